//! Schema layout and rasterization.
//!
//! Rendering happens in three passes:
//!
//! 1. **Sizing** — every field's intrinsic dimensions (font metrics or
//!    barcode raster plus padding) determine column widths and row heights;
//!    multi-cell fields distribute their deficit evenly over the cells they
//!    cover, and columns are floored at a minimum width.
//! 2. **Placement** — each field is drawn at the sum of the preceding
//!    column widths / row heights, adjusted for alignment and padding.
//! 3. **Fit** — the raster is uniformly scaled to the original label
//!    dimensions (height first, re-scaled if the width overflows) and
//!    centered on a white canvas in FILL mode.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

use crate::error::LabelError;

use super::barcode;
use super::schema::{Field, FieldAlign, FieldContent, Schema, SchemaStretch};
use super::text::TextRasterizer;

// =============================================================================
// Constants
// =============================================================================

/// Minimum width of a schema column in pixels.
const MIN_COLUMN_WIDTH: u32 = 140;

// =============================================================================
// LabelRenderer
// =============================================================================

/// Renders a [`Schema`] into an RGB raster of the target label dimensions.
pub struct LabelRenderer<'a> {
    text: &'a dyn TextRasterizer,
}

impl<'a> LabelRenderer<'a> {
    pub fn new(text: &'a dyn TextRasterizer) -> Self {
        LabelRenderer { text }
    }

    /// Render a schema to exactly `target_width × target_height` pixels.
    pub fn render(
        &self,
        schema: &Schema,
        target_width: u32,
        target_height: u32,
    ) -> Result<RgbImage, LabelError> {
        if schema.is_empty() {
            return Err(LabelError::EmptySchema);
        }

        let prepared = self.prepare(schema)?;
        let widths = column_sizes(schema, &prepared);
        let heights = row_sizes(schema, &prepared);

        let canvas = self.draw(schema, &prepared, &widths, &heights);
        let canvas = pad_canvas(canvas, schema);
        Ok(fit_to_target(canvas, schema.stretch, target_width, target_height))
    }

    /// Measure text fields and pre-render barcodes.
    fn prepare<'b>(&self, schema: &'b Schema) -> Result<Vec<PreparedField<'b>>, LabelError> {
        schema
            .fields()
            .iter()
            .map(|field| {
                let (content_width, content_height, image) = match &field.content {
                    FieldContent::Text { text, font, size } => {
                        let (w, h) = self.text.measure(text, *font, *size);
                        (w, h, None)
                    }
                    FieldContent::Barcode {
                        symbology,
                        payload,
                        code_size,
                    } => {
                        let image = barcode::encode(*symbology, payload, *code_size)?;
                        let (w, h) = image.dimensions();
                        (w, h, Some(image))
                    }
                };

                Ok(PreparedField {
                    field,
                    content_width,
                    content_height,
                    image,
                })
            })
            .collect()
    }

    /// Draw all fields on a white canvas sized from the resolved grid.
    fn draw(
        &self,
        _schema: &Schema,
        prepared: &[PreparedField<'_>],
        widths: &[u32],
        heights: &[u32],
    ) -> RgbImage {
        let total_width: u32 = widths.iter().sum();
        let total_height: u32 = heights.iter().sum();
        let mut canvas = RgbImage::from_pixel(
            total_width.max(1),
            total_height.max(1),
            Rgb([255, 255, 255]),
        );

        for item in prepared {
            let field = item.field;
            let padding = field.padding;

            let mut x: i64 = widths[..field.col].iter().map(|&w| w as i64).sum();

            if field.align != FieldAlign::Left || field.colspan > 1 {
                let span_width: i64 = widths[field.col..field.col + field.colspan]
                    .iter()
                    .map(|&w| w as i64)
                    .sum();

                // Barcodes center on their code size, text on its measured
                // width
                let content_width = match &field.content {
                    FieldContent::Text { .. } => item.content_width as i64,
                    FieldContent::Barcode { code_size, .. } => *code_size as i64,
                };

                let mut shift = span_width - content_width;
                if field.align == FieldAlign::Center || field.colspan > 1 {
                    shift /= 2;
                }
                x += shift.max(0);
            }

            match field.align {
                FieldAlign::Left => x += padding.left as i64,
                FieldAlign::Right => x -= padding.right as i64,
                FieldAlign::Center => {}
            }

            let y: i64 = heights[..field.row].iter().map(|&h| h as i64).sum::<i64>()
                + padding.top as i64;

            let x = x.max(0);
            match &field.content {
                FieldContent::Text { text, font, size } => {
                    self.text
                        .draw(&mut canvas, x as u32, y.max(0) as u32, text, *font, *size);
                }
                FieldContent::Barcode { .. } => {
                    if let Some(ref image) = item.image {
                        imageops::replace(&mut canvas, image, x, y);
                    }
                }
            }
        }

        canvas
    }
}

/// A field with its measured content and any pre-rendered barcode raster.
struct PreparedField<'f> {
    field: &'f Field,
    content_width: u32,
    content_height: u32,
    image: Option<RgbImage>,
}

impl PreparedField<'_> {
    fn intrinsic_width(&self) -> u32 {
        self.content_width + self.field.padding.left + self.field.padding.right
    }

    fn intrinsic_height(&self) -> u32 {
        self.content_height + self.field.padding.top + self.field.padding.bottom
    }
}

// =============================================================================
// Grid sizing
// =============================================================================

/// Resolve column widths: the maximum intrinsic width of single-column
/// fields per column, spans distributing their deficit, then the minimum
/// column width floor.
fn column_sizes(schema: &Schema, prepared: &[PreparedField<'_>]) -> Vec<u32> {
    let mut widths = vec![0u32; schema.columns];
    let mut spans = Vec::new();

    for item in prepared {
        let required = item.intrinsic_width();
        if item.field.colspan == 1 {
            let slot = &mut widths[item.field.col];
            *slot = (*slot).max(required);
        } else {
            spans.push((item.field.col, item.field.colspan, required));
        }
    }

    distribute_spans(&mut widths, &spans);

    for width in &mut widths {
        *width = (*width).max(MIN_COLUMN_WIDTH);
    }

    widths
}

/// Resolve row heights symmetrically (no minimum).
fn row_sizes(schema: &Schema, prepared: &[PreparedField<'_>]) -> Vec<u32> {
    let mut heights = vec![0u32; schema.rows];
    let mut spans = Vec::new();

    for item in prepared {
        let required = item.intrinsic_height();
        if item.field.rowspan == 1 {
            let slot = &mut heights[item.field.row];
            *slot = (*slot).max(required);
        } else {
            spans.push((item.field.row, item.field.rowspan, required));
        }
    }

    distribute_spans(&mut heights, &spans);
    heights
}

/// Add `⌈deficit / span⌉` to every covered cell of each under-sized span.
fn distribute_spans(sizes: &mut [u32], spans: &[(usize, usize, u32)]) {
    for &(start, span, required) in spans {
        let covered: u32 = sizes[start..start + span].iter().sum();
        if covered < required {
            let gap = (required - covered).div_ceil(span as u32);
            for size in &mut sizes[start..start + span] {
                *size += gap;
            }
        }
    }
}

// =============================================================================
// Outer padding and target fitting
// =============================================================================

/// Apply the schema's outer padding on a fresh white canvas.
fn pad_canvas(canvas: RgbImage, schema: &Schema) -> RgbImage {
    let padding = schema.padding;
    if padding == super::schema::Padding::ZERO {
        return canvas;
    }

    let (width, height) = canvas.dimensions();
    let mut padded = RgbImage::from_pixel(
        width + padding.left + padding.right,
        height + padding.top + padding.bottom,
        Rgb([255, 255, 255]),
    );
    imageops::replace(&mut padded, &canvas, padding.left as i64, padding.top as i64);
    padded
}

/// Uniformly scale the raster into the target label dimensions.
///
/// The raster is first scaled so its height matches the target; if that
/// overflows the target width it is re-scaled to the width instead. FILL
/// centers the result on a white target-sized canvas, otherwise the result
/// sits top-left on a black one.
fn fit_to_target(
    canvas: RgbImage,
    stretch: SchemaStretch,
    target_width: u32,
    target_height: u32,
) -> RgbImage {
    let (width, height) = canvas.dimensions();

    let ratio = target_height as f64 / height as f64;
    let mut scaled_width = (width as f64 * ratio) as u32;
    let mut scaled_height = (height as f64 * ratio) as u32;

    if scaled_width > target_width {
        let ratio = target_width as f64 / scaled_width as f64;
        scaled_height = (scaled_height as f64 * ratio) as u32;
        scaled_width = (scaled_width as f64 * ratio) as u32;
    }

    let scaled = imageops::resize(
        &canvas,
        scaled_width.max(1),
        scaled_height.max(1),
        FilterType::Lanczos3,
    );

    let background = match stretch {
        SchemaStretch::Fill => Rgb([255, 255, 255]),
        SchemaStretch::None => Rgb([0, 0, 0]),
    };
    let mut out = RgbImage::from_pixel(target_width, target_height, background);

    let (offset_x, offset_y) = match stretch {
        SchemaStretch::Fill => (
            (target_width.saturating_sub(scaled.width())) / 2,
            (target_height.saturating_sub(scaled.height())) / 2,
        ),
        SchemaStretch::None => (0, 0),
    };
    imageops::replace(&mut out, &scaled, offset_x as i64, offset_y as i64);

    out
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label::schema::{FontFace, Padding};

    /// Deterministic fixed-advance rasterizer so layout tests need no font
    /// assets.
    struct StubText;

    impl TextRasterizer for StubText {
        fn measure(&self, text: &str, _face: FontFace, size: f32) -> (u32, u32) {
            let advance = (size * 0.6).ceil() as u32;
            (advance * text.chars().count() as u32, size.ceil() as u32)
        }

        fn draw(
            &self,
            canvas: &mut RgbImage,
            x: u32,
            y: u32,
            text: &str,
            face: FontFace,
            size: f32,
        ) {
            let (w, h) = self.measure(text, face, size);
            for py in y..(y + h).min(canvas.height()) {
                for px in x..(x + w).min(canvas.width()) {
                    canvas.put_pixel(px, py, Rgb([0, 0, 0]));
                }
            }
        }
    }

    fn text_schema(rows: usize) -> Schema {
        let mut schema = Schema::new(1, rows);
        for row in 0..rows {
            schema
                .add(Field::text(format!("row {row}"), 0, row))
                .unwrap();
        }
        schema
    }

    // -------------------------------------------------------------------------
    // Grid sizing
    // -------------------------------------------------------------------------

    #[test]
    fn test_columns_floored_at_minimum_width() {
        let renderer = LabelRenderer::new(&StubText);
        let schema = text_schema(1);
        let prepared = renderer.prepare(&schema).unwrap();
        let widths = column_sizes(&schema, &prepared);
        assert_eq!(widths, vec![MIN_COLUMN_WIDTH]);
    }

    #[test]
    fn test_wide_content_beats_minimum_width() {
        let renderer = LabelRenderer::new(&StubText);
        let mut schema = Schema::new(1, 1);
        // 20 chars at size 32: 20 * 20 = 400 wide
        schema
            .add(Field::text("x".repeat(20), 0, 0))
            .unwrap();
        let prepared = renderer.prepare(&schema).unwrap();
        let widths = column_sizes(&schema, &prepared);
        assert_eq!(widths, vec![400]);
    }

    #[test]
    fn test_padding_contributes_to_intrinsic_size() {
        let renderer = LabelRenderer::new(&StubText);
        let mut schema = Schema::new(1, 1);
        schema
            .add(
                Field::text("x".repeat(20), 0, 0)
                    .with_padding(Padding::new(3, 10, 4, 30)),
            )
            .unwrap();
        let prepared = renderer.prepare(&schema).unwrap();

        assert_eq!(column_sizes(&schema, &prepared), vec![440]);
        assert_eq!(row_sizes(&schema, &prepared), vec![32 + 3 + 4]);
    }

    #[test]
    fn test_span_deficit_distributed_evenly() {
        let mut sizes = vec![100, 100, 100];
        distribute_spans(&mut sizes, &[(0, 2, 250)]);
        // Deficit 50 over 2 columns: ceil(25) each
        assert_eq!(sizes, vec![125, 125, 100]);
    }

    #[test]
    fn test_span_with_no_deficit_is_noop() {
        let mut sizes = vec![200, 200];
        distribute_spans(&mut sizes, &[(0, 2, 300)]);
        assert_eq!(sizes, vec![200, 200]);
    }

    #[test]
    fn test_row_heights_follow_tallest_field() {
        let renderer = LabelRenderer::new(&StubText);
        let mut schema = Schema::new(1, 2);
        schema
            .add(Field::text("big", 0, 0).with_font(FontFace::Display, 40.0))
            .unwrap();
        schema.add(Field::text("small", 0, 1)).unwrap();
        let prepared = renderer.prepare(&schema).unwrap();

        assert_eq!(row_sizes(&schema, &prepared), vec![40, 32]);
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    #[test]
    fn test_render_is_target_sized() {
        let renderer = LabelRenderer::new(&StubText);
        let schema = text_schema(3);
        let image = renderer.render(&schema, 400, 300).unwrap();
        assert_eq!(image.dimensions(), (400, 300));
    }

    #[test]
    fn test_render_fill_centers_on_white() {
        let renderer = LabelRenderer::new(&StubText);
        let schema = text_schema(2);
        let image = renderer.render(&schema, 600, 200).unwrap();

        // Corners stay white in FILL mode
        assert_eq!(image.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(image.get_pixel(599, 199).0, [255, 255, 255]);

        // Some text pixels made it through scaling
        assert!(image.pixels().any(|p| p.0[0] < 128));
    }

    #[test]
    fn test_render_none_stretch_fills_black() {
        let renderer = LabelRenderer::new(&StubText);
        let schema = text_schema(2).with_stretch(SchemaStretch::None);
        let image = renderer.render(&schema, 600, 200).unwrap();

        // Bottom-right is unpainted background
        assert_eq!(image.get_pixel(599, 199).0, [0, 0, 0]);
    }

    #[test]
    fn test_render_empty_schema_rejected() {
        let renderer = LabelRenderer::new(&StubText);
        let schema = Schema::new(1, 1);
        let result = renderer.render(&schema, 100, 100);
        assert!(matches!(result, Err(LabelError::EmptySchema)));
    }

    #[test]
    fn test_outer_padding_applied() {
        let schema = Schema::new(1, 1).with_padding(Padding::new(5, 10, 15, 20));
        let canvas = RgbImage::from_pixel(100, 50, Rgb([0, 0, 0]));
        let padded = pad_canvas(canvas, &schema);
        assert_eq!(padded.dimensions(), (130, 70));
        // Padding area is white, content area kept
        assert_eq!(padded.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(padded.get_pixel(20, 5).0, [0, 0, 0]);
    }

    #[test]
    fn test_fit_rescales_when_width_overflows() {
        // A very wide canvas: scaling to height would overflow the width,
        // so the fit re-scales to the width and letterboxes vertically
        let canvas = RgbImage::from_pixel(1000, 100, Rgb([0, 0, 0]));
        let out = fit_to_target(canvas, SchemaStretch::Fill, 200, 100);
        assert_eq!(out.dimensions(), (200, 100));
        // Top rows are white letterbox
        assert_eq!(out.get_pixel(100, 0).0, [255, 255, 255]);
        // Vertical center is content
        assert_eq!(out.get_pixel(100, 50).0, [0, 0, 0]);
    }
}
