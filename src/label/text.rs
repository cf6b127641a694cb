//! Text measurement and rasterization.
//!
//! Font assets are external collaborators, consumed through the narrow
//! [`TextRasterizer`] trait: the renderer only needs to measure a string
//! and to draw it dark-on-light at a position. The production
//! implementation rasterizes TTF outlines with `ab_glyph`.

use std::path::Path;

use ab_glyph::{point, Font, FontArc, PxScale, ScaleFont};
use image::RgbImage;

use crate::error::LabelError;

use super::schema::FontFace;

// =============================================================================
// TextRasterizer
// =============================================================================

/// The font seam of the label renderer.
pub trait TextRasterizer: Send + Sync {
    /// Intrinsic pixel dimensions of a string at the given face and size.
    fn measure(&self, text: &str, face: FontFace, size: f32) -> (u32, u32);

    /// Draw a string dark-on-light with its top-left corner at `(x, y)`.
    fn draw(&self, canvas: &mut RgbImage, x: u32, y: u32, text: &str, face: FontFace, size: f32);
}

// =============================================================================
// AbGlyphRasterizer
// =============================================================================

/// TTF-backed rasterizer over two font faces.
pub struct AbGlyphRasterizer {
    regular: FontArc,
    display: FontArc,
}

impl AbGlyphRasterizer {
    /// Load both faces from TTF files.
    pub fn from_files(
        regular: impl AsRef<Path>,
        display: impl AsRef<Path>,
    ) -> Result<Self, LabelError> {
        let regular = std::fs::read(regular)?;
        let display = std::fs::read(display)?;
        Self::from_bytes(regular, display)
    }

    /// Build from raw TTF bytes.
    pub fn from_bytes(regular: Vec<u8>, display: Vec<u8>) -> Result<Self, LabelError> {
        Ok(AbGlyphRasterizer {
            regular: FontArc::try_from_vec(regular)
                .map_err(|e| LabelError::Font(format!("regular face: {e}")))?,
            display: FontArc::try_from_vec(display)
                .map_err(|e| LabelError::Font(format!("display face: {e}")))?,
        })
    }

    fn font(&self, face: FontFace) -> &FontArc {
        match face {
            FontFace::Regular => &self.regular,
            FontFace::Display => &self.display,
        }
    }
}

impl TextRasterizer for AbGlyphRasterizer {
    fn measure(&self, text: &str, face: FontFace, size: f32) -> (u32, u32) {
        let font = self.font(face);
        let scaled = font.as_scaled(PxScale::from(size));

        let mut width = 0.0f32;
        let mut previous = None;
        for ch in text.chars() {
            let glyph_id = scaled.glyph_id(ch);
            if let Some(prev) = previous {
                width += scaled.kern(prev, glyph_id);
            }
            width += scaled.h_advance(glyph_id);
            previous = Some(glyph_id);
        }

        let height = scaled.ascent() - scaled.descent();
        (width.ceil() as u32, height.ceil() as u32)
    }

    fn draw(&self, canvas: &mut RgbImage, x: u32, y: u32, text: &str, face: FontFace, size: f32) {
        let font = self.font(face);
        let scale = PxScale::from(size);
        let scaled = font.as_scaled(scale);

        let baseline = y as f32 + scaled.ascent();
        let mut caret = x as f32;
        let mut previous = None;

        for ch in text.chars() {
            let glyph_id = scaled.glyph_id(ch);
            if let Some(prev) = previous {
                caret += scaled.kern(prev, glyph_id);
            }

            let glyph = glyph_id.with_scale_and_position(scale, point(caret, baseline));
            if let Some(outlined) = font.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                outlined.draw(|gx, gy, coverage| {
                    let px = bounds.min.x as i64 + gx as i64;
                    let py = bounds.min.y as i64 + gy as i64;
                    if px < 0 || py < 0 {
                        return;
                    }
                    let (px, py) = (px as u32, py as u32);
                    if px >= canvas.width() || py >= canvas.height() {
                        return;
                    }

                    // Darken toward black proportionally to coverage
                    let level = (255.0 * (1.0 - coverage.clamp(0.0, 1.0))) as u8;
                    let pixel = canvas.get_pixel_mut(px, py);
                    for channel in pixel.0.iter_mut() {
                        *channel = (*channel).min(level);
                    }
                });
            }

            caret += scaled.h_advance(glyph_id);
            previous = Some(glyph_id);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
