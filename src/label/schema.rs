//! Label content schema.
//!
//! A [`Schema`] is a grid of rows × columns; each [`Field`] occupies a cell
//! range and carries either text (font face + size) or a barcode (symbology
//! + code size), an alignment and a padding. The renderer turns a schema
//! into a raster sized from the fields' intrinsic dimensions.

use crate::error::LabelError;

use super::barcode::Symbology;

// =============================================================================
// Vocabulary
// =============================================================================

/// Font faces available on labels.
///
/// The concrete TTF files behind the faces are external assets supplied
/// through the text rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFace {
    /// Body text face
    Regular,

    /// Heavier face used for the large slide ID
    Display,
}

/// Horizontal position of content within its cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAlign {
    Left,
    Right,
    Center,
}

/// How the rendered schema raster is placed into the target label area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStretch {
    /// Top-left placement on a black canvas
    None,

    /// Centered on a white canvas filling the target
    Fill,
}

/// Cell padding in pixels: `(top, right, bottom, left)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Padding {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl Padding {
    pub const fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Padding {
            top,
            right,
            bottom,
            left,
        }
    }

    pub const ZERO: Padding = Padding::new(0, 0, 0, 0);
}

// =============================================================================
// Field
// =============================================================================

/// What a field renders.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldContent {
    Text {
        text: String,
        font: FontFace,
        size: f32,
    },
    Barcode {
        symbology: Symbology,
        payload: String,
        code_size: u32,
    },
}

/// Default font size for text fields.
pub const DEFAULT_FONT_SIZE: f32 = 32.0;

/// Default pixel width for barcode fields.
pub const DEFAULT_CODE_SIZE: u32 = 100;

/// One cell of a label schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub content: FieldContent,
    pub col: usize,
    pub row: usize,
    pub colspan: usize,
    pub rowspan: usize,
    pub align: FieldAlign,
    pub padding: Padding,
}

impl Field {
    /// A text field with the regular face at the default size.
    pub fn text(text: impl Into<String>, col: usize, row: usize) -> Self {
        Field {
            content: FieldContent::Text {
                text: text.into(),
                font: FontFace::Regular,
                size: DEFAULT_FONT_SIZE,
            },
            col,
            row,
            colspan: 1,
            rowspan: 1,
            align: FieldAlign::Left,
            padding: Padding::ZERO,
        }
    }

    /// A barcode field at the default code size.
    pub fn barcode(symbology: Symbology, payload: impl Into<String>, col: usize, row: usize) -> Self {
        Field {
            content: FieldContent::Barcode {
                symbology,
                payload: payload.into(),
                code_size: DEFAULT_CODE_SIZE,
            },
            col,
            row,
            colspan: 1,
            rowspan: 1,
            align: FieldAlign::Left,
            padding: Padding::ZERO,
        }
    }

    pub fn with_font(mut self, font: FontFace, size: f32) -> Self {
        if let FieldContent::Text {
            font: ref mut f,
            size: ref mut s,
            ..
        } = self.content
        {
            *f = font;
            *s = size;
        }
        self
    }

    pub fn with_code_size(mut self, size: u32) -> Self {
        if let FieldContent::Barcode {
            code_size: ref mut c,
            ..
        } = self.content
        {
            *c = size;
        }
        self
    }

    pub fn with_align(mut self, align: FieldAlign) -> Self {
        self.align = align;
        self
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_span(mut self, colspan: usize, rowspan: usize) -> Self {
        self.colspan = colspan.max(1);
        self.rowspan = rowspan.max(1);
        self
    }
}

// =============================================================================
// Schema
// =============================================================================

/// A grid of fields plus outer padding and stretch mode.
#[derive(Debug, Clone)]
pub struct Schema {
    pub columns: usize,
    pub rows: usize,
    pub stretch: SchemaStretch,
    pub padding: Padding,
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(columns: usize, rows: usize) -> Self {
        Schema {
            columns,
            rows,
            stretch: SchemaStretch::Fill,
            padding: Padding::ZERO,
            fields: Vec::new(),
        }
    }

    pub fn with_padding(mut self, padding: Padding) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_stretch(mut self, stretch: SchemaStretch) -> Self {
        self.stretch = stretch;
        self
    }

    /// Add a field, checking it stays inside the grid.
    pub fn add(&mut self, field: Field) -> Result<(), LabelError> {
        if field.col + field.colspan > self.columns || field.row + field.rowspan > self.rows {
            return Err(LabelError::FieldOutOfGrid {
                col: field.col,
                row: field.row,
                cols: self.columns,
                rows: self.rows,
            });
        }
        self.fields.push(field);
        Ok(())
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
