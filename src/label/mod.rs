//! Pseudonym label rendering.
//!
//! A structured content schema (rows × columns of text and barcode cells)
//! is rasterized into an RGB image of the original label's dimensions.
//! Font rasterization and barcode symbologies are external collaborators
//! behind narrow seams ([`TextRasterizer`], the `barcode` module).

pub mod barcode;
mod content;
mod render;
mod schema;
mod text;

pub use barcode::Symbology;
pub use content::{barcode_payload, slide_label_schema, LabelContext};
pub use render::LabelRenderer;
pub use schema::{
    Field, FieldAlign, FieldContent, FontFace, Padding, Schema, SchemaStretch,
    DEFAULT_CODE_SIZE, DEFAULT_FONT_SIZE,
};
pub use text::{AbGlyphRasterizer, TextRasterizer};
