//! # WSI Pseudonym
//!
//! A pseudonymization engine for Whole Slide Images (WSI) in digital
//! pathology.
//!
//! A slide scan carries more than the gigapixel pyramid: it embeds a
//! photograph of the physical glass-slide label and free-text metadata
//! that together expose patient identity. This library produces a clone of
//! an Aperio SVS slide in which the label image and identifying metadata
//! are replaced by synthetic equivalents, while the originals are escrowed
//! encrypted so an authorized party can reverse the operation exactly.
//!
//! ## Features
//!
//! - **Byte-exact rewriting**: only the label strips and description tags
//!   change; every other byte of the pyramid is preserved
//! - **Reversibility**: originals are escrowed under per-blob Fernet keys
//!   and restored at their original file offsets
//! - **Stable pseudonyms**: real ↔ pseudonymous mappings persist in a
//!   registry, so repeated ingestion reuses the same pseudonyms
//! - **Synthetic labels**: rendered from a grid schema with text rows and
//!   a PDF417 barcode, scaled into the original label's dimensions
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`mod@format`] - classic-TIFF parsing, vendor detection, and the
//!   in-place rewriter
//! - [`codec`] - raster → TIFF strips (none/LZW/Adobe-Deflate, predictors)
//! - [`label`] - pseudonym label schema and rendering
//! - [`escrow`] - encrypted blob store for the originals
//! - [`registry`] - identity records, associations, and the registry trait
//! - [`engine`] - the pseudonymization controller
//! - [`manifest`] - input/output manifest shapes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wsi_pseudonym::{
//!     AbGlyphRasterizer, EngineConfig, LocalRegistry, Manifest, Pseudonymizer,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = LocalRegistry::open("data/registry.json").await?;
//!     let fonts = Arc::new(AbGlyphRasterizer::from_files(
//!         "fonts/HindMadurai-Bold.ttf",
//!         "fonts/seguibl.ttf",
//!     )?);
//!
//!     let controller = Pseudonymizer::new(EngineConfig::default(), registry, fonts)?;
//!
//!     let input = Manifest::from_json(&std::fs::read_to_string("slide.json")?)?;
//!     let output = controller.pseudonymize(&input).await?;
//!     println!("{}", output.to_json_pretty()?);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod escrow;
pub mod format;
pub mod ids;
pub mod label;
pub mod manifest;
pub mod registry;

// Re-export commonly used types
pub use config::{Cli, Command, EngineConfig, RunConfig};
pub use engine::Pseudonymizer;
pub use error::{
    CodecError, EscrowError, LabelError, PseudonymError, RegistryError, TiffError,
};
pub use escrow::{DescriptionBlob, DescriptionRecord, EscrowStore, LabelBlob};
pub use format::{
    detect_vendor, is_classic_tiff_header, vendor_from_extension, ByteOrder, Compression,
    SlideFile, TiffTag, Vendor,
};
pub use label::{
    slide_label_schema, AbGlyphRasterizer, LabelContext, LabelRenderer, Schema, Symbology,
    TextRasterizer,
};
pub use manifest::{CaseManifest, Manifest, PatientManifest, SlideManifest, StudyManifest};
pub use registry::{
    allocate_pseudo_id, BlobRef, CaseRecord, EntityKind, LocalRegistry, PatientRecord, Registry,
    Sex, SlideRecord, StudyRecord, TimeStamp,
};
