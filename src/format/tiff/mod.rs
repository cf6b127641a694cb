//! TIFF structure parsing and rewriting.
//!
//! This module is the foundation of the pseudonymization engine: it parses
//! classic TIFF files (the container format of Aperio SVS) and performs the
//! byte-exact in-place edits that swap the label image and description
//! metadata while preserving every other byte of the pyramid.
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian,
//!   MM = big-endian) in the header. All reads and writes respect this order.
//!
//! - **Classic TIFF only**: BigTIFF (64-bit offsets) is recognized and
//!   rejected; the rewriter's 4-byte tag edits are specific to classic TIFF.
//!
//! - **IFD (Image File Directory)**: Contains metadata and pointers to image
//!   data. SVS files have one IFD per pyramid level plus label and macro
//!   images; the label IFD is identified by its description text.
//!
//! - **Inline vs offset values**: Small values are stored inline in the IFD
//!   entry, larger values at an offset pointed to by the entry. Edits resolve
//!   both uniformly through the entry's value location.

mod ifd;
mod parser;
mod rewriter;
mod tags;

pub use ifd::{Ifd, IfdEntry};
pub use parser::{is_classic_tiff_header, ByteOrder, TiffHeader, IFD_ENTRY_SIZE, TIFF_HEADER_SIZE};
pub use rewriter::SlideFile;
pub use tags::{Compression, FieldType, TiffTag};
