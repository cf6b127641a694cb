//! File format handling for Whole Slide Images.
//!
//! This module provides the classic-TIFF parser and rewriter plus vendor
//! detection for the slide formats the engine recognizes.

pub mod detect;
pub mod tiff;

pub use detect::{detect_vendor, vendor_from_extension, Vendor};
pub use tiff::{
    is_classic_tiff_header, ByteOrder, Compression, FieldType, Ifd, IfdEntry, SlideFile,
    TiffHeader, TiffTag, IFD_ENTRY_SIZE, TIFF_HEADER_SIZE,
};
