//! Vendor detection for Whole Slide Image files.
//!
//! The engine only rewrites Aperio SVS slides, but it recognizes the other
//! common WSI vendors so multi-slide flows can skip them with a useful
//! message instead of failing on a parse error:
//!
//! - **Aperio SVS**: TIFF-based, identified by the "Aperio" marker in the
//!   first IFD's ImageDescription
//! - **Hamamatsu NDPI**: recognized by file extension, deferred
//! - **Mirax MRXS**: recognized by file extension, deferred
//!
//! BigTIFF files surface as a parse rejection before vendor detection runs.

use std::path::Path;

use crate::error::TiffError;

use super::tiff::SlideFile;

// =============================================================================
// Vendor
// =============================================================================

/// Detected slide vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vendor {
    /// Aperio SVS (the only vendor the rewriter handles)
    Aperio,

    /// Hamamatsu NDPI (recognized, deferred)
    Hamamatsu,

    /// Mirax MRXS (recognized, deferred)
    Mirax,

    /// Anything else
    Unknown,
}

impl Vendor {
    /// Get a human-readable name for the vendor.
    pub const fn name(&self) -> &'static str {
        match self {
            Vendor::Aperio => "Aperio",
            Vendor::Hamamatsu => "Hamamatsu",
            Vendor::Mirax => "Mirax",
            Vendor::Unknown => "Unknown",
        }
    }

    /// Whether the engine can rewrite slides from this vendor.
    #[inline]
    pub const fn is_supported(&self) -> bool {
        matches!(self, Vendor::Aperio)
    }
}

// =============================================================================
// Detection
// =============================================================================

/// Marker string for the Aperio SVS format.
const APERIO_MARKER: &str = "Aperio";

/// Detect the vendor of an opened slide file.
///
/// The first IFD's ImageDescription is checked for the Aperio marker;
/// Hamamatsu and Mirax are recognized by their file extensions.
pub fn detect_vendor(slide: &mut SlideFile) -> Result<Vendor, TiffError> {
    if slide.ifd_count() > 0 {
        if let Some(description) = slide.description(0)? {
            if description.contains(APERIO_MARKER) {
                return Ok(Vendor::Aperio);
            }
        }
    }

    Ok(vendor_from_extension(slide.path()).unwrap_or(Vendor::Unknown))
}

/// Vendor recognized purely by file extension.
///
/// Used both as the fallback of [`detect_vendor`] and for files that do
/// not parse as TIFF at all (Mirax MRXS is not TIFF-based), so they can be
/// skipped with a vendor message instead of a parse error.
pub fn vendor_from_extension(path: &Path) -> Option<Vendor> {
    match extension_of(path).as_deref() {
        Some("ndpi") => Some(Vendor::Hamamatsu),
        Some("mrxs") => Some(Vendor::Mirax),
        _ => None,
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

// =============================================================================
// Tests
// =============================================================================
