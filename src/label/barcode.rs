//! Barcode generation.
//!
//! Symbology encoders are external collaborators: everything goes through
//! `rxing` (a ZXing port covering DataMatrix, PDF417 and Code39 writers)
//! and comes back as a plain module bitmap that the renderer scales to the
//! requested code size.

use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use rxing::{BarcodeFormat, MultiFormatWriter, Writer};

use crate::error::LabelError;

// =============================================================================
// Symbology
// =============================================================================

/// Barcode symbologies available on labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbology {
    /// 2D Data Matrix
    DataMatrix,

    /// Stacked-linear PDF417 (the slide-label symbology)
    Pdf417,

    /// Linear Code 39
    Code39,
}

impl Symbology {
    pub const fn name(&self) -> &'static str {
        match self {
            Symbology::DataMatrix => "DataMatrix",
            Symbology::Pdf417 => "PDF417",
            Symbology::Code39 => "Code39",
        }
    }

    fn format(&self) -> BarcodeFormat {
        match self {
            Symbology::DataMatrix => BarcodeFormat::DATA_MATRIX,
            Symbology::Pdf417 => BarcodeFormat::PDF_417,
            Symbology::Code39 => BarcodeFormat::CODE_39,
        }
    }

    /// Requested raster dimensions handed to the writer for a target width.
    /// DataMatrix is square; the linear and stacked symbologies are wide.
    const fn requested_dimensions(&self, width: u32) -> (u32, u32) {
        match self {
            Symbology::DataMatrix => (width, width),
            Symbology::Pdf417 | Symbology::Code39 => (width, width / 3),
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a payload into a black-on-white raster scaled to `code_size`
/// pixels wide.
pub fn encode(symbology: Symbology, payload: &str, code_size: u32) -> Result<RgbImage, LabelError> {
    let (width, height) = symbology.requested_dimensions(code_size.max(1));

    let matrix = MultiFormatWriter
        .encode(payload, &symbology.format(), width as i32, height as i32)
        .map_err(|e| LabelError::Barcode {
            symbology: symbology.name(),
            message: e.to_string(),
        })?;

    let (mw, mh) = (matrix.getWidth(), matrix.getHeight());
    let mut image = RgbImage::from_pixel(mw, mh, Rgb([255, 255, 255]));
    for y in 0..mh {
        for x in 0..mw {
            if matrix.get(x, y) {
                image.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
    }

    Ok(resize_by_width(&image, code_size))
}

/// Scale an image to a new width, preserving the aspect ratio.
pub fn resize_by_width(image: &RgbImage, new_width: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    if new_width == width || width == 0 {
        return image.clone();
    }

    let ratio = new_width as f64 / width as f64;
    let new_height = ((height as f64 * ratio).floor() as u32).max(1);
    image::imageops::resize(image, new_width.max(1), new_height, FilterType::Lanczos3)
}

// =============================================================================
// Tests
// =============================================================================
