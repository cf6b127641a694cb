//! Strip codec: encodes a raster into TIFF strips.
//!
//! The pseudonym label raster must be re-inserted into the slide using the
//! same strip layout the original label used, so this module takes the
//! original IFD's `rows_per_strip`, predictor and compression and produces
//! ready-to-write strips. Supported compressions are uncompressed, TIFF
//! variable-width LZW (via `weezl`) and Adobe Deflate (zlib via `flate2`
//! with default parameters).

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression as FlateCompression;
use weezl::encode::Encoder as LzwEncoder;
use weezl::BitOrder;

use crate::error::CodecError;
use crate::format::tiff::Compression;

mod predictor;

pub use predictor::Predictor;

// =============================================================================
// Strip
// =============================================================================

/// One encoded strip, indexed top-to-bottom from 0.
#[derive(Debug, Clone)]
pub struct Strip {
    /// Strip index in row-major top-to-bottom order
    pub index: usize,

    /// Encoded strip bytes
    pub data: Vec<u8>,
}

// =============================================================================
// Encoding parameters
// =============================================================================

/// How a raster is cut and encoded into strips.
#[derive(Debug, Clone, Copy)]
pub struct StripLayout {
    /// Rows per strip; the trailing strip holds the remainder
    pub rows_per_strip: u32,

    /// Predictor applied in place before compression
    pub predictor: Predictor,

    /// Compression scheme; must be encodable
    pub compression: Compression,
}

// =============================================================================
// encode_strips
// =============================================================================

/// Encode an `height × width × samples` byte raster into TIFF strips.
///
/// The predictor operates on a working copy of the raster, then strips of
/// `rows_per_strip` rows (plus one remainder strip when the height is not a
/// multiple) are compressed independently.
pub fn encode_strips(
    raster: &[u8],
    height: u32,
    width: u32,
    samples: u32,
    layout: StripLayout,
) -> Result<Vec<Strip>, CodecError> {
    let expected = height as usize * width as usize * samples as usize;
    if raster.len() != expected {
        return Err(CodecError::RasterSizeMismatch {
            expected,
            actual: raster.len(),
        });
    }

    if !layout.compression.is_encodable() {
        return Err(CodecError::UnsupportedCompression(
            layout.compression.as_u16(),
        ));
    }

    let rows_per_strip = layout.rows_per_strip.max(1);

    let mut plane = raster.to_vec();
    predictor::encode(
        &mut plane,
        width as usize,
        samples as usize,
        8,
        layout.predictor,
    )?;

    let full_strips = height / rows_per_strip;
    let remainder = height % rows_per_strip;
    let strip_count = full_strips + u32::from(remainder > 0);

    let row_bytes = width as usize * samples as usize;
    let mut strips = Vec::with_capacity(strip_count as usize);

    for index in 0..strip_count {
        let start_row = (index * rows_per_strip) as usize;
        let rows = if index == full_strips {
            remainder as usize
        } else {
            rows_per_strip as usize
        };
        let tile = &plane[start_row * row_bytes..(start_row + rows) * row_bytes];

        let data = match layout.compression {
            Compression::None => tile.to_vec(),
            Compression::AdobeDeflate => deflate_encode(tile)?,
            Compression::Lzw => lzw_encode(tile)?,
            other => return Err(CodecError::UnsupportedCompression(other.as_u16())),
        };

        strips.push(Strip {
            index: index as usize,
            data,
        });
    }

    Ok(strips)
}

/// Compress bytes with zlib at the default level.
fn deflate_encode(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), FlateCompression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

/// Compress bytes with TIFF's variable-width LZW.
///
/// MSB-first bit order, 8-bit symbols, clear/EOI codes and the early
/// code-width switch TIFF writers use.
fn lzw_encode(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    let mut encoder = LzwEncoder::with_tiff_size_switch(BitOrder::Msb, 8);
    let result = encoder.into_stream(&mut out).encode_all(bytes);
    result.status.map_err(|e| CodecError::Lzw(e.to_string()))?;
    Ok(out)
}

// =============================================================================
// Tests
// =============================================================================
