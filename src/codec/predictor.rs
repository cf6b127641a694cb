//! TIFF predictors applied before strip compression.
//!
//! A predictor rewrites the sample plane in place so the compressor sees
//! smaller symbol distances. Horizontal predictors difference along the
//! width axis; the ×2/×4 variants set the delta distance in pixels. The
//! floating-point predictor shuffles each value's bytes into big-endian
//! planes per row before byte differencing and applies only to 32-bit
//! float samples.

use crate::error::CodecError;

// =============================================================================
// Predictor
// =============================================================================

/// TIFF predictor identifiers (tag 317).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Predictor {
    /// No prediction
    None = 1,

    /// Horizontal differencing
    Horizontal = 2,

    /// Floating-point byte shuffle + differencing
    FloatingPoint = 3,

    /// Horizontal differencing with distance 2
    HorizontalX2 = 34892,

    /// Horizontal differencing with distance 4
    HorizontalX4 = 34893,

    /// Floating-point predictor with distance 2
    FloatingPointX2 = 34894,

    /// Floating-point predictor with distance 4
    FloatingPointX4 = 34895,
}

impl Predictor {
    /// Create a Predictor from its numeric tag value.
    pub fn from_u16(value: u16) -> Result<Self, CodecError> {
        match value {
            1 => Ok(Predictor::None),
            2 => Ok(Predictor::Horizontal),
            3 => Ok(Predictor::FloatingPoint),
            34892 => Ok(Predictor::HorizontalX2),
            34893 => Ok(Predictor::HorizontalX4),
            34894 => Ok(Predictor::FloatingPointX2),
            34895 => Ok(Predictor::FloatingPointX4),
            other => Err(CodecError::UnknownPredictor(other)),
        }
    }

    /// Get the numeric tag value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Delta distance along the width axis.
    #[inline]
    pub const fn distance(self) -> usize {
        match self {
            Predictor::None | Predictor::Horizontal | Predictor::FloatingPoint => 1,
            Predictor::HorizontalX2 | Predictor::FloatingPointX2 => 2,
            Predictor::HorizontalX4 | Predictor::FloatingPointX4 => 4,
        }
    }

    /// Whether this is a floating-point predictor.
    #[inline]
    pub const fn is_floating_point(self) -> bool {
        matches!(
            self,
            Predictor::FloatingPoint | Predictor::FloatingPointX2 | Predictor::FloatingPointX4
        )
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Apply a predictor to an `height × width × samples` plane in place.
///
/// `bits_per_sample` selects the sample layout: horizontal predictors expect
/// 8-bit samples, floating-point predictors 32-bit floats.
pub fn encode(
    data: &mut [u8],
    width: usize,
    samples: usize,
    bits_per_sample: u32,
    predictor: Predictor,
) -> Result<(), CodecError> {
    match predictor {
        Predictor::None => Ok(()),
        Predictor::Horizontal | Predictor::HorizontalX2 | Predictor::HorizontalX4 => {
            if bits_per_sample != 8 {
                return Err(CodecError::PredictorMismatch {
                    predictor: predictor.as_u16(),
                    message: format!(
                        "horizontal differencing expects 8-bit samples, got {bits_per_sample}"
                    ),
                });
            }
            encode_horizontal(data, width, samples, predictor.distance());
            Ok(())
        }
        Predictor::FloatingPoint | Predictor::FloatingPointX2 | Predictor::FloatingPointX4 => {
            if bits_per_sample != 32 {
                return Err(CodecError::PredictorMismatch {
                    predictor: predictor.as_u16(),
                    message: format!(
                        "floating-point prediction expects 32-bit samples, got {bits_per_sample}"
                    ),
                });
            }
            encode_floating_point(data, width, samples, predictor.distance());
            Ok(())
        }
    }
}

/// Horizontal differencing along the width axis, per sample component.
fn encode_horizontal(data: &mut [u8], width: usize, samples: usize, distance: usize) {
    let row_bytes = width * samples;
    if row_bytes == 0 {
        return;
    }

    for row in data.chunks_exact_mut(row_bytes) {
        // Walk right-to-left so deltas use original neighbor values
        for w in (distance..width).rev() {
            for s in 0..samples {
                let current = w * samples + s;
                let reference = (w - distance) * samples + s;
                row[current] = row[current].wrapping_sub(row[reference]);
            }
        }
    }
}

/// Floating-point prediction: per row, shuffle each 4-byte value into
/// big-endian byte planes, then difference the shuffled bytes.
fn encode_floating_point(data: &mut [u8], width: usize, samples: usize, distance: usize) {
    const VALUE_BYTES: usize = 4;
    let row_bytes = width * samples * VALUE_BYTES;
    if row_bytes == 0 {
        return;
    }

    let values_per_row = width * samples;
    let mut shuffled = vec![0u8; row_bytes];

    for row in data.chunks_exact_mut(row_bytes) {
        for (i, value) in row.chunks_exact(VALUE_BYTES).enumerate() {
            // Native little-endian value, emitted most significant byte first
            for plane in 0..VALUE_BYTES {
                shuffled[plane * values_per_row + i] = value[VALUE_BYTES - 1 - plane];
            }
        }

        let delta_distance = distance * samples;
        for i in (delta_distance..row_bytes).rev() {
            shuffled[i] = shuffled[i].wrapping_sub(shuffled[i - delta_distance]);
        }

        row.copy_from_slice(&shuffled);
    }
}

// =============================================================================
// Tests
// =============================================================================
