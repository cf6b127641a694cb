//! TIFF tag and field type definitions.
//!
//! This module defines the vocabulary for TIFF parsing and rewriting:
//! - Field types that determine how values are encoded
//! - Tag IDs that identify metadata fields
//!
//! Only classic TIFF is supported; the rewriter rejects BigTIFF up front.

// =============================================================================
// TIFF Field Types
// =============================================================================

/// TIFF field types that determine how values are encoded.
///
/// Each field type has a specific size in bytes, which is critical for:
/// - Determining if a value fits inline in an IFD entry
/// - Reading arrays of values correctly
///
/// Note: We only define types actually touched by the rewriter. TIFF supports
/// additional types (RATIONAL, FLOAT, etc.) that are skipped during parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer (1 byte)
    Byte = 1,

    /// 8-bit ASCII character (1 byte)
    Ascii = 2,

    /// Unsigned 16-bit integer (2 bytes)
    Short = 3,

    /// Unsigned 32-bit integer (4 bytes)
    Long = 4,

    /// Undefined byte data (1 byte per element)
    Undefined = 7,
}

impl FieldType {
    /// Size of a single value of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte => 1,
            FieldType::Ascii => 1,
            FieldType::Short => 2,
            FieldType::Long => 4,
            FieldType::Undefined => 1,
        }
    }

    /// Create a FieldType from its numeric value.
    ///
    /// Returns `None` for unsupported or unknown type values.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            7 => Some(FieldType::Undefined),
            _ => None,
        }
    }

    /// Maximum bytes that can be stored inline in a classic TIFF IFD entry.
    pub const INLINE_THRESHOLD: usize = 4;

    /// Check if a value with this type and count fits inline in the entry's
    /// 4-byte value/offset field.
    #[inline]
    pub fn fits_inline(self, count: u32) -> bool {
        self.size_in_bytes() as u64 * count as u64 <= Self::INLINE_THRESHOLD as u64
    }
}

// =============================================================================
// TIFF Tags
// =============================================================================

/// TIFF tag IDs relevant to label rewriting.
///
/// Tags are 16-bit identifiers that describe the type of metadata in an IFD
/// entry. We define only the tags needed for:
/// - Basic image structure (dimensions, samples)
/// - Strip access (offsets, byte counts, rows per strip)
/// - Compression and predictor handling
/// - SVS metadata (ImageDescription)
///
/// Tags not listed here are preserved byte-for-byte and otherwise ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum TiffTag {
    /// Image width in pixels
    ImageWidth = 256,

    /// Image height (length) in pixels
    ImageLength = 257,

    /// Bits per sample (8 for label images)
    BitsPerSample = 258,

    /// Compression scheme used
    Compression = 259,

    /// Description string (contains identifying metadata in SVS files)
    ImageDescription = 270,

    /// Byte offsets of strips
    StripOffsets = 273,

    /// Number of components per pixel (e.g., 3 for RGB)
    SamplesPerPixel = 277,

    /// Row count per strip
    RowsPerStrip = 278,

    /// Byte counts of strips
    StripByteCounts = 279,

    /// Predictor applied before compression
    Predictor = 317,
}

impl TiffTag {
    /// Create a TiffTag from its numeric value.
    ///
    /// Returns `None` for unrecognized tags. Unknown tags are not an error;
    /// they are simply left untouched.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            256 => Some(TiffTag::ImageWidth),
            257 => Some(TiffTag::ImageLength),
            258 => Some(TiffTag::BitsPerSample),
            259 => Some(TiffTag::Compression),
            270 => Some(TiffTag::ImageDescription),
            273 => Some(TiffTag::StripOffsets),
            277 => Some(TiffTag::SamplesPerPixel),
            278 => Some(TiffTag::RowsPerStrip),
            279 => Some(TiffTag::StripByteCounts),
            317 => Some(TiffTag::Predictor),
            _ => None,
        }
    }

    /// Get the numeric tag ID.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

// =============================================================================
// Compression Values
// =============================================================================

/// TIFF compression scheme identifiers.
///
/// The strip codec can encode {None, LZW, Adobe Deflate}. Labels stored with
/// any other scheme are re-encoded with the Adobe Deflate fallback and tag
/// 259 is rewritten accordingly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    /// No compression
    None = 1,

    /// LZW compression
    Lzw = 5,

    /// "Old-style" JPEG (decode-only legacy scheme)
    OldJpeg = 6,

    /// JPEG compression (common for SVS label images)
    Jpeg = 7,

    /// Adobe Deflate (zlib)
    AdobeDeflate = 8,

    /// Deflate (legacy tag value)
    Deflate = 32946,

    /// JPEG 2000
    Jpeg2000 = 33003,
}

impl Compression {
    /// Fallback scheme used when the source compression cannot be encoded.
    pub const FALLBACK: Compression = Compression::AdobeDeflate;

    /// Create a Compression from its numeric value.
    ///
    /// Returns `None` for unrecognized compression values.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Compression::None),
            5 => Some(Compression::Lzw),
            6 => Some(Compression::OldJpeg),
            7 => Some(Compression::Jpeg),
            8 => Some(Compression::AdobeDeflate),
            32946 => Some(Compression::Deflate),
            33003 => Some(Compression::Jpeg2000),
            _ => None,
        }
    }

    /// Check if the strip codec can encode this scheme.
    #[inline]
    pub const fn is_encodable(self) -> bool {
        matches!(
            self,
            Compression::None | Compression::Lzw | Compression::AdobeDeflate
        )
    }

    /// Scheme actually used when re-encoding a label that was stored with
    /// this compression: the scheme itself when encodable, the Adobe Deflate
    /// fallback otherwise.
    pub fn encoding_target(value: u16) -> Compression {
        match Compression::from_u16(value) {
            Some(c) if c.is_encodable() => c,
            _ => Compression::FALLBACK,
        }
    }

    /// Get a human-readable name for the compression scheme.
    pub const fn name(self) -> &'static str {
        match self {
            Compression::None => "None",
            Compression::Lzw => "LZW",
            Compression::OldJpeg => "Old JPEG",
            Compression::Jpeg => "JPEG",
            Compression::AdobeDeflate => "Adobe Deflate",
            Compression::Deflate => "Deflate",
            Compression::Jpeg2000 => "JPEG 2000",
        }
    }

    /// Get the numeric tag value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}

// =============================================================================
// Tests
// =============================================================================
