//! TIFF header parsing and endian-aware integer access.
//!
//! The rewriter must determine endianness from the header and preserve it for
//! every subsequent read and write, so [`ByteOrder`] carries both directions.
//!
//! # TIFF Header Structure (classic, 8 bytes)
//!
//! ```text
//! Bytes 0-1: Byte order (0x4949 = little-endian "II", 0x4D4D = big-endian "MM")
//! Bytes 2-3: Version (42 = 0x002A)
//! Bytes 4-7: Offset to first IFD (4 bytes)
//! ```
//!
//! BigTIFF (version 43) is recognized and rejected: its 8-byte offsets are
//! explicitly out of scope for the rewriter.

use crate::error::TiffError;

// =============================================================================
// Constants
// =============================================================================

/// Magic bytes indicating little-endian byte order ("II" for Intel)
const BYTE_ORDER_LITTLE_ENDIAN: u16 = 0x4949;

/// Magic bytes indicating big-endian byte order ("MM" for Motorola)
const BYTE_ORDER_BIG_ENDIAN: u16 = 0x4D4D;

/// Version number for classic TIFF
const VERSION_TIFF: u16 = 42;

/// Version number for BigTIFF
const VERSION_BIGTIFF: u16 = 43;

/// Size of a classic TIFF header in bytes
pub const TIFF_HEADER_SIZE: usize = 8;

/// Size of a classic TIFF IFD entry in bytes
/// (2 tag + 2 type + 4 count + 4 value/offset)
pub const IFD_ENTRY_SIZE: usize = 12;

// =============================================================================
// ByteOrder
// =============================================================================

/// Byte order (endianness) of a TIFF file.
///
/// TIFF files declare their byte order in the first two bytes of the header.
/// All multi-byte values in the file must be read and written respecting
/// this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Little-endian ("II" = Intel)
    LittleEndian,
    /// Big-endian ("MM" = Motorola)
    BigEndian,
}

impl ByteOrder {
    /// Read a u16 from a byte slice using this byte order.
    #[inline]
    pub fn read_u16(self, bytes: &[u8]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes([bytes[0], bytes[1]]),
            ByteOrder::BigEndian => u16::from_be_bytes([bytes[0], bytes[1]]),
        }
    }

    /// Read a u32 from a byte slice using this byte order.
    #[inline]
    pub fn read_u32(self, bytes: &[u8]) -> u32 {
        match self {
            ByteOrder::LittleEndian => {
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
            }
            ByteOrder::BigEndian => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }

    /// Encode a u16 using this byte order.
    #[inline]
    pub fn u16_bytes(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }

    /// Encode a u32 using this byte order.
    ///
    /// This is the write width for every integer tag edit the rewriter
    /// performs (classic TIFF value/offset fields are 4 bytes).
    #[inline]
    pub fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::LittleEndian => value.to_le_bytes(),
            ByteOrder::BigEndian => value.to_be_bytes(),
        }
    }
}

// =============================================================================
// TiffHeader
// =============================================================================

/// Parsed classic TIFF file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Byte order for all multi-byte values in the file
    pub byte_order: ByteOrder,

    /// Offset to the first IFD in the file
    pub first_ifd_offset: u32,
}

impl TiffHeader {
    /// Parse a TIFF header from raw bytes.
    ///
    /// # Errors
    /// - `InvalidMagic` if byte order bytes are not II or MM
    /// - `BigTiff` if the version is 43
    /// - `InvalidVersion` for any other version
    /// - `FileTooSmall` if there aren't enough bytes for the header
    /// - `InvalidIfdOffset` if the first IFD offset is outside the file
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < TIFF_HEADER_SIZE {
            return Err(TiffError::FileTooSmall {
                required: TIFF_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        // Byte order marker is read as little-endian because we're checking
        // for specific byte patterns
        let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
        let byte_order = match magic {
            BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
            BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
            _ => return Err(TiffError::InvalidMagic(magic)),
        };

        let version = byte_order.read_u16(&bytes[2..4]);
        match version {
            VERSION_TIFF => {}
            VERSION_BIGTIFF => return Err(TiffError::BigTiff),
            _ => return Err(TiffError::InvalidVersion(version)),
        }

        let first_ifd_offset = byte_order.read_u32(&bytes[4..8]);
        if first_ifd_offset as u64 >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset as u64));
        }

        Ok(TiffHeader {
            byte_order,
            first_ifd_offset,
        })
    }
}

/// Check if bytes look like a classic TIFF header.
///
/// Quick screen used during manifest validation before full parsing.
/// BigTIFF headers return `false`.
pub fn is_classic_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    let magic = u16::from_le_bytes([bytes[0], bytes[1]]);
    let byte_order = match magic {
        BYTE_ORDER_LITTLE_ENDIAN => ByteOrder::LittleEndian,
        BYTE_ORDER_BIG_ENDIAN => ByteOrder::BigEndian,
        _ => return false,
    };

    byte_order.read_u16(&bytes[2..4]) == VERSION_TIFF
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -------------------------------------------------------------------------
    // ByteOrder Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_byte_order_read_u16() {
        let bytes = [0x01, 0x02];
        assert_eq!(ByteOrder::LittleEndian.read_u16(&bytes), 0x0201);
        assert_eq!(ByteOrder::BigEndian.read_u16(&bytes), 0x0102);
    }

    #[test]
    fn test_byte_order_read_u32() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(ByteOrder::LittleEndian.read_u32(&bytes), 0x04030201);
        assert_eq!(ByteOrder::BigEndian.read_u32(&bytes), 0x01020304);
    }

    #[test]
    fn test_byte_order_round_trips_writes() {
        for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
            let bytes = order.u32_bytes(0xDEADBEEF);
            assert_eq!(order.read_u32(&bytes), 0xDEADBEEF);

            let bytes = order.u16_bytes(0xBEEF);
            assert_eq!(order.read_u16(&bytes), 0xBEEF);
        }
    }

    // -------------------------------------------------------------------------
    // TiffHeader Parsing Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_tiff_little_endian() {
        let header = [
            0x49, 0x49, // II (little-endian)
            0x2A, 0x00, // Version 42 (little-endian)
            0x08, 0x00, 0x00, 0x00, // First IFD offset = 8 (little-endian)
        ];

        let result = TiffHeader::parse(&header, 1000).unwrap();
        assert_eq!(result.byte_order, ByteOrder::LittleEndian);
        assert_eq!(result.first_ifd_offset, 8);
    }

    #[test]
    fn test_parse_tiff_big_endian() {
        let header = [
            0x4D, 0x4D, // MM (big-endian)
            0x00, 0x2A, // Version 42 (big-endian)
            0x00, 0x00, 0x00, 0x08, // First IFD offset = 8 (big-endian)
        ];

        let result = TiffHeader::parse(&header, 1000).unwrap();
        assert_eq!(result.byte_order, ByteOrder::BigEndian);
        assert_eq!(result.first_ifd_offset, 8);
    }

    #[test]
    fn test_parse_invalid_magic() {
        let header = [0x00, 0x00, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        let result = TiffHeader::parse(&header, 1000);
        assert!(matches!(result, Err(TiffError::InvalidMagic(0x0000))));
    }

    #[test]
    fn test_parse_invalid_version() {
        let header = [0x49, 0x49, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00];
        let result = TiffHeader::parse(&header, 1000);
        assert!(matches!(result, Err(TiffError::InvalidVersion(0))));
    }

    #[test]
    fn test_parse_bigtiff_rejected() {
        let header = [
            0x49, 0x49, // II
            0x2B, 0x00, // Version 43 (BigTIFF)
            0x08, 0x00, 0x00, 0x00,
        ];
        let result = TiffHeader::parse(&header, 1000);
        assert!(matches!(result, Err(TiffError::BigTiff)));
    }

    #[test]
    fn test_parse_file_too_small() {
        let header = [0x49, 0x49, 0x2A, 0x00]; // Only 4 bytes
        let result = TiffHeader::parse(&header, 1000);
        assert!(matches!(
            result,
            Err(TiffError::FileTooSmall {
                required: 8,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_parse_invalid_ifd_offset() {
        let header = [
            0x49, 0x49, // II
            0x2A, 0x00, // Version 42
            0xE8, 0x03, 0x00, 0x00, // First IFD offset = 1000
        ];
        let result = TiffHeader::parse(&header, 500); // File is only 500 bytes
        assert!(matches!(result, Err(TiffError::InvalidIfdOffset(1000))));
    }

    // -------------------------------------------------------------------------
    // is_classic_tiff_header Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_is_classic_tiff_header() {
        let le = [0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        assert!(is_classic_tiff_header(&le));

        let be = [0x4D, 0x4D, 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08];
        assert!(is_classic_tiff_header(&be));
    }

    #[test]
    fn test_is_classic_tiff_header_rejects_bigtiff() {
        let header = [0x49, 0x49, 0x2B, 0x00, 0x08, 0x00, 0x00, 0x00];
        assert!(!is_classic_tiff_header(&header));
    }

    #[test]
    fn test_is_classic_tiff_header_rejects_other() {
        // JPEG magic bytes
        let header = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46];
        assert!(!is_classic_tiff_header(&header));

        // Too short
        assert!(!is_classic_tiff_header(&[0x49, 0x49]));
    }
}
