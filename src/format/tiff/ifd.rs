//! IFD (Image File Directory) parsing.
//!
//! An IFD is a count of entries followed by 12-byte entries
//! `(tag, type, count, value-or-offset)` and a 4-byte offset to the next IFD.
//! The rewriter keeps every parsed entry together with the absolute file
//! offset of its fields, because edits are performed in place: the count
//! field lives at `entry_offset + 4` and the value/offset field at
//! `entry_offset + 8`.

use crate::error::TiffError;

use super::parser::{ByteOrder, IFD_ENTRY_SIZE};
use super::tags::{FieldType, TiffTag};

// =============================================================================
// IfdEntry
// =============================================================================

/// A single parsed IFD entry.
#[derive(Debug, Clone)]
pub struct IfdEntry {
    /// Numeric tag ID
    pub tag: u16,

    /// Raw field type value
    pub field_type_raw: u16,

    /// Recognized field type, if any
    pub field_type: Option<FieldType>,

    /// Number of values of the field type
    pub count: u32,

    /// Raw bytes of the 4-byte value/offset field
    pub value_bytes: [u8; 4],

    /// Absolute file offset of this 12-byte entry
    pub entry_offset: u64,
}

impl IfdEntry {
    /// Parse an entry from its 12 raw bytes.
    pub fn parse(bytes: &[u8], entry_offset: u64, byte_order: ByteOrder) -> Self {
        let tag = byte_order.read_u16(&bytes[0..2]);
        let field_type_raw = byte_order.read_u16(&bytes[2..4]);
        let count = byte_order.read_u32(&bytes[4..8]);
        let value_bytes = [bytes[8], bytes[9], bytes[10], bytes[11]];

        IfdEntry {
            tag,
            field_type_raw,
            field_type: FieldType::from_u16(field_type_raw),
            count,
            value_bytes,
            entry_offset,
        }
    }

    /// Whether the value is stored inline in the value/offset field.
    pub fn is_inline(&self) -> Result<bool, TiffError> {
        let field_type = self
            .field_type
            .ok_or(TiffError::UnknownFieldType(self.field_type_raw))?;
        Ok(field_type.fits_inline(self.count))
    }

    /// Total byte size of the value.
    pub fn value_byte_size(&self) -> Result<u64, TiffError> {
        let field_type = self
            .field_type
            .ok_or(TiffError::UnknownFieldType(self.field_type_raw))?;
        Ok(field_type.size_in_bytes() as u64 * self.count as u64)
    }

    /// Absolute file offset of the entry's count field.
    #[inline]
    pub fn count_field_offset(&self) -> u64 {
        self.entry_offset + 4
    }

    /// Absolute file offset of the entry's value/offset field.
    #[inline]
    pub fn value_field_offset(&self) -> u64 {
        self.entry_offset + 8
    }

    /// The value/offset field interpreted as a u32 in file byte order.
    #[inline]
    pub fn value_or_offset(&self, byte_order: ByteOrder) -> u32 {
        byte_order.read_u32(&self.value_bytes)
    }

    /// Absolute file offset where the value bytes live.
    ///
    /// For inline values this is the value field itself, otherwise the
    /// offset the field points at. Writes targeting "the slot referenced by
    /// the value-or-offset" resolve through here, so inline and external
    /// storage are handled uniformly.
    pub fn value_location(&self, byte_order: ByteOrder) -> Result<u64, TiffError> {
        if self.is_inline()? {
            Ok(self.value_field_offset())
        } else {
            Ok(self.value_or_offset(byte_order) as u64)
        }
    }

    /// Byte capacity of the current value slot.
    ///
    /// An inline slot always holds 4 bytes; an external slot holds the
    /// current value size. New arrays longer than this must be appended at
    /// end-of-file instead of overwriting in place.
    pub fn slot_capacity(&self) -> Result<u64, TiffError> {
        if self.is_inline()? {
            Ok(FieldType::INLINE_THRESHOLD as u64)
        } else {
            self.value_byte_size()
        }
    }
}

// =============================================================================
// Ifd
// =============================================================================

/// A parsed IFD, keyed by its original offset in the file.
#[derive(Debug, Clone)]
pub struct Ifd {
    /// Position of this IFD in the file's IFD chain
    pub index: usize,

    /// Absolute file offset of this IFD
    pub offset: u64,

    /// Parsed entries, in file order
    pub entries: Vec<IfdEntry>,

    /// Offset of the next IFD (0 terminates the chain)
    pub next_ifd_offset: u32,
}

impl Ifd {
    /// Parse an IFD from raw bytes.
    ///
    /// `bytes` must contain the entry count, all entries, and the next-IFD
    /// offset; `offset` is the absolute file offset the bytes were read
    /// from.
    pub fn parse(
        bytes: &[u8],
        offset: u64,
        index: usize,
        byte_order: ByteOrder,
    ) -> Result<Self, TiffError> {
        if bytes.len() < 2 {
            return Err(TiffError::FileTooSmall {
                required: offset + 2,
                actual: offset + bytes.len() as u64,
            });
        }

        let entry_count = byte_order.read_u16(&bytes[0..2]) as usize;
        let required = 2 + entry_count * IFD_ENTRY_SIZE + 4;
        if bytes.len() < required {
            return Err(TiffError::FileTooSmall {
                required: offset + required as u64,
                actual: offset + bytes.len() as u64,
            });
        }

        let mut entries = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            let start = 2 + i * IFD_ENTRY_SIZE;
            let entry_offset = offset + start as u64;
            entries.push(IfdEntry::parse(
                &bytes[start..start + IFD_ENTRY_SIZE],
                entry_offset,
                byte_order,
            ));
        }

        let next_ifd_offset = byte_order.read_u32(&bytes[2 + entry_count * IFD_ENTRY_SIZE..]);

        Ok(Ifd {
            index,
            offset,
            entries,
            next_ifd_offset,
        })
    }

    /// Size in bytes of an IFD holding `entry_count` entries.
    #[inline]
    pub const fn size_for(entry_count: usize) -> usize {
        2 + entry_count * IFD_ENTRY_SIZE + 4
    }

    /// Look up an entry by tag.
    pub fn entry(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag == tag.as_u16())
    }

    /// Look up an entry by tag, mutably.
    pub fn entry_mut(&mut self, tag: TiffTag) -> Option<&mut IfdEntry> {
        self.entries.iter_mut().find(|e| e.tag == tag.as_u16())
    }
}

// =============================================================================
// Tests
// =============================================================================
