//! Byte-exact in-place rewriting of slide TIFF files.
//!
//! [`SlideFile`] opens a TIFF file for random access, enumerates its IFDs,
//! and performs targeted edits that leave every other byte of the pyramid
//! untouched:
//!
//! - **Strip replacement**: the old strip region is wiped with zero bytes
//!   and the new strips are appended at end-of-file, so the replacement
//!   never has to fit the old hole and no other data shifts. The 259/273/279
//!   tag values are then updated in place.
//! - **Description replacement**: a shorter description is padded with
//!   spaces so a byte-for-byte write wipes the old content; a longer one is
//!   appended at end-of-file with the value offset redirected.
//! - **Restoration**: the inverse writes, placing preserved bytes back at
//!   their original offsets.
//!
//! The rewriter does not transact. Callers clone the file first and discard
//! the clone on failure.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::TiffError;

use super::ifd::{Ifd, IfdEntry};
use super::parser::{ByteOrder, TiffHeader, TIFF_HEADER_SIZE};
use super::tags::{FieldType, TiffTag};

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of IFDs to parse (safety limit)
const MAX_IFDS: usize = 100;

/// Chunk size used when wiping old data regions
const WIPE_CHUNK: usize = 64 * 1024;

/// Marker substring identifying the label IFD in SVS files
const LABEL_MARKER: &str = "label";

/// How an array write treats the slot it targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayWrite {
    /// Replacement: honor the slot's current capacity, appending at
    /// end-of-file when the new array does not fit.
    Replace,

    /// Restoration: the target slot is the original array region, so write
    /// in place unconditionally.
    Restore,
}

// =============================================================================
// SlideFile
// =============================================================================

/// A TIFF slide file opened for random-access reading and rewriting.
///
/// IFDs are parsed eagerly at open time and kept with their original file
/// offsets; every edit goes through the parsed entry table so the in-memory
/// view stays consistent with the bytes on disk.
#[derive(Debug)]
pub struct SlideFile {
    file: File,
    path: PathBuf,
    header: TiffHeader,
    ifds: Vec<Ifd>,
    writable: bool,
}

impl SlideFile {
    /// Open a slide file read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TiffError> {
        Self::open_with(path.as_ref(), false)
    }

    /// Open a slide file for reading and in-place rewriting.
    pub fn open_rw(path: impl AsRef<Path>) -> Result<Self, TiffError> {
        Self::open_with(path.as_ref(), true)
    }

    fn open_with(path: &Path, writable: bool) -> Result<Self, TiffError> {
        let file = OpenOptions::new().read(true).write(writable).open(path)?;
        let file_size = file.metadata()?.len();

        let mut slide = SlideFile {
            file,
            path: path.to_path_buf(),
            header: TiffHeader {
                byte_order: ByteOrder::LittleEndian,
                first_ifd_offset: 0,
            },
            ifds: Vec::new(),
            writable,
        };

        let header_bytes = slide.read_exact_at(0, TIFF_HEADER_SIZE)?;
        slide.header = TiffHeader::parse(&header_bytes, file_size)?;
        slide.ifds = slide.parse_all_ifds(file_size)?;

        Ok(slide)
    }

    /// Parse all IFDs in the file following the next-IFD chain.
    fn parse_all_ifds(&mut self, file_size: u64) -> Result<Vec<Ifd>, TiffError> {
        let byte_order = self.header.byte_order;
        let mut ifds = Vec::new();
        let mut offset = self.header.first_ifd_offset as u64;

        while offset != 0 && ifds.len() < MAX_IFDS {
            if offset >= file_size {
                return Err(TiffError::InvalidIfdOffset(offset));
            }

            let count_bytes = self.read_exact_at(offset, 2)?;
            let entry_count = byte_order.read_u16(&count_bytes) as usize;

            let ifd_size = Ifd::size_for(entry_count);
            let ifd_bytes = self.read_exact_at(offset, ifd_size)?;
            let ifd = Ifd::parse(&ifd_bytes, offset, ifds.len(), byte_order)?;

            offset = ifd.next_ifd_offset as u64;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    /// Path this file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte order declared in the file header.
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Number of IFDs in the file.
    pub fn ifd_count(&self) -> usize {
        self.ifds.len()
    }

    /// Access a parsed IFD.
    pub fn ifd(&self, index: usize) -> Result<&Ifd, TiffError> {
        self.ifds.get(index).ok_or(TiffError::IfdOutOfRange(index))
    }

    // =========================================================================
    // Raw I/O
    // =========================================================================

    fn read_exact_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>, TiffError> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_all_at(&mut self, offset: u64, bytes: &[u8]) -> Result<(), TiffError> {
        self.require_writable()?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        Ok(())
    }

    fn require_writable(&self) -> Result<(), TiffError> {
        if !self.writable {
            return Err(TiffError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "slide file was opened read-only",
            )));
        }
        Ok(())
    }

    /// Overwrite `len` bytes at `offset` with zeros, in chunks.
    fn wipe_region(&mut self, offset: u64, len: u64) -> Result<(), TiffError> {
        self.require_writable()?;
        self.file.seek(SeekFrom::Start(offset))?;
        let zeros = vec![0u8; WIPE_CHUNK.min(len as usize)];
        let mut remaining = len;
        while remaining > 0 {
            let n = (remaining as usize).min(zeros.len());
            self.file.write_all(&zeros[..n])?;
            remaining -= n as u64;
        }
        Ok(())
    }

    // =========================================================================
    // Tag reading
    // =========================================================================

    fn entry(&self, ifd_index: usize, tag: TiffTag) -> Result<Option<IfdEntry>, TiffError> {
        Ok(self.ifd(ifd_index)?.entry(tag).cloned())
    }

    fn required_entry(
        &self,
        ifd_index: usize,
        tag: TiffTag,
        name: &'static str,
    ) -> Result<IfdEntry, TiffError> {
        self.entry(ifd_index, tag)?.ok_or(TiffError::MissingTag(name))
    }

    /// Read the raw value bytes of an entry (inline or external).
    fn entry_value_bytes(&mut self, entry: &IfdEntry) -> Result<Vec<u8>, TiffError> {
        let size = entry.value_byte_size()? as usize;
        if entry.is_inline()? {
            Ok(entry.value_bytes[..size].to_vec())
        } else {
            let offset = entry.value_or_offset(self.header.byte_order) as u64;
            self.read_exact_at(offset, size)
        }
    }

    /// Read a single integer tag value, converting Short or Long to u32.
    pub fn tag_u32(&mut self, ifd_index: usize, tag: TiffTag) -> Result<Option<u32>, TiffError> {
        let entry = match self.entry(ifd_index, tag)? {
            Some(e) => e,
            None => return Ok(None),
        };
        let values = self.read_u32_values(&entry)?;
        Ok(values.first().copied())
    }

    /// Read an array tag (Short or Long elements) as u32 values.
    pub fn tag_u32_array(
        &mut self,
        ifd_index: usize,
        tag: TiffTag,
        name: &'static str,
    ) -> Result<Vec<u32>, TiffError> {
        let entry = self.required_entry(ifd_index, tag, name)?;
        self.read_u32_values(&entry)
    }

    fn read_u32_values(&mut self, entry: &IfdEntry) -> Result<Vec<u32>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        let bytes = self.entry_value_bytes(entry)?;
        let byte_order = self.header.byte_order;
        let count = entry.count as usize;

        let mut values = Vec::with_capacity(count);
        match field_type {
            FieldType::Short => {
                for i in 0..count {
                    values.push(byte_order.read_u16(&bytes[i * 2..]) as u32);
                }
            }
            FieldType::Long => {
                for i in 0..count {
                    values.push(byte_order.read_u32(&bytes[i * 4..]));
                }
            }
            other => {
                return Err(TiffError::InvalidTagValue {
                    tag: "integer tag",
                    message: format!("expected Short or Long, got {:?}", other),
                });
            }
        }

        Ok(values)
    }

    /// Read the `ImageDescription` string of an IFD, if present.
    ///
    /// The result is truncated at the first NUL byte.
    pub fn description(&mut self, ifd_index: usize) -> Result<Option<String>, TiffError> {
        let entry = match self.entry(ifd_index, TiffTag::ImageDescription)? {
            Some(e) => e,
            None => return Ok(None),
        };

        let bytes = self.entry_value_bytes(&entry)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(Some(String::from_utf8_lossy(&bytes[..end]).into_owned()))
    }

    /// The description entry of an IFD together with the absolute offset of
    /// its value bytes. Used when capturing originals for escrow.
    pub fn description_entry(
        &mut self,
        ifd_index: usize,
    ) -> Result<Option<(IfdEntry, u64)>, TiffError> {
        let entry = match self.entry(ifd_index, TiffTag::ImageDescription)? {
            Some(e) => e,
            None => return Ok(None),
        };
        let location = entry.value_location(self.header.byte_order)?;
        Ok(Some((entry, location)))
    }

    // =========================================================================
    // Image geometry accessors
    // =========================================================================

    pub fn image_width(&mut self, ifd_index: usize) -> Result<u32, TiffError> {
        self.tag_u32(ifd_index, TiffTag::ImageWidth)?
            .ok_or(TiffError::MissingTag("ImageWidth"))
    }

    pub fn image_length(&mut self, ifd_index: usize) -> Result<u32, TiffError> {
        self.tag_u32(ifd_index, TiffTag::ImageLength)?
            .ok_or(TiffError::MissingTag("ImageLength"))
    }

    /// Samples per pixel, defaulting to 1 when the tag is absent.
    pub fn samples_per_pixel(&mut self, ifd_index: usize) -> Result<u32, TiffError> {
        Ok(self.tag_u32(ifd_index, TiffTag::SamplesPerPixel)?.unwrap_or(1))
    }

    /// Bits per sample of the first component, defaulting to 8.
    pub fn bits_per_sample(&mut self, ifd_index: usize) -> Result<u32, TiffError> {
        Ok(self.tag_u32(ifd_index, TiffTag::BitsPerSample)?.unwrap_or(8))
    }

    /// Compression scheme, defaulting to 1 (uncompressed).
    pub fn compression(&mut self, ifd_index: usize) -> Result<u16, TiffError> {
        Ok(self
            .tag_u32(ifd_index, TiffTag::Compression)?
            .unwrap_or(1) as u16)
    }

    /// Predictor, defaulting to 1 (none).
    pub fn predictor(&mut self, ifd_index: usize) -> Result<u16, TiffError> {
        Ok(self.tag_u32(ifd_index, TiffTag::Predictor)?.unwrap_or(1) as u16)
    }

    /// Rows per strip, defaulting to the full image height.
    pub fn rows_per_strip(&mut self, ifd_index: usize) -> Result<u32, TiffError> {
        match self.tag_u32(ifd_index, TiffTag::RowsPerStrip)? {
            Some(rows) => Ok(rows),
            None => self.image_length(ifd_index),
        }
    }

    /// Strip offsets (tag 273).
    pub fn strip_offsets(&mut self, ifd_index: usize) -> Result<Vec<u32>, TiffError> {
        self.tag_u32_array(ifd_index, TiffTag::StripOffsets, "StripOffsets")
    }

    /// Strip byte counts (tag 279).
    pub fn strip_byte_counts(&mut self, ifd_index: usize) -> Result<Vec<u32>, TiffError> {
        self.tag_u32_array(ifd_index, TiffTag::StripByteCounts, "StripByteCounts")
    }

    /// Read the compressed strip data of an IFD, concatenated in strip order.
    pub fn read_strip_data(&mut self, ifd_index: usize) -> Result<Bytes, TiffError> {
        let offsets = self.strip_offsets(ifd_index)?;
        let counts = self.strip_byte_counts(ifd_index)?;

        let total: u64 = counts.iter().map(|&c| c as u64).sum();
        let mut data = Vec::with_capacity(total as usize);
        for (&offset, &count) in offsets.iter().zip(counts.iter()) {
            data.extend_from_slice(&self.read_exact_at(offset as u64, count as usize)?);
        }

        Ok(Bytes::from(data))
    }

    /// Find the label IFD: the one whose description contains `"label"`.
    pub fn find_label_ifd(&mut self) -> Result<Option<usize>, TiffError> {
        for index in 0..self.ifds.len() {
            if let Some(description) = self.description(index)? {
                if description.to_lowercase().contains(LABEL_MARKER) {
                    return Ok(Some(index));
                }
            }
        }
        Ok(None)
    }

    // =========================================================================
    // Tag writing
    // =========================================================================

    /// Write a single integer tag value in place, honoring the entry's
    /// declared field width so the value reads back correctly in either
    /// byte order.
    fn write_tag_u32(
        &mut self,
        ifd_index: usize,
        tag: TiffTag,
        name: &'static str,
        value: u32,
    ) -> Result<(), TiffError> {
        let entry = self.required_entry(ifd_index, tag, name)?;
        let byte_order = self.header.byte_order;

        let mut new_value_bytes = [0u8; 4];
        match entry.field_type {
            Some(FieldType::Short) => {
                let bytes = byte_order.u16_bytes(value as u16);
                new_value_bytes[..2].copy_from_slice(&bytes);
            }
            Some(FieldType::Long) => {
                new_value_bytes = byte_order.u32_bytes(value);
            }
            _ => {
                return Err(TiffError::InvalidTagValue {
                    tag: name,
                    message: format!(
                        "expected Short or Long for in-place write, got type {}",
                        entry.field_type_raw
                    ),
                });
            }
        }

        self.write_all_at(entry.value_field_offset(), &new_value_bytes)?;
        self.update_entry(ifd_index, tag, |e| e.value_bytes = new_value_bytes);
        Ok(())
    }

    /// Write an integer array into the slot referenced by the entry's
    /// value-or-offset field.
    ///
    /// A single-element array is always written inline into the value field,
    /// matching how classic-TIFF readers interpret a count of 1. A longer
    /// array goes to the external location the entry points at; under
    /// [`ArrayWrite::Replace`] an array that outgrows the slot's current
    /// capacity is appended at end-of-file with the value offset redirected,
    /// while [`ArrayWrite::Restore`] writes in place unconditionally because
    /// the slot it targets is the original array region. The entry's count
    /// field is rewritten whenever the element count changes.
    fn write_tag_array(
        &mut self,
        ifd_index: usize,
        tag: TiffTag,
        name: &'static str,
        values: &[u32],
        mode: ArrayWrite,
    ) -> Result<(), TiffError> {
        let entry = self.required_entry(ifd_index, tag, name)?;
        if entry.field_type != Some(FieldType::Long) {
            return Err(TiffError::InvalidTagValue {
                tag: name,
                message: format!(
                    "strip tables must use Long values, got type {}",
                    entry.field_type_raw
                ),
            });
        }

        let byte_order = self.header.byte_order;
        let mut encoded = Vec::with_capacity(values.len() * 4);
        for &value in values {
            encoded.extend_from_slice(&byte_order.u32_bytes(value));
        }

        let was_inline = entry.is_inline()?;
        let mut new_value_bytes = entry.value_bytes;

        if encoded.len() <= FieldType::INLINE_THRESHOLD {
            // Count 1 reads as an inline value, so it must be stored inline
            new_value_bytes = [0u8; 4];
            new_value_bytes[..encoded.len()].copy_from_slice(&encoded);
            self.write_all_at(entry.value_field_offset(), &new_value_bytes)?;
        } else {
            let fits = match mode {
                ArrayWrite::Replace => encoded.len() as u64 <= entry.slot_capacity()?,
                ArrayWrite::Restore => true,
            };

            if !was_inline && fits {
                let location = entry.value_location(byte_order)?;
                self.write_all_at(location, &encoded)?;
            } else {
                // No usable slot: append at end-of-file and redirect
                let appended_at = self.append_at_eof(&encoded)?;
                new_value_bytes = byte_order.u32_bytes(appended_at);
                self.write_all_at(entry.value_field_offset(), &new_value_bytes)?;
            }
        }

        if values.len() as u32 != entry.count {
            let count_bytes = byte_order.u32_bytes(values.len() as u32);
            self.write_all_at(entry.count_field_offset(), &count_bytes)?;
        }

        let new_count = values.len() as u32;
        self.update_entry(ifd_index, tag, |e| {
            e.count = new_count;
            e.value_bytes = new_value_bytes;
        });
        Ok(())
    }

    /// Append bytes at end-of-file and return the 32-bit offset they landed
    /// at. Classic TIFF cannot address data past 4 GiB.
    fn append_at_eof(&mut self, bytes: &[u8]) -> Result<u32, TiffError> {
        self.require_writable()?;
        let offset = self.file.seek(SeekFrom::End(0))?;
        if offset + bytes.len() as u64 > u32::MAX as u64 {
            return Err(TiffError::InvalidTagValue {
                tag: "offset",
                message: "file too large for 32-bit TIFF offsets".to_string(),
            });
        }
        self.file.write_all(bytes)?;
        Ok(offset as u32)
    }

    fn update_entry(&mut self, ifd_index: usize, tag: TiffTag, apply: impl FnOnce(&mut IfdEntry)) {
        if let Some(entry) = self
            .ifds
            .get_mut(ifd_index)
            .and_then(|ifd| ifd.entry_mut(tag))
        {
            apply(entry);
        }
    }

    // =========================================================================
    // Strip replacement and restoration
    // =========================================================================

    /// Replace the strip data of an IFD.
    ///
    /// The old strip region is wiped with zeros and the new strips are
    /// appended at end-of-file. Tag 259 is rewritten when the compression
    /// changed; tags 279 and 273 are updated with the new byte counts and
    /// append offsets.
    pub fn replace_strips(
        &mut self,
        ifd_index: usize,
        strips: &[Vec<u8>],
        compression: u16,
    ) -> Result<(), TiffError> {
        let old_offsets = self.strip_offsets(ifd_index)?;
        let old_counts = self.strip_byte_counts(ifd_index)?;

        let first_offset = *old_offsets.first().ok_or(TiffError::InvalidTagValue {
            tag: "StripOffsets",
            message: "strip offset table is empty".to_string(),
        })?;
        let old_total: u64 = old_counts.iter().map(|&c| c as u64).sum();
        self.wipe_region(first_offset as u64, old_total)?;

        if compression != self.compression(ifd_index)? {
            self.write_tag_u32(ifd_index, TiffTag::Compression, "Compression", compression as u32)?;
        }

        let new_counts: Vec<u32> = strips.iter().map(|s| s.len() as u32).collect();
        self.write_tag_array(
            ifd_index,
            TiffTag::StripByteCounts,
            "StripByteCounts",
            &new_counts,
            ArrayWrite::Replace,
        )?;

        let mut new_offsets = Vec::with_capacity(strips.len());
        for strip in strips {
            new_offsets.push(self.append_at_eof(strip)?);
        }
        self.write_tag_array(
            ifd_index,
            TiffTag::StripOffsets,
            "StripOffsets",
            &new_offsets,
            ArrayWrite::Replace,
        )?;

        self.file.flush()?;
        Ok(())
    }

    /// Write preserved strip data back at its original offsets.
    pub fn restore_strips(
        &mut self,
        ifd_index: usize,
        byte_counts: &[u32],
        offsets: &[u32],
        compression: u16,
        data: &[u8],
    ) -> Result<(), TiffError> {
        let current_offsets = self.strip_offsets(ifd_index)?;
        let current_counts = self.strip_byte_counts(ifd_index)?;

        if let Some(&first) = current_offsets.first() {
            let total: u64 = current_counts.iter().map(|&c| c as u64).sum();
            self.wipe_region(first as u64, total)?;
        }

        self.write_tag_u32(ifd_index, TiffTag::Compression, "Compression", compression as u32)?;
        self.write_tag_array(
            ifd_index,
            TiffTag::StripByteCounts,
            "StripByteCounts",
            byte_counts,
            ArrayWrite::Restore,
        )?;
        self.write_tag_array(
            ifd_index,
            TiffTag::StripOffsets,
            "StripOffsets",
            offsets,
            ArrayWrite::Restore,
        )?;

        let first_offset = *offsets.first().ok_or(TiffError::InvalidTagValue {
            tag: "StripOffsets",
            message: "preserved strip offset table is empty".to_string(),
        })?;
        self.write_all_at(first_offset as u64, data)?;

        self.file.flush()?;
        Ok(())
    }

    // =========================================================================
    // Description replacement and restoration
    // =========================================================================

    /// Replace the `ImageDescription` of an IFD.
    ///
    /// A new text no longer than the stored count is padded with spaces to
    /// the exact old length so the write wipes all old content in place; a
    /// longer text has the old region zero-wiped and is appended at
    /// end-of-file with the value offset redirected. The count field is
    /// rewritten to the new (unpadded) length either way.
    pub fn replace_description(&mut self, ifd_index: usize, text: &str) -> Result<(), TiffError> {
        let entry = self.required_entry(ifd_index, TiffTag::ImageDescription, "ImageDescription")?;
        let byte_order = self.header.byte_order;

        let old_count = entry.count;
        let new_len = text.len() as u32;
        let location = entry.value_location(byte_order)?;

        let count_bytes = byte_order.u32_bytes(new_len);
        self.write_all_at(entry.count_field_offset(), &count_bytes)?;

        let mut new_value_bytes = entry.value_bytes;
        if new_len <= old_count {
            let mut padded = text.as_bytes().to_vec();
            padded.resize(old_count as usize, b' ');
            self.write_all_at(location, &padded)?;
        } else {
            self.wipe_region(location, old_count as u64)?;
            let appended_at = self.append_at_eof(text.as_bytes())?;
            new_value_bytes = byte_order.u32_bytes(appended_at);
            self.write_all_at(entry.value_field_offset(), &new_value_bytes)?;
        }

        self.update_entry(ifd_index, TiffTag::ImageDescription, |e| {
            e.count = new_len;
            e.value_bytes = new_value_bytes;
        });

        self.file.flush()?;
        Ok(())
    }

    /// Write a preserved description back at its original location.
    pub fn restore_description(
        &mut self,
        ifd_index: usize,
        count: u32,
        value_offset: u32,
        value: &str,
    ) -> Result<(), TiffError> {
        let entry = self.required_entry(ifd_index, TiffTag::ImageDescription, "ImageDescription")?;
        let byte_order = self.header.byte_order;

        // Wipe whatever description currently occupies the slot
        let current_location = entry.value_location(byte_order)?;
        self.wipe_region(current_location, entry.count as u64)?;

        let count_bytes = byte_order.u32_bytes(count);
        self.write_all_at(entry.count_field_offset(), &count_bytes)?;

        let offset_bytes = byte_order.u32_bytes(value_offset);
        self.write_all_at(entry.value_field_offset(), &offset_bytes)?;

        // For an originally inline description the stored offset is the
        // value field itself, so this write lands there and restores the
        // inline bytes
        self.write_all_at(value_offset as u64, value.as_bytes())?;

        // The original count covers the NUL terminator the captured text
        // does not carry; zero-fill the gap so the region is byte-exact
        if (value.len() as u64) < count as u64 {
            self.wipe_region(
                value_offset as u64 + value.len() as u64,
                count as u64 - value.len() as u64,
            )?;
        }

        self.update_entry(ifd_index, TiffTag::ImageDescription, |e| {
            e.count = count;
            e.value_bytes = offset_bytes;
        });

        self.file.flush()?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    /// Minimal single-IFD classic TIFF builder for rewriter tests.
    ///
    /// Layout: header, IFD, external byte-count/offset arrays, description,
    /// strip data.
    struct TestTiff {
        description: String,
        strips: Vec<Vec<u8>>,
        compression: u16,
    }

    impl TestTiff {
        fn new(description: &str, strips: Vec<Vec<u8>>, compression: u16) -> Self {
            TestTiff {
                description: description.to_string(),
                strips,
                compression,
            }
        }

        fn build(&self) -> Vec<u8> {
            let entry_count = 9u16;
            let ifd_offset = 8u32;
            let ifd_size = 2 + entry_count as usize * 12 + 4;
            let arrays_offset = ifd_offset as usize + ifd_size;
            let strip_count = self.strips.len();

            let counts_offset = arrays_offset;
            let offsets_offset = counts_offset + strip_count * 4;
            let desc_offset = offsets_offset + strip_count * 4;
            let data_offset = desc_offset + self.description.len();

            let mut strip_offsets = Vec::new();
            let mut cursor = data_offset as u32;
            for strip in &self.strips {
                strip_offsets.push(cursor);
                cursor += strip.len() as u32;
            }

            let mut out = Vec::new();
            out.extend_from_slice(&[0x49, 0x49, 0x2A, 0x00]); // II, 42
            out.extend_from_slice(&ifd_offset.to_le_bytes());

            out.extend_from_slice(&entry_count.to_le_bytes());
            let mut entry = |tag: u16, field_type: u16, count: u32, value: [u8; 4]| {
                out.extend_from_slice(&tag.to_le_bytes());
                out.extend_from_slice(&field_type.to_le_bytes());
                out.extend_from_slice(&count.to_le_bytes());
                out.extend_from_slice(&value);
            };

            let long = |v: u32| v.to_le_bytes();
            let short = |v: u16| {
                let mut b = [0u8; 4];
                b[..2].copy_from_slice(&v.to_le_bytes());
                b
            };

            entry(256, 4, 1, long(8)); // ImageWidth
            entry(257, 4, 1, long(4)); // ImageLength
            entry(258, 3, 1, short(8)); // BitsPerSample
            entry(259, 3, 1, short(self.compression)); // Compression
            entry(
                270,
                2,
                self.description.len() as u32,
                long(desc_offset as u32),
            );
            entry(273, 4, strip_count as u32, long(offsets_offset as u32));
            entry(277, 3, 1, short(3)); // SamplesPerPixel
            entry(278, 4, 1, long(2)); // RowsPerStrip
            entry(279, 4, strip_count as u32, long(counts_offset as u32));

            out.extend_from_slice(&0u32.to_le_bytes()); // next IFD

            for strip in &self.strips {
                out.extend_from_slice(&(strip.len() as u32).to_le_bytes());
            }
            for offset in &strip_offsets {
                out.extend_from_slice(&offset.to_le_bytes());
            }
            out.extend_from_slice(self.description.as_bytes());
            for strip in &self.strips {
                out.extend_from_slice(strip);
            }

            out
        }

        fn write_to_temp(&self) -> tempfile::NamedTempFile {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            file.write_all(&self.build()).unwrap();
            file.flush().unwrap();
            file
        }
    }

    fn label_fixture() -> TestTiff {
        TestTiff::new(
            "Aperio Image Library\nlabel 8x4",
            vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8, 9]],
            1,
        )
    }

    // -------------------------------------------------------------------------
    // Parsing tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_open_parses_ifds_and_tags() {
        let temp = label_fixture().write_to_temp();
        let mut slide = SlideFile::open(temp.path()).unwrap();

        assert_eq!(slide.ifd_count(), 1);
        assert_eq!(slide.image_width(0).unwrap(), 8);
        assert_eq!(slide.image_length(0).unwrap(), 4);
        assert_eq!(slide.samples_per_pixel(0).unwrap(), 3);
        assert_eq!(slide.compression(0).unwrap(), 1);
        assert_eq!(slide.rows_per_strip(0).unwrap(), 2);
        assert_eq!(slide.predictor(0).unwrap(), 1);
        assert_eq!(slide.strip_byte_counts(0).unwrap(), vec![4, 5]);
    }

    #[test]
    fn test_description_and_label_lookup() {
        let temp = label_fixture().write_to_temp();
        let mut slide = SlideFile::open(temp.path()).unwrap();

        let description = slide.description(0).unwrap().unwrap();
        assert!(description.contains("label"));
        assert_eq!(slide.find_label_ifd().unwrap(), Some(0));
    }

    #[test]
    fn test_read_strip_data_concatenates_in_order() {
        let temp = label_fixture().write_to_temp();
        let mut slide = SlideFile::open(temp.path()).unwrap();

        let data = slide.read_strip_data(0).unwrap();
        assert_eq!(&data[..], &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_writes_rejected_on_read_only_handle() {
        let temp = label_fixture().write_to_temp();
        let mut slide = SlideFile::open(temp.path()).unwrap();

        let result = slide.replace_description(0, "x");
        assert!(matches!(result, Err(TiffError::Io(_))));
    }

    // -------------------------------------------------------------------------
    // Strip replacement tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_replace_strips_appends_and_updates_tags() {
        let temp = label_fixture().write_to_temp();
        let original_len = std::fs::metadata(temp.path()).unwrap().len();

        let mut slide = SlideFile::open_rw(temp.path()).unwrap();
        let old_offsets = slide.strip_offsets(0).unwrap();

        let new_strips = vec![vec![0xAA; 7], vec![0xBB; 3]];
        slide.replace_strips(0, &new_strips, 8).unwrap();

        // Tags updated
        assert_eq!(slide.compression(0).unwrap(), 8);
        assert_eq!(slide.strip_byte_counts(0).unwrap(), vec![7, 3]);
        let new_offsets = slide.strip_offsets(0).unwrap();
        assert!(new_offsets.iter().all(|&o| o as u64 >= original_len));

        // New data readable through the same handle
        let data = slide.read_strip_data(0).unwrap();
        assert_eq!(&data[..7], &[0xAA; 7]);
        assert_eq!(&data[7..], &[0xBB; 3]);

        // Old region wiped with zeros
        drop(slide);
        let bytes = std::fs::read(temp.path()).unwrap();
        let first = old_offsets[0] as usize;
        assert!(bytes[first..first + 9].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_replace_strips_with_more_strips_than_before() {
        let temp = label_fixture().write_to_temp();
        let mut slide = SlideFile::open_rw(temp.path()).unwrap();

        // Three strips where the table slot holds two: the arrays must be
        // appended and the entry counts rewritten
        let new_strips = vec![vec![1u8; 2], vec![2u8; 2], vec![3u8; 2]];
        slide.replace_strips(0, &new_strips, 1).unwrap();

        assert_eq!(slide.strip_byte_counts(0).unwrap(), vec![2, 2, 2]);
        assert_eq!(slide.strip_offsets(0).unwrap().len(), 3);
        assert_eq!(&slide.read_strip_data(0).unwrap()[..], &[1, 1, 2, 2, 3, 3]);

        // Survives a reopen (tables were really rewritten on disk)
        drop(slide);
        let mut reopened = SlideFile::open(temp.path()).unwrap();
        assert_eq!(reopened.strip_byte_counts(0).unwrap(), vec![2, 2, 2]);
    }

    #[test]
    fn test_restore_strips_round_trip() {
        let fixture = label_fixture();
        let temp = fixture.write_to_temp();
        let pristine = std::fs::read(temp.path()).unwrap();

        let mut slide = SlideFile::open_rw(temp.path()).unwrap();
        let offsets = slide.strip_offsets(0).unwrap();
        let counts = slide.strip_byte_counts(0).unwrap();
        let compression = slide.compression(0).unwrap();
        let data = slide.read_strip_data(0).unwrap();

        slide
            .replace_strips(0, &[vec![0xCC; 12], vec![0xDD; 11]], 8)
            .unwrap();
        slide
            .restore_strips(0, &counts, &offsets, compression, &data)
            .unwrap();
        drop(slide);

        // Byte-for-byte identical up to the original length; the appended
        // tail past original EOF is permitted to remain
        let restored = std::fs::read(temp.path()).unwrap();
        assert_eq!(&restored[..pristine.len()], &pristine[..]);
    }

    // -------------------------------------------------------------------------
    // Description replacement tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_replace_description_shorter_pads_in_place() {
        let temp = label_fixture().write_to_temp();
        let mut slide = SlideFile::open_rw(temp.path()).unwrap();

        let entry_before = slide
            .entry(0, TiffTag::ImageDescription)
            .unwrap()
            .unwrap();
        let location = entry_before
            .value_location(ByteOrder::LittleEndian)
            .unwrap();
        let old_count = entry_before.count;

        slide.replace_description(0, "short").unwrap();
        assert_eq!(slide.description(0).unwrap().unwrap(), "short");
        drop(slide);

        // The old region was overwritten: text then spaces to the old length
        let bytes = std::fs::read(temp.path()).unwrap();
        let region = &bytes[location as usize..(location + old_count as u64) as usize];
        assert_eq!(&region[..5], b"short");
        assert!(region[5..].iter().all(|&b| b == b' '));
    }

    #[test]
    fn test_replace_description_longer_appends() {
        let temp = label_fixture().write_to_temp();
        let original_len = std::fs::metadata(temp.path()).unwrap().len();

        let mut slide = SlideFile::open_rw(temp.path()).unwrap();
        let long_text = "x".repeat(200);
        slide.replace_description(0, &long_text).unwrap();

        assert_eq!(slide.description(0).unwrap().unwrap(), long_text);

        let entry = slide.entry(0, TiffTag::ImageDescription).unwrap().unwrap();
        assert!(entry.value_or_offset(ByteOrder::LittleEndian) as u64 >= original_len);
    }

    #[test]
    fn test_restore_description_round_trip() {
        let fixture = label_fixture();
        let temp = fixture.write_to_temp();
        let pristine = std::fs::read(temp.path()).unwrap();

        let mut slide = SlideFile::open_rw(temp.path()).unwrap();
        let (entry, location) = slide.description_entry(0).unwrap().unwrap();
        let original = slide.description(0).unwrap().unwrap();

        slide
            .replace_description(0, &"y".repeat(300))
            .unwrap();
        slide
            .restore_description(0, entry.count, location as u32, &original)
            .unwrap();
        drop(slide);

        let restored = std::fs::read(temp.path()).unwrap();
        assert_eq!(&restored[..pristine.len()], &pristine[..]);
    }
}
