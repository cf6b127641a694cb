//! Shared helpers for integration tests.
//!
//! Builds small synthetic Aperio-style SVS files (classic little-endian
//! TIFF, one "pyramid" page with identifying metadata plus a label page)
//! and provides a deterministic text rasterizer so no font asset is
//! needed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{Rgb, RgbImage};
use wsi_pseudonym::config::EngineConfig;
use wsi_pseudonym::label::{FontFace, TextRasterizer};
use wsi_pseudonym::registry::LocalRegistry;
use wsi_pseudonym::Pseudonymizer;

// =============================================================================
// TIFF fixture builder
// =============================================================================

/// One page of a synthetic slide file.
pub struct PageSpec {
    pub width: u32,
    pub height: u32,
    pub rows_per_strip: u32,
    pub compression: u16,
    pub description: String,
    pub strips: Vec<Vec<u8>>,
}

/// Serialize pages into a classic little-endian TIFF.
///
/// Layout per page: IFD, external strip tables (when more than one strip),
/// description bytes, strip data. Entries are written in ascending tag
/// order as the TIFF spec requires.
pub fn build_tiff(pages: &[PageSpec]) -> Vec<u8> {
    const ENTRY_COUNT: u16 = 9;

    let mut out = vec![0x49, 0x49, 0x2A, 0x00, 0, 0, 0, 0];
    let mut next_ifd_field: usize = 4;

    for page in pages {
        let ifd_offset = out.len() as u32;
        out[next_ifd_field..next_ifd_field + 4].copy_from_slice(&ifd_offset.to_le_bytes());

        let strip_count = page.strips.len();
        let ifd_size = 2 + ENTRY_COUNT as usize * 12 + 4;
        let tables_size = if strip_count > 1 { 8 * strip_count } else { 0 };

        let counts_offset = ifd_offset as usize + ifd_size;
        let offsets_offset = counts_offset + if strip_count > 1 { 4 * strip_count } else { 0 };
        let desc_offset = ifd_offset as usize + ifd_size + tables_size;
        let data_offset = desc_offset + page.description.len();

        let mut strip_offsets = Vec::with_capacity(strip_count);
        let mut cursor = data_offset as u32;
        for strip in &page.strips {
            strip_offsets.push(cursor);
            cursor += strip.len() as u32;
        }

        let long = |v: u32| v.to_le_bytes();
        let short = |v: u16| {
            let mut bytes = [0u8; 4];
            bytes[..2].copy_from_slice(&v.to_le_bytes());
            bytes
        };

        out.extend_from_slice(&ENTRY_COUNT.to_le_bytes());
        let mut entry = |out: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, value: [u8; 4]| {
            out.extend_from_slice(&tag.to_le_bytes());
            out.extend_from_slice(&field_type.to_le_bytes());
            out.extend_from_slice(&count.to_le_bytes());
            out.extend_from_slice(&value);
        };

        entry(&mut out, 256, 4, 1, long(page.width));
        entry(&mut out, 257, 4, 1, long(page.height));
        entry(&mut out, 258, 3, 1, short(8));
        entry(&mut out, 259, 3, 1, short(page.compression));
        entry(
            &mut out,
            270,
            2,
            page.description.len() as u32,
            long(desc_offset as u32),
        );
        if strip_count > 1 {
            entry(&mut out, 273, 4, strip_count as u32, long(offsets_offset as u32));
        } else {
            entry(&mut out, 273, 4, 1, long(strip_offsets[0]));
        }
        entry(&mut out, 277, 3, 1, short(3));
        entry(&mut out, 278, 4, 1, long(page.rows_per_strip));
        if strip_count > 1 {
            entry(&mut out, 279, 4, strip_count as u32, long(counts_offset as u32));
        } else {
            entry(&mut out, 279, 4, 1, long(page.strips[0].len() as u32));
        }

        next_ifd_field = out.len();
        out.extend_from_slice(&0u32.to_le_bytes());

        if strip_count > 1 {
            for strip in &page.strips {
                out.extend_from_slice(&(strip.len() as u32).to_le_bytes());
            }
            for offset in &strip_offsets {
                out.extend_from_slice(&offset.to_le_bytes());
            }
        }
        out.extend_from_slice(page.description.as_bytes());
        for strip in &page.strips {
            out.extend_from_slice(strip);
        }
    }

    out
}

/// The pyramid page + label page of a synthetic SVS slide.
pub fn svs_pages(slide_tag: &str, label_compression: u16) -> Vec<PageSpec> {
    let main_description = format!(
        "Aperio Image Library v12.0.15\r\n16x16 [0,0] JPEG/RGB Q=30|AppMag = 20\
         |Filename = {slide_tag}|Title = liver biopsy|Date = 06/15/21\
         |Time = 10:02:13|Time Zone = GMT+01:00|User = b414b664"
    );

    let main_strip = |seed: u8| (0..16 * 8 * 3).map(|i| (i as u8).wrapping_add(seed)).collect();
    let label_strip = |seed: u8| {
        (0..64 * 16 * 3)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect()
    };

    vec![
        PageSpec {
            width: 16,
            height: 16,
            rows_per_strip: 8,
            compression: 1,
            description: main_description,
            strips: vec![main_strip(1), main_strip(2)],
        },
        PageSpec {
            width: 64,
            height: 48,
            rows_per_strip: 16,
            compression: label_compression,
            description: "Aperio Image Library v12.0.15\r\nlabel 64x48".to_string(),
            strips: vec![label_strip(3), label_strip(5), label_strip(7)],
        },
    ]
}

/// Write a synthetic SVS file into a directory.
pub fn write_svs(dir: &Path, name: &str, slide_tag: &str, label_compression: u16) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, build_tiff(&svs_pages(slide_tag, label_compression))).unwrap();
    path
}

/// A minimal BigTIFF header followed by padding; enough to be recognized
/// and rejected.
pub fn write_bigtiff(dir: &Path, name: &str) -> PathBuf {
    let mut bytes = vec![
        0x49, 0x49, // II
        0x2B, 0x00, // version 43
        0x08, 0x00, // offset size
        0x00, 0x00, // reserved
        0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // first IFD at 16
    ];
    bytes.extend_from_slice(&[0u8; 64]);

    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

// =============================================================================
// Controller construction
// =============================================================================

/// Build a controller rooted in a temp directory, with the escrow store
/// under `store/` and clones under `out/`.
pub fn controller_with(root: &Path, registry: LocalRegistry) -> Pseudonymizer<LocalRegistry> {
    let out = root.join("out");
    std::fs::create_dir_all(&out).unwrap();

    let config = EngineConfig {
        store_dir: root.join("store"),
        dest_dir: Some(out),
    };
    Pseudonymizer::new(config, registry, Arc::new(BoxText)).unwrap()
}

/// Controller over a fresh in-memory registry.
pub fn test_controller(root: &Path) -> Pseudonymizer<LocalRegistry> {
    controller_with(root, LocalRegistry::in_memory())
}

// =============================================================================
// Stub text rasterizer
// =============================================================================

/// Fixed-advance rasterizer: every glyph is a filled box. Deterministic
/// and font-free, which is all layout and round-trip tests need.
pub struct BoxText;

impl TextRasterizer for BoxText {
    fn measure(&self, text: &str, _face: FontFace, size: f32) -> (u32, u32) {
        let advance = (size * 0.6).ceil() as u32;
        (advance * text.chars().count() as u32, size.ceil() as u32)
    }

    fn draw(&self, canvas: &mut RgbImage, x: u32, y: u32, text: &str, face: FontFace, size: f32) {
        let (w, h) = self.measure(text, face, size);
        for py in y..(y + h).min(canvas.height()) {
            for px in x..(x + w).min(canvas.width()) {
                canvas.put_pixel(px, py, Rgb([0, 0, 0]));
            }
        }
    }
}
