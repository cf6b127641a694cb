//! Rewriter behavior on multi-IFD synthetic SVS files.

use wsi_pseudonym::format::{detect_vendor, SlideFile, Vendor};
use wsi_pseudonym::TiffError;

use super::test_utils::{write_bigtiff, write_svs};

#[test]
fn test_parses_both_pages_and_finds_label() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_svs(dir.path(), "slide.svs", "SRC-0001", 1);

    let mut slide = SlideFile::open(&path).unwrap();
    assert_eq!(slide.ifd_count(), 2);

    // Vendor detection sees the Aperio marker in the first page
    assert_eq!(detect_vendor(&mut slide).unwrap(), Vendor::Aperio);

    // The label page is found by its description
    assert_eq!(slide.find_label_ifd().unwrap(), Some(1));
    assert_eq!(slide.image_width(1).unwrap(), 64);
    assert_eq!(slide.image_length(1).unwrap(), 48);
    assert_eq!(slide.rows_per_strip(1).unwrap(), 16);
    assert_eq!(slide.strip_byte_counts(1).unwrap().len(), 3);
}

#[test]
fn test_bigtiff_rejected_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_bigtiff(dir.path(), "big.svs");

    let result = SlideFile::open(&path);
    assert!(matches!(result, Err(TiffError::BigTiff)));
}

#[test]
fn test_label_swap_preserves_other_pages() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_svs(dir.path(), "slide.svs", "SRC-0001", 1);
    let pristine = std::fs::read(&path).unwrap();

    let mut slide = SlideFile::open_rw(&path).unwrap();
    let main_strips_before = slide.read_strip_data(0).unwrap();
    let main_desc_before = slide.description(0).unwrap().unwrap();

    let replacement = vec![vec![0x11u8; 100], vec![0x22u8; 90], vec![0x33u8; 80]];
    slide.replace_strips(1, &replacement, 8).unwrap();

    // Label page updated
    assert_eq!(slide.compression(1).unwrap(), 8);
    assert_eq!(slide.strip_byte_counts(1).unwrap(), vec![100, 90, 80]);

    // Pyramid page untouched
    assert_eq!(slide.read_strip_data(0).unwrap(), main_strips_before);
    assert_eq!(slide.description(0).unwrap().unwrap(), main_desc_before);

    // The file only grew; bytes before the old label region are identical
    drop(slide);
    let rewritten = std::fs::read(&path).unwrap();
    assert!(rewritten.len() > pristine.len());
}

#[test]
fn test_full_rewrite_and_restore_is_byte_exact() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_svs(dir.path(), "slide.svs", "SRC-0001", 5);
    let pristine = std::fs::read(&path).unwrap();

    let mut slide = SlideFile::open_rw(&path).unwrap();

    // Capture label originals
    let counts = slide.strip_byte_counts(1).unwrap();
    let offsets = slide.strip_offsets(1).unwrap();
    let compression = slide.compression(1).unwrap();
    let data = slide.read_strip_data(1).unwrap();

    // Capture description originals of the pyramid page
    let (entry, location) = slide.description_entry(0).unwrap().unwrap();
    let description = slide.description(0).unwrap().unwrap();

    // Swap both, as the controller does
    slide
        .replace_strips(1, &[vec![9u8; 50], vec![8u8; 40], vec![7u8; 30]], 8)
        .unwrap();
    slide
        .replace_description(0, "Aperio Image Library v12.0.15\r\n16x16|Filename = X")
        .unwrap();

    // Restore in the controller's order: description first, then strips
    slide
        .restore_description(0, entry.count, location as u32, &description)
        .unwrap();
    slide
        .restore_strips(1, &counts, &offsets, compression, &data)
        .unwrap();
    drop(slide);

    let restored = std::fs::read(&path).unwrap();
    assert_eq!(&restored[..pristine.len()], &pristine[..]);
    // Appended tail is fully zero-wiped
    assert!(restored[pristine.len()..].iter().all(|&b| b == 0));
}
