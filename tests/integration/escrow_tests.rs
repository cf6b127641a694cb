//! Escrow binding: every blob the registry references must resolve and
//! decode to the expected document.

use wsi_pseudonym::manifest::{Manifest, SlideManifest};
use wsi_pseudonym::Registry;

use super::test_utils::{test_controller, write_svs};

fn slide_manifest(path: &std::path::Path) -> Manifest {
    Manifest::SingleSlide(SlideManifest {
        id: "S1".to_string(),
        path: path.to_string_lossy().into_owned(),
        name: Some("foo".to_string()),
        acquired_at: Some("2021-06-15T10:00:00".to_string()),
        stain: Some("H&E".to_string()),
        tissue: Some("liver".to_string()),
    })
}

#[tokio::test]
async fn test_registry_blob_references_resolve_and_decode() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_svs(dir.path(), "slide.svs", "SRC-0001", 1);
    let controller = test_controller(dir.path());

    controller
        .pseudonymize(&slide_manifest(&source))
        .await
        .unwrap();

    let record = controller
        .registry()
        .slide_by_id("S1")
        .await
        .unwrap()
        .expect("slide recorded");

    // Label blob decodes and matches the original label geometry
    let label_ref = record.label_blob.expect("label blob reference");
    let label = controller
        .escrow()
        .get_label(&label_ref.name, &label_ref.key)
        .await
        .unwrap();
    assert_eq!(label.data_byte_counts.len(), 3);
    assert_eq!(label.data_offsets.len(), 3);
    assert_eq!(label.compression, 1);
    let total: usize = label.data_byte_counts.iter().map(|&c| c as usize).sum();
    assert_eq!(label.data.len(), total);

    // Description blob covers the pyramid page that carried identifiers
    let meta_ref = record.metadata_blob.expect("metadata blob reference");
    let descriptions = controller
        .escrow()
        .get_descriptions(&meta_ref.name, &meta_ref.key)
        .await
        .unwrap();
    assert_eq!(descriptions.len(), 1);
    assert_eq!(descriptions[0].page_index, 0);
    assert_eq!(descriptions[0].shape, [16, 16, 3]);
    assert!(descriptions[0].value.contains("Filename = SRC-0001"));
}

#[tokio::test]
async fn test_blob_files_live_in_the_store_directory() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_svs(dir.path(), "slide.svs", "SRC-0001", 1);
    let controller = test_controller(dir.path());

    controller
        .pseudonymize(&slide_manifest(&source))
        .await
        .unwrap();

    let blobs: Vec<_> = std::fs::read_dir(dir.path().join("store"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(blobs.len(), 2);
    for name in &blobs {
        assert_eq!(name.len(), 20);
        assert!(name.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}

#[tokio::test]
async fn test_reingestion_does_not_duplicate_blobs() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_svs(dir.path(), "slide.svs", "SRC-0001", 1);
    let controller = test_controller(dir.path());

    controller
        .pseudonymize(&slide_manifest(&source))
        .await
        .unwrap();
    controller
        .pseudonymize(&slide_manifest(&source))
        .await
        .unwrap();

    let blob_count = std::fs::read_dir(dir.path().join("store")).unwrap().count();
    assert_eq!(blob_count, 2);
}
