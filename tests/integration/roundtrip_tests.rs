//! End-to-end pseudonymize → de-pseudonymize scenarios.

use wsi_pseudonym::error::{EscrowError, PseudonymError};
use wsi_pseudonym::format::SlideFile;
use wsi_pseudonym::manifest::{
    Manifest, PatientManifest, SlideManifest, StudyManifest,
};
use wsi_pseudonym::registry::TimeStamp;
use wsi_pseudonym::Registry;

use super::test_utils::{test_controller, write_bigtiff, write_svs};

fn slide_manifest(id: &str, path: &std::path::Path) -> SlideManifest {
    SlideManifest {
        id: id.to_string(),
        path: path.to_string_lossy().into_owned(),
        name: Some("foo".to_string()),
        acquired_at: Some("2021-06-15T10:00:00".to_string()),
        stain: Some("H&E".to_string()),
        tissue: Some("liver".to_string()),
    }
}

fn out_dir_count(root: &std::path::Path) -> usize {
    std::fs::read_dir(root.join("out")).unwrap().count()
}

// =============================================================================
// Scenario: single slide
// =============================================================================

#[tokio::test]
async fn test_single_slide_pseudonymization() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_svs(dir.path(), "slide.svs", "SRC-0001", 1);
    let controller = test_controller(dir.path());

    let output = controller
        .pseudonymize(&Manifest::SingleSlide(slide_manifest("S1", &source)))
        .await
        .unwrap();

    let Manifest::SingleSlide(slide) = output else {
        panic!("shape changed");
    };

    // Identity replaced, clinical fields preserved
    assert_ne!(slide.id, "S1");
    assert_eq!(slide.stain.as_deref(), Some("H&E"));
    assert_eq!(slide.tissue.as_deref(), Some("liver"));

    // Timestamp emitted in the datetime output format and re-parseable
    let acquired_at = slide.acquired_at.as_deref().unwrap();
    assert!(acquired_at.contains("AM") || acquired_at.contains("PM"));
    assert!(TimeStamp::parse(acquired_at).is_some());

    // The clone's descriptions no longer carry the identifying values
    let clone_path = std::path::PathBuf::from(&slide.path);
    let mut clone = SlideFile::open(&clone_path).unwrap();
    for index in 0..clone.ifd_count() {
        if let Some(description) = clone.description(index).unwrap() {
            assert!(!description.contains("SRC-0001"));
            assert!(!description.contains("liver biopsy"));
            assert!(!description.contains("b414b664"));
        }
    }

    // The main description now names the pseudonymous ID
    let main = clone.description(0).unwrap().unwrap();
    assert!(main.contains(&format!("Filename = {}", slide.id)));

    // The label strips decode to a raster of the label's dimensions with
    // both dark (text/barcode) and light pixels
    let label_index = clone.find_label_ifd().unwrap().unwrap();
    assert_eq!(clone.compression(label_index).unwrap(), 1);
    let raster = clone.read_strip_data(label_index).unwrap();
    assert_eq!(raster.len(), 64 * 48 * 3);
    assert!(raster.iter().any(|&b| b < 64));
    assert!(raster.iter().any(|&b| b > 192));
}

#[tokio::test]
async fn test_single_slide_round_trip_is_byte_exact() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_svs(dir.path(), "slide.svs", "SRC-0001", 1);
    let pristine = std::fs::read(&source).unwrap();
    let controller = test_controller(dir.path());

    let pseudonymized = controller
        .pseudonymize(&Manifest::SingleSlide(slide_manifest("S1", &source)))
        .await
        .unwrap();

    let restored = controller.depseudonymize(&pseudonymized).await.unwrap();
    let Manifest::SingleSlide(slide) = restored else {
        panic!("shape changed");
    };

    // Real identity back in the manifest
    assert_eq!(slide.id, "S1");
    assert_eq!(slide.name.as_deref(), Some("foo"));

    // Byte-for-byte identical, appended tail zero-wiped
    let bytes = std::fs::read(&slide.path).unwrap();
    assert_eq!(&bytes[..pristine.len()], &pristine[..]);
    assert!(bytes[pristine.len()..].iter().all(|&b| b == 0));
}

// =============================================================================
// Scenario: JPEG label falls back to Adobe Deflate
// =============================================================================

#[tokio::test]
async fn test_jpeg_label_reencoded_with_deflate_and_still_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_svs(dir.path(), "slide.svs", "SRC-0001", 7);
    let pristine = std::fs::read(&source).unwrap();
    let controller = test_controller(dir.path());

    let pseudonymized = controller
        .pseudonymize(&Manifest::SingleSlide(slide_manifest("S1", &source)))
        .await
        .unwrap();
    let Manifest::SingleSlide(ref pseudo_slide) = pseudonymized else {
        panic!("shape changed");
    };

    // Tag 259 rewritten to Adobe Deflate, strips decode to the raster
    let mut clone = SlideFile::open(std::path::Path::new(&pseudo_slide.path)).unwrap();
    let label_index = clone.find_label_ifd().unwrap().unwrap();
    assert_eq!(clone.compression(label_index).unwrap(), 8);

    let counts = clone.strip_byte_counts(label_index).unwrap();
    let offsets = clone.strip_offsets(label_index).unwrap();
    let file_bytes = std::fs::read(&pseudo_slide.path).unwrap();

    let mut decoded = Vec::new();
    for (&offset, &count) in offsets.iter().zip(counts.iter()) {
        use std::io::Read;
        let strip = &file_bytes[offset as usize..(offset + count) as usize];
        let mut decoder = flate2::read::ZlibDecoder::new(strip);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        decoded.extend_from_slice(&out);
    }
    assert_eq!(decoded.len(), 64 * 48 * 3);

    // Restoration still brings back the original "JPEG" strips exactly
    let restored = controller.depseudonymize(&pseudonymized).await.unwrap();
    let Manifest::SingleSlide(slide) = restored else {
        panic!("shape changed");
    };
    let bytes = std::fs::read(&slide.path).unwrap();
    assert_eq!(&bytes[..pristine.len()], &pristine[..]);
}

// =============================================================================
// Scenario: wrong escrow key
// =============================================================================

#[tokio::test]
async fn test_depseudonymize_with_tampered_blob_fails_without_writing() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_svs(dir.path(), "slide.svs", "SRC-0001", 1);
    let controller = test_controller(dir.path());

    let pseudonymized = controller
        .pseudonymize(&Manifest::SingleSlide(slide_manifest("S1", &source)))
        .await
        .unwrap();

    // Corrupt the escrowed label blob
    let record = controller
        .registry()
        .slide_by_id("S1")
        .await
        .unwrap()
        .unwrap();
    let blob_path = controller
        .escrow()
        .path_of(&record.label_blob.unwrap().name);
    let mut bytes = std::fs::read(&blob_path).unwrap();
    let middle = bytes.len() / 2;
    bytes[middle] = if bytes[middle] == b'A' { b'B' } else { b'A' };
    std::fs::write(&blob_path, &bytes).unwrap();

    let clones_before = out_dir_count(dir.path());
    let result = controller.depseudonymize(&pseudonymized).await;

    assert!(matches!(
        result,
        Err(PseudonymError::Escrow(EscrowError::InvalidKey))
    ));
    // No restored file was written
    assert_eq!(out_dir_count(dir.path()), clones_before);
}

// =============================================================================
// Scenario: study with an unsupported slide
// =============================================================================

#[tokio::test]
async fn test_study_skips_bigtiff_slide_and_completes_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let slide_a = write_svs(dir.path(), "a.svs", "SRC-000A", 1);
    let slide_b = write_svs(dir.path(), "b.svs", "SRC-000B", 1);
    let slide_big = write_bigtiff(dir.path(), "big.svs");
    let controller = test_controller(dir.path());

    let study = Manifest::Study(StudyManifest {
        id: "ST1".to_string(),
        name: Some("study one".to_string()),
        date: Some("2020-05-01".to_string()),
        patients: vec![
            PatientManifest {
                id: "P1".to_string(),
                name: Some("Jane Roe".to_string()),
                sex: Some("female".to_string()),
                age: Some(61),
                slides: vec![
                    slide_manifest("SA", &slide_a),
                    slide_manifest("SBIG", &slide_big),
                ],
            },
            PatientManifest {
                id: "P2".to_string(),
                name: None,
                sex: Some("male".to_string()),
                age: None,
                slides: vec![slide_manifest("SB", &slide_b)],
            },
        ],
    });

    let output = controller.pseudonymize(&study).await.unwrap();
    let Manifest::Study(study_out) = output else {
        panic!("shape changed");
    };

    // The BigTIFF slide is skipped; the other two completed
    assert_eq!(study_out.patients.len(), 2);
    assert_eq!(study_out.patients[0].slides.len(), 1);
    assert_eq!(study_out.patients[1].slides.len(), 1);

    // Study and patient pseudonyms present
    assert_ne!(study_out.id, "ST1");
    assert_ne!(study_out.patients[0].id, "P1");
    assert_ne!(study_out.patients[0].name.as_deref(), Some("Jane Roe"));
    let pseudo_age = study_out.patients[0].age.unwrap();
    assert!((20..=70).contains(&pseudo_age));
    // Sex passes through, absent fields stay absent
    assert_eq!(study_out.patients[0].sex.as_deref(), Some("female"));
    assert_eq!(study_out.patients[1].name, None);
    assert_eq!(study_out.patients[1].age, None);

    // The skipped slide never reached the registry
    assert!(controller
        .registry()
        .slide_by_id("SBIG")
        .await
        .unwrap()
        .is_none());
    assert!(controller
        .registry()
        .slide_by_id("SA")
        .await
        .unwrap()
        .is_some());
}

// =============================================================================
// Manifest shape preservation
// =============================================================================

#[tokio::test]
async fn test_absent_optional_fields_stay_absent() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_svs(dir.path(), "slide.svs", "SRC-0001", 1);
    let controller = test_controller(dir.path());

    let input = Manifest::SingleSlide(SlideManifest {
        id: "S1".to_string(),
        path: source.to_string_lossy().into_owned(),
        name: None,
        acquired_at: None,
        stain: Some("H&E".to_string()),
        tissue: None,
    });

    let output = controller.pseudonymize(&input).await.unwrap();
    let Manifest::SingleSlide(slide) = output else {
        panic!("shape changed");
    };

    assert_eq!(slide.name, None);
    assert_eq!(slide.acquired_at, None);
    assert_eq!(slide.tissue, None);
    assert_eq!(slide.stain.as_deref(), Some("H&E"));
}

#[tokio::test]
async fn test_validation_failures_are_collected_before_any_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let controller = test_controller(dir.path());

    let input = Manifest::SingleSlide(SlideManifest {
        id: String::new(),
        path: "/nowhere/missing.svs".to_string(),
        name: None,
        acquired_at: Some("not a timestamp".to_string()),
        stain: None,
        tissue: None,
    });

    let result = controller.pseudonymize(&input).await;
    match result {
        Err(PseudonymError::InputInvalid(errors)) => {
            assert_eq!(errors.len(), 3);
        }
        other => panic!("expected InputInvalid, got {other:?}"),
    }

    // Nothing was created
    assert_eq!(out_dir_count(dir.path()), 0);
    assert_eq!(std::fs::read_dir(dir.path().join("store")).unwrap().count(), 0);
}
