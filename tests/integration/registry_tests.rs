//! Pseudonym stability and uniqueness through the controller.

use wsi_pseudonym::manifest::{CaseManifest, Manifest, SlideManifest};
use wsi_pseudonym::registry::LocalRegistry;
use wsi_pseudonym::Registry;

use super::test_utils::{controller_with, test_controller, write_svs};

fn slide_manifest(id: &str, path: &std::path::Path) -> SlideManifest {
    SlideManifest {
        id: id.to_string(),
        path: path.to_string_lossy().into_owned(),
        name: Some(format!("{id} scan")),
        acquired_at: Some("2021-06-15T10:00:00".to_string()),
        stain: Some("H&E".to_string()),
        tissue: None,
    }
}

#[tokio::test]
async fn test_pseudo_ids_unique_across_slides() {
    let dir = tempfile::tempdir().unwrap();
    let controller = test_controller(dir.path());

    let mut seen = std::collections::HashSet::new();
    for index in 0..8 {
        let source = write_svs(
            dir.path(),
            &format!("slide{index}.svs"),
            &format!("SRC-{index:04}"),
            1,
        );
        let input = Manifest::SingleSlide(slide_manifest(&format!("S{index}"), &source));
        let output = controller.pseudonymize(&input).await.unwrap();

        let Manifest::SingleSlide(slide) = output else {
            panic!("shape changed");
        };
        assert_eq!(slide.id.len(), 13);
        assert!(seen.insert(slide.id), "pseudo ID collision");
    }
}

#[tokio::test]
async fn test_stability_across_controller_instances() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_svs(dir.path(), "slide.svs", "SRC-0001", 1);
    let registry_path = dir.path().join("registry.json");

    let first_id = {
        let registry = LocalRegistry::open(&registry_path).await.unwrap();
        let controller = controller_with(dir.path(), registry);
        let output = controller
            .pseudonymize(&Manifest::SingleSlide(slide_manifest("S1", &source)))
            .await
            .unwrap();
        match output {
            Manifest::SingleSlide(slide) => slide.id,
            other => panic!("shape changed: {other:?}"),
        }
    };

    // A fresh controller over the persisted registry reuses the pseudonym
    let registry = LocalRegistry::open(&registry_path).await.unwrap();
    let controller = controller_with(dir.path(), registry);
    let output = controller
        .pseudonymize(&Manifest::SingleSlide(slide_manifest("S1", &source)))
        .await
        .unwrap();
    match output {
        Manifest::SingleSlide(slide) => assert_eq!(slide.id, first_id),
        other => panic!("shape changed: {other:?}"),
    }
}

#[tokio::test]
async fn test_case_ingestion_adds_edge_without_touching_pseudonym() {
    let dir = tempfile::tempdir().unwrap();
    let source = write_svs(dir.path(), "slide.svs", "SRC-0001", 1);
    let controller = test_controller(dir.path());

    // First ingestion: single slide
    let output = controller
        .pseudonymize(&Manifest::SingleSlide(slide_manifest("S1", &source)))
        .await
        .unwrap();
    let Manifest::SingleSlide(first) = output else {
        panic!("shape changed");
    };

    // Second ingestion: the same slide under a case
    let case = Manifest::Case(CaseManifest {
        id: "C1".to_string(),
        name: Some("case one".to_string()),
        created_at: Some("2022-01-10".to_string()),
        slides: vec![slide_manifest("S1", &source)],
    });
    let output = controller.pseudonymize(&case).await.unwrap();
    let Manifest::Case(case_out) = output else {
        panic!("shape changed");
    };

    // Slide pseudonym unchanged, case edge added
    assert_eq!(case_out.slides.len(), 1);
    assert_eq!(case_out.slides[0].id, first.id);

    let slides = controller.registry().slides_of_case("C1").await.unwrap();
    assert_eq!(slides.len(), 1);
    assert_eq!(slides[0].id, "S1");
}

#[tokio::test]
async fn test_pseudonyms_differ_from_originals() {
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

    assert_ne!(slide.id, "S1");
    assert_ne!(slide.name.as_deref(), Some("S1 scan"));

    let record = controller
        .registry()
        .slide_by_id("S1")
        .await
        .unwrap()
        .unwrap();
    assert_ne!(record.pseudo_acquired_at, record.acquired_at);
}
