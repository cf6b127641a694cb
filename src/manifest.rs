//! Input and output manifests.
//!
//! A manifest describes what to (de-)pseudonymize in one of three shapes,
//! discriminated by key presence: a study carries `patients`, a case
//! carries `slides`, and anything else is a single slide. The output
//! manifest mirrors the input shape with identifying values replaced by
//! their pseudonyms (or restored originals); optional fields absent in the
//! input stay absent in the output.
//!
//! Timestamps are carried as strings: inputs accept ISO-like free-form
//! values, outputs are formatted `%d.%m.%Y` (dates) and `%I:%M%p %d.%m.%Y`
//! (datetimes). Deep JSON Schema validation is an external collaborator;
//! this module performs structural and path validation and collects every
//! finding before the controller runs.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::registry::TimeStamp;

// =============================================================================
// Manifest shapes
// =============================================================================

/// A single slide entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideManifest {
    pub id: String,

    /// Path of the slide file (source on input, clone on output)
    pub path: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquired_at: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stain: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tissue: Option<String>,
}

/// A patient with their slides (study manifests only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientManifest {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,

    pub slides: Vec<SlideManifest>,
}

/// A case grouping slides directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseManifest {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    pub slides: Vec<SlideManifest>,
}

/// A study grouping patients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyManifest {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    pub patients: Vec<PatientManifest>,
}

/// The three manifest shapes, discriminated by key presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Manifest {
    Study(StudyManifest),
    Case(CaseManifest),
    SingleSlide(SlideManifest),
}

impl Manifest {
    /// Short kind name for log messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Manifest::SingleSlide(_) => "wsi",
            Manifest::Case(_) => "case",
            Manifest::Study(_) => "study",
        }
    }

    /// Parse a manifest from JSON text.
    pub fn from_json(text: &str) -> Result<Manifest, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Serialize to pretty JSON for the output file.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Validate a manifest, collecting every finding.
///
/// Checks are structural (non-empty IDs, parseable timestamps) and
/// filesystem-level (slide paths exist). Vendor and BigTIFF checks happen
/// per slide at processing time so multi-slide flows can skip rather than
/// fail.
pub fn validate(manifest: &Manifest) -> Vec<String> {
    let mut errors = Vec::new();

    match manifest {
        Manifest::SingleSlide(slide) => {
            validate_slide(slide, "$", &mut errors);
        }
        Manifest::Case(case) => {
            if case.id.is_empty() {
                errors.push("$.id: must not be empty".to_string());
            }
            validate_timestamp(&case.created_at, "$.created_at", &mut errors);
            for (index, slide) in case.slides.iter().enumerate() {
                validate_slide(slide, &format!("$.slides[{index}]"), &mut errors);
            }
        }
        Manifest::Study(study) => {
            if study.id.is_empty() {
                errors.push("$.id: must not be empty".to_string());
            }
            validate_timestamp(&study.date, "$.date", &mut errors);
            for (patient_index, patient) in study.patients.iter().enumerate() {
                let prefix = format!("$.patients[{patient_index}]");
                if patient.id.is_empty() {
                    errors.push(format!("{prefix}.id: must not be empty"));
                }
                for (index, slide) in patient.slides.iter().enumerate() {
                    validate_slide(slide, &format!("{prefix}.slides[{index}]"), &mut errors);
                }
            }
        }
    }

    errors
}

fn validate_slide(slide: &SlideManifest, prefix: &str, errors: &mut Vec<String>) {
    if slide.id.is_empty() {
        errors.push(format!("{prefix}.id: must not be empty"));
    }

    if slide.path.is_empty() {
        errors.push(format!("{prefix}.path: must not be empty"));
    } else if !Path::new(&slide.path).is_file() {
        errors.push(format!("{prefix}.path: {}, file not found", slide.path));
    }

    validate_timestamp(&slide.acquired_at, &format!("{prefix}.acquired_at"), errors);
}

fn validate_timestamp(value: &Option<String>, location: &str, errors: &mut Vec<String>) {
    if let Some(text) = value {
        if TimeStamp::parse(text).is_none() {
            errors.push(format!("{location}: cannot parse timestamp '{text}'"));
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
