//! Entity resolution against the registry.
//!
//! First ingestion allocates a pseudonymous ID and generates the pseudonym
//! twin atomically with the real record. Re-ingestion reuses the stored
//! pseudonyms and applies the update policy: a stored null enriched by a
//! non-null incoming value sets the real field and regenerates its
//! pseudonym (names, dates, age only — never the pseudonymous ID); a
//! changed non-null value updates only the real side.

use crate::error::PseudonymError;
use crate::manifest::{CaseManifest, PatientManifest, SlideManifest, StudyManifest};
use crate::registry::{
    allocate_pseudo_id, CaseRecord, EntityKind, PatientRecord, Registry, Sex, SlideRecord,
    StudyRecord, TimeStamp,
};

use super::material::{pseudo_age, pseudo_person_name, pseudo_timestamp};

// =============================================================================
// Resolved
// =============================================================================

/// A resolved record plus what the registry needs to hear about it.
#[derive(Debug, Clone)]
pub struct Resolved<T> {
    pub record: T,

    /// True when this ingestion created the record
    pub created: bool,

    /// Field names to update when the record already existed
    pub updates: Vec<String>,
}

impl<T> Resolved<T> {
    fn created(record: T) -> Self {
        Resolved {
            record,
            created: true,
            updates: Vec::new(),
        }
    }

    pub fn needs_write(&self) -> bool {
        self.created || !self.updates.is_empty()
    }
}

fn parse_timestamp(value: &str) -> Result<TimeStamp, PseudonymError> {
    TimeStamp::parse(value).ok_or_else(|| {
        PseudonymError::InputInvalid(vec![format!("cannot parse timestamp '{value}'")])
    })
}

// =============================================================================
// Slide
// =============================================================================

pub async fn resolve_slide<R: Registry + ?Sized>(
    registry: &R,
    manifest: &SlideManifest,
    gap_year: i32,
) -> Result<Resolved<SlideRecord>, PseudonymError> {
    let existing = registry.slide_by_id(&manifest.id).await?;

    match existing {
        None => {
            let pseudo_id = allocate_pseudo_id(registry, EntityKind::Slide).await?;
            let mut record = SlideRecord::new(&manifest.id, &pseudo_id);

            if let Some(ref name) = manifest.name {
                record.name = Some(name.clone());
                record.pseudo_name = Some(format!("wsi_{pseudo_id}"));
            }
            if let Some(ref acquired_at) = manifest.acquired_at {
                let original = parse_timestamp(acquired_at)?;
                record.acquired_at = Some(original);
                record.pseudo_acquired_at = Some(pseudo_timestamp(original, gap_year)?);
            }
            record.stain = manifest.stain.clone();
            record.tissue = manifest.tissue.clone();

            Ok(Resolved::created(record))
        }
        Some(stored) => {
            let mut record = stored;
            let mut updates = Vec::new();

            if let Some(ref name) = manifest.name {
                if record.name.is_none() {
                    record.name = Some(name.clone());
                    record.pseudo_name = Some(format!("wsi_{}", record.pseudo_id));
                    updates.push("name".to_string());
                    updates.push("pseudo_name".to_string());
                } else if record.name.as_deref() != Some(name.as_str()) {
                    record.name = Some(name.clone());
                    updates.push("name".to_string());
                }
            }

            if let Some(ref acquired_at) = manifest.acquired_at {
                let incoming = parse_timestamp(acquired_at)?;
                if record.acquired_at.is_none() {
                    record.acquired_at = Some(incoming);
                    record.pseudo_acquired_at = Some(pseudo_timestamp(incoming, gap_year)?);
                    updates.push("acquired_at".to_string());
                    updates.push("pseudo_acquired_at".to_string());
                } else if record.acquired_at != Some(incoming) {
                    record.acquired_at = Some(incoming);
                    updates.push("acquired_at".to_string());
                }
            }

            if let Some(ref stain) = manifest.stain {
                if record.stain.as_deref() != Some(stain.as_str()) {
                    record.stain = Some(stain.clone());
                    updates.push("stain".to_string());
                }
            }

            if let Some(ref tissue) = manifest.tissue {
                if record.tissue.as_deref() != Some(tissue.as_str()) {
                    record.tissue = Some(tissue.clone());
                    updates.push("tissue".to_string());
                }
            }

            Ok(Resolved {
                record,
                created: false,
                updates,
            })
        }
    }
}

// =============================================================================
// Patient
// =============================================================================

pub async fn resolve_patient<R: Registry + ?Sized>(
    registry: &R,
    manifest: &PatientManifest,
) -> Result<Resolved<PatientRecord>, PseudonymError> {
    let existing = registry.patient_by_id(&manifest.id).await?;

    match existing {
        None => {
            let pseudo_id = allocate_pseudo_id(registry, EntityKind::Patient).await?;
            let mut record = PatientRecord::new(&manifest.id, &pseudo_id);

            if let Some(ref name) = manifest.name {
                record.name = Some(name.clone());
                record.pseudo_name = Some(pseudo_person_name());
            }
            if let Some(ref sex) = manifest.sex {
                record.sex = Sex::parse(sex);
            }
            if let Some(age) = manifest.age {
                record.age = Some(age);
                record.pseudo_age = Some(pseudo_age());
            }

            Ok(Resolved::created(record))
        }
        Some(stored) => {
            let mut record = stored;
            let mut updates = Vec::new();

            if let Some(ref name) = manifest.name {
                if record.name.is_none() {
                    record.name = Some(name.clone());
                    record.pseudo_name = Some(pseudo_person_name());
                    updates.push("name".to_string());
                    updates.push("pseudo_name".to_string());
                } else if record.name.as_deref() != Some(name.as_str()) {
                    record.name = Some(name.clone());
                    updates.push("name".to_string());
                }
            }

            if let Some(ref sex) = manifest.sex {
                let incoming = Sex::parse(sex);
                if record.sex != incoming {
                    record.sex = incoming;
                    updates.push("sex".to_string());
                }
            }

            if let Some(age) = manifest.age {
                if record.age.is_none() {
                    record.age = Some(age);
                    record.pseudo_age = Some(pseudo_age());
                    updates.push("age".to_string());
                    updates.push("pseudo_age".to_string());
                } else if record.age != Some(age) {
                    record.age = Some(age);
                    updates.push("age".to_string());
                }
            }

            Ok(Resolved {
                record,
                created: false,
                updates,
            })
        }
    }
}

// =============================================================================
// Case
// =============================================================================

pub async fn resolve_case<R: Registry + ?Sized>(
    registry: &R,
    manifest: &CaseManifest,
    gap_year: i32,
) -> Result<Resolved<CaseRecord>, PseudonymError> {
    let existing = registry.case_by_id(&manifest.id).await?;

    match existing {
        None => {
            let pseudo_id = allocate_pseudo_id(registry, EntityKind::Case).await?;
            let mut record = CaseRecord::new(&manifest.id, &pseudo_id);

            if let Some(ref name) = manifest.name {
                record.name = Some(name.clone());
                record.pseudo_name = Some(format!("case_{pseudo_id}"));
            }
            if let Some(ref created_at) = manifest.created_at {
                let original = parse_timestamp(created_at)?;
                record.created_at = Some(original);
                record.pseudo_created_at = Some(pseudo_timestamp(original, gap_year)?);
            }

            Ok(Resolved::created(record))
        }
        Some(stored) => {
            let mut record = stored;
            let mut updates = Vec::new();

            if let Some(ref name) = manifest.name {
                if record.name.is_none() {
                    record.name = Some(name.clone());
                    record.pseudo_name = Some(format!("case_{}", record.pseudo_id));
                    updates.push("name".to_string());
                    updates.push("pseudo_name".to_string());
                } else if record.name.as_deref() != Some(name.as_str()) {
                    record.name = Some(name.clone());
                    updates.push("name".to_string());
                }
            }

            if let Some(ref created_at) = manifest.created_at {
                let incoming = parse_timestamp(created_at)?;
                if record.created_at.is_none() {
                    record.created_at = Some(incoming);
                    record.pseudo_created_at = Some(pseudo_timestamp(incoming, gap_year)?);
                    updates.push("created_at".to_string());
                    updates.push("pseudo_created_at".to_string());
                } else if record.created_at != Some(incoming) {
                    record.created_at = Some(incoming);
                    updates.push("created_at".to_string());
                }
            }

            Ok(Resolved {
                record,
                created: false,
                updates,
            })
        }
    }
}

// =============================================================================
// Study
// =============================================================================

pub async fn resolve_study<R: Registry + ?Sized>(
    registry: &R,
    manifest: &StudyManifest,
    gap_year: i32,
) -> Result<Resolved<StudyRecord>, PseudonymError> {
    let existing = registry.study_by_id(&manifest.id).await?;

    match existing {
        None => {
            let pseudo_id = allocate_pseudo_id(registry, EntityKind::Study).await?;
            let mut record = StudyRecord::new(&manifest.id, &pseudo_id);

            if let Some(ref name) = manifest.name {
                record.name = Some(name.clone());
                record.pseudo_name = Some(format!("study_{pseudo_id}"));
            }
            if let Some(ref date) = manifest.date {
                let original = parse_timestamp(date)?;
                record.date = Some(original);
                record.pseudo_date = Some(pseudo_timestamp(original, gap_year)?);
            }

            Ok(Resolved::created(record))
        }
        Some(stored) => {
            let mut record = stored;
            let mut updates = Vec::new();

            if let Some(ref name) = manifest.name {
                if record.name.is_none() {
                    record.name = Some(name.clone());
                    record.pseudo_name = Some(format!("study_{}", record.pseudo_id));
                    updates.push("name".to_string());
                    updates.push("pseudo_name".to_string());
                } else if record.name.as_deref() != Some(name.as_str()) {
                    record.name = Some(name.clone());
                    updates.push("name".to_string());
                }
            }

            if let Some(ref date) = manifest.date {
                let incoming = parse_timestamp(date)?;
                if record.date.is_none() {
                    record.date = Some(incoming);
                    record.pseudo_date = Some(pseudo_timestamp(incoming, gap_year)?);
                    updates.push("date".to_string());
                    updates.push("pseudo_date".to_string());
                } else if record.date != Some(incoming) {
                    record.date = Some(incoming);
                    updates.push("date".to_string());
                }
            }

            Ok(Resolved {
                record,
                created: false,
                updates,
            })
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
