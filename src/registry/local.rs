//! Bundled registry implementation.
//!
//! [`LocalRegistry`] keeps the whole registry state in memory and, when
//! opened on a path, reloads committed state at open and rewrites the file
//! on every commit (write-temp-then-rename). Mutations go to a staged copy
//! of the state so `rollback` is a plain discard.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::RegistryError;

use super::model::{CaseRecord, PatientRecord, SlideRecord, StudyRecord};
use super::{EntityKind, Registry};

// =============================================================================
// State
// =============================================================================

/// The full registry content: records per kind plus set-valued associations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryState {
    slides: BTreeMap<String, SlideRecord>,
    patients: BTreeMap<String, PatientRecord>,
    cases: BTreeMap<String, CaseRecord>,
    studies: BTreeMap<String, StudyRecord>,

    /// (study_id, patient_id)
    study_patients: BTreeSet<(String, String)>,

    /// (patient_id, slide_id)
    patient_slides: BTreeSet<(String, String)>,

    /// (case_id, slide_id)
    case_slides: BTreeSet<(String, String)>,
}

#[derive(Debug, Default)]
struct Inner {
    committed: RegistryState,

    /// Present while a transaction is open
    staged: Option<RegistryState>,
}

impl Inner {
    /// The state reads should observe: staged if a transaction is open.
    fn view(&self) -> &RegistryState {
        self.staged.as_ref().unwrap_or(&self.committed)
    }

    /// The state mutations target, opening a transaction if necessary.
    fn staged_mut(&mut self) -> &mut RegistryState {
        if self.staged.is_none() {
            self.staged = Some(self.committed.clone());
        }
        self.staged.as_mut().expect("staged state just ensured")
    }
}

// =============================================================================
// LocalRegistry
// =============================================================================

/// In-memory registry with optional JSON file persistence.
#[derive(Debug)]
pub struct LocalRegistry {
    path: Option<PathBuf>,
    inner: Mutex<Inner>,
}

impl LocalRegistry {
    /// A registry that lives only for the process lifetime.
    pub fn in_memory() -> Self {
        LocalRegistry {
            path: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Open a file-backed registry, loading committed state if the file
    /// exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();

        let committed = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| RegistryError::Storage(format!("cannot load {}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RegistryState::default(),
            Err(e) => {
                return Err(RegistryError::Storage(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(LocalRegistry {
            path: Some(path),
            inner: Mutex::new(Inner {
                committed,
                staged: None,
            }),
        })
    }

    async fn persist(&self, state: &RegistryState) -> Result<(), RegistryError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RegistryError::Storage(e.to_string()))?;
        }

        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| RegistryError::Storage(e.to_string()))?;

        let temp = path.with_extension("json.tmp");
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|e| RegistryError::Storage(e.to_string()))?;
        tokio::fs::rename(&temp, path)
            .await
            .map_err(|e| RegistryError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl Registry for LocalRegistry {
    // --- Slide ---------------------------------------------------------------

    async fn slide_by_id(&self, id: &str) -> Result<Option<SlideRecord>, RegistryError> {
        Ok(self.inner.lock().await.view().slides.get(id).cloned())
    }

    async fn slide_by_pseudo_id(
        &self,
        pseudo_id: &str,
    ) -> Result<Option<SlideRecord>, RegistryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .view()
            .slides
            .values()
            .find(|r| r.pseudo_id == pseudo_id)
            .cloned())
    }

    async fn put_slide(&self, record: SlideRecord) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        inner.staged_mut().slides.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update_slide(
        &self,
        record: &SlideRecord,
        fields: &[String],
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .staged_mut()
            .slides
            .get_mut(&record.id)
            .ok_or_else(|| RegistryError::Storage(format!("unknown slide id {}", record.id)))?;
        stored.apply_fields(record, fields);
        Ok(())
    }

    // --- Patient -------------------------------------------------------------

    async fn patient_by_id(&self, id: &str) -> Result<Option<PatientRecord>, RegistryError> {
        Ok(self.inner.lock().await.view().patients.get(id).cloned())
    }

    async fn patient_by_pseudo_id(
        &self,
        pseudo_id: &str,
    ) -> Result<Option<PatientRecord>, RegistryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .view()
            .patients
            .values()
            .find(|r| r.pseudo_id == pseudo_id)
            .cloned())
    }

    async fn put_patient(&self, record: PatientRecord) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        inner
            .staged_mut()
            .patients
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn update_patient(
        &self,
        record: &PatientRecord,
        fields: &[String],
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .staged_mut()
            .patients
            .get_mut(&record.id)
            .ok_or_else(|| RegistryError::Storage(format!("unknown patient id {}", record.id)))?;
        stored.apply_fields(record, fields);
        Ok(())
    }

    // --- Case ----------------------------------------------------------------

    async fn case_by_id(&self, id: &str) -> Result<Option<CaseRecord>, RegistryError> {
        Ok(self.inner.lock().await.view().cases.get(id).cloned())
    }

    async fn case_by_pseudo_id(
        &self,
        pseudo_id: &str,
    ) -> Result<Option<CaseRecord>, RegistryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .view()
            .cases
            .values()
            .find(|r| r.pseudo_id == pseudo_id)
            .cloned())
    }

    async fn put_case(&self, record: CaseRecord) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        inner.staged_mut().cases.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update_case(
        &self,
        record: &CaseRecord,
        fields: &[String],
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .staged_mut()
            .cases
            .get_mut(&record.id)
            .ok_or_else(|| RegistryError::Storage(format!("unknown case id {}", record.id)))?;
        stored.apply_fields(record, fields);
        Ok(())
    }

    // --- Study ---------------------------------------------------------------

    async fn study_by_id(&self, id: &str) -> Result<Option<StudyRecord>, RegistryError> {
        Ok(self.inner.lock().await.view().studies.get(id).cloned())
    }

    async fn study_by_pseudo_id(
        &self,
        pseudo_id: &str,
    ) -> Result<Option<StudyRecord>, RegistryError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .view()
            .studies
            .values()
            .find(|r| r.pseudo_id == pseudo_id)
            .cloned())
    }

    async fn put_study(&self, record: StudyRecord) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        inner
            .staged_mut()
            .studies
            .insert(record.id.clone(), record);
        Ok(())
    }

    async fn update_study(
        &self,
        record: &StudyRecord,
        fields: &[String],
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        let stored = inner
            .staged_mut()
            .studies
            .get_mut(&record.id)
            .ok_or_else(|| RegistryError::Storage(format!("unknown study id {}", record.id)))?;
        stored.apply_fields(record, fields);
        Ok(())
    }

    // --- Associations --------------------------------------------------------

    async fn slides_of_case(&self, case_id: &str) -> Result<Vec<SlideRecord>, RegistryError> {
        let inner = self.inner.lock().await;
        let state = inner.view();
        Ok(state
            .case_slides
            .iter()
            .filter(|(case, _)| case == case_id)
            .filter_map(|(_, slide)| state.slides.get(slide).cloned())
            .collect())
    }

    async fn slides_of_patient(
        &self,
        patient_id: &str,
    ) -> Result<Vec<SlideRecord>, RegistryError> {
        let inner = self.inner.lock().await;
        let state = inner.view();
        Ok(state
            .patient_slides
            .iter()
            .filter(|(patient, _)| patient == patient_id)
            .filter_map(|(_, slide)| state.slides.get(slide).cloned())
            .collect())
    }

    async fn patients_of_study(
        &self,
        study_id: &str,
    ) -> Result<Vec<PatientRecord>, RegistryError> {
        let inner = self.inner.lock().await;
        let state = inner.view();
        Ok(state
            .study_patients
            .iter()
            .filter(|(study, _)| study == study_id)
            .filter_map(|(_, patient)| state.patients.get(patient).cloned())
            .collect())
    }

    async fn link_case_slide(&self, case_id: &str, slide_id: &str) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        inner
            .staged_mut()
            .case_slides
            .insert((case_id.to_string(), slide_id.to_string()));
        Ok(())
    }

    async fn link_patient_slide(
        &self,
        patient_id: &str,
        slide_id: &str,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        inner
            .staged_mut()
            .patient_slides
            .insert((patient_id.to_string(), slide_id.to_string()));
        Ok(())
    }

    async fn link_study_patient(
        &self,
        study_id: &str,
        patient_id: &str,
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        inner
            .staged_mut()
            .study_patients
            .insert((study_id.to_string(), patient_id.to_string()));
        Ok(())
    }

    // --- Allocation support --------------------------------------------------

    async fn pseudo_id_taken(
        &self,
        kind: EntityKind,
        pseudo_id: &str,
    ) -> Result<bool, RegistryError> {
        let inner = self.inner.lock().await;
        let state = inner.view();
        let taken = match kind {
            EntityKind::Slide => state.slides.values().any(|r| r.pseudo_id == pseudo_id),
            EntityKind::Patient => state.patients.values().any(|r| r.pseudo_id == pseudo_id),
            EntityKind::Case => state.cases.values().any(|r| r.pseudo_id == pseudo_id),
            EntityKind::Study => state.studies.values().any(|r| r.pseudo_id == pseudo_id),
        };
        Ok(taken)
    }

    // --- Transaction boundary ------------------------------------------------

    async fn commit(&self) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        if let Some(staged) = inner.staged.take() {
            self.persist(&staged).await?;
            inner.committed = staged;
        }
        Ok(())
    }

    async fn rollback(&self) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().await;
        inner.staged = None;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
