//! Persistent identity registry.
//!
//! The registry is the source of truth for real ↔ pseudonymous identity
//! mappings and their associations (Study↔Patient, Patient↔Slide,
//! Case↔Slide). The [`Registry`] trait is the consumed contract — a
//! relational backend can stand behind it — while [`LocalRegistry`] is the
//! bundled implementation used by the CLI and tests.
//!
//! All mutations are staged and only become visible to later sessions on
//! `commit`; `rollback` discards staged state. The controller opens one
//! transaction per top-level entity.

use async_trait::async_trait;

use crate::config::{ID_ALLOCATION_ATTEMPTS, PSEUDO_ID_LENGTH};
use crate::error::RegistryError;
use crate::ids::generate_id;

mod local;
pub mod model;

pub use local::LocalRegistry;
pub use model::{BlobRef, CaseRecord, PatientRecord, Sex, SlideRecord, StudyRecord, TimeStamp};

// =============================================================================
// EntityKind
// =============================================================================

/// The four pseudonymized entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Slide,
    Patient,
    Case,
    Study,
}

impl EntityKind {
    pub const fn name(&self) -> &'static str {
        match self {
            EntityKind::Slide => "Slide",
            EntityKind::Patient => "Patient",
            EntityKind::Case => "Case",
            EntityKind::Study => "Study",
        }
    }
}

// =============================================================================
// Registry trait
// =============================================================================

/// The registry contract consumed by the controller.
///
/// Lookups read committed state plus anything staged in the current
/// transaction. `put_*` inserts a new record; `update_*` copies the named
/// fields of the given record onto the stored one; `link_*` union-merges an
/// association edge. Everything mutating stays invisible to other sessions
/// until `commit`.
#[async_trait]
pub trait Registry: Send + Sync {
    // --- Slide ---------------------------------------------------------------
    async fn slide_by_id(&self, id: &str) -> Result<Option<SlideRecord>, RegistryError>;
    async fn slide_by_pseudo_id(&self, pseudo_id: &str)
        -> Result<Option<SlideRecord>, RegistryError>;
    async fn put_slide(&self, record: SlideRecord) -> Result<(), RegistryError>;
    async fn update_slide(
        &self,
        record: &SlideRecord,
        fields: &[String],
    ) -> Result<(), RegistryError>;

    // --- Patient -------------------------------------------------------------
    async fn patient_by_id(&self, id: &str) -> Result<Option<PatientRecord>, RegistryError>;
    async fn patient_by_pseudo_id(
        &self,
        pseudo_id: &str,
    ) -> Result<Option<PatientRecord>, RegistryError>;
    async fn put_patient(&self, record: PatientRecord) -> Result<(), RegistryError>;
    async fn update_patient(
        &self,
        record: &PatientRecord,
        fields: &[String],
    ) -> Result<(), RegistryError>;

    // --- Case ----------------------------------------------------------------
    async fn case_by_id(&self, id: &str) -> Result<Option<CaseRecord>, RegistryError>;
    async fn case_by_pseudo_id(&self, pseudo_id: &str)
        -> Result<Option<CaseRecord>, RegistryError>;
    async fn put_case(&self, record: CaseRecord) -> Result<(), RegistryError>;
    async fn update_case(
        &self,
        record: &CaseRecord,
        fields: &[String],
    ) -> Result<(), RegistryError>;

    // --- Study ---------------------------------------------------------------
    async fn study_by_id(&self, id: &str) -> Result<Option<StudyRecord>, RegistryError>;
    async fn study_by_pseudo_id(
        &self,
        pseudo_id: &str,
    ) -> Result<Option<StudyRecord>, RegistryError>;
    async fn put_study(&self, record: StudyRecord) -> Result<(), RegistryError>;
    async fn update_study(
        &self,
        record: &StudyRecord,
        fields: &[String],
    ) -> Result<(), RegistryError>;

    // --- Associations (children resolution + linking) ------------------------
    async fn slides_of_case(&self, case_id: &str) -> Result<Vec<SlideRecord>, RegistryError>;
    async fn slides_of_patient(&self, patient_id: &str)
        -> Result<Vec<SlideRecord>, RegistryError>;
    async fn patients_of_study(
        &self,
        study_id: &str,
    ) -> Result<Vec<PatientRecord>, RegistryError>;
    async fn link_case_slide(&self, case_id: &str, slide_id: &str) -> Result<(), RegistryError>;
    async fn link_patient_slide(
        &self,
        patient_id: &str,
        slide_id: &str,
    ) -> Result<(), RegistryError>;
    async fn link_study_patient(
        &self,
        study_id: &str,
        patient_id: &str,
    ) -> Result<(), RegistryError>;

    // --- Allocation support --------------------------------------------------
    async fn pseudo_id_taken(
        &self,
        kind: EntityKind,
        pseudo_id: &str,
    ) -> Result<bool, RegistryError>;

    // --- Transaction boundary ------------------------------------------------
    async fn commit(&self) -> Result<(), RegistryError>;
    async fn rollback(&self) -> Result<(), RegistryError>;
}

// =============================================================================
// Pseudonymous ID allocation
// =============================================================================

/// Allocate a collision-free pseudonymous ID for an entity kind.
///
/// Draws a fresh 13-character ID and retries on a registry collision, up to
/// the configured attempt budget.
pub async fn allocate_pseudo_id<R: Registry + ?Sized>(
    registry: &R,
    kind: EntityKind,
) -> Result<String, RegistryError> {
    for _ in 0..ID_ALLOCATION_ATTEMPTS {
        let candidate = generate_id(PSEUDO_ID_LENGTH);
        if !registry.pseudo_id_taken(kind, &candidate).await? {
            return Ok(candidate);
        }
    }

    Err(RegistryError::AllocationExhausted {
        kind: kind.name(),
        attempts: ID_ALLOCATION_ATTEMPTS,
    })
}
