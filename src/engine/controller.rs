//! The pseudonymization controller.
//!
//! Orchestrates the full per-slide pipeline: validate → resolve pseudonyms
//! → render the pseudonym label → encode strips → rewrite the clone →
//! escrow the originals → commit the registry → emit the output manifest,
//! and the symmetric inverse.
//!
//! Ordering per slide is total: escrow writes happen before the registry
//! put that references them, which happens before the manifest is
//! returned. A failure before the commit leaves no trace in the registry;
//! the failed slide's clone and freshly written escrow blobs are deleted.
//! In case and study flows the context entities commit first, each slide
//! commits at its own boundary, and a failed slide is skipped (and omitted
//! from the output) while the remaining slides continue.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::codec::{self, Predictor, StripLayout};
use crate::config::EngineConfig;
use crate::error::{PseudonymError, RegistryError, TiffError};
use crate::escrow::{DescriptionBlob, DescriptionRecord, EscrowStore, LabelBlob};
use crate::format::tiff::Compression;
use crate::format::{detect_vendor, vendor_from_extension, SlideFile};
use crate::label::{slide_label_schema, LabelContext, LabelRenderer, TextRasterizer};
use crate::manifest::{self, CaseManifest, Manifest, PatientManifest, SlideManifest, StudyManifest};
use crate::registry::{BlobRef, Registry, SlideRecord};

use super::material::draw_gap_year;
use super::metadata::{contains_identifier_keys, pseudonym_metadata, rewrite_description};
use super::resolve::{self, Resolved};

// =============================================================================
// Pseudonymizer
// =============================================================================

/// Top-level orchestrator for pseudonymization and de-pseudonymization.
pub struct Pseudonymizer<R: Registry> {
    config: EngineConfig,
    registry: R,
    escrow: EscrowStore,
    text: Arc<dyn TextRasterizer>,
}

impl<R: Registry> Pseudonymizer<R> {
    /// Build a controller over a registry and a text rasterizer, opening
    /// the configured escrow store.
    pub fn new(
        config: EngineConfig,
        registry: R,
        text: Arc<dyn TextRasterizer>,
    ) -> Result<Self, PseudonymError> {
        let escrow = EscrowStore::open(&config.store_dir)?;
        Ok(Pseudonymizer {
            config,
            registry,
            escrow,
            text,
        })
    }

    /// The registry behind this controller.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// The escrow store behind this controller.
    pub fn escrow(&self) -> &EscrowStore {
        &self.escrow
    }

    // =========================================================================
    // Pseudonymization
    // =========================================================================

    /// Pseudonymize everything the manifest describes.
    pub async fn pseudonymize(&self, input: &Manifest) -> Result<Manifest, PseudonymError> {
        let errors = manifest::validate(input);
        if !errors.is_empty() {
            return Err(PseudonymError::InputInvalid(errors));
        }

        // One gap year per invocation, applied to every timestamp pseudonym
        let gap_year = draw_gap_year();

        match input {
            Manifest::SingleSlide(slide) => {
                let output = self
                    .pseudonymize_slide(slide, LabelContext::Slide, gap_year)
                    .await?;
                Ok(Manifest::SingleSlide(output))
            }
            Manifest::Case(case) => Ok(Manifest::Case(self.pseudonymize_case(case, gap_year).await?)),
            Manifest::Study(study) => {
                Ok(Manifest::Study(self.pseudonymize_study(study, gap_year).await?))
            }
        }
    }

    async fn pseudonymize_case(
        &self,
        case: &CaseManifest,
        gap_year: i32,
    ) -> Result<CaseManifest, PseudonymError> {
        let resolved = resolve::resolve_case(&self.registry, case, gap_year).await?;
        self.stage_case(&resolved).await?;
        self.registry.commit().await?;

        let mut slides = Vec::new();
        for slide in &case.slides {
            match self
                .pseudonymize_slide(slide, LabelContext::Case(&resolved.record), gap_year)
                .await
            {
                Ok(output) => slides.push(output),
                Err(e) => warn!("Slide[id = {}]: skipped: {e}", slide.id),
            }
        }

        Ok(CaseManifest {
            id: resolved.record.pseudo_id.clone(),
            name: case
                .name
                .as_ref()
                .map(|_| resolved.record.pseudo_name.clone().unwrap_or_default()),
            created_at: case
                .created_at
                .as_ref()
                .and_then(|_| resolved.record.pseudo_created_at.map(|t| t.format())),
            slides,
        })
    }

    async fn pseudonymize_study(
        &self,
        study: &StudyManifest,
        gap_year: i32,
    ) -> Result<StudyManifest, PseudonymError> {
        let resolved_study = resolve::resolve_study(&self.registry, study, gap_year).await?;
        self.stage_study(&resolved_study).await?;

        // Resolve and stage every patient in the same context transaction
        let mut resolved_patients = Vec::with_capacity(study.patients.len());
        for patient in &study.patients {
            let resolved = resolve::resolve_patient(&self.registry, patient).await?;
            self.stage_patient(&resolved).await?;
            self.registry
                .link_study_patient(&resolved_study.record.id, &resolved.record.id)
                .await?;
            resolved_patients.push(resolved);
        }
        self.registry.commit().await?;

        let mut patients = Vec::new();
        for (patient, resolved_patient) in study.patients.iter().zip(&resolved_patients) {
            let mut slides = Vec::new();
            for slide in &patient.slides {
                let context = LabelContext::Study {
                    study: &resolved_study.record,
                    patient: &resolved_patient.record,
                };
                match self.pseudonymize_slide(slide, context, gap_year).await {
                    Ok(output) => slides.push(output),
                    Err(e) => warn!(
                        "Patient[id = {}] Slide[id = {}]: skipped: {e}",
                        patient.id, slide.id
                    ),
                }
            }

            patients.push(PatientManifest {
                id: resolved_patient.record.pseudo_id.clone(),
                name: patient
                    .name
                    .as_ref()
                    .map(|_| resolved_patient.record.pseudo_name.clone().unwrap_or_default()),
                sex: patient.sex.clone(),
                age: patient.age.and_then(|_| resolved_patient.record.pseudo_age),
                slides,
            });
        }

        Ok(StudyManifest {
            id: resolved_study.record.pseudo_id.clone(),
            name: study
                .name
                .as_ref()
                .map(|_| resolved_study.record.pseudo_name.clone().unwrap_or_default()),
            date: study
                .date
                .as_ref()
                .and_then(|_| resolved_study.record.pseudo_date.map(|t| t.format())),
            patients,
        })
    }

    /// The whole per-slide pipeline, with rollback of everything this
    /// slide created when any step fails.
    async fn pseudonymize_slide(
        &self,
        slide: &SlideManifest,
        context: LabelContext<'_>,
        gap_year: i32,
    ) -> Result<SlideManifest, PseudonymError> {
        info!("Slide[id = {}]: pseudonymizing {}", slide.id, slide.path);

        // Structural checks on the source before touching anything
        let source_path = Path::new(&slide.path);
        let mut source = match SlideFile::open(source_path) {
            Ok(source) => source,
            Err(TiffError::BigTiff) => {
                return Err(PseudonymError::VendorUnsupported("BigTIFF".to_string()));
            }
            Err(e @ (TiffError::InvalidMagic(_) | TiffError::InvalidVersion(_))) => {
                // Non-TIFF containers of recognized vendors (Mirax) are
                // skipped as unsupported rather than failed as corrupt
                return Err(match vendor_from_extension(source_path) {
                    Some(vendor) => PseudonymError::VendorUnsupported(vendor.name().to_string()),
                    None => e.into(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let vendor = detect_vendor(&mut source)?;
        if !vendor.is_supported() {
            return Err(PseudonymError::VendorUnsupported(vendor.name().to_string()));
        }

        let label_index = source
            .find_label_ifd()?
            .ok_or_else(|| PseudonymError::NoLabel(slide.id.clone()))?;

        let label_width = source.image_width(label_index)?;
        let label_height = source.image_length(label_index)?;
        let rows_per_strip = source.rows_per_strip(label_index)?;
        let predictor = Predictor::from_u16(source.predictor(label_index)?)?;
        let original_compression = source.compression(label_index)?;
        let target_compression = Compression::encoding_target(original_compression);
        drop(source);

        // Resolve or allocate the pseudonym record
        let resolved = resolve::resolve_slide(&self.registry, slide, gap_year).await?;
        let mut record = resolved.record.clone();

        // Render the pseudonym label at the original dimensions and encode
        // it with the original strip layout
        let schema = slide_label_schema(&record, context, label_width, label_height)?;
        let raster = LabelRenderer::new(self.text.as_ref()).render(&schema, label_width, label_height)?;
        let strips = codec::encode_strips(
            raster.as_raw(),
            label_height,
            label_width,
            3,
            StripLayout {
                rows_per_strip,
                predictor,
                compression: target_compression,
            },
        )?;
        let strip_data: Vec<Vec<u8>> = strips.into_iter().map(|s| s.data).collect();

        // Clone the source; the clone is the sole write target from here on
        let clone_path = clone_destination(self.config.dest_dir.as_deref(), &slide.path, &record.pseudo_id);
        tokio::fs::copy(&slide.path, &clone_path).await?;

        let mut created_blobs = Vec::new();
        let result = self
            .rewrite_slide_clone(
                &clone_path,
                label_index,
                &strip_data,
                original_compression,
                target_compression.as_u16(),
                &mut record,
                &resolved,
                context,
                &mut created_blobs,
            )
            .await;

        if let Err(e) = result {
            warn!("Slide[id = {}]: rolling back", slide.id);
            let _ = self.registry.rollback().await;
            for name in &created_blobs {
                let _ = self.escrow.remove(name).await;
            }
            let _ = tokio::fs::remove_file(&clone_path).await;
            return Err(e);
        }

        info!(
            "Slide[id = {}]: wrote pseudonymized clone {}",
            slide.id,
            clone_path.display()
        );
        Ok(pseudonym_output(slide, &record, &clone_path))
    }

    /// Rewrite the clone, escrow the originals, and commit the registry.
    #[allow(clippy::too_many_arguments)]
    async fn rewrite_slide_clone(
        &self,
        clone_path: &Path,
        label_index: usize,
        strip_data: &[Vec<u8>],
        original_compression: u16,
        target_compression: u16,
        record: &mut SlideRecord,
        resolved: &Resolved<SlideRecord>,
        context: LabelContext<'_>,
        created_blobs: &mut Vec<String>,
    ) -> Result<(), PseudonymError> {
        let mut clone = SlideFile::open_rw(clone_path)?;

        // Capture the originals before any byte is rewritten
        let label_blob = LabelBlob {
            data_byte_counts: clone.strip_byte_counts(label_index)?,
            data_offsets: clone.strip_offsets(label_index)?,
            compression: original_compression,
            data: clone.read_strip_data(label_index)?.to_vec(),
        };

        let mut descriptions: DescriptionBlob = Vec::new();
        for index in 0..clone.ifd_count() {
            let Some(description) = clone.description(index)? else {
                continue;
            };
            if !contains_identifier_keys(&description) {
                continue;
            }
            let Some((entry, location)) = clone.description_entry(index)? else {
                continue;
            };
            descriptions.push(DescriptionRecord {
                page_index: index,
                shape: [
                    clone.image_length(index)?,
                    clone.image_width(index)?,
                    clone.samples_per_pixel(index)?,
                ],
                count: entry.count,
                value_offset: location as u32,
                value: description,
            });
        }

        // Swap the label strips, then the identifying descriptions
        clone.replace_strips(label_index, strip_data, target_compression)?;

        let replacements = pseudonym_metadata(&record.pseudo_id);
        for item in &descriptions {
            let rewritten = rewrite_description(&item.value, &replacements);
            clone.replace_description(item.page_index, &rewritten)?;
        }
        drop(clone);

        // Escrow the originals for newly created slides; re-ingested slides
        // already reference blobs holding these exact bytes
        if resolved.created {
            let (meta_name, meta_key) = self.escrow.put_descriptions(&descriptions).await?;
            created_blobs.push(meta_name.clone());
            record.metadata_blob = Some(BlobRef {
                name: meta_name,
                key: meta_key,
            });

            let (label_name, label_key) = self.escrow.put_label(&label_blob).await?;
            created_blobs.push(label_name.clone());
            record.label_blob = Some(BlobRef {
                name: label_name,
                key: label_key,
            });

            self.registry.put_slide(record.clone()).await?;
        } else if !resolved.updates.is_empty() {
            self.registry.update_slide(record, &resolved.updates).await?;
        }

        match context {
            LabelContext::Slide => {}
            LabelContext::Case(case) => {
                self.registry.link_case_slide(&case.id, &record.id).await?;
            }
            LabelContext::Study { patient, .. } => {
                self.registry
                    .link_patient_slide(&patient.id, &record.id)
                    .await?;
            }
        }

        self.registry.commit().await?;
        Ok(())
    }

    async fn stage_case(
        &self,
        resolved: &Resolved<crate::registry::CaseRecord>,
    ) -> Result<(), PseudonymError> {
        if resolved.created {
            self.registry.put_case(resolved.record.clone()).await?;
        } else if !resolved.updates.is_empty() {
            self.registry
                .update_case(&resolved.record, &resolved.updates)
                .await?;
        }
        Ok(())
    }

    async fn stage_study(
        &self,
        resolved: &Resolved<crate::registry::StudyRecord>,
    ) -> Result<(), PseudonymError> {
        if resolved.created {
            self.registry.put_study(resolved.record.clone()).await?;
        } else if !resolved.updates.is_empty() {
            self.registry
                .update_study(&resolved.record, &resolved.updates)
                .await?;
        }
        Ok(())
    }

    async fn stage_patient(
        &self,
        resolved: &Resolved<crate::registry::PatientRecord>,
    ) -> Result<(), PseudonymError> {
        if resolved.created {
            self.registry.put_patient(resolved.record.clone()).await?;
        } else if !resolved.updates.is_empty() {
            self.registry
                .update_patient(&resolved.record, &resolved.updates)
                .await?;
        }
        Ok(())
    }

    // =========================================================================
    // De-pseudonymization
    // =========================================================================

    /// Restore the original slides described by a pseudonymized manifest.
    pub async fn depseudonymize(&self, input: &Manifest) -> Result<Manifest, PseudonymError> {
        let errors = manifest::validate(input);
        if !errors.is_empty() {
            return Err(PseudonymError::InputInvalid(errors));
        }

        match input {
            Manifest::SingleSlide(slide) => {
                let record = self
                    .registry
                    .slide_by_pseudo_id(&slide.id)
                    .await?
                    .ok_or_else(|| RegistryError::UnknownPseudoId {
                        kind: "Slide",
                        pseudo_id: slide.id.clone(),
                    })?;
                let output = self.depseudonymize_slide(slide, &record).await?;
                Ok(Manifest::SingleSlide(output))
            }
            Manifest::Case(case) => {
                let case_record = self
                    .registry
                    .case_by_pseudo_id(&case.id)
                    .await?
                    .ok_or_else(|| RegistryError::UnknownPseudoId {
                        kind: "Case",
                        pseudo_id: case.id.clone(),
                    })?;
                let children = self.registry.slides_of_case(&case_record.id).await?;

                let mut slides = Vec::new();
                for slide in &case.slides {
                    let Some(record) = children.iter().find(|r| r.pseudo_id == slide.id) else {
                        warn!(
                            "No association between Slide[id = {}] and Case[id = {}]",
                            slide.id, case.id
                        );
                        continue;
                    };
                    match self.depseudonymize_slide(slide, record).await {
                        Ok(output) => slides.push(output),
                        Err(e) => warn!("Slide[id = {}]: skipped: {e}", slide.id),
                    }
                }

                Ok(Manifest::Case(CaseManifest {
                    id: case_record.id.clone(),
                    name: case.name.as_ref().map(|_| case_record.name.clone().unwrap_or_default()),
                    created_at: case
                        .created_at
                        .as_ref()
                        .and_then(|_| case_record.created_at.map(|t| t.format())),
                    slides,
                }))
            }
            Manifest::Study(study) => {
                let study_record = self
                    .registry
                    .study_by_pseudo_id(&study.id)
                    .await?
                    .ok_or_else(|| RegistryError::UnknownPseudoId {
                        kind: "Study",
                        pseudo_id: study.id.clone(),
                    })?;
                let known_patients = self.registry.patients_of_study(&study_record.id).await?;

                let mut patients = Vec::new();
                for patient in &study.patients {
                    let Some(patient_record) =
                        known_patients.iter().find(|r| r.pseudo_id == patient.id)
                    else {
                        warn!(
                            "No association between Patient[id = {}] and Study[id = {}]",
                            patient.id, study.id
                        );
                        continue;
                    };
                    let children = self.registry.slides_of_patient(&patient_record.id).await?;

                    let mut slides = Vec::new();
                    for slide in &patient.slides {
                        let Some(record) = children.iter().find(|r| r.pseudo_id == slide.id)
                        else {
                            warn!(
                                "No association between Slide[id = {}] and Patient[id = {}]",
                                slide.id, patient.id
                            );
                            continue;
                        };
                        match self.depseudonymize_slide(slide, record).await {
                            Ok(output) => slides.push(output),
                            Err(e) => warn!("Slide[id = {}]: skipped: {e}", slide.id),
                        }
                    }

                    patients.push(PatientManifest {
                        id: patient_record.id.clone(),
                        name: patient
                            .name
                            .as_ref()
                            .map(|_| patient_record.name.clone().unwrap_or_default()),
                        sex: patient.sex.clone(),
                        age: patient.age.and_then(|_| patient_record.age),
                        slides,
                    });
                }

                Ok(Manifest::Study(StudyManifest {
                    id: study_record.id.clone(),
                    name: study
                        .name
                        .as_ref()
                        .map(|_| study_record.name.clone().unwrap_or_default()),
                    date: study
                        .date
                        .as_ref()
                        .and_then(|_| study_record.date.map(|t| t.format())),
                    patients,
                }))
            }
        }
    }

    /// Restore one slide from its escrowed originals.
    async fn depseudonymize_slide(
        &self,
        slide: &SlideManifest,
        record: &SlideRecord,
    ) -> Result<SlideManifest, PseudonymError> {
        info!("Slide[id = {}]: restoring {}", slide.id, slide.path);

        let label_ref = record.label_blob.as_ref().ok_or_else(|| {
            PseudonymError::Inconsistent(format!(
                "slide {} has no escrowed label reference",
                record.id
            ))
        })?;
        let meta_ref = record.metadata_blob.as_ref().ok_or_else(|| {
            PseudonymError::Inconsistent(format!(
                "slide {} has no escrowed metadata reference",
                record.id
            ))
        })?;

        // Fetch and authenticate the escrowed originals up front
        let label_blob = self.escrow.get_label(&label_ref.name, &label_ref.key).await?;
        let descriptions = self
            .escrow
            .get_descriptions(&meta_ref.name, &meta_ref.key)
            .await?;

        let clone_path = clone_destination(self.config.dest_dir.as_deref(), &slide.path, &record.id);
        tokio::fs::copy(&slide.path, &clone_path).await?;

        if let Err(e) = restore_clone(&clone_path, &label_blob, &descriptions) {
            let _ = tokio::fs::remove_file(&clone_path).await;
            return Err(e);
        }

        info!(
            "Slide[id = {}]: wrote restored clone {}",
            slide.id,
            clone_path.display()
        );
        Ok(SlideManifest {
            id: record.id.clone(),
            path: clone_path.display().to_string(),
            name: slide.name.as_ref().map(|_| record.name.clone().unwrap_or_default()),
            acquired_at: slide
                .acquired_at
                .as_ref()
                .and_then(|_| record.acquired_at.map(|t| t.format())),
            stain: slide.stain.clone(),
            tissue: slide.tissue.clone(),
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Restore descriptions first, then the label strips.
fn restore_clone(
    path: &Path,
    label_blob: &LabelBlob,
    descriptions: &DescriptionBlob,
) -> Result<(), PseudonymError> {
    let mut clone = SlideFile::open_rw(path)?;

    for item in descriptions {
        if item.page_index >= clone.ifd_count() {
            return Err(PseudonymError::Inconsistent(format!(
                "escrowed metadata references IFD {} but the file has {}",
                item.page_index,
                clone.ifd_count()
            )));
        }

        let shape = [
            clone.image_length(item.page_index)?,
            clone.image_width(item.page_index)?,
            clone.samples_per_pixel(item.page_index)?,
        ];
        if shape != item.shape {
            return Err(PseudonymError::Inconsistent(format!(
                "IFD {} shape {:?} does not match the escrowed shape {:?}",
                item.page_index, shape, item.shape
            )));
        }

        clone.restore_description(item.page_index, item.count, item.value_offset, &item.value)?;
    }

    let label_index = clone
        .find_label_ifd()?
        .ok_or_else(|| PseudonymError::NoLabel(path.display().to_string()))?;
    clone.restore_strips(
        label_index,
        &label_blob.data_byte_counts,
        &label_blob.data_offsets,
        label_blob.compression,
        &label_blob.data,
    )?;

    Ok(())
}

/// The slide's entry in the output manifest, mirroring the input fields.
fn pseudonym_output(slide: &SlideManifest, record: &SlideRecord, clone_path: &Path) -> SlideManifest {
    SlideManifest {
        id: record.pseudo_id.clone(),
        path: clone_path.display().to_string(),
        name: slide
            .name
            .as_ref()
            .map(|_| record.pseudo_name.clone().unwrap_or_default()),
        acquired_at: slide
            .acquired_at
            .as_ref()
            .and_then(|_| record.pseudo_acquired_at.map(|t| t.format())),
        stain: slide.stain.clone(),
        tissue: slide.tissue.clone(),
    }
}

/// Destination path for a clone: the configured directory (or the source's
/// directory) with the stem replaced, uniquified with a `_N` suffix.
fn clone_destination(dest_dir: Option<&Path>, source: &str, stem: &str) -> PathBuf {
    let source = Path::new(source);
    let dir = dest_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| source.parent().unwrap_or_else(|| Path::new(".")).to_path_buf());
    let extension = source.extension();

    let with_stem = |stem: &str| {
        let mut path = dir.join(stem);
        if let Some(ext) = extension {
            path.set_extension(ext);
        }
        path
    };

    let mut candidate = with_stem(stem);
    let mut counter = 1;
    while candidate.exists() {
        candidate = with_stem(&format!("{stem}_{counter}"));
        counter += 1;
    }

    candidate
}

// =============================================================================
// Tests
// =============================================================================
