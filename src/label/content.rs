//! Slide label content.
//!
//! Builds the pseudonym-label schema for a slide, mirroring the
//! informational layout of a real glass-slide label: context rows (case or
//! study/patient), the slide pseudonym in a display face, staining
//! metadata, a PDF417 barcode and the acquisition datetime. Rows whose
//! real value is absent are omitted.

use crate::error::LabelError;
use crate::registry::{CaseRecord, PatientRecord, SlideRecord, StudyRecord};

use super::barcode::Symbology;
use super::schema::{Field, FieldAlign, FontFace, Padding, Schema};

// =============================================================================
// Constants
// =============================================================================

/// Font size of context rows (case/study/patient identifiers).
const CONTEXT_FONT_SIZE: f32 = 10.0;

/// Font size of slide rows (pseudo ID, name, stain, tissue).
const SLIDE_FONT_SIZE: f32 = 18.0;

/// Font size of the acquisition datetime row.
const DATE_FONT_SIZE: f32 = 15.0;

/// Pixel width of the slide barcode.
const SLIDE_CODE_SIZE: u32 = 250;

/// Aspect ratio below which the squarer label padding is used.
const SQUARE_RATIO_THRESHOLD: f64 = 1.5;

// =============================================================================
// LabelContext
// =============================================================================

/// The manifest context a slide label is rendered in.
#[derive(Debug, Clone, Copy)]
pub enum LabelContext<'a> {
    /// Single-slide manifest: no context rows
    Slide,

    /// Case manifest: case pseudonym rows
    Case(&'a CaseRecord),

    /// Study manifest: study and patient pseudonym rows
    Study {
        study: &'a StudyRecord,
        patient: &'a PatientRecord,
    },
}

// =============================================================================
// Schema construction
// =============================================================================

/// Barcode payload: `"[year-]pseudo_id[-stain][-tissue]"`, optional
/// segments omitted when their source field is absent.
pub fn barcode_payload(slide: &SlideRecord) -> String {
    let mut value = slide.pseudo_id.clone();

    if slide.acquired_at.is_some() {
        if let Some(pseudo_acquired_at) = slide.pseudo_acquired_at {
            value = format!("{}-{}", pseudo_acquired_at.year(), value);
        }
    }
    if let Some(ref stain) = slide.stain {
        value = format!("{value}-{stain}");
    }
    if let Some(ref tissue) = slide.tissue {
        value = format!("{value}-{tissue}");
    }

    value
}

/// Build the pseudonym-label schema for a slide.
///
/// The outer padding is chosen from the original label's aspect ratio:
/// wide labels get a slim top margin, squarer labels a thicker one.
pub fn slide_label_schema(
    slide: &SlideRecord,
    context: LabelContext<'_>,
    label_width: u32,
    label_height: u32,
) -> Result<Schema, LabelError> {
    let mut rows: Vec<Field> = Vec::new();

    match context {
        LabelContext::Slide => {}
        LabelContext::Case(case) => {
            rows.push(
                Field::text(&case.pseudo_id, 0, 0).with_font(FontFace::Regular, CONTEXT_FONT_SIZE),
            );
            if case.name.is_some() {
                if let Some(ref pseudo_name) = case.pseudo_name {
                    rows.push(
                        Field::text(pseudo_name, 0, 0)
                            .with_font(FontFace::Regular, CONTEXT_FONT_SIZE),
                    );
                }
            }
        }
        LabelContext::Study { study, patient } => {
            rows.push(
                Field::text(&study.pseudo_id, 0, 0)
                    .with_font(FontFace::Regular, CONTEXT_FONT_SIZE),
            );
            if study.name.is_some() {
                if let Some(ref pseudo_name) = study.pseudo_name {
                    rows.push(
                        Field::text(pseudo_name, 0, 0)
                            .with_font(FontFace::Regular, CONTEXT_FONT_SIZE),
                    );
                }
            }
            rows.push(
                Field::text(&patient.pseudo_id, 0, 0)
                    .with_font(FontFace::Regular, CONTEXT_FONT_SIZE),
            );
        }
    }

    rows.push(
        Field::text(&slide.pseudo_id, 0, 0).with_font(FontFace::Display, SLIDE_FONT_SIZE),
    );

    if slide.name.is_some() {
        if let Some(ref pseudo_name) = slide.pseudo_name {
            rows.push(
                Field::text(pseudo_name, 0, 0).with_font(FontFace::Regular, SLIDE_FONT_SIZE),
            );
        }
    }
    if let Some(ref stain) = slide.stain {
        rows.push(Field::text(stain, 0, 0).with_font(FontFace::Regular, SLIDE_FONT_SIZE));
    }
    if let Some(ref tissue) = slide.tissue {
        rows.push(Field::text(tissue, 0, 0).with_font(FontFace::Regular, SLIDE_FONT_SIZE));
    }

    rows.push(
        Field::barcode(Symbology::Pdf417, barcode_payload(slide), 0, 0)
            .with_code_size(SLIDE_CODE_SIZE)
            .with_align(FieldAlign::Center),
    );

    if slide.acquired_at.is_some() {
        if let Some(pseudo_acquired_at) = slide.pseudo_acquired_at {
            rows.push(
                Field::text(pseudo_acquired_at.format(), 0, 0)
                    .with_font(FontFace::Regular, DATE_FONT_SIZE),
            );
        }
    }

    let ratio = label_width as f64 / label_height.max(1) as f64;
    let padding = if ratio < SQUARE_RATIO_THRESHOLD {
        Padding::new(5, 10, 15, 10)
    } else {
        Padding::new(0, 15, 10, 15)
    };

    let mut schema = Schema::new(1, rows.len()).with_padding(padding);
    for (row, field) in rows.into_iter().enumerate() {
        let mut field = field;
        field.row = row;
        schema.add(field)?;
    }

    Ok(schema)
}

// =============================================================================
// Tests
// =============================================================================
