//! Identity registry record types.
//!
//! Each entity kind keeps its real fields next to their pseudonymous twins.
//! The invariants the registry maintains:
//!
//! - `(id, pseudo_id)` is 1:1 and `pseudo_id` is unique per kind
//! - once stored, `id → pseudo_id` never changes; re-ingestion reuses it
//! - real-side fields may be enriched or corrected later without touching
//!   the pseudonymous ID

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::config::{DATETIME_FORMAT, DATE_FORMAT};

// =============================================================================
// TimeStamp
// =============================================================================

/// A date or datetime value.
///
/// A parsed value with a zero time-of-day is treated as a plain date; this
/// drives both pseudonym generation (date-level vs datetime-level
/// randomization) and output formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeStamp {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// Input formats accepted for datetime values.
const DATETIME_INPUT_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    DATETIME_FORMAT,
];

/// Input formats accepted for date values.
const DATE_INPUT_FORMATS: &[&str] = &["%Y-%m-%d", DATE_FORMAT, "%d/%m/%Y"];

impl TimeStamp {
    /// Parse an ISO-like free-form timestamp string.
    pub fn parse(text: &str) -> Option<TimeStamp> {
        let text = text.trim();

        for format in DATETIME_INPUT_FORMATS {
            if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
                return Some(TimeStamp::from_datetime(datetime));
            }
        }

        for format in DATE_INPUT_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(text, format) {
                return Some(TimeStamp::Date(date));
            }
        }

        None
    }

    /// Classify a datetime: midnight collapses to a plain date.
    pub fn from_datetime(datetime: NaiveDateTime) -> TimeStamp {
        let time = datetime.time();
        if time.hour() + time.minute() + time.second() == 0 {
            TimeStamp::Date(datetime.date())
        } else {
            TimeStamp::DateTime(datetime)
        }
    }

    /// The date component.
    pub fn date(&self) -> NaiveDate {
        match self {
            TimeStamp::Date(date) => *date,
            TimeStamp::DateTime(datetime) => datetime.date(),
        }
    }

    /// The year component.
    pub fn year(&self) -> i32 {
        use chrono::Datelike;
        self.date().year()
    }

    /// Format for emission: `%d.%m.%Y` for dates, `%I:%M%p %d.%m.%Y` for
    /// datetimes.
    pub fn format(&self) -> String {
        match self {
            TimeStamp::Date(date) => date.format(DATE_FORMAT).to_string(),
            TimeStamp::DateTime(datetime) => datetime.format(DATETIME_FORMAT).to_string(),
        }
    }
}

// =============================================================================
// Sex
// =============================================================================

/// Patient sex as carried in manifests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Female,
    Male,
    #[default]
    Unknown,
}

impl Sex {
    /// Parse the manifest representation; anything unrecognized is Unknown.
    pub fn parse(text: &str) -> Sex {
        match text.to_lowercase().as_str() {
            "female" => Sex::Female,
            "male" => Sex::Male,
            _ => Sex::Unknown,
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// Escrow blob reference: file name in the store plus the per-blob key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub name: String,
    pub key: String,
}

/// A slide (WSI) and its pseudonymous twin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideRecord {
    pub id: String,
    pub name: Option<String>,
    pub acquired_at: Option<TimeStamp>,
    pub stain: Option<String>,
    pub tissue: Option<String>,
    pub pseudo_id: String,
    pub pseudo_name: Option<String>,
    pub pseudo_acquired_at: Option<TimeStamp>,

    /// Escrow reference of the original label strips
    pub label_blob: Option<BlobRef>,

    /// Escrow reference of the original descriptions
    pub metadata_blob: Option<BlobRef>,
}

impl SlideRecord {
    /// A fresh record carrying only identity.
    pub fn new(id: impl Into<String>, pseudo_id: impl Into<String>) -> Self {
        SlideRecord {
            id: id.into(),
            name: None,
            acquired_at: None,
            stain: None,
            tissue: None,
            pseudo_id: pseudo_id.into(),
            pseudo_name: None,
            pseudo_acquired_at: None,
            label_blob: None,
            metadata_blob: None,
        }
    }

    /// Copy the named fields from `incoming` into this record.
    pub fn apply_fields(&mut self, incoming: &SlideRecord, fields: &[String]) {
        for field in fields {
            match field.as_str() {
                "name" => self.name = incoming.name.clone(),
                "pseudo_name" => self.pseudo_name = incoming.pseudo_name.clone(),
                "acquired_at" => self.acquired_at = incoming.acquired_at,
                "pseudo_acquired_at" => self.pseudo_acquired_at = incoming.pseudo_acquired_at,
                "stain" => self.stain = incoming.stain.clone(),
                "tissue" => self.tissue = incoming.tissue.clone(),
                "label_blob" => self.label_blob = incoming.label_blob.clone(),
                "metadata_blob" => self.metadata_blob = incoming.metadata_blob.clone(),
                _ => {}
            }
        }
    }
}

/// A patient and their pseudonymous twin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: String,
    pub name: Option<String>,
    pub sex: Sex,
    pub age: Option<u32>,
    pub pseudo_id: String,
    pub pseudo_name: Option<String>,
    pub pseudo_age: Option<u32>,
}

impl PatientRecord {
    pub fn new(id: impl Into<String>, pseudo_id: impl Into<String>) -> Self {
        PatientRecord {
            id: id.into(),
            name: None,
            sex: Sex::Unknown,
            age: None,
            pseudo_id: pseudo_id.into(),
            pseudo_name: None,
            pseudo_age: None,
        }
    }

    pub fn apply_fields(&mut self, incoming: &PatientRecord, fields: &[String]) {
        for field in fields {
            match field.as_str() {
                "name" => self.name = incoming.name.clone(),
                "pseudo_name" => self.pseudo_name = incoming.pseudo_name.clone(),
                "sex" => self.sex = incoming.sex,
                "age" => self.age = incoming.age,
                "pseudo_age" => self.pseudo_age = incoming.pseudo_age,
                _ => {}
            }
        }
    }
}

/// A case and its pseudonymous twin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: String,
    pub name: Option<String>,
    pub created_at: Option<TimeStamp>,
    pub pseudo_id: String,
    pub pseudo_name: Option<String>,
    pub pseudo_created_at: Option<TimeStamp>,
}

impl CaseRecord {
    pub fn new(id: impl Into<String>, pseudo_id: impl Into<String>) -> Self {
        CaseRecord {
            id: id.into(),
            name: None,
            created_at: None,
            pseudo_id: pseudo_id.into(),
            pseudo_name: None,
            pseudo_created_at: None,
        }
    }

    pub fn apply_fields(&mut self, incoming: &CaseRecord, fields: &[String]) {
        for field in fields {
            match field.as_str() {
                "name" => self.name = incoming.name.clone(),
                "pseudo_name" => self.pseudo_name = incoming.pseudo_name.clone(),
                "created_at" => self.created_at = incoming.created_at,
                "pseudo_created_at" => self.pseudo_created_at = incoming.pseudo_created_at,
                _ => {}
            }
        }
    }
}

/// A study and its pseudonymous twin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRecord {
    pub id: String,
    pub name: Option<String>,
    pub date: Option<TimeStamp>,
    pub pseudo_id: String,
    pub pseudo_name: Option<String>,
    pub pseudo_date: Option<TimeStamp>,
}

impl StudyRecord {
    pub fn new(id: impl Into<String>, pseudo_id: impl Into<String>) -> Self {
        StudyRecord {
            id: id.into(),
            name: None,
            date: None,
            pseudo_id: pseudo_id.into(),
            pseudo_name: None,
            pseudo_date: None,
        }
    }

    pub fn apply_fields(&mut self, incoming: &StudyRecord, fields: &[String]) {
        for field in fields {
            match field.as_str() {
                "name" => self.name = incoming.name.clone(),
                "pseudo_name" => self.pseudo_name = incoming.pseudo_name.clone(),
                "date" => self.date = incoming.date,
                "pseudo_date" => self.pseudo_date = incoming.pseudo_date,
                _ => {}
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
