//! Pseudonym material generation.
//!
//! Synthetic replacements for identifying values: random person names,
//! randomized ages, and timestamps shifted into `[original − gap, now]`.
//! One gap year is drawn per invocation and applied to every timestamp
//! pseudonym generated in that invocation.

use chrono::{Datelike, Days, Duration, Local, NaiveDate};
use fake::faker::name::en::Name;
use fake::Fake;
use rand::Rng;

use crate::config::{GAP_YEAR_RANGE, PSEUDO_AGE_RANGE, TIMESTAMP_DRAW_ATTEMPTS};
use crate::error::PseudonymError;
use crate::registry::TimeStamp;

// =============================================================================
// Simple draws
// =============================================================================

/// Draw the per-invocation gap year.
pub fn draw_gap_year() -> i32 {
    rand::thread_rng().gen_range(GAP_YEAR_RANGE.0..=GAP_YEAR_RANGE.1)
}

/// A synthetic full person name.
pub fn pseudo_person_name() -> String {
    Name().fake()
}

/// A randomized pseudonymous age.
pub fn pseudo_age() -> u32 {
    rand::thread_rng().gen_range(PSEUDO_AGE_RANGE.0..=PSEUDO_AGE_RANGE.1)
}

// =============================================================================
// Timestamp pseudonyms
// =============================================================================

/// Generate a pseudonymous timestamp in `[original − gap_year, now]` that
/// differs from the original.
///
/// Dates stay dates and datetimes stay datetimes. The draw is retried a
/// bounded number of times when it lands exactly on the original; running
/// out of retries surfaces an inconsistency instead of spinning.
pub fn pseudo_timestamp(
    original: TimeStamp,
    gap_year: i32,
) -> Result<TimeStamp, PseudonymError> {
    let mut rng = rand::thread_rng();

    for _ in 0..TIMESTAMP_DRAW_ATTEMPTS {
        let candidate = match original {
            TimeStamp::Date(date) => {
                let start = shift_back_years(date, gap_year);
                let end = Local::now().date_naive();
                let span_days = (end - start).num_days().max(0);
                TimeStamp::Date(
                    start
                        .checked_add_days(Days::new(rng.gen_range(0..=span_days) as u64))
                        .unwrap_or(start),
                )
            }
            TimeStamp::DateTime(datetime) => {
                let start_date = shift_back_years(datetime.date(), gap_year);
                let start = start_date.and_time(datetime.time());
                let end = Local::now().naive_local();
                let span_seconds = (end - start).num_seconds().max(0);
                // Datetimes stay datetimes even when the draw lands on
                // midnight
                TimeStamp::DateTime(start + Duration::seconds(rng.gen_range(0..=span_seconds)))
            }
        };

        if candidate != original {
            return Ok(candidate);
        }
    }

    Err(PseudonymError::Inconsistent(format!(
        "could not draw a timestamp differing from {} in {} attempts",
        original.format(),
        TIMESTAMP_DRAW_ATTEMPTS
    )))
}

/// Move a date back by whole years, clamping Feb 29 into non-leap years.
fn shift_back_years(date: NaiveDate, years: i32) -> NaiveDate {
    date.with_year(date.year() - years)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(date.year() - years, 3, 1).unwrap_or(date))
}

// =============================================================================
// Tests
// =============================================================================
