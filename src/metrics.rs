//! Derived per-activity metrics: miles, minutes, speed, pace, calendar buckets.
//!
//! All values are recomputed from the stored raw fields on every render run.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

use crate::types::ActivityRecord;

/// Meters to statute miles.
pub const METERS_TO_MILES: f64 = 0.000621371;

/// Calendar position of an activity in the athlete's local time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarBucket {
    pub year: i32,
    /// English month name, e.g. "March"
    pub month: String,
    /// 1-based
    pub day_of_year: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedRecord<'a> {
    pub record: &'a ActivityRecord,
    pub distance_miles: f64,
    pub elapsed_minutes: f64,
    /// `None` when elapsed time is zero
    pub speed_mph: Option<f64>,
    /// Minutes per mile; `None` when distance is zero
    pub pace_min_per_mile: Option<f64>,
    /// `None` when `start_date_local` cannot be parsed
    pub calendar: Option<CalendarBucket>,
}

impl<'a> DerivedRecord<'a> {
    pub fn from_record(record: &'a ActivityRecord) -> Self {
        let summary = &record.summary;
        let distance_miles = summary.distance * METERS_TO_MILES;
        let elapsed_minutes = summary.elapsed_time as f64 / 60.0;

        let speed_mph = (elapsed_minutes > 0.0).then(|| distance_miles / (elapsed_minutes / 60.0));
        let pace_min_per_mile = (distance_miles > 0.0).then(|| elapsed_minutes / distance_miles);

        Self {
            record,
            distance_miles,
            elapsed_minutes,
            speed_mph,
            pace_min_per_mile,
            calendar: parse_local_date(&summary.start_date_local).map(calendar_bucket),
        }
    }

    pub fn activity_type(&self) -> &str {
        &self.record.summary.activity_type
    }

    pub fn year(&self) -> Option<i32> {
        self.calendar.as_ref().map(|c| c.year)
    }
}

/// Derive metrics for every record, in order.
pub fn derive_all<'a>(records: impl IntoIterator<Item = &'a ActivityRecord>) -> Vec<DerivedRecord<'a>> {
    records.into_iter().map(DerivedRecord::from_record).collect()
}

/// Parse a local start time as a calendar date.
///
/// The provider writes local times with a misleading `Z` suffix; the offset
/// is ignored and the wall-clock date kept.
pub fn parse_local_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local().date());
    }
    const FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];
    let trimmed = s.trim_end_matches('Z');
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok())
}

fn calendar_bucket(date: NaiveDate) -> CalendarBucket {
    CalendarBucket {
        year: date.year(),
        month: date.format("%B").to_string(),
        day_of_year: date.ordinal(),
    }
}
