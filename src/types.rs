//! Activity record types.
//!
//! Provider payloads are loosely structured JSON. The handful of fields the
//! sync and render paths depend on are typed; everything else rides along in
//! an [`ExtraFields`] bag, flattened to dotted keys so it maps one-to-one onto
//! a CSV column.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::error::{OptionExt, Result, SyncError};

/// Sentinel stored in `map_polyline` when the provider had no path for an activity.
pub const NO_DATA: &str = "no_data";

/// Opaque passthrough fields keyed by dotted path (e.g. `athlete.id`).
pub type ExtraFields = BTreeMap<String, Value>;

/// Keys lifted out of the JSON payload into typed fields.
const TYPED_KEYS: [&str; 6] = [
    "id",
    "type",
    "start_date",
    "start_date_local",
    "distance",
    "elapsed_time",
];

/// Dotted key of the full-resolution polyline in detail payloads.
pub const POLYLINE_KEY: &str = "map.polyline";

// ============================================================================
// Activity Summary
// ============================================================================

/// One entry from the activity list endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySummary {
    pub id: u64,
    /// Category string, e.g. "Walk", "Ride" (column `type`)
    pub activity_type: String,
    pub start_date: DateTime<Utc>,
    /// Wall-clock start in the athlete's timezone, kept as the provider wrote it
    pub start_date_local: String,
    /// Distance in meters
    pub distance: f64,
    /// Elapsed time in seconds
    pub elapsed_time: u64,
    pub extra: ExtraFields,
}

impl ActivitySummary {
    /// Build a summary from a list-endpoint JSON object.
    pub fn from_json(value: Value) -> Result<Self> {
        let fields = match value {
            Value::Object(map) => flatten_object(map),
            other => {
                return Err(SyncError::malformed(
                    "activity summary",
                    format!("expected object, got {}", json_kind(&other)),
                ))
            }
        };
        Self::from_fields(fields, "activity summary")
    }

    /// Build a summary from flattened fields, consuming the typed keys.
    ///
    /// Remaining keys (except `map.polyline`, which belongs to the record)
    /// become the passthrough bag.
    pub fn from_fields(mut fields: ExtraFields, context: &str) -> Result<Self> {
        let id = fields
            .get("id")
            .and_then(value_as_u64)
            .ok_or_malformed(context, "id")?;
        let context = format!("{} {}", context, id);

        let activity_type = fields
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_malformed(&context, "type")?;
        let start_date = fields
            .get("start_date")
            .and_then(Value::as_str)
            .and_then(parse_utc_timestamp)
            .ok_or_malformed(&context, "start_date")?;
        let start_date_local = fields
            .get("start_date_local")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_malformed(&context, "start_date_local")?;
        let distance = fields
            .get("distance")
            .and_then(value_as_f64)
            .ok_or_malformed(&context, "distance")?;
        let elapsed_time = fields
            .get("elapsed_time")
            .and_then(value_as_u64)
            .ok_or_malformed(&context, "elapsed_time")?;

        for key in TYPED_KEYS {
            fields.remove(key);
        }
        fields.remove(POLYLINE_KEY);

        Ok(Self {
            id,
            activity_type,
            start_date,
            start_date_local,
            distance,
            elapsed_time,
            extra: fields,
        })
    }

    /// `start_date` as Unix seconds.
    pub fn start_epoch(&self) -> i64 {
        self.start_date.timestamp()
    }

    /// `start_date` in the provider's own format (`2024-03-01T07:12:44Z`).
    pub fn start_date_string(&self) -> String {
        self.start_date.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

// ============================================================================
// Activity Detail
// ============================================================================

/// The part of a per-activity detail response that is merged back into the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityDetail {
    pub id: u64,
    /// `map.polyline` as returned; `None` if the provider omitted it
    pub map_polyline: Option<String>,
}

impl ActivityDetail {
    pub fn from_json(value: Value) -> Result<Self> {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Err(SyncError::malformed(
                    "activity detail",
                    format!("expected object, got {}", json_kind(&other)),
                ))
            }
        };
        let id = map
            .get("id")
            .and_then(value_as_u64)
            .ok_or_malformed("activity detail", "id")?;
        let map_polyline = match map.remove("map") {
            Some(Value::Object(mut inner)) => match inner.remove("polyline") {
                Some(Value::String(s)) => Some(s),
                _ => None,
            },
            Some(Value::Null) | None => None,
            Some(other) => {
                return Err(SyncError::malformed(
                    format!("activity detail {}", id),
                    format!("expected 'map' object, got {}", json_kind(&other)),
                ))
            }
        };
        Ok(Self { id, map_polyline })
    }

    /// Polyline value to store: the path itself, or [`NO_DATA`] when the
    /// provider had nothing usable (missing or shorter than 5 characters).
    pub fn resolved_polyline(&self) -> String {
        match &self.map_polyline {
            Some(p) if p.chars().count() >= 5 => p.clone(),
            _ => NO_DATA.to_string(),
        }
    }
}

// ============================================================================
// Activity Record
// ============================================================================

/// A dataset row: a summary plus its (possibly not yet fetched) path.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub summary: ActivitySummary,
    /// Encoded path, [`NO_DATA`], or `None` when detail has not been fetched
    pub map_polyline: Option<String>,
}

impl ActivityRecord {
    pub fn new(summary: ActivitySummary) -> Self {
        Self {
            summary,
            map_polyline: None,
        }
    }

    pub fn with_polyline(summary: ActivitySummary, polyline: impl Into<String>) -> Self {
        Self {
            summary,
            map_polyline: Some(polyline.into()),
        }
    }

    pub fn id(&self) -> u64 {
        self.summary.id
    }

    /// True when `map_polyline` holds a real encoded path (not the sentinel, not empty).
    pub fn has_path(&self) -> bool {
        matches!(&self.map_polyline, Some(p) if !p.is_empty() && p != NO_DATA)
    }
}

impl From<ActivitySummary> for ActivityRecord {
    fn from(summary: ActivitySummary) -> Self {
        Self::new(summary)
    }
}

// ============================================================================
// JSON Helpers
// ============================================================================

/// Flatten nested objects into dotted keys. Arrays and scalars are kept as-is.
pub fn flatten_object(map: Map<String, Value>) -> ExtraFields {
    let mut out = ExtraFields::new();
    flatten_into(&mut out, None, map);
    out
}

fn flatten_into(out: &mut ExtraFields, prefix: Option<&str>, map: Map<String, Value>) {
    for (key, value) in map {
        let key = match prefix {
            Some(p) => format!("{}.{}", p, key),
            None => key,
        };
        match value {
            Value::Object(inner) => flatten_into(out, Some(&key), inner),
            other => {
                out.insert(key, other);
            }
        }
    }
}

/// Parse a UTC timestamp as written by the provider (`...Z`) or any RFC 3339 offset.
pub fn parse_utc_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(integral_u64)),
        // Spreadsheet tools like to write integers as "600.0"
        Value::String(s) => {
            let s = s.trim();
            s.parse()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral_u64))
        }
        _ => None,
    }
}

fn integral_u64(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0).then_some(f as u64)
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn summary_json() -> Value {
        json!({
            "id": 9001,
            "name": "Morning Walk",
            "type": "Walk",
            "start_date": "2023-04-02T15:04:05Z",
            "start_date_local": "2023-04-02T08:04:05Z",
            "distance": 3210.5,
            "elapsed_time": 2400,
            "athlete": { "id": 124433, "resource_state": 1 },
            "map": { "id": "a9001", "summary_polyline": "abc", "resource_state": 2 },
            "start_latlng": [47.6, -122.2]
        })
    }

    #[test]
    fn test_summary_typed_fields() {
        let summary = ActivitySummary::from_json(summary_json()).unwrap();
        assert_eq!(summary.id, 9001);
        assert_eq!(summary.activity_type, "Walk");
        assert_eq!(summary.start_date_string(), "2023-04-02T15:04:05Z");
        assert_eq!(summary.start_date_local, "2023-04-02T08:04:05Z");
        assert_eq!(summary.distance, 3210.5);
        assert_eq!(summary.elapsed_time, 2400);
    }

    #[test]
    fn test_summary_extra_fields_flattened() {
        let summary = ActivitySummary::from_json(summary_json()).unwrap();
        assert_eq!(summary.extra.get("name"), Some(&json!("Morning Walk")));
        assert_eq!(summary.extra.get("athlete.id"), Some(&json!(124433)));
        assert_eq!(summary.extra.get("map.summary_polyline"), Some(&json!("abc")));
        assert_eq!(summary.extra.get("start_latlng"), Some(&json!([47.6, -122.2])));
        assert!(!summary.extra.contains_key("id"));
        assert!(!summary.extra.contains_key("type"));
    }

    #[test]
    fn test_summary_missing_field_is_malformed() {
        let mut value = summary_json();
        value.as_object_mut().unwrap().remove("start_date");
        let err = ActivitySummary::from_json(value).unwrap_err();
        assert!(matches!(err, SyncError::MalformedResponse { .. }));
        assert!(err.to_string().contains("start_date"));
    }

    #[test]
    fn test_detail_polyline() {
        let detail =
            ActivityDetail::from_json(json!({"id": 5, "map": {"polyline": "_p~iF~ps|U"}})).unwrap();
        assert_eq!(detail.id, 5);
        assert_eq!(detail.resolved_polyline(), "_p~iF~ps|U");

        let empty = ActivityDetail::from_json(json!({"id": 6, "map": {"polyline": ""}})).unwrap();
        assert_eq!(empty.resolved_polyline(), NO_DATA);

        let short = ActivityDetail::from_json(json!({"id": 7, "map": {"polyline": "ab"}})).unwrap();
        assert_eq!(short.resolved_polyline(), NO_DATA);

        let missing = ActivityDetail::from_json(json!({"id": 8})).unwrap();
        assert_eq!(missing.map_polyline, None);
        assert_eq!(missing.resolved_polyline(), NO_DATA);
    }

    #[test]
    fn test_detail_without_id_is_malformed() {
        let err = ActivityDetail::from_json(json!({"map": {"polyline": "abcdef"}})).unwrap_err();
        assert!(matches!(err, SyncError::MalformedResponse { .. }));
    }

    #[test]
    fn test_has_path() {
        let summary = ActivitySummary::from_json(summary_json()).unwrap();
        assert!(!ActivityRecord::new(summary.clone()).has_path());
        assert!(!ActivityRecord::with_polyline(summary.clone(), NO_DATA).has_path());
        assert!(ActivityRecord::with_polyline(summary, "_p~iF~ps|U").has_path());
    }
}
