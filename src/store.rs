//! Dataset persistence.
//!
//! The dataset lives in one CSV file per credential, named
//! `<client_id>-activities.csv`. Column layout:
//!
//! | columns | content |
//! |---------|---------|
//! | `id`, `type`, `start_date`, `start_date_local`, `distance`, `elapsed_time` | typed summary fields |
//! | sorted union of extra keys | passthrough fields, dotted names, see [`cell_text`] |
//! | `map.polyline` | encoded path, `no_data`, or empty when not yet fetched |
//!
//! Saves are atomic: the file is written to a temporary sibling and renamed
//! over the old one, so an interrupted run leaves either the previous or the
//! new dataset on disk.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, info};
use serde_json::Value;

use crate::dataset::Dataset;
use crate::error::{Result, SyncError};
use crate::types::{ActivityRecord, ActivitySummary, ExtraFields, POLYLINE_KEY};

const TYPED_COLUMNS: [&str; 6] = [
    "id",
    "type",
    "start_date",
    "start_date_local",
    "distance",
    "elapsed_time",
];

/// Persisted dataset loader/saver.
pub trait DatasetStore {
    /// Previous run's dataset, or `None` if there is none yet.
    fn load(&self) -> Result<Option<Dataset>>;

    fn save(&self, dataset: &Dataset) -> Result<()>;
}

// ============================================================================
// CSV Store
// ============================================================================

pub struct CsvStore {
    path: PathBuf,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for `client_id` inside `dir`.
    pub fn for_client(dir: &Path, client_id: &str) -> Self {
        Self::new(dir.join(format!("{}-activities.csv", client_id)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn err(&self, e: impl std::fmt::Display) -> SyncError {
        SyncError::Persistence {
            path: self.path.display().to_string(),
            message: e.to_string(),
        }
    }
}

impl DatasetStore for CsvStore {
    fn load(&self) -> Result<Option<Dataset>> {
        if !self.path.exists() {
            debug!("[Store] No dataset at {}", self.path.display());
            return Ok(None);
        }
        let start = Instant::now();
        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| self.err(e))?;
        let headers = reader.headers().map_err(|e| self.err(e))?.clone();

        let mut dataset = Dataset::new();
        for (row, result) in reader.records().enumerate() {
            let record = result.map_err(|e| self.err(e))?;
            let parsed = parse_row(&headers, &record, row + 1).map_err(|e| self.err(e))?;
            if !dataset.insert_if_absent(parsed) {
                debug!("[Store] Dropping duplicate id at row {}", row + 1);
            }
        }

        info!(
            "[Store] Loaded {} activities from {} ({:?})",
            dataset.len(),
            self.path.display(),
            start.elapsed()
        );
        Ok(Some(dataset))
    }

    fn save(&self, dataset: &Dataset) -> Result<()> {
        let start = Instant::now();
        let extra_columns: BTreeSet<&str> = dataset
            .iter()
            .flat_map(|r| r.summary.extra.keys().map(String::as_str))
            .collect();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.err(e))?;
        }
        let temp = self.temp_path();
        {
            let mut writer = csv::Writer::from_path(&temp).map_err(|e| self.err(e))?;
            let header: Vec<&str> = TYPED_COLUMNS
                .iter()
                .copied()
                .chain(extra_columns.iter().copied())
                .chain(std::iter::once(POLYLINE_KEY))
                .collect();
            writer.write_record(&header).map_err(|e| self.err(e))?;

            for record in dataset {
                writer
                    .write_record(row_values(record, &extra_columns))
                    .map_err(|e| self.err(e))?;
            }
            writer.flush().map_err(|e| self.err(e))?;
        }
        fs::rename(&temp, &self.path).map_err(|e| self.err(e))?;

        info!(
            "[Store] Saved {} activities to {} ({:?})",
            dataset.len(),
            self.path.display(),
            start.elapsed()
        );
        Ok(())
    }
}

fn row_values(record: &ActivityRecord, extra_columns: &BTreeSet<&str>) -> Vec<String> {
    let summary = &record.summary;
    let mut values = vec![
        summary.id.to_string(),
        summary.activity_type.clone(),
        summary.start_date_string(),
        summary.start_date_local.clone(),
        summary.distance.to_string(),
        summary.elapsed_time.to_string(),
    ];
    values.extend(
        extra_columns
            .iter()
            .map(|key| summary.extra.get(*key).map(cell_text).unwrap_or_default()),
    );
    values.push(record.map_polyline.clone().unwrap_or_default());
    values
}

/// Text for a passthrough cell.
///
/// Non-string values are written as JSON. Strings are written as-is unless
/// they would read back as JSON (`2024`, `true`, `"x"`) or are empty; those
/// are written as a quoted JSON string so the type survives a reload.
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) if s.is_empty() || serde_json::from_str::<Value>(s).is_ok() => {
            Value::String(s.clone()).to_string()
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Inverse of [`cell_text`]. Cells that are not valid JSON are plain strings.
fn cell_value(text: &str) -> Value {
    serde_json::from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn parse_row(
    headers: &csv::StringRecord,
    record: &csv::StringRecord,
    row: usize,
) -> Result<ActivityRecord> {
    let mut fields = ExtraFields::new();
    let mut map_polyline = None;

    for (column, cell) in headers.iter().zip(record.iter()) {
        if cell.is_empty() {
            continue;
        }
        if column == POLYLINE_KEY {
            map_polyline = Some(cell.to_string());
        } else if TYPED_COLUMNS.contains(&column) {
            fields.insert(column.to_string(), Value::String(cell.to_string()));
        } else {
            fields.insert(column.to_string(), cell_value(cell));
        }
    }

    let summary = ActivitySummary::from_fields(fields, &format!("dataset row {}", row))?;
    Ok(ActivityRecord {
        summary,
        map_polyline,
    })
}

// ============================================================================
// In-Memory Store
// ============================================================================

/// Store that keeps the dataset in memory. Used for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    dataset: RefCell<Option<Dataset>>,
    saves: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(dataset: Dataset) -> Self {
        Self {
            dataset: RefCell::new(Some(dataset)),
            saves: Cell::new(0),
        }
    }

    /// Last saved (or seeded) dataset.
    pub fn snapshot(&self) -> Option<Dataset> {
        self.dataset.borrow().clone()
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.get()
    }
}

impl DatasetStore for MemoryStore {
    fn load(&self) -> Result<Option<Dataset>> {
        Ok(self.snapshot())
    }

    fn save(&self, dataset: &Dataset) -> Result<()> {
        *self.dataset.borrow_mut() = Some(dataset.clone());
        self.saves.set(self.saves.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_value() {
        assert_eq!(cell_value("124433"), Value::from(124433));
        assert_eq!(cell_value("true"), Value::Bool(true));
        assert_eq!(cell_value("[47.6,-122.2]"), serde_json::json!([47.6, -122.2]));
        assert_eq!(cell_value("Morning Walk"), Value::String("Morning Walk".into()));
        assert_eq!(cell_value("\"2024\""), Value::String("2024".into()));
        assert_eq!(cell_value("null"), Value::Null);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Value::Null), "null");
        assert_eq!(cell_text(&Value::String("a,b".into())), "a,b");
        assert_eq!(cell_text(&Value::String("1e5".into())), "\"1e5\"");
        assert_eq!(cell_text(&Value::String(String::new())), "\"\"");
        assert_eq!(cell_text(&serde_json::json!([1, 2])), "[1,2]");
    }

    #[test]
    fn test_cells_keep_their_type() {
        let values = [
            Value::String("2024".into()),
            Value::String("null".into()),
            Value::String("\"quoted\"".into()),
            Value::String(String::new()),
            Value::String("Lunch Walk".into()),
            Value::from(2024),
            Value::from(1.5),
            Value::Null,
        ];
        for value in values {
            assert_eq!(cell_value(&cell_text(&value)), value);
        }
    }

    #[test]
    fn test_temp_path_is_sibling() {
        let store = CsvStore::new("/data/124433-activities.csv");
        assert_eq!(
            store.temp_path(),
            PathBuf::from("/data/124433-activities.csv.tmp")
        );
    }

    #[test]
    fn test_for_client() {
        let store = CsvStore::for_client(Path::new("out"), "124433");
        assert_eq!(store.path(), Path::new("out/124433-activities.csv"));
    }
}
