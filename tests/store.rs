//! CSV dataset persistence tests.

mod common;

use std::fs;

use activity_maps::{CsvStore, Dataset, DatasetStore, SyncError, NO_DATA};
use common::{record, walk, REFERENCE_POLYLINE};
use serde_json::json;
use tempfile::TempDir;

fn sample_dataset() -> Dataset {
    let mut with_extra = walk(1);
    with_extra.extra.insert("name".to_string(), json!("Lunch, with friends"));
    with_extra.extra.insert("athlete.id".to_string(), json!(124433));
    with_extra.extra.insert("start_latlng".to_string(), json!([47.6, -122.2]));
    with_extra.extra.insert("commute".to_string(), json!(false));

    let mut ride = walk(2);
    ride.activity_type = "Ride".to_string();
    ride.distance = 25000.5;

    Dataset::from_records(vec![
        activity_maps::ActivityRecord::with_polyline(with_extra, REFERENCE_POLYLINE),
        activity_maps::ActivityRecord::with_polyline(ride, NO_DATA),
        record(3, None),
    ])
}

#[test]
fn test_missing_file_loads_none() {
    let tmp = TempDir::new().unwrap();
    let store = CsvStore::for_client(tmp.path(), "124433");
    assert!(store.load().unwrap().is_none());
}

#[test]
fn test_save_and_reload() {
    let tmp = TempDir::new().unwrap();
    let store = CsvStore::for_client(tmp.path(), "124433");
    let dataset = sample_dataset();

    store.save(&dataset).unwrap();
    assert!(tmp.path().join("124433-activities.csv").exists());
    assert!(!tmp.path().join("124433-activities.csv.tmp").exists());

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded, dataset);
    assert_eq!(loaded.ids(), vec![1, 2, 3]);
    assert_eq!(loaded.get(2).unwrap().map_polyline.as_deref(), Some(NO_DATA));
    assert_eq!(loaded.get(3).unwrap().map_polyline, None);
}

#[test]
fn test_passthrough_strings_stay_strings() {
    let tmp = TempDir::new().unwrap();
    let store = CsvStore::for_client(tmp.path(), "1");

    let mut summary = walk(1);
    for (key, value) in [
        ("name", json!("2024")),
        ("external_id", json!("1e5")),
        ("device_name", json!("true")),
        ("description", json!("")),
        ("gear_id", json!(null)),
        ("location_city", json!("null")),
        ("private_note", json!("\"quoted\"")),
        ("upload_id", json!(100000)),
    ] {
        summary.extra.insert(key.to_string(), value);
    }
    let dataset = Dataset::from_records(vec![activity_maps::ActivityRecord::new(summary)]);

    store.save(&dataset).unwrap();
    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded, dataset);

    // A second save writes the same bytes
    let first = fs::read_to_string(store.path()).unwrap();
    store.save(&loaded).unwrap();
    assert_eq!(fs::read_to_string(store.path()).unwrap(), first);
}

#[test]
fn test_header_layout() {
    let tmp = TempDir::new().unwrap();
    let store = CsvStore::for_client(tmp.path(), "1");
    store.save(&sample_dataset()).unwrap();

    let contents = fs::read_to_string(store.path()).unwrap();
    let header = contents.lines().next().unwrap();
    assert_eq!(
        header,
        "id,type,start_date,start_date_local,distance,elapsed_time,athlete.id,commute,name,start_latlng,map.polyline"
    );
}

#[test]
fn test_save_replaces_previous_file() {
    let tmp = TempDir::new().unwrap();
    let store = CsvStore::for_client(tmp.path(), "1");
    store.save(&sample_dataset()).unwrap();
    store
        .save(&Dataset::from_records(vec![record(9, Some(REFERENCE_POLYLINE))]))
        .unwrap();

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded.ids(), vec![9]);
}

#[test]
fn test_loads_spreadsheet_style_numbers() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("1-activities.csv");
    fs::write(
        &path,
        "id,type,start_date,start_date_local,distance,elapsed_time,map.polyline\n\
         42.0,Walk,2021-05-01T15:00:00Z,2021-05-01T08:00:00Z,1609.34,600.0,\n",
    )
    .unwrap();

    let loaded = CsvStore::new(&path).load().unwrap().unwrap();
    let record = loaded.get(42).unwrap();
    assert_eq!(record.summary.elapsed_time, 600);
    assert_eq!(record.map_polyline, None);
}

#[test]
fn test_malformed_row_is_persistence_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("1-activities.csv");
    fs::write(
        &path,
        "id,type,start_date,start_date_local,distance,elapsed_time\n\
         abc,Walk,2021-05-01T15:00:00Z,2021-05-01T08:00:00Z,1609.34,600\n",
    )
    .unwrap();

    let result = CsvStore::new(&path).load();
    match result {
        Err(SyncError::Persistence { message, .. }) => assert!(message.contains("id")),
        other => panic!("unexpected: {:?}", other),
    }
}
