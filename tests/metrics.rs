//! Derived metrics tests.

mod common;

use activity_maps::{derive_all, DerivedRecord};
use common::{record, summary};

#[test]
fn test_mile_in_ten_minutes() {
    let rec = record(1, None);
    let derived = DerivedRecord::from_record(&rec);

    assert!((derived.distance_miles - 1.0).abs() < 1e-4);
    assert_eq!(derived.elapsed_minutes, 10.0);
    assert!((derived.speed_mph.unwrap() - 6.0).abs() < 1e-3);
    assert!((derived.pace_min_per_mile.unwrap() - 10.0).abs() < 1e-3);
}

#[test]
fn test_zero_elapsed_has_no_speed() {
    let mut rec = record(1, None);
    rec.summary.elapsed_time = 0;
    let derived = DerivedRecord::from_record(&rec);
    assert_eq!(derived.speed_mph, None);
    assert_eq!(derived.pace_min_per_mile, Some(0.0));
}

#[test]
fn test_zero_distance_has_no_pace() {
    let mut rec = record(1, None);
    rec.summary.distance = 0.0;
    let derived = DerivedRecord::from_record(&rec);
    assert_eq!(derived.pace_min_per_mile, None);
    assert_eq!(derived.speed_mph, Some(0.0));
}

#[test]
fn test_calendar_from_local_start() {
    let mut rec = record(1, None);
    // Bucketed by the local wall clock, not the UTC start
    rec.summary.start_date_local = "2022-12-31T18:00:00Z".to_string();
    let derived = DerivedRecord::from_record(&rec);
    let calendar = derived.calendar.unwrap();
    assert_eq!(calendar.year, 2022);
    assert_eq!(calendar.month, "December");
    assert_eq!(calendar.day_of_year, 365);
}

#[test]
fn test_unparseable_local_start() {
    let mut rec = record(1, None);
    rec.summary.start_date_local = "not a date".to_string();
    assert_eq!(DerivedRecord::from_record(&rec).year(), None);
}

#[test]
fn test_derive_all_keeps_order() {
    let records = vec![
        activity_maps::ActivityRecord::new(summary(2, "Ride", 40)),
        activity_maps::ActivityRecord::new(summary(1, "Walk", 0)),
    ];
    let derived = derive_all(&records);
    assert_eq!(derived.len(), 2);
    assert_eq!(derived[0].activity_type(), "Ride");
    assert_eq!(derived[0].calendar.as_ref().unwrap().month, "February");
    assert_eq!(derived[1].calendar.as_ref().unwrap().day_of_year, 1);
}
