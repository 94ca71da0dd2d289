//! Behaviour of the filter builder over a typed scheduling frame

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use pretty_assertions::assert_eq;
use resplan::core::{Lovs, MONTHS, Schedule, ScheduleRecord};
use resplan::filter::{ColumnKind, FilterBuilder, FilterCondition, FilterControl, FilterSettings, FilterSpec};

const STATUSES: [&str; 4] = ["Planned", "In Progress", "On Hold", "Closed"];

fn actual_fte(i: usize) -> Option<i64> {
    if i == 0 { None } else { Some(((i * 7) % 41) as i64) }
}

fn create_test_schedule() -> Schedule {
    let base = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    let records = (0..100usize)
        .map(|i| ScheduleRecord {
            project_descr: Some(format!("Project {}", i % 30)),
            client: Some(format!("Client {:03}", i)),
            user: Some(format!("User {}", i % 5)),
            status: Some(STATUSES[i % 4].to_string()),
            actual_fte: actual_fte(i),
            year: Some(2025),
            start_date: Some(base + Duration::days(i as i64)),
            months: [Some(i as i64 % 3); 12],
            ..Default::default()
        })
        .collect();
    Schedule::new(records, Lovs::default())
}

fn months() -> Vec<String> {
    MONTHS.iter().map(|m| m.to_string()).collect()
}

fn set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn setup() -> (DataFrame, FilterBuilder) {
    let df = create_test_schedule().to_dataframe().unwrap();
    let builder = FilterBuilder::excluding(&df, FilterSettings::default(), months()).unwrap();
    (df, builder)
}

#[test]
fn test_columns_are_classified() {
    let (_, builder) = setup();
    let status = builder.profile("STATUS").unwrap();
    assert_eq!(status.kind, ColumnKind::Categorical);
    assert_eq!(
        status.control,
        FilterControl::ValueSet {
            options: vec!["Closed".into(), "In Progress".into(), "On Hold".into(), "Planned".into()],
            has_missing: false,
        }
    );
    assert_eq!(
        builder.profile("ACTUAL_FTE").unwrap().control,
        FilterControl::NumericRange { min: 0.0, max: 40.0 }
    );
    assert_eq!(builder.profile("START_DATE").unwrap().kind, ColumnKind::Temporal);
    assert_eq!(builder.profile("CLIENT").unwrap().kind, ColumnKind::Text);
    assert!(builder.profile("GEN").is_none());
}

#[test]
fn test_full_extent_range_keeps_missing_but_narrower_range_drops_it() {
    let (df, builder) = setup();
    assert_eq!(actual_fte(0), None);

    let mut spec = FilterSpec::default();
    spec.set("ACTUAL_FTE", FilterCondition::Between { min: 0.0, max: 40.0 });
    let view = builder.apply(&df, &spec).unwrap();
    assert_eq!(view.rows, (0..100).collect::<Vec<_>>());

    spec.set("ACTUAL_FTE", FilterCondition::Between { min: 0.0, max: 39.0 });
    let view = builder.apply(&df, &spec).unwrap();
    let expected: Vec<usize> = (0..100)
        .filter(|i| actual_fte(*i).is_some_and(|v| v <= 39))
        .collect();
    assert_eq!(view.rows, expected);
    assert!(!view.rows.contains(&0));
}

#[test]
fn test_constant_column_still_filters_when_it_is_not_categorical() {
    let df = create_test_schedule().to_dataframe().unwrap();
    let settings = FilterSettings { categorical_threshold: 1, ..Default::default() };
    let builder = FilterBuilder::excluding(&df, settings, months()).unwrap();
    assert_eq!(builder.profile("YEAR").unwrap().control, FilterControl::Fixed { value: Some("2025".into()) });

    let mut spec = FilterSpec::default();
    spec.set("YEAR", FilterCondition::Between { min: 2026.0, max: 2030.0 });
    assert!(builder.apply(&df, &spec).unwrap().is_empty());

    spec.set("YEAR", FilterCondition::Contains { pattern: "1999".into(), regex: false });
    assert!(builder.apply(&df, &spec).unwrap().is_empty());

    spec.set("YEAR", FilterCondition::Between { min: 2020.0, max: 2030.0 });
    assert_eq!(builder.apply(&df, &spec).unwrap().len(), 100);
}

#[test]
fn test_default_spec_is_identity() {
    let (df, builder) = setup();
    let view = builder.apply(&df, &builder.default_spec()).unwrap();
    assert_eq!(view.rows, (0..100).collect::<Vec<_>>());
    assert!(view.frame.equals_missing(&df));
}

#[test]
fn test_deselecting_a_status_removes_exactly_its_rows() {
    let (df, builder) = setup();
    let mut spec = builder.default_spec();
    spec.set(
        "STATUS",
        FilterCondition::InList { values: set(&["Planned", "In Progress", "Closed"]), include_missing: true },
    );
    let view = builder.apply(&df, &spec).unwrap();
    let expected: Vec<usize> = (0..100).filter(|i| STATUSES[i % 4] != "On Hold").collect();
    assert_eq!(view.rows, expected);
    assert_eq!(view.len(), 75);
}

#[test]
fn test_numeric_range_is_inclusive() {
    let (df, builder) = setup();
    let spec = FilterSpec::new(vec![resplan::filter::ColumnFilter::new(
        "ACTUAL_FTE",
        FilterCondition::Between { min: 10.0, max: 20.0 },
    )]);
    let view = builder.apply(&df, &spec).unwrap();
    let expected: Vec<usize> = (0..100)
        .filter(|i| actual_fte(*i).is_some_and(|v| (10..=20).contains(&v)))
        .collect();
    assert_eq!(view.rows, expected);

    let kept = view.frame.column("ACTUAL_FTE").unwrap().i64().unwrap();
    assert!(kept.into_iter().all(|v| v.is_some_and(|v| (10..=20).contains(&v))));
}

#[test]
fn test_and_composition_is_sound_and_complete() {
    let (df, builder) = setup();
    let mut spec = FilterSpec::default();
    spec.set("STATUS", FilterCondition::InList { values: set(&["Planned", "Closed"]), include_missing: false });
    spec.set("ACTUAL_FTE", FilterCondition::Between { min: 5.0, max: 30.0 });
    spec.set("CLIENT", FilterCondition::Contains { pattern: "client 01".into(), regex: false });
    spec.set(
        "START_DATE",
        FilterCondition::DateBetween {
            start: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        },
    );
    builder.validate(&spec).unwrap();

    let view = builder.apply(&df, &spec).unwrap();
    let expected: Vec<usize> = (0..100)
        .filter(|i| matches!(STATUSES[i % 4], "Planned" | "Closed"))
        .filter(|i| actual_fte(*i).is_some_and(|v| (5..=30).contains(&v)))
        .filter(|i| format!("client {:03}", i).contains("client 01"))
        .filter(|i| (4..=89).contains(i))
        .collect();
    assert_eq!(view.rows, expected);
    // month columns come back with their rows
    assert_eq!(view.frame.width(), df.width());
}

#[test]
fn test_refiltering_is_idempotent() {
    let (df, builder) = setup();
    let mut spec = FilterSpec::default();
    spec.set("STATUS", FilterCondition::InList { values: set(&["Planned", "On Hold"]), include_missing: true });
    spec.set("ACTUAL_FTE", FilterCondition::Between { min: 10.0, max: 20.0 });

    let once = builder.apply(&df, &spec).unwrap();
    let twice = once.refine(&spec, builder.settings()).unwrap();
    assert_eq!(twice.rows, once.rows);
    assert!(twice.frame.equals_missing(&once.frame));
}

#[test]
fn test_source_is_never_modified() {
    let (df, builder) = setup();
    let before = df.clone();
    let mut spec = FilterSpec::default();
    spec.set("CLIENT", FilterCondition::Contains { pattern: "^client 00".into(), regex: true });
    let view = builder.apply(&df, &spec).unwrap();
    assert_eq!(view.len(), 10);
    assert!(df.equals_missing(&before));
}

#[test]
fn test_empty_frame_returns_immediately() {
    let df = Schedule::default().to_dataframe().unwrap();
    let builder = FilterBuilder::new(&df, FilterSettings::default()).unwrap();
    let mut spec = FilterSpec::default();
    spec.set("STATUS", FilterCondition::InList { values: BTreeSet::new(), include_missing: false });
    let view = builder.apply(&df, &spec).unwrap();
    assert!(view.is_empty());
}

#[test]
fn test_spec_survives_a_file_roundtrip() {
    let (df, builder) = setup();
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("filter.json");

    let mut spec = FilterSpec::default();
    spec.set("STATUS", FilterCondition::InList { values: set(&["Closed"]), include_missing: false });
    spec.save_to_file(&path).unwrap();
    let loaded = FilterSpec::load_from_file(&path).unwrap();
    assert_eq!(loaded, spec);
    assert_eq!(builder.apply(&df, &loaded).unwrap().len(), 25);
}
