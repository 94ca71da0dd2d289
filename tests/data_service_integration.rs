//! Integration tests for DataService with real workbooks on disk

use std::fs;
use std::path::Path;

use calamine::{open_workbook_auto, Reader};
use pretty_assertions::assert_eq;
use resplan::core::{CsvImportOptions, Field, ImportMode, ScheduleRecord};
use resplan::filter::{FilterCondition, FilterSettings, FilterSpec};
use resplan::services::{DataService, OpenOutcome, RecordError};
use tempfile::TempDir;

fn open(dir: &Path) -> (DataService, OpenOutcome) {
    DataService::open(&dir.join("SCHEDULING.xlsx"), &dir.join("backups")).unwrap()
}

#[test]
fn test_corrupted_workbook_is_backed_up_and_replaced() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("SCHEDULING.xlsx");
    fs::write(&path, b"definitely not a spreadsheet").unwrap();

    let (service, outcome) = open(dir.path());
    let OpenOutcome::Recovered { backup, .. } = outcome else {
        panic!("expected a recovery, got {outcome:?}");
    };

    let name = backup.file_name().unwrap().to_str().unwrap();
    assert!(name.starts_with("SCHEDULING_corrupted_"), "{name}");
    assert!(name.ends_with(".xlsx"));
    // SCHEDULING_corrupted_YYYYmmdd_HHMMSS.xlsx
    assert_eq!(name.len(), "SCHEDULING_corrupted_".len() + 15 + ".xlsx".len());
    assert_eq!(fs::read(&backup).unwrap(), b"definitely not a spreadsheet");

    assert!(!service.snapshot().schedule.is_empty());
    let (_, reopened) = open(dir.path());
    assert!(matches!(reopened, OpenOutcome::Loaded(_)));
}

#[test]
fn test_missing_workbook_gets_a_sample_without_backup() {
    let dir = TempDir::new().unwrap();
    let (service, outcome) = open(dir.path());
    assert_eq!(outcome, OpenOutcome::Created);
    assert!(service.path().exists());
    assert!(!dir.path().join("backups").exists());

    let mut workbook = open_workbook_auto(service.path()).unwrap();
    assert_eq!(workbook.sheet_names(), vec!["Scheduling".to_string(), "LoVs".to_string()]);
}

#[test]
fn test_record_validation_uses_lovs() {
    let dir = TempDir::new().unwrap();
    let (service, _) = open(dir.path());
    let record = ScheduleRecord {
        project_descr: Some("Audit".into()),
        status: Some("Cancelled".into()),
        ..Default::default()
    };
    let err = service.add_record(record).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RecordError>(),
        Some(RecordError::NotInList { field: Field::Status, .. })
    ));

    let err = service.edit_record(0, &[(Field::Progress, "150".into())]).unwrap_err();
    assert_eq!(err.downcast_ref::<RecordError>(), Some(&RecordError::ProgressOutOfRange(150)));
}

#[test]
fn test_filtered_export_keeps_month_columns() {
    let dir = TempDir::new().unwrap();
    let (service, _) = open(dir.path());
    let schedule = service.snapshot().schedule.clone();

    let mut spec = FilterSpec::default();
    spec.set(
        "STATUS",
        FilterCondition::InList { values: ["Planned".to_string()].into_iter().collect(), include_missing: false },
    );
    let expected = schedule.records.iter().filter(|r| r.status.as_deref() == Some("Planned")).count();

    let csv_path = dir.path().join("planned.csv");
    let rows = service.export(&csv_path, Some(&spec), &FilterSettings::default()).unwrap();
    assert_eq!(rows, expected);

    let text = fs::read_to_string(&csv_path).unwrap();
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    assert!(header.starts_with("PROJECT_DESCR,CLIENT,"));
    assert!(header.ends_with("NOV,DIC"));
    assert_eq!(lines.count(), expected);

    let xlsx_path = dir.path().join("all.xlsx");
    assert_eq!(service.export(&xlsx_path, None, &FilterSettings::default()).unwrap(), schedule.len());
    let mut workbook = open_workbook_auto(&xlsx_path).unwrap();
    let range = workbook.worksheet_range("Scheduling").unwrap();
    assert_eq!(range.height(), schedule.len() + 1);
}

#[test]
fn test_export_then_import_restores_records() {
    let dir = TempDir::new().unwrap();
    let (service, _) = open(dir.path());
    let original = service.snapshot().schedule.records.clone();

    let csv_path = dir.path().join("backup.csv");
    service.export(&csv_path, None, &FilterSettings::default()).unwrap();
    service.delete_record(0).unwrap();
    assert_eq!(service.snapshot().schedule.len(), original.len() - 1);

    let report = service.import(&csv_path, ImportMode::Replace, &CsvImportOptions::default()).unwrap();
    assert_eq!(report.coerced_to_missing, 0);
    assert_eq!(service.snapshot().schedule.records, original);

    let xlsx_path = dir.path().join("copy.xlsx");
    service.export(&xlsx_path, None, &FilterSettings::default()).unwrap();
    service.import(&xlsx_path, ImportMode::Append, &CsvImportOptions::default()).unwrap();
    assert_eq!(service.snapshot().schedule.len(), original.len() * 2);
}

#[test]
fn test_every_change_bumps_the_version() {
    let dir = TempDir::new().unwrap();
    let (service, _) = open(dir.path());
    let v0 = service.store().version();
    service.edit_record(1, &[(Field::Client, "Globex".into())]).unwrap();
    service.delete_record(2).unwrap();
    assert_eq!(service.store().version().get(), v0.get() + 2);
}
