use crate::core::{
    schema::SCHEDULING_SHEET,
    types::{CsvImportOptions, ImportMode, SourceType},
    Field, LoadReport, Lovs, RawCell, Schedule, ScheduleRecord, MONTHS,
};
use crate::filter::{apply_projected, FilterSettings, FilterSpec};
use crate::services::sample::sample_schedule;
use crate::services::store::{DatasetStore, Snapshot};
use crate::services::workbook::{read_records, read_workbook, write_frame, write_workbook, Table};
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use polars::prelude::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Working days per month used for FTE conversion
pub const WORKING_DAYS_PER_MONTH: f64 = 20.0;

/// Columns shown on the dashboard's upcoming-projects table
pub const UPCOMING_COLUMNS: [&str; 5] = ["PROJECT_DESCR", "CLIENT", "START_DATE", "END_DATE", "STATUS"];

/// Convert person-days to FTE units
pub fn to_fte(days: f64) -> f64 {
    days / WORKING_DAYS_PER_MONTH
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("row {index} does not exist (dataset has {len} rows)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("{0} is required")]
    MissingField(Field),
    #[error("'{value}' is not an allowed {field} (allowed: {allowed})")]
    NotInList { field: Field, value: String, allowed: String },
    #[error("PROGRESS must be between 0 and 100, got {0}")]
    ProgressOutOfRange(i64),
    #[error("START_DATE {start} is after END_DATE {end}")]
    DateOrder { start: NaiveDate, end: NaiveDate },
    #[error("'{value}' is not a valid value for {field}")]
    InvalidValue { field: Field, value: String },
}

/// Check a record against the lookup lists and value ranges
pub fn validate_record(record: &ScheduleRecord, lovs: &Lovs) -> Result<(), RecordError> {
    if record.project_descr.as_deref().is_none_or(|s| s.trim().is_empty()) {
        return Err(RecordError::MissingField(Field::ProjectDescr));
    }
    for field in [Field::ItemType, Field::DeliveryType, Field::Status] {
        if let Some(value) = record.text(field) {
            if !lovs.is_allowed(field, value) {
                return Err(RecordError::NotInList {
                    field,
                    value: value.to_string(),
                    allowed: lovs.allowed(field).join(", "),
                });
            }
        }
    }
    if let Some(p) = record.progress {
        if !(0..=100).contains(&p) {
            return Err(RecordError::ProgressOutOfRange(p));
        }
    }
    if let (Some(start), Some(end)) = (record.start_date, record.end_date) {
        if start > end {
            return Err(RecordError::DateOrder { start, end });
        }
    }
    Ok(())
}

/// How the workbook was obtained when the service opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Loaded(LoadReport),
    /// No file existed; a sample was written
    Created,
    /// The file could not be read; it was backed up and replaced by a sample
    Recovered { backup: PathBuf, reason: String },
}

/// `<stem>_corrupted_<YYYYmmdd_HHMMSS>.<ext>` inside `backup_dir`
pub fn backup_path(path: &Path, backup_dir: &Path, at: NaiveDateTime) -> PathBuf {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("workbook");
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("xlsx");
    backup_dir.join(format!("{}_corrupted_{}.{}", stem, at.format("%Y%m%d_%H%M%S"), ext))
}

/// DataService owns the scheduling workbook
///
/// This service is responsible for:
/// - Loading the workbook, recovering from missing or corrupted files
/// - Record edits validated against the LoVs
/// - Imports, exports, and the dashboard/analytics views
/// - Publishing every change through the [`DatasetStore`]
pub struct DataService {
    /// Path to the workbook
    path: PathBuf,

    /// Where corrupted workbooks are copied before being replaced
    backup_dir: PathBuf,

    store: DatasetStore,
}

impl DataService {
    /// Open the workbook at `path`
    ///
    /// A missing file is replaced by a sample. An unreadable file is copied to
    /// `backup_dir` first.
    pub fn open(path: &Path, backup_dir: &Path) -> Result<(Self, OpenOutcome)> {
        let (schedule, outcome) = if !path.exists() {
            info!("'{}' does not exist, creating a sample dataset", path.display());
            (Self::write_sample(path)?, OpenOutcome::Created)
        } else {
            match read_workbook(path) {
                Ok((schedule, report)) => (schedule, OpenOutcome::Loaded(report)),
                Err(e) => {
                    fs::create_dir_all(backup_dir)?;
                    let backup = backup_path(path, backup_dir, Local::now().naive_local());
                    fs::copy(path, &backup)?;
                    warn!(
                        "'{}' is unreadable ({}); backed up to '{}' and replaced by a sample",
                        path.display(),
                        e,
                        backup.display()
                    );
                    (
                        Self::write_sample(path)?,
                        OpenOutcome::Recovered { backup, reason: e.to_string() },
                    )
                }
            }
        };
        Ok((
            Self {
                path: path.to_owned(),
                backup_dir: backup_dir.to_owned(),
                store: DatasetStore::new(schedule),
            },
            outcome,
        ))
    }

    fn write_sample(path: &Path) -> Result<Schedule> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let schedule = sample_schedule(Local::now().year());
        write_workbook(path, &schedule)?;
        Ok(schedule)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.current()
    }

    /// Typed frame of the current dataset
    pub fn dataframe(&self) -> Result<DataFrame> {
        Ok(self.snapshot().schedule.to_dataframe()?)
    }

    /// Write the current dataset back to the workbook
    pub fn save(&self) -> Result<()> {
        write_workbook(&self.path, &self.snapshot().schedule)
    }

    /// Apply a change to a copy of the dataset, save it, then commit it.
    /// A failed save leaves the store untouched.
    fn mutate<T>(&self, change: impl FnOnce(&mut Schedule) -> Result<T, RecordError>) -> Result<T> {
        let mut schedule = self.snapshot().schedule.clone();
        let out = change(&mut schedule)?;
        write_workbook(&self.path, &schedule)?;
        let version = self.store.commit(schedule);
        info!("saved dataset {} to '{}'", version, self.path.display());
        Ok(out)
    }

    /// Append a record; returns its row index
    pub fn add_record(&self, record: ScheduleRecord) -> Result<usize> {
        self.mutate(|schedule| {
            validate_record(&record, &schedule.lovs)?;
            schedule.records.push(record);
            Ok(schedule.records.len() - 1)
        })
    }

    /// Replace the record at `index`
    pub fn update_record(&self, index: usize, record: ScheduleRecord) -> Result<()> {
        self.mutate(|schedule| {
            let len = schedule.records.len();
            validate_record(&record, &schedule.lovs)?;
            let slot = schedule
                .records
                .get_mut(index)
                .ok_or(RecordError::IndexOutOfRange { index, len })?;
            *slot = record;
            Ok(())
        })
    }

    /// Set individual columns of the record at `index`; returns the updated record
    pub fn edit_record(&self, index: usize, assignments: &[(Field, String)]) -> Result<ScheduleRecord> {
        self.mutate(|schedule| {
            let len = schedule.records.len();
            let mut record = schedule
                .records
                .get(index)
                .cloned()
                .ok_or(RecordError::IndexOutOfRange { index, len })?;
            for (field, value) in assignments {
                let cell = if value.trim().is_empty() { RawCell::Empty } else { RawCell::Text(value.clone()) };
                if !record.set(*field, &cell) {
                    return Err(RecordError::InvalidValue { field: *field, value: value.clone() });
                }
            }
            validate_record(&record, &schedule.lovs)?;
            schedule.records[index] = record.clone();
            Ok(record)
        })
    }

    /// Remove the record at `index`; returns it
    pub fn delete_record(&self, index: usize) -> Result<ScheduleRecord> {
        self.mutate(|schedule| {
            let len = schedule.records.len();
            if index >= len {
                return Err(RecordError::IndexOutOfRange { index, len });
            }
            Ok(schedule.records.remove(index))
        })
    }

    /// Import records from an xlsx or csv file
    pub fn import(&self, path: &Path, mode: ImportMode, csv_options: &CsvImportOptions) -> Result<LoadReport> {
        let source = SourceType::from_path(path)
            .ok_or_else(|| eyre!("Cannot tell the format of '{}' from its extension", path.display()))?;
        let (records, report) = match source {
            SourceType::Xlsx => read_records(path)?,
            SourceType::Csv => {
                let (header, rows) = read_csv_table(path, csv_options)?;
                crate::core::schema::records_from_table(&header, &rows)?
            }
        };
        info!("importing {} records from '{}' ({:?})", records.len(), path.display(), mode);
        self.mutate(|schedule| {
            match mode {
                ImportMode::Replace => schedule.records = records,
                ImportMode::Append => schedule.records.extend(records),
            }
            Ok(())
        })?;
        Ok(report)
    }

    /// Export the dataset, optionally filtered, to csv or xlsx. Returns the row count.
    ///
    /// Filters apply to the non-month columns; month columns follow their rows.
    pub fn export(&self, path: &Path, spec: Option<&FilterSpec>, settings: &FilterSettings) -> Result<usize> {
        let df = self.dataframe()?;
        let df = match spec {
            Some(spec) => {
                let months: Vec<String> = MONTHS.iter().map(|m| m.to_string()).collect();
                apply_projected(&df, &months, spec, settings)?.frame
            }
            None => df,
        };
        export_frame(&df, path)?;
        Ok(df.height())
    }

    /// Projects sorted by start date, earliest first, missing dates last
    pub fn upcoming(&self, limit: usize) -> Result<DataFrame> {
        let df = self.dataframe()?;
        let sorted = df
            .select(UPCOMING_COLUMNS)?
            .sort(["START_DATE"], SortMultipleOptions::default().with_nulls_last(true))?;
        Ok(sorted.head(Some(limit)))
    }

    /// Month allocations summed per USER, with a TOTAL column
    pub fn fte_by_user_month(&self, as_fte: bool) -> Result<DataFrame> {
        let df = self.dataframe()?;
        let sums: Vec<Expr> = MONTHS
            .iter()
            .map(|m| {
                let sum = col(*m).sum();
                if as_fte {
                    (sum.cast(DataType::Float64) / lit(WORKING_DAYS_PER_MONTH)).alias(*m)
                } else {
                    sum.alias(*m)
                }
            })
            .collect();
        let total = MONTHS
            .iter()
            .fold(lit(0), |acc, m| acc + col(*m))
            .alias("TOTAL");
        let out = df
            .lazy()
            .group_by([col(Field::User.name())])
            .agg(sums)
            .with_column(total)
            .sort([Field::User.name()], SortMultipleOptions::default().with_nulls_last(true))
            .collect()?;
        Ok(out)
    }
}

/// Write a frame as csv or xlsx, chosen by extension
pub fn export_frame(df: &DataFrame, path: &Path) -> Result<()> {
    let source = SourceType::from_path(path)
        .ok_or_else(|| eyre!("Cannot tell the format of '{}' from its extension", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    match (source, ext.as_deref()) {
        (SourceType::Csv, ext) => {
            let separator = if ext == Some("tsv") { b'\t' } else { b',' };
            let mut file = File::create(path)?;
            CsvWriter::new(&mut file)
                .include_header(true)
                .with_separator(separator)
                .finish(&mut df.clone())?;
        }
        (SourceType::Xlsx, Some("xlsx")) => write_frame(df, path, SCHEDULING_SHEET)?,
        (SourceType::Xlsx, _) => {
            return Err(eyre!("Cannot export to '{}': workbooks are written as .xlsx only", path.display()));
        }
    }
    info!("exported {} rows to '{}'", df.height(), path.display());
    Ok(())
}

/// Read a csv file into a header row and text cells
pub fn read_csv_table(path: &Path, options: &CsvImportOptions) -> Result<Table> {
    let delimiter = u8::try_from(options.delimiter)
        .map_err(|_| eyre!("Delimiter '{}' must be a single-byte character", options.delimiter))?;
    let mut builder = csv::ReaderBuilder::new();
    builder.delimiter(delimiter).has_headers(false).flexible(true);
    match options.quote_char {
        Some(q) => {
            let quote = u8::try_from(q).map_err(|_| eyre!("Quote '{}' must be a single-byte character", q))?;
            builder.quote(quote);
        }
        None => {
            builder.quoting(false);
        }
    }
    let mut reader = builder
        .from_path(path)
        .map_err(|e| eyre!("Failed to open CSV file '{}': {}", path.display(), e))?;

    let mut rows: Vec<Vec<RawCell>> = Vec::new();
    let mut header: Option<Vec<String>> = None;
    for record in reader.records() {
        let record = record.map_err(|e| eyre!("Failed to parse CSV file: {e}"))?;
        if header.is_none() && options.has_header {
            header = Some(record.iter().map(|s| s.trim().to_string()).collect());
            continue;
        }
        rows.push(
            record
                .iter()
                .map(|s| if s.trim().is_empty() { RawCell::Empty } else { RawCell::Text(s.to_string()) })
                .collect(),
        );
    }
    let header = match header {
        Some(h) => h,
        None if options.has_header => return Err(eyre!("CSV file '{}' is empty", path.display())),
        // headerless files use the canonical column order
        None => Field::all().iter().map(|f| f.name().to_string()).collect(),
    };
    Ok((header, rows))
}
