//! Explicit schema for the `Scheduling` sheet.
//!
//! Every input table is validated once into [`ScheduleRecord`]s. Cells that do not
//! coerce to the column type become `None` and are counted in the [`LoadReport`].

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

/// Italian month prefixes, in calendar order
pub const MONTHS: [&str; 12] = [
    "GEN", "FEB", "MAR", "APR", "MAG", "GIU", "LUG", "AGO", "SET", "OTT", "NOV", "DIC",
];

/// Name of the records sheet
pub const SCHEDULING_SHEET: &str = "Scheduling";
/// Name of the list-of-values sheet
pub const LOVS_SHEET: &str = "LoVs";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("table has no header row")]
    EmptyTable,
    #[error("required column '{0}' is missing")]
    MissingColumn(&'static str),
    #[error("column '{0}' appears more than once")]
    DuplicateColumn(String),
}

/// Storage type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Date,
}

/// A known column of the scheduling sheet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    ProjectDescr,
    Client,
    ItemType,
    DeliveryType,
    User,
    Pm,
    Status,
    PlannedFte,
    ActualFte,
    Progress,
    Year,
    StartDate,
    EndDate,
    /// Month allocation, 0 = GEN .. 11 = DIC
    Month(usize),
}

const BASE_FIELDS: [Field; 13] = [
    Field::ProjectDescr,
    Field::Client,
    Field::ItemType,
    Field::DeliveryType,
    Field::User,
    Field::Pm,
    Field::Status,
    Field::PlannedFte,
    Field::ActualFte,
    Field::Progress,
    Field::Year,
    Field::StartDate,
    Field::EndDate,
];

impl Field {
    /// All columns in canonical sheet order
    pub fn all() -> Vec<Field> {
        BASE_FIELDS
            .iter()
            .copied()
            .chain((0..MONTHS.len()).map(Field::Month))
            .collect()
    }

    pub fn months() -> impl Iterator<Item = Field> {
        (0..MONTHS.len()).map(Field::Month)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Field::ProjectDescr => "PROJECT_DESCR",
            Field::Client => "CLIENT",
            Field::ItemType => "ITEM_TYPE",
            Field::DeliveryType => "DELIVERY_TYPE",
            Field::User => "USER",
            Field::Pm => "PM",
            Field::Status => "STATUS",
            Field::PlannedFte => "PLANNED_FTE",
            Field::ActualFte => "ACTUAL_FTE",
            Field::Progress => "PROGRESS",
            Field::Year => "YEAR",
            Field::StartDate => "START_DATE",
            Field::EndDate => "END_DATE",
            Field::Month(i) => MONTHS.get(*i).copied().unwrap_or("???"),
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::ProjectDescr
            | Field::Client
            | Field::ItemType
            | Field::DeliveryType
            | Field::User
            | Field::Pm
            | Field::Status => FieldKind::Text,
            Field::StartDate | Field::EndDate => FieldKind::Date,
            _ => FieldKind::Integer,
        }
    }

    pub fn is_month(&self) -> bool {
        matches!(self, Field::Month(_))
    }

    /// Map an input header to a column.
    ///
    /// Exact names match case-insensitively with spaces treated as underscores.
    /// Any header whose first three letters are a month prefix is that month.
    pub fn from_header(header: &str) -> Option<Field> {
        let canonical = header.trim().to_uppercase().replace([' ', '-'], "_");
        if let Some(field) = BASE_FIELDS.iter().find(|f| f.name() == canonical) {
            return Some(*field);
        }
        let prefix: String = canonical.chars().take(3).collect();
        MONTHS.iter().position(|m| *m == prefix).map(Field::Month)
    }

    pub fn is_month_header(header: &str) -> bool {
        matches!(Field::from_header(header), Some(Field::Month(_)))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A source-independent spreadsheet cell
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Excel serial date (days since 1899-12-30)
    DateSerial(f64),
    Date(NaiveDate),
}

impl RawCell {
    pub fn is_empty(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&calamine::Data> for RawCell {
    fn from(cell: &calamine::Data) -> Self {
        match cell {
            calamine::Data::Empty => RawCell::Empty,
            calamine::Data::String(s) => RawCell::Text(s.clone()),
            calamine::Data::Int(i) => RawCell::Int(*i),
            calamine::Data::Float(f) => RawCell::Float(*f),
            calamine::Data::Bool(b) => RawCell::Bool(*b),
            calamine::Data::DateTime(d) => RawCell::DateSerial(d.as_f64()),
            calamine::Data::DateTimeIso(s) => RawCell::Text(s.clone()),
            calamine::Data::DurationIso(s) => RawCell::Text(s.clone()),
            calamine::Data::Error(_) => RawCell::Empty,
        }
    }
}

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parse a date written in one of the accepted layouts
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Convert an Excel serial day number to a date
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(serial.floor() as i64))
}

fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(i);
    }
    s.replace(',', ".").parse::<f64>().ok().and_then(float_to_integer)
}

fn float_to_integer(f: f64) -> Option<i64> {
    if !f.is_finite() {
        return None;
    }
    if f.fract() != 0.0 {
        debug!("rounding non-integral value {f}");
    }
    Some(f.round() as i64)
}

/// Render a float without a trailing `.0` for integral values
pub fn format_number(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}

fn coerce_text(cell: &RawCell) -> Option<String> {
    let s = match cell {
        RawCell::Empty => return None,
        RawCell::Text(s) => s.trim().to_string(),
        RawCell::Int(i) => i.to_string(),
        RawCell::Float(f) => format_number(*f),
        RawCell::Bool(b) => b.to_string(),
        RawCell::DateSerial(f) => excel_serial_to_date(*f).map(|d| d.to_string())?,
        RawCell::Date(d) => d.to_string(),
    };
    if s.is_empty() { None } else { Some(s) }
}

fn coerce_integer(cell: &RawCell) -> Option<i64> {
    match cell {
        RawCell::Int(i) => Some(*i),
        RawCell::Float(f) | RawCell::DateSerial(f) => float_to_integer(*f),
        RawCell::Text(s) => parse_integer(s),
        RawCell::Bool(b) => Some(i64::from(*b)),
        RawCell::Empty | RawCell::Date(_) => None,
    }
}

fn coerce_date(cell: &RawCell) -> Option<NaiveDate> {
    match cell {
        RawCell::Date(d) => Some(*d),
        RawCell::DateSerial(f) | RawCell::Float(f) => excel_serial_to_date(*f),
        RawCell::Int(i) => excel_serial_to_date(*i as f64),
        RawCell::Text(s) => parse_date(s),
        RawCell::Empty | RawCell::Bool(_) => None,
    }
}

/// One allocation row of the scheduling sheet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub project_descr: Option<String>,
    pub client: Option<String>,
    pub item_type: Option<String>,
    pub delivery_type: Option<String>,
    pub user: Option<String>,
    pub pm: Option<String>,
    pub status: Option<String>,
    pub planned_fte: Option<i64>,
    pub actual_fte: Option<i64>,
    pub progress: Option<i64>,
    pub year: Option<i64>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub months: [Option<i64>; 12],
}

impl ScheduleRecord {
    pub fn text(&self, field: Field) -> Option<&str> {
        match field {
            Field::ProjectDescr => self.project_descr.as_deref(),
            Field::Client => self.client.as_deref(),
            Field::ItemType => self.item_type.as_deref(),
            Field::DeliveryType => self.delivery_type.as_deref(),
            Field::User => self.user.as_deref(),
            Field::Pm => self.pm.as_deref(),
            Field::Status => self.status.as_deref(),
            _ => None,
        }
    }

    pub fn integer(&self, field: Field) -> Option<i64> {
        match field {
            Field::PlannedFte => self.planned_fte,
            Field::ActualFte => self.actual_fte,
            Field::Progress => self.progress,
            Field::Year => self.year,
            Field::Month(i) => self.months.get(i).copied().flatten(),
            _ => None,
        }
    }

    pub fn date(&self, field: Field) -> Option<NaiveDate> {
        match field {
            Field::StartDate => self.start_date,
            Field::EndDate => self.end_date,
            _ => None,
        }
    }

    /// Display value of a column, `None` when missing
    pub fn display(&self, field: Field) -> Option<String> {
        match field.kind() {
            FieldKind::Text => self.text(field).map(str::to_string),
            FieldKind::Integer => self.integer(field).map(|i| i.to_string()),
            FieldKind::Date => self.date(field).map(|d| d.to_string()),
        }
    }

    /// Typed cell for writers
    pub fn cell(&self, field: Field) -> RawCell {
        match field.kind() {
            FieldKind::Text => self
                .text(field)
                .map(|s| RawCell::Text(s.to_string()))
                .unwrap_or(RawCell::Empty),
            FieldKind::Integer => self.integer(field).map(RawCell::Int).unwrap_or(RawCell::Empty),
            FieldKind::Date => self.date(field).map(RawCell::Date).unwrap_or(RawCell::Empty),
        }
    }

    /// Sum of the month allocations, missing months count as zero
    pub fn month_total(&self) -> i64 {
        self.months.iter().flatten().sum()
    }

    /// Set a column from a raw cell. Returns false when a non-empty cell was coerced to missing.
    pub fn set(&mut self, field: Field, cell: &RawCell) -> bool {
        let coerced_ok;
        match field.kind() {
            FieldKind::Text => {
                let v = coerce_text(cell);
                coerced_ok = v.is_some() || cell.is_empty();
                match field {
                    Field::ProjectDescr => self.project_descr = v,
                    Field::Client => self.client = v,
                    Field::ItemType => self.item_type = v,
                    Field::DeliveryType => self.delivery_type = v,
                    Field::User => self.user = v,
                    Field::Pm => self.pm = v,
                    Field::Status => self.status = v,
                    _ => {}
                }
            }
            FieldKind::Integer => {
                let v = coerce_integer(cell);
                coerced_ok = v.is_some() || cell.is_empty();
                match field {
                    Field::PlannedFte => self.planned_fte = v,
                    Field::ActualFte => self.actual_fte = v,
                    Field::Progress => self.progress = v,
                    Field::Year => self.year = v,
                    Field::Month(i) => {
                        if let Some(slot) = self.months.get_mut(i) {
                            *slot = v;
                        }
                    }
                    _ => {}
                }
            }
            FieldKind::Date => {
                let v = coerce_date(cell);
                coerced_ok = v.is_some() || cell.is_empty();
                match field {
                    Field::StartDate => self.start_date = v,
                    Field::EndDate => self.end_date = v,
                    _ => {}
                }
            }
        }
        coerced_ok
    }
}

/// Outcome of validating an input table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub rows: usize,
    /// Non-empty cells that could not be coerced and became missing
    pub coerced_to_missing: usize,
    /// Input headers that are not part of the schema
    pub ignored_columns: Vec<String>,
}

/// Validate a header row and data rows into records.
///
/// Rows that are entirely empty are skipped.
pub fn records_from_table(
    header: &[String],
    rows: &[Vec<RawCell>],
) -> Result<(Vec<ScheduleRecord>, LoadReport), SchemaError> {
    if header.is_empty() {
        return Err(SchemaError::EmptyTable);
    }

    let mut seen = HashSet::new();
    let mut mapping: Vec<Option<Field>> = Vec::with_capacity(header.len());
    let mut report = LoadReport::default();
    for raw in header {
        match Field::from_header(raw) {
            Some(field) => {
                if !seen.insert(field) {
                    return Err(SchemaError::DuplicateColumn(raw.trim().to_string()));
                }
                mapping.push(Some(field));
            }
            None => {
                if !raw.trim().is_empty() {
                    report.ignored_columns.push(raw.trim().to_string());
                }
                mapping.push(None);
            }
        }
    }
    if !seen.contains(&Field::ProjectDescr) {
        return Err(SchemaError::MissingColumn(Field::ProjectDescr.name()));
    }
    if !report.ignored_columns.is_empty() {
        warn!("ignoring unknown columns: {}", report.ignored_columns.join(", "));
    }

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        if row.iter().all(RawCell::is_empty) {
            continue;
        }
        let mut record = ScheduleRecord::default();
        for (cell, field) in row.iter().zip(mapping.iter()) {
            if let Some(field) = field {
                if !record.set(*field, cell) {
                    report.coerced_to_missing += 1;
                }
            }
        }
        records.push(record);
    }
    report.rows = records.len();
    if report.coerced_to_missing > 0 {
        warn!("{} cells could not be parsed and were set to missing", report.coerced_to_missing);
    }
    Ok((records, report))
}
