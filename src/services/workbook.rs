//! Reading and writing the scheduling workbook.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use polars::prelude::*;
use chrono::Datelike;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook, Worksheet};
use tracing::{info, warn};

use crate::core::cells::{column_cells, CellValue};
use crate::core::schema::{records_from_table, LOVS_SHEET, SCHEDULING_SHEET};
use crate::core::{Field, LoadReport, Lovs, RawCell, Schedule, ScheduleRecord};

const DATE_FORMAT: &str = "yyyy-mm-dd";

/// A header row plus data rows, as read from a sheet
pub type Table = (Vec<String>, Vec<Vec<RawCell>>);

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn range_to_table(range: &Range<Data>) -> Table {
    let mut rows = range.rows();
    let header: Vec<String> = match rows.next() {
        Some(row) => row.iter().map(header_text).collect(),
        None => return (Vec::new(), Vec::new()),
    };
    let data = rows.map(|row| row.iter().map(RawCell::from).collect()).collect();
    (header, data)
}

/// Read the records sheet (`Scheduling`, or the first sheet) and the optional `LoVs` sheet
pub fn read_workbook(path: &Path) -> Result<(Schedule, LoadReport)> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| eyre!("Failed to open workbook '{}': {}", path.display(), e))?;
    let names = workbook.sheet_names();
    let records_sheet = names
        .iter()
        .find(|n| n.eq_ignore_ascii_case(SCHEDULING_SHEET))
        .or_else(|| names.first())
        .cloned()
        .ok_or_else(|| eyre!("Workbook '{}' has no sheets", path.display()))?;

    let range = workbook
        .worksheet_range(&records_sheet)
        .map_err(|e| eyre!("Failed to read worksheet '{}': {}", records_sheet, e))?;
    let (header, rows) = range_to_table(&range);
    let (records, report) = records_from_table(&header, &rows)?;

    let lovs = match names.iter().find(|n| n.eq_ignore_ascii_case(LOVS_SHEET)) {
        Some(sheet) => {
            let range = workbook
                .worksheet_range(sheet)
                .map_err(|e| eyre!("Failed to read worksheet '{}': {}", sheet, e))?;
            let (header, rows) = range_to_table(&range);
            Lovs::from_table(&header, &rows)
        }
        None => {
            warn!("workbook '{}' has no {} sheet", path.display(), LOVS_SHEET);
            Lovs::default()
        }
    };
    info!("loaded {} records from '{}'", records.len(), path.display());
    Ok((Schedule::new(records, lovs), report))
}

/// Records only, for imports
pub fn read_records(path: &Path) -> Result<(Vec<ScheduleRecord>, LoadReport)> {
    let (schedule, report) = read_workbook(path)?;
    Ok((schedule.records, report))
}

fn write_raw(sheet: &mut Worksheet, row: u32, col: u16, cell: &RawCell) -> Result<()> {
    match cell {
        RawCell::Empty => {}
        RawCell::Text(s) => {
            sheet.write_string(row, col, s)?;
        }
        RawCell::Int(i) => {
            sheet.write_number(row, col, *i as f64)?;
        }
        RawCell::Float(f) | RawCell::DateSerial(f) => {
            sheet.write_number(row, col, *f)?;
        }
        RawCell::Bool(b) => {
            sheet.write_boolean(row, col, *b)?;
        }
        RawCell::Date(d) => {
            let date = ExcelDateTime::from_ymd(d.year() as u16, d.month() as u8, d.day() as u8)?;
            sheet.write_datetime_with_format(row, col, &date, &Format::new().set_num_format(DATE_FORMAT))?;
        }
    }
    Ok(())
}

fn write_header(sheet: &mut Worksheet, header: &[String]) -> Result<()> {
    let bold = Format::new().set_bold();
    for (col, name) in header.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, name, &bold)?;
    }
    Ok(())
}

/// Write the whole dataset: `Scheduling` then `LoVs`
pub fn write_workbook(path: &Path, schedule: &Schedule) -> Result<()> {
    let mut workbook = Workbook::new();

    let sheet = workbook.add_worksheet();
    sheet.set_name(SCHEDULING_SHEET)?;
    let fields = Field::all();
    let header: Vec<String> = fields.iter().map(|f| f.name().to_string()).collect();
    write_header(sheet, &header)?;
    for (r, record) in schedule.records.iter().enumerate() {
        for (c, field) in fields.iter().enumerate() {
            write_raw(sheet, r as u32 + 1, c as u16, &record.cell(*field))?;
        }
    }

    let lov_sheet = workbook.add_worksheet();
    lov_sheet.set_name(LOVS_SHEET)?;
    let (lov_header, lov_rows) = schedule.lovs.to_table();
    write_header(lov_sheet, &lov_header)?;
    for (r, row) in lov_rows.iter().enumerate() {
        for (c, cell) in row.iter().enumerate() {
            write_raw(lov_sheet, r as u32 + 1, c as u16, cell)?;
        }
    }

    workbook.save(path)?;
    Ok(())
}

/// Write a frame to a single-sheet workbook, keeping column order and displayed values
pub fn write_frame(df: &DataFrame, path: &Path, sheet_name: &str) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(sheet_name)?;
    let header: Vec<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();
    write_header(sheet, &header)?;
    for (c, column) in df.get_columns().iter().enumerate() {
        for (r, cell) in column_cells(column)?.iter().enumerate() {
            let raw = match cell {
                CellValue::Missing => RawCell::Empty,
                CellValue::Bool(b) => RawCell::Bool(*b),
                CellValue::Int(i) => RawCell::Int(*i),
                CellValue::Float(f) => RawCell::Float(*f),
                CellValue::Date(d) => RawCell::Date(*d),
                CellValue::Text(s) => RawCell::Text(s.clone()),
            };
            write_raw(sheet, r as u32 + 1, c as u16, &raw)?;
        }
    }
    workbook.save(path)?;
    Ok(())
}
