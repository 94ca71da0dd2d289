use std::collections::BTreeMap;

use chrono::NaiveDate;
use derive_deref::{Deref, DerefMut};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::schema::{Field, FieldKind, RawCell, ScheduleRecord};

/// Allowed values per categorical column, read from the `LoVs` sheet
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, DerefMut, Serialize, Deserialize)]
pub struct Lovs(pub BTreeMap<String, Vec<String>>);

impl Lovs {
    /// Build from a header row and data rows; each column is one list
    pub fn from_table(header: &[String], rows: &[Vec<RawCell>]) -> Self {
        let mut lists: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (idx, name) in header.iter().enumerate() {
            let name = name.trim().to_uppercase();
            if name.is_empty() {
                continue;
            }
            let values = lists.entry(name).or_default();
            for row in rows {
                if let Some(RawCell::Text(s)) = row.get(idx) {
                    let s = s.trim();
                    if !s.is_empty() && !values.iter().any(|v| v == s) {
                        values.push(s.to_string());
                    }
                }
            }
        }
        Self(lists)
    }

    pub fn allowed(&self, field: Field) -> &[String] {
        self.0.get(field.name()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// A value is allowed when the list for its column is empty or contains it
    pub fn is_allowed(&self, field: Field, value: &str) -> bool {
        let allowed = self.allowed(field);
        allowed.is_empty() || allowed.iter().any(|v| v == value)
    }

    /// Lists laid out column-wise for writing back to a sheet
    pub fn to_table(&self) -> (Vec<String>, Vec<Vec<RawCell>>) {
        let header: Vec<String> = self.0.keys().cloned().collect();
        let height = self.0.values().map(Vec::len).max().unwrap_or(0);
        let rows = (0..height)
            .map(|r| {
                self.0
                    .values()
                    .map(|list| list.get(r).map(|s| RawCell::Text(s.clone())).unwrap_or(RawCell::Empty))
                    .collect()
            })
            .collect();
        (header, rows)
    }
}

/// The full dataset: records plus their lookup lists
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    pub records: Vec<ScheduleRecord>,
    pub lovs: Lovs,
}

fn date_to_days(d: NaiveDate) -> i32 {
    d.signed_duration_since(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default())
        .num_days() as i32
}

impl Schedule {
    pub fn new(records: Vec<ScheduleRecord>, lovs: Lovs) -> Self {
        Self { records, lovs }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct non-missing values of a text column, in first-seen order
    pub fn distinct(&self, field: Field) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for record in &self.records {
            if let Some(v) = record.display(field) {
                if !out.contains(&v) {
                    out.push(v);
                }
            }
        }
        out
    }

    /// Build a typed polars frame with every schema column, in sheet order
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns = Field::all()
            .into_iter()
            .map(|field| self.series_for(field).map(Column::from))
            .collect::<PolarsResult<Vec<_>>>()?;
        DataFrame::new(columns)
    }

    fn series_for(&self, field: Field) -> PolarsResult<Series> {
        let name: PlSmallStr = field.name().into();
        match field.kind() {
            FieldKind::Text => {
                let values: Vec<Option<String>> = self
                    .records
                    .iter()
                    .map(|r| r.text(field).map(str::to_string))
                    .collect();
                Ok(Series::new(name, values))
            }
            FieldKind::Integer => {
                let values: Vec<Option<i64>> = self.records.iter().map(|r| r.integer(field)).collect();
                Ok(Series::new(name, values))
            }
            FieldKind::Date => {
                let days: Vec<Option<i32>> = self
                    .records
                    .iter()
                    .map(|r| r.date(field).map(date_to_days))
                    .collect();
                Series::new(name, days).cast(&DataType::Date)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cells::{column_cells, CellValue};

    fn record(project: &str, user: &str, start: Option<NaiveDate>) -> ScheduleRecord {
        ScheduleRecord {
            project_descr: Some(project.to_string()),
            user: Some(user.to_string()),
            start_date: start,
            months: [Some(1); 12],
            ..Default::default()
        }
    }

    #[test]
    fn test_to_dataframe_has_typed_columns() {
        let d = NaiveDate::from_ymd_opt(2025, 2, 1);
        let schedule = Schedule::new(vec![record("A", "u1", d), record("B", "u2", None)], Lovs::default());
        let df = schedule.to_dataframe().unwrap();

        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 25);
        assert_eq!(df.column("START_DATE").unwrap().dtype(), &DataType::Date);
        assert_eq!(df.column("GEN").unwrap().dtype(), &DataType::Int64);

        let starts = column_cells(df.column("START_DATE").unwrap()).unwrap();
        assert_eq!(starts, vec![CellValue::Date(d.unwrap()), CellValue::Missing]);
    }

    #[test]
    fn test_empty_schedule_builds_empty_frame() {
        let df = Schedule::default().to_dataframe().unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 25);
    }

    #[test]
    fn test_distinct_keeps_first_seen_order() {
        let schedule = Schedule::new(
            vec![record("A", "b", None), record("B", "a", None), record("C", "b", None)],
            Lovs::default(),
        );
        assert_eq!(schedule.distinct(Field::User), vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_lovs_roundtrip_through_table() {
        let header = vec!["STATUS".to_string(), "ITEM_TYPE".to_string()];
        let rows = vec![
            vec![RawCell::Text("Open".into()), RawCell::Text("Project".into())],
            vec![RawCell::Text("Closed".into()), RawCell::Empty],
            vec![RawCell::Text("Open".into()), RawCell::Empty],
        ];
        let lovs = Lovs::from_table(&header, &rows);
        assert_eq!(lovs.allowed(Field::Status), ["Open".to_string(), "Closed".to_string()]);
        assert!(lovs.is_allowed(Field::ItemType, "Project"));
        assert!(!lovs.is_allowed(Field::ItemType, "Other"));
        assert!(lovs.is_allowed(Field::DeliveryType, "anything"));

        let (h, r) = lovs.to_table();
        assert_eq!(Lovs::from_table(&h, &r), lovs);
    }
}
