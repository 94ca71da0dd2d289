//! The fixed set of parameterized query operations the assistant can run.

use std::collections::BTreeMap;

use crate::core::{Field, Schedule, ScheduleRecord, MONTHS};

/// Label used for records whose grouping column is empty
pub const EMPTY_LABEL: &str = "(empty)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOp {
    /// Rows whose `column` equals one of `values`, with month totals
    EntityProfile { column: Field, values: Vec<String> },
    /// Sum of month allocations per value of `column`
    AggregateByColumn { column: Field },
    ListDistinct { column: Field },
    /// Number of records per value of `column`
    CountBy { column: Field },
}

/// One record of an entity profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLine {
    pub project: Option<String>,
    pub client: Option<String>,
    pub user: Option<String>,
    pub status: Option<String>,
    pub planned_fte: Option<i64>,
    pub actual_fte: Option<i64>,
    pub allocated: i64,
}

impl From<&ScheduleRecord> for ProjectLine {
    fn from(r: &ScheduleRecord) -> Self {
        Self {
            project: r.project_descr.clone(),
            client: r.client.clone(),
            user: r.user.clone(),
            status: r.status.clone(),
            planned_fte: r.planned_fte,
            actual_fte: r.actual_fte,
            allocated: r.month_total(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityProfile {
    pub column: Field,
    pub values: Vec<String>,
    pub records: usize,
    /// Sum per month column, GEN..DIC
    pub month_totals: [i64; 12],
    /// Always the sum of `month_totals`
    pub grand_total: i64,
    pub projects: Vec<ProjectLine>,
}

impl EntityProfile {
    pub fn months(&self) -> impl Iterator<Item = (&'static str, i64)> + '_ {
        MONTHS.iter().copied().zip(self.month_totals.iter().copied())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResult {
    Profile(EntityProfile),
    Totals { column: Field, rows: Vec<(String, i64)> },
    Distinct { column: Field, values: Vec<String> },
    Counts { column: Field, rows: Vec<(String, usize)> },
}

fn group_key(record: &ScheduleRecord, column: Field) -> String {
    record.display(column).unwrap_or_else(|| EMPTY_LABEL.to_string())
}

/// Sort by value descending, then label ascending
fn ranked<V: Ord + Copy>(groups: BTreeMap<String, V>) -> Vec<(String, V)> {
    let mut rows: Vec<(String, V)> = groups.into_iter().collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows
}

impl QueryOp {
    pub fn execute(&self, schedule: &Schedule) -> QueryResult {
        match self {
            QueryOp::EntityProfile { column, values } => {
                let matching: Vec<&ScheduleRecord> = schedule
                    .records
                    .iter()
                    .filter(|r| r.display(*column).is_some_and(|v| values.contains(&v)))
                    .collect();
                let mut month_totals = [0i64; 12];
                for record in &matching {
                    for (total, value) in month_totals.iter_mut().zip(record.months.iter()) {
                        *total += value.unwrap_or(0);
                    }
                }
                QueryResult::Profile(EntityProfile {
                    column: *column,
                    values: values.clone(),
                    records: matching.len(),
                    grand_total: month_totals.iter().sum(),
                    month_totals,
                    projects: matching.into_iter().map(ProjectLine::from).collect(),
                })
            }
            QueryOp::AggregateByColumn { column } => {
                let mut groups: BTreeMap<String, i64> = BTreeMap::new();
                for record in &schedule.records {
                    *groups.entry(group_key(record, *column)).or_default() += record.month_total();
                }
                QueryResult::Totals { column: *column, rows: ranked(groups) }
            }
            QueryOp::ListDistinct { column } => {
                let mut values = schedule.distinct(*column);
                values.sort();
                QueryResult::Distinct { column: *column, values }
            }
            QueryOp::CountBy { column } => {
                let mut groups: BTreeMap<String, usize> = BTreeMap::new();
                for record in &schedule.records {
                    *groups.entry(group_key(record, *column)).or_default() += 1;
                }
                QueryResult::Counts { column: *column, rows: ranked(groups) }
            }
        }
    }
}
