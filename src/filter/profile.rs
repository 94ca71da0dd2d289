//! Column profiling: decide which filter control fits each column.

use std::cmp::Ordering;

use chrono::NaiveDate;
use color_eyre::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::core::cells::{date_days, date_from_days, is_numeric_dtype, is_temporal_dtype, key_column, numeric_values};
use crate::core::schema::format_number;
use crate::filter::condition::FilterCondition;

/// Tunables for column classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Columns with fewer distinct non-missing values than this are categorical
    pub categorical_threshold: usize,
    /// Share of non-missing text cells that must parse as dates for a text column to be temporal
    pub date_parse_ratio: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            categorical_threshold: 10,
            date_parse_ratio: 0.5,
        }
    }
}

/// Inferred column class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum ColumnKind {
    Categorical,
    Numeric,
    Temporal,
    Text,
}

/// The control offered for a column, with its default bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterControl {
    /// Pick a subset of the distinct values
    ValueSet { options: Vec<String>, has_missing: bool },
    /// Inclusive numeric range over the column's actual extent
    NumericRange { min: f64, max: f64 },
    /// Inclusive date range over the column's actual extent
    DateRange { min: NaiveDate, max: NaiveDate },
    /// Case-insensitive substring or regex
    TextMatch,
    /// Only one value (or none), nothing to filter
    Fixed { value: Option<String> },
}

/// Classification result for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub missing: usize,
    pub control: FilterControl,
}

impl ColumnProfile {
    /// The condition that leaves every row in place, if the column has a control
    pub fn default_condition(&self) -> Option<FilterCondition> {
        match &self.control {
            FilterControl::ValueSet { options, .. } => Some(FilterCondition::InList {
                values: options.iter().cloned().collect(),
                include_missing: true,
            }),
            FilterControl::NumericRange { min, max } => Some(FilterCondition::Between { min: *min, max: *max }),
            FilterControl::DateRange { min, max } => Some(FilterCondition::DateBetween { start: *min, end: *max }),
            FilterControl::TextMatch => Some(FilterCondition::Contains {
                pattern: String::new(),
                regex: false,
            }),
            FilterControl::Fixed { .. } => None,
        }
    }

    /// Whether the condition cannot remove any row of this column
    pub fn is_default(&self, condition: &FilterCondition) -> bool {
        if condition.is_blank() {
            return true;
        }
        match (&self.control, condition) {
            // one value at most: the condition is a no-op only if it keeps that value and the missing cells
            (FilterControl::Fixed { value }, _) => {
                value.as_deref().is_none_or(|v| condition.admits(Some(v)))
                    && (self.missing == 0 || condition.admits(None))
            }
            (
                FilterControl::ValueSet { options, has_missing },
                FilterCondition::InList { values, include_missing },
            ) => (*include_missing || !has_missing) && options.iter().all(|o| values.contains(o)),
            // a range spanning the whole extent is a no-op even when cells are missing
            (FilterControl::NumericRange { min, max }, FilterCondition::Between { min: lo, max: hi }) => {
                lo <= min && hi >= max
            }
            (FilterControl::DateRange { min, max }, FilterCondition::DateBetween { start, end }) => {
                start <= min && end >= max
            }
            _ => false,
        }
    }

    /// One-line description for listings
    pub fn describe(&self) -> String {
        let control = match &self.control {
            FilterControl::ValueSet { options, has_missing } => {
                let mut s = format!("one of {} values", options.len());
                if *has_missing {
                    s.push_str(" (+ missing)");
                }
                s
            }
            FilterControl::NumericRange { min, max } => {
                format!("range {} ..= {}", format_number(*min), format_number(*max))
            }
            FilterControl::DateRange { min, max } => format!("dates {min} ..= {max}"),
            FilterControl::TextMatch => "text match".to_string(),
            FilterControl::Fixed { value: Some(v) } => format!("fixed: {v}"),
            FilterControl::Fixed { value: None } => "fixed: empty".to_string(),
        };
        format!("{} [{}] {} (missing: {})", self.name, self.kind, control, self.missing)
    }
}

fn sort_options(options: &mut [String], numeric: bool) {
    if numeric {
        options.sort_by(|a, b| {
            let a = a.parse::<f64>().unwrap_or(f64::NAN);
            let b = b.parse::<f64>().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        });
    } else {
        options.sort();
    }
}

/// Profile a single column
pub fn profile_column(column: &Column, settings: &FilterSettings) -> Result<ColumnProfile> {
    let name = column.name().to_string();
    let dtype = column.dtype().clone();
    let keys = key_column(column)?;
    let missing = keys.null_count();
    let present = keys.len() - missing;

    let distinct = keys.into_series().drop_nulls().unique()?;
    let numeric = is_numeric_dtype(&dtype);

    if distinct.len() < settings.categorical_threshold {
        let mut options: Vec<String> = distinct.str()?.into_iter().flatten().map(String::from).collect();
        sort_options(&mut options, numeric);
        return Ok(ColumnProfile {
            name,
            kind: ColumnKind::Categorical,
            missing,
            control: FilterControl::ValueSet {
                options,
                has_missing: missing > 0,
            },
        });
    }

    if numeric {
        let values = numeric_values(column)?;
        let values = values.filter(&values.is_not_nan())?;
        let control = match (values.min(), values.max()) {
            (Some(min), Some(max)) if min != max => FilterControl::NumericRange { min, max },
            (Some(only), _) => FilterControl::Fixed { value: Some(format_number(only)) },
            _ => FilterControl::Fixed { value: None },
        };
        return Ok(ColumnProfile { name, kind: ColumnKind::Numeric, missing, control });
    }

    let days = date_days(column)?;
    let parsed = days.len() - days.null_count();
    let temporal =
        is_temporal_dtype(&dtype) || (parsed > 0 && parsed as f64 >= present as f64 * settings.date_parse_ratio);
    if temporal {
        // unparsable cells count as missing
        let missing = days.null_count();
        let bounds = (days.min().and_then(date_from_days), days.max().and_then(date_from_days));
        let control = match bounds {
            (Some(min), Some(max)) if min != max => FilterControl::DateRange { min, max },
            (Some(only), _) => FilterControl::Fixed { value: Some(only.to_string()) },
            _ => FilterControl::Fixed { value: None },
        };
        return Ok(ColumnProfile { name, kind: ColumnKind::Temporal, missing, control });
    }

    Ok(ColumnProfile {
        name,
        kind: ColumnKind::Text,
        missing,
        control: FilterControl::TextMatch,
    })
}

/// Profile every column of a frame. Empty frames yield no profiles.
pub fn profile_frame(df: &DataFrame, settings: &FilterSettings) -> Result<Vec<ColumnProfile>> {
    if df.height() == 0 {
        return Ok(Vec::new());
    }
    df.get_columns()
        .iter()
        .map(|column| profile_column(column, settings))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings() -> FilterSettings {
        FilterSettings::default()
    }

    macro_rules! col {
        ($name:expr, $values:expr) => {
            Column::from(Series::new($name.into(), $values))
        };
    }

    #[test]
    fn test_few_distinct_values_are_categorical() {
        let statuses = ["Open", "Closed", "On hold", "Draft"];
        let values: Vec<Option<&str>> = (0..100).map(|i| Some(statuses[i % 4])).collect();
        let p = profile_column(&col!("STATUS", values), &settings()).unwrap();

        assert_eq!(p.kind, ColumnKind::Categorical);
        match &p.control {
            FilterControl::ValueSet { options, has_missing } => {
                assert_eq!(options.len(), 4);
                assert!(!has_missing);
            }
            other => panic!("unexpected control {other:?}"),
        }
        let default = p.default_condition().unwrap();
        assert!(p.is_default(&default));
    }

    #[test]
    fn test_threshold_boundary() {
        // nine distinct values: categorical; ten: numeric range
        let nine: Vec<i64> = (0..9).collect();
        let ten: Vec<i64> = (0..10).collect();
        assert_eq!(profile_column(&col!("n", nine), &settings()).unwrap().kind, ColumnKind::Categorical);
        assert_eq!(profile_column(&col!("n", ten), &settings()).unwrap().kind, ColumnKind::Numeric);
    }

    #[test]
    fn test_numeric_range_uses_actual_extent() {
        let values: Vec<Option<i64>> = (0..=40).map(Some).chain([None]).collect();
        let p = profile_column(&col!("ACTUAL_FTE", values), &settings()).unwrap();
        assert_eq!(p.kind, ColumnKind::Numeric);
        assert_eq!(p.missing, 1);
        assert_eq!(p.control, FilterControl::NumericRange { min: 0.0, max: 40.0 });
    }

    #[test]
    fn test_single_value_numeric_column_has_no_range() {
        let settings = FilterSettings { categorical_threshold: 0, ..Default::default() };
        let p = profile_column(&col!("YEAR", vec![2025i64; 20]), &settings).unwrap();
        assert_eq!(p.kind, ColumnKind::Numeric);
        assert_eq!(p.control, FilterControl::Fixed { value: Some("2025".to_string()) });
        assert_eq!(p.default_condition(), None);
    }

    #[test]
    fn test_fixed_column_condition_is_default_only_when_it_keeps_the_value() {
        let settings = FilterSettings { categorical_threshold: 1, ..Default::default() };
        let p = profile_column(&col!("YEAR", vec![2025i64; 5]), &settings).unwrap();
        assert_eq!(p.control, FilterControl::Fixed { value: Some("2025".to_string()) });

        assert!(p.is_default(&FilterCondition::Between { min: 2020.0, max: 2030.0 }));
        assert!(!p.is_default(&FilterCondition::Between { min: 2026.0, max: 2030.0 }));
        assert!(p.is_default(&FilterCondition::Contains { pattern: "202".into(), regex: false }));
        assert!(!p.is_default(&FilterCondition::Contains { pattern: "^19".into(), regex: true }));

        let with_gap = profile_column(&col!("YEAR", vec![Some(2025i64), None]), &settings).unwrap();
        assert_eq!(with_gap.missing, 1);
        assert!(!with_gap.is_default(&FilterCondition::Between { min: 2020.0, max: 2030.0 }));
        let keep_all = FilterCondition::InList { values: ["2025".to_string()].into(), include_missing: true };
        assert!(with_gap.is_default(&keep_all));
    }

    #[test]
    fn test_all_missing_column() {
        let values: Vec<Option<&str>> = vec![None; 12];
        let p = profile_column(&col!("PM", values), &settings()).unwrap();
        assert_eq!(p.kind, ColumnKind::Categorical);
        assert_eq!(p.missing, 12);
        assert_eq!(
            p.control,
            FilterControl::ValueSet { options: vec![], has_missing: true }
        );
    }

    #[test]
    fn test_text_dates_with_garbage_are_temporal() {
        let mut values: Vec<String> = (1..=20).map(|d| format!("2025-01-{d:02}")).collect();
        values.push("soon".to_string());
        values.push("n/a".to_string());
        let p = profile_column(&col!("START_DATE", values), &settings()).unwrap();

        assert_eq!(p.kind, ColumnKind::Temporal);
        assert_eq!(p.missing, 2);
        assert_eq!(
            p.control,
            FilterControl::DateRange {
                min: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                max: NaiveDate::from_ymd_opt(2025, 1, 20).unwrap(),
            }
        );
    }

    #[test]
    fn test_free_text_column() {
        let values: Vec<String> = (0..30).map(|i| format!("Project {i}")).collect();
        let p = profile_column(&col!("PROJECT_DESCR", values), &settings()).unwrap();
        assert_eq!(p.kind, ColumnKind::Text);
        assert_eq!(p.control, FilterControl::TextMatch);
        assert!(p.is_default(&FilterCondition::Contains { pattern: "  ".into(), regex: false }));
    }

    #[test]
    fn test_empty_frame_profiles_nothing() {
        let df = DataFrame::new(vec![col!("a", Vec::<i64>::new())]).unwrap();
        assert!(profile_frame(&df, &settings()).unwrap().is_empty());
    }

    #[test]
    fn test_numeric_categorical_options_sort_numerically() {
        let p = profile_column(&col!("PROGRESS", vec![100i64, 20, 5, 20]), &settings()).unwrap();
        match p.control {
            FilterControl::ValueSet { options, .. } => assert_eq!(options, vec!["5", "20", "100"]),
            other => panic!("unexpected control {other:?}"),
        }
    }
}
