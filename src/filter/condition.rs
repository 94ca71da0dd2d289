//! Filter conditions, specs, and the row-preserving view they produce.

use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;

use chrono::NaiveDate;
use color_eyre::Result;
use polars::prelude::*;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::core::cells::{date_days, days_since_epoch, key_column, numeric_values};
use crate::core::schema::parse_date;
use crate::filter::profile::{profile_frame, ColumnProfile, FilterSettings};

/// Predicate for a single column
#[derive(Debug, Clone, PartialEq, Display, Serialize, Deserialize)]
pub enum FilterCondition {
    /// Value must be one of the selected values; missing cells pass when `include_missing`
    InList { values: BTreeSet<String>, include_missing: bool },
    /// Inclusive numeric range; missing or non-numeric cells fail
    Between { min: f64, max: f64 },
    /// Inclusive date range; missing or unparsable cells fail
    DateBetween { start: NaiveDate, end: NaiveDate },
    /// Case-insensitive substring (or regex); missing cells fail
    Contains { pattern: String, regex: bool },
}

impl FilterCondition {
    /// A text condition with no pattern filters nothing
    pub fn is_blank(&self) -> bool {
        matches!(self, FilterCondition::Contains { pattern, .. } if pattern.trim().is_empty())
    }

    /// Whether a cell whose display key is `key` passes; `None` is a missing cell
    pub fn admits(&self, key: Option<&str>) -> bool {
        let Some(key) = key else {
            return matches!(self, FilterCondition::InList { include_missing: true, .. });
        };
        match self {
            FilterCondition::InList { values, .. } => values.contains(key),
            FilterCondition::Between { min, max } => key.parse::<f64>().is_ok_and(|v| *min <= v && v <= *max),
            FilterCondition::DateBetween { start, end } => parse_date(key).is_some_and(|d| *start <= d && d <= *end),
            FilterCondition::Contains { pattern, regex: false } => key.to_lowercase().contains(&pattern.to_lowercase()),
            FilterCondition::Contains { pattern, regex: true } => RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .is_ok_and(|re| re.is_match(key)),
        }
    }
}

fn strict(mask: BooleanChunked) -> Result<BooleanChunked> {
    Ok(mask.fill_null_with_values(false)?)
}

/// Filter applied to a column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub column: String,
    pub condition: FilterCondition,
}

impl ColumnFilter {
    pub fn new(column: impl Into<String>, condition: FilterCondition) -> Self {
        Self { column: column.into(), condition }
    }

    /// Evaluate this filter against every row of the frame. Missing cells
    /// only pass an `InList` that includes them.
    pub fn create_mask(&self, df: &DataFrame) -> Result<BooleanChunked> {
        let column = df
            .column(&self.column)
            .map_err(|e| color_eyre::eyre::eyre!("Filter references unknown column '{}': {}", self.column, e))?;

        match &self.condition {
            FilterCondition::InList { values, include_missing } => {
                let keys = key_column(column)?;
                let mut mask = BooleanChunked::full(PlSmallStr::EMPTY, false, keys.len());
                for value in values {
                    mask = mask | keys.equal(value.as_str());
                }
                let mask = strict(mask)?;
                if *include_missing { Ok(mask | keys.is_null()) } else { Ok(mask) }
            }
            FilterCondition::Between { min, max } => {
                let values = numeric_values(column)?;
                strict(values.gt_eq(*min) & values.lt_eq(*max))
            }
            FilterCondition::DateBetween { start, end } => {
                let days = date_days(column)?;
                strict(days.gt_eq(days_since_epoch(*start)) & days.lt_eq(days_since_epoch(*end)))
            }
            FilterCondition::Contains { pattern, regex: true } => {
                let keys = key_column(column)?;
                let mask = keys
                    .contains(&format!("(?i){pattern}"), true)
                    .map_err(|e| color_eyre::eyre::eyre!("Invalid filter pattern '{}': {}", pattern, e))?;
                strict(mask)
            }
            FilterCondition::Contains { pattern, regex: false } => {
                let keys = key_column(column)?;
                strict(keys.to_lowercase().contains_literal(&pattern.to_lowercase())?)
            }
        }
    }
}

/// A conjunction of column filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub filters: Vec<ColumnFilter>,
}

impl FilterSpec {
    pub fn new(filters: Vec<ColumnFilter>) -> Self {
        Self { filters }
    }

    /// Add or replace the filter for a column
    pub fn set(&mut self, column: impl Into<String>, condition: FilterCondition) {
        let column = column.into();
        match self.filters.iter_mut().find(|f| f.column == column) {
            Some(existing) => existing.condition = condition,
            None => self.filters.push(ColumnFilter { column, condition }),
        }
    }

    pub fn get(&self, column: &str) -> Option<&FilterCondition> {
        self.filters.iter().find(|f| f.column == column).map(|f| &f.condition)
    }

    /// Spec holding every profile's default condition
    pub fn defaults(profiles: &[ColumnProfile]) -> Self {
        Self {
            filters: profiles
                .iter()
                .filter_map(|p| p.default_condition().map(|c| ColumnFilter::new(p.name.clone(), c)))
                .collect(),
        }
    }

    /// Filters that can remove rows, given the frame's profiles
    pub fn active<'a>(&'a self, profiles: &[ColumnProfile]) -> Vec<&'a ColumnFilter> {
        self.filters
            .iter()
            .filter(|f| {
                if f.condition.is_blank() {
                    return false;
                }
                match profiles.iter().find(|p| p.name == f.column) {
                    Some(profile) => !profile.is_default(&f.condition),
                    None => true,
                }
            })
            .collect()
    }

    /// AND of the given filters' masks
    pub fn combined_mask(filters: &[&ColumnFilter], df: &DataFrame) -> Result<BooleanChunked> {
        let mut mask = BooleanChunked::full(PlSmallStr::EMPTY, true, df.height());
        for filter in filters {
            mask = mask & filter.create_mask(df)?;
        }
        Ok(mask)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }
}

/// Result of filtering: surviving original row indices plus the rows themselves
#[derive(Debug, Clone)]
pub struct FilteredView {
    /// Indices into the source frame, ascending
    pub rows: Vec<usize>,
    pub frame: DataFrame,
}

impl FilteredView {
    /// Unfiltered view over a frame
    pub fn all(df: &DataFrame) -> Self {
        Self {
            rows: (0..df.height()).collect(),
            frame: df.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows of `source` at this view's indices, with all of `source`'s columns
    pub fn project(&self, source: &DataFrame) -> Result<DataFrame> {
        let idx: Vec<IdxSize> = self.rows.iter().map(|r| *r as IdxSize).collect();
        let idx = IdxCa::from_vec(PlSmallStr::EMPTY, idx);
        Ok(source.take(&idx)?)
    }

    /// Filter this view again; indices keep pointing into the original source
    pub fn refine(&self, spec: &FilterSpec, settings: &FilterSettings) -> Result<FilteredView> {
        let local = apply(&self.frame, spec, settings)?;
        Ok(FilteredView {
            rows: local.rows.iter().map(|r| self.rows[*r]).collect(),
            frame: local.frame,
        })
    }
}

/// Apply a spec to a frame. The source is never modified.
pub fn apply(df: &DataFrame, spec: &FilterSpec, settings: &FilterSettings) -> Result<FilteredView> {
    if df.height() == 0 {
        return Ok(FilteredView::all(df));
    }
    let profiles = profile_frame(df, settings)?;
    let active = spec.active(&profiles);
    if active.is_empty() {
        return Ok(FilteredView::all(df));
    }
    debug!("applying {} active filters to {} rows", active.len(), df.height());

    let mask = FilterSpec::combined_mask(&active, df)?;
    let frame = df.filter(&mask)?;
    let rows: Vec<usize> = mask
        .into_iter()
        .enumerate()
        .filter_map(|(i, keep)| (keep == Some(true)).then_some(i))
        .collect();
    Ok(FilteredView { rows, frame })
}

/// Filter on every column except `excluded`, then re-attach the excluded
/// columns from `df` by surviving row index.
pub fn apply_projected(
    df: &DataFrame,
    excluded: &[String],
    spec: &FilterSpec,
    settings: &FilterSettings,
) -> Result<FilteredView> {
    let kept: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|n| n.to_string())
        .filter(|n| !excluded.contains(n))
        .collect();
    let projected = df.select(kept)?;
    let view = apply(&projected, spec, settings)?;
    let frame = view.project(df)?;
    Ok(FilteredView { rows: view.rows, frame })
}
