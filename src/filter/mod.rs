//! Dataframe filter builder.
//!
//! [`FilterBuilder`] profiles a frame once and then applies [`FilterSpec`]s to it.
//! The source frame is never modified; results are [`FilteredView`]s that keep
//! the surviving row indices so other columns can be re-attached.

pub mod condition;
pub mod profile;

pub use condition::{apply, apply_projected, ColumnFilter, FilterCondition, FilterSpec, FilteredView};
pub use profile::{profile_column, profile_frame, ColumnKind, ColumnProfile, FilterControl, FilterSettings};

use color_eyre::Result;
use color_eyre::eyre::eyre;
use polars::prelude::DataFrame;

/// Profiles for one frame, plus the settings they were built with
#[derive(Debug, Clone)]
pub struct FilterBuilder {
    settings: FilterSettings,
    excluded: Vec<String>,
    profiles: Vec<ColumnProfile>,
}

impl FilterBuilder {
    /// Profile every column of `df`
    pub fn new(df: &DataFrame, settings: FilterSettings) -> Result<Self> {
        Self::excluding(df, settings, Vec::new())
    }

    /// Profile every column of `df` except `excluded`
    pub fn excluding(df: &DataFrame, settings: FilterSettings, excluded: Vec<String>) -> Result<Self> {
        let profiles = profile_frame(df, &settings)?
            .into_iter()
            .filter(|p| !excluded.contains(&p.name))
            .collect();
        Ok(Self { settings, excluded, profiles })
    }

    pub fn profiles(&self) -> &[ColumnProfile] {
        &self.profiles
    }

    pub fn profile(&self, column: &str) -> Option<&ColumnProfile> {
        self.profiles.iter().find(|p| p.name == column)
    }

    pub fn settings(&self) -> &FilterSettings {
        &self.settings
    }

    /// A spec where every column sits at its no-op default
    pub fn default_spec(&self) -> FilterSpec {
        FilterSpec::defaults(&self.profiles)
    }

    /// Check that every filter targets a profiled column with a matching control
    pub fn validate(&self, spec: &FilterSpec) -> Result<()> {
        for filter in &spec.filters {
            if self.excluded.contains(&filter.column) {
                return Err(eyre!("Column '{}' cannot be filtered here", filter.column));
            }
            let profile = self
                .profile(&filter.column)
                .ok_or_else(|| eyre!("Unknown column '{}'", filter.column))?;
            let fits = matches!(
                (&profile.control, &filter.condition),
                (FilterControl::ValueSet { .. }, FilterCondition::InList { .. })
                    | (FilterControl::NumericRange { .. }, FilterCondition::Between { .. })
                    | (FilterControl::DateRange { .. }, FilterCondition::DateBetween { .. })
                    | (_, FilterCondition::Contains { .. })
                    | (FilterControl::Fixed { .. }, _)
            );
            if !fits {
                return Err(eyre!(
                    "Filter {} does not fit column '{}' ({})",
                    filter.condition,
                    filter.column,
                    profile.kind
                ));
            }
        }
        Ok(())
    }

    /// Apply a spec to `df`, honoring the excluded columns
    pub fn apply(&self, df: &DataFrame, spec: &FilterSpec) -> Result<FilteredView> {
        if self.excluded.is_empty() {
            apply(df, spec, &self.settings)
        } else {
            apply_projected(df, &self.excluded, spec, &self.settings)
        }
    }
}
