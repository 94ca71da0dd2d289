#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_match)]
#![allow(clippy::collapsible_else_if)]

pub mod chat;
pub mod config;
pub mod core;
pub mod filter;
pub mod logging;
pub mod providers;
pub mod services;

// Re-export commonly used types
pub use chat::{ChatSession, ChatSettings, Orchestrator, Reply};
pub use core::{CsvImportOptions, Field, ImportMode, Schedule, ScheduleRecord, SourceType};
pub use filter::{FilterBuilder, FilterSettings, FilterSpec, FilteredView};
pub use services::{DataService, DatasetStore};
