pub mod data_service;
pub mod sample;
pub mod store;
pub mod workbook;

pub use data_service::{to_fte, DataService, OpenOutcome, RecordError};
pub use store::{DatasetStore, Snapshot};
