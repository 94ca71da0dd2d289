pub mod cells;
pub mod schedule;
pub mod schema;
pub mod types;

pub use cells::CellValue;
pub use schedule::{Lovs, Schedule};
pub use schema::{Field, FieldKind, LoadReport, RawCell, ScheduleRecord, SchemaError, MONTHS};
pub use types::*;
