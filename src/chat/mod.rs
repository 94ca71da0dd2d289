//! Data-grounded assistant.
//!
//! Questions are classified by keyword. Data questions are planned into one of the
//! fixed [`QueryOp`]s and answered verbatim from the dataset; an external model may
//! only add phrasing on top. General questions go to the model when one is configured.

pub mod answer;
pub mod intent;
pub mod normalize;
pub mod orchestrator;
pub mod query;
pub mod session;

pub use intent::{classify, Intent, QueryPlan};
pub use normalize::{normalize, resolve, MatchQuality, Resolution};
pub use orchestrator::{ChatSettings, Orchestrator, Outcome, Reply};
pub use query::{EntityProfile, QueryOp, QueryResult};
pub use session::ChatSession;
