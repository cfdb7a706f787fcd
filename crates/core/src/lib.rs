//! Shared data model, reporting-time primitives, errors and configuration
//! for the stepline analytics engine.

pub mod config;
pub mod error;
pub mod time;
pub mod types;

pub use config::AppConfig;
pub use error::{StepError, StepResult};
pub use time::{parse_day, DayRange, ReportingOffset};
pub use types::{EventId, NewEvent, StepEvent, UserId};
