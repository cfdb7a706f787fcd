//! Step analytics — localized event view, session reconstruction, daily
//! active users, funnels and attribute distributions.
//!
//! Every aggregate is computed at query time from the event log and a
//! snapshot of the exclusion registry; nothing is cached.

pub mod attributes;
pub mod dau;
pub mod engine;
pub mod funnel;
pub mod sessions;
pub mod view;

pub use attributes::AttributeRow;
pub use engine::{AnalyticsEngine, SessionsReport};
pub use funnel::{Dropoff, FunnelReport, FunnelRow, FunnelStepResult};
pub use sessions::{Session, SessionReconstructor, SessionState, SessionSummary};
pub use view::{LocalizedEvent, LocalizedView, QueryOptions};

/// `part` as a percentage of `whole`, or `None` when `whole` is zero.
pub(crate) fn percent_of(part: f64, whole: u64) -> Option<f64> {
    if whole == 0 {
        None
    } else {
        Some(part / whole as f64 * 100.0)
    }
}
