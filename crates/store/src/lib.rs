//! Append-only step event storage and the operator-controlled exclusion
//! registry.

pub mod journal;
pub mod log;
pub mod memory;
pub mod registry;

pub use journal::{JournalTask, JournalWriter};
pub use log::{EventLog, ScanFilter};
pub use memory::MemoryEventLog;
pub use registry::{ExclusionEntry, ExclusionRegistry, RegistrySnapshot};
