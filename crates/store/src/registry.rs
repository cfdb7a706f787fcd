//! Exclusion registry — the operator-maintained set of non-production user
//! ids plus the reporting timezone offset.
//!
//! Membership is not time-scoped: an excluded user is hidden from every
//! query over every range until removed. Queries take a `RegistrySnapshot`
//! once at the start and thread it through the whole computation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use stepline_core::config::ReportingConfig;
use stepline_core::{ReportingOffset, StepError, StepResult, UserId};
use tracing::{error, info};

/// A single excluded user. `created_at` is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionEntry {
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time view of the registry used by one query.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub offset: ReportingOffset,
    pub excluded: HashSet<UserId>,
}

impl RegistrySnapshot {
    pub fn is_excluded(&self, user_id: UserId) -> bool {
        self.excluded.contains(&user_id)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRegistry {
    reporting_offset: ReportingOffset,
    #[serde(default)]
    excluded: Vec<ExclusionEntry>,
}

/// Mutable exclusion list and reporting offset shared by every query.
pub struct ExclusionRegistry {
    excluded: DashMap<UserId, DateTime<Utc>>,
    offset: RwLock<ReportingOffset>,
    persist_path: Option<PathBuf>,
    persist_lock: Mutex<()>,
}

impl ExclusionRegistry {
    pub fn new(offset: ReportingOffset) -> Self {
        Self {
            excluded: DashMap::new(),
            offset: RwLock::new(offset),
            persist_path: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Build the registry from a persisted document if one exists at `path`,
    /// otherwise from the configured seeds. Mutations are written back to
    /// `path` when it is given.
    pub fn load_or_seed(path: Option<&Path>, seeds: &ReportingConfig) -> StepResult<Self> {
        let persisted = match path {
            Some(p) => Self::read_persisted(p)?,
            None => None,
        };

        let mut registry = match persisted {
            Some(doc) => {
                let registry = Self::new(doc.reporting_offset);
                for entry in doc.excluded {
                    registry.excluded.insert(entry.user_id, entry.created_at);
                }
                registry
            }
            None => {
                let registry = Self::new(ReportingOffset::parse(&seeds.default_offset)?);
                let now = Utc::now();
                for user_id in &seeds.excluded_users {
                    registry.excluded.insert(*user_id, now);
                }
                registry
            }
        };
        registry.persist_path = path.map(Path::to_path_buf);

        info!(
            offset = %registry.reporting_offset(),
            excluded = registry.excluded.len(),
            persisted = registry.persist_path.is_some(),
            "Exclusion registry initialized"
        );
        Ok(registry)
    }

    fn read_persisted(path: &Path) -> StepResult<Option<PersistedRegistry>> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StepError::Storage(format!("{}: {}", path.display(), e))),
        }
    }

    /// Exclude a user from all queries. Returns false if already excluded.
    pub fn add_excluded(&self, user_id: UserId) -> bool {
        let added = match self.excluded.entry(user_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Utc::now());
                true
            }
        };
        if added {
            metrics::counter!("exclusions.changed", "action" => "add").increment(1);
            info!(user_id, "User excluded from analytics");
            self.persist();
        }
        added
    }

    /// Re-include a user. Returns false if the user was not excluded.
    pub fn remove_excluded(&self, user_id: UserId) -> bool {
        let removed = self.excluded.remove(&user_id).is_some();
        if removed {
            metrics::counter!("exclusions.changed", "action" => "remove").increment(1);
            info!(user_id, "User re-included in analytics");
            self.persist();
        }
        removed
    }

    pub fn is_excluded(&self, user_id: UserId) -> bool {
        self.excluded.contains_key(&user_id)
    }

    /// Excluded user ids in ascending order.
    pub fn list_excluded(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.excluded.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn entries(&self) -> Vec<ExclusionEntry> {
        let mut entries: Vec<ExclusionEntry> = self
            .excluded
            .iter()
            .map(|e| ExclusionEntry {
                user_id: *e.key(),
                created_at: *e.value(),
            })
            .collect();
        entries.sort_by_key(|e| e.user_id);
        entries
    }

    /// Unpersisted copy of the exclusions under a different offset. Entries
    /// keep their original `created_at`.
    pub fn detached_with_offset(&self, offset: ReportingOffset) -> Self {
        let copy = Self::new(offset);
        for entry in self.excluded.iter() {
            copy.excluded.insert(*entry.key(), *entry.value());
        }
        copy
    }

    pub fn set_reporting_offset(&self, offset: ReportingOffset) {
        let previous = std::mem::replace(&mut *self.offset.write(), offset);
        if previous != offset {
            info!(from = %previous, to = %offset, "Reporting offset changed");
            self.persist();
        }
    }

    /// Parse and apply a `±HH:MM` offset. Malformed input is rejected
    /// without changing the current value.
    pub fn set_reporting_offset_str(&self, raw: &str) -> StepResult<ReportingOffset> {
        let offset = ReportingOffset::parse(raw)?;
        self.set_reporting_offset(offset);
        Ok(offset)
    }

    pub fn reporting_offset(&self) -> ReportingOffset {
        *self.offset.read()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            offset: self.reporting_offset(),
            excluded: self.excluded.iter().map(|e| *e.key()).collect(),
        }
    }

    fn persist(&self) {
        let Some(path) = &self.persist_path else {
            return;
        };
        let _guard = self.persist_lock.lock();
        let doc = PersistedRegistry {
            reporting_offset: self.reporting_offset(),
            excluded: self.entries(),
        };
        if let Err(e) = write_atomically(path, &doc) {
            metrics::counter!("exclusions.persist_errors").increment(1);
            error!(error = %e, path = %path.display(), "Failed to persist exclusion registry");
        }
    }
}

impl Default for ExclusionRegistry {
    fn default() -> Self {
        Self::new(ReportingOffset::utc())
    }
}

fn write_atomically(path: &Path, doc: &PersistedRegistry) -> StepResult<()> {
    let json = serde_json::to_vec_pretty(doc)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
