use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::store::{PersistenceResult, StateStore};

/// Diagnostic record written immediately before the process recycles itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartRecord {
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub cycle_count: u32,
}

impl RestartRecord {
    pub fn new(reason: impl Into<String>, cycle_count: u32) -> Self {
        Self {
            timestamp: Utc::now(),
            reason: reason.into(),
            cycle_count,
        }
    }

    pub fn save(&self, store: &dyn StateStore, key: &str) -> PersistenceResult<()> {
        store.save(key, &serde_json::to_value(self)?)
    }

    pub fn load(store: &dyn StateStore, key: &str) -> PersistenceResult<Option<Self>> {
        match store.load(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}
