//! Process-wide typed key/value store (spec §2, §9).
//!
//! Populated once from startup configuration and thereafter mutated only
//! by explicit admin actions — never by the scheduler, executor, webhook
//! engine, broadcast bus, watchfolder scanner, or registrar loops.
//!
//! Grounded in the original implementation's `internal/cfg` package: a
//! single global typed map with `Get`/`Set`/`Has` accessors. The original
//! panics on a type mismatch; here a mismatch returns
//! `CoreError::InvariantViolation` instead, since panicking on a
//! configuration typo is not an idiom this workspace uses elsewhere.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CoreError, Result};

#[derive(Debug, Default)]
pub struct ConfigStore {
    values: DashMap<String, Value>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_raw(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.clone())
    }

    /// Typed lookup. Returns `InvariantViolation` rather than panicking
    /// when the stored value doesn't deserialize as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let raw = self
            .values
            .get(key)
            .ok_or_else(|| CoreError::NotFound(format!("config key not set: {key}")))?;
        serde_json::from_value(raw.clone()).map_err(|e| {
            CoreError::InvariantViolation(format!("config key {key} has wrong type: {e}"))
        })
    }

    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        self.get(key)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_round_trip() {
        let store = ConfigStore::new();
        store.set("max_concurrent_tasks", 4);
        assert_eq!(store.get::<i64>("max_concurrent_tasks").unwrap(), 4);
    }

    #[test]
    fn missing_key_is_not_found() {
        let store = ConfigStore::new();
        assert!(matches!(
            store.get::<String>("nope"),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn type_mismatch_is_invariant_violation() {
        let store = ConfigStore::new();
        store.set("name", "not-a-number");
        assert!(matches!(
            store.get::<i64>("name"),
            Err(CoreError::InvariantViolation(_))
        ));
    }
}
