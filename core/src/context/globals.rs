use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::BuildError;

/// Well-known global keys.
pub mod keys {
    pub const PROJECT_NAME: &str = "project_name";
    pub const DATABASE_KIND: &str = "database_kind";
    pub const OUTPUT_ROOT: &str = "output_root";
    pub const PROJECT_DESCRIPTION: &str = "project_description";
}

/// Run-wide values shared by every handler (project name, output root, ...).
///
/// Values are stored as JSON and read back through serde, so a typed read of
/// a value stored under another shape fails cleanly.
#[derive(Debug, Default)]
pub struct GlobalContext {
    values: RwLock<HashMap<String, Value>>,
}

impl GlobalContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Value>> {
        match self.values.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Value>> {
        match self.values.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: T) -> Result<(), BuildError> {
        let value = serde_json::to_value(value)
            .map_err(|e| BuildError::invalid_parameter(format!("global '{key}': {e}")))?;
        self.write().insert(key.to_string(), value);
        Ok(())
    }

    /// Typed read. `None` when absent or of another shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.read().get(key).cloned()?;
        serde_json::from_value(value).ok()
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get::<String>(key)
    }

    /// Typed read that reports absence as missing configuration.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, BuildError> {
        self.get(key)
            .ok_or_else(|| BuildError::missing_config(format!("global '{key}' is not set")))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write().remove(key)
    }

    pub fn snapshot(&self) -> HashMap<String, Value> {
        self.read().clone()
    }
}
