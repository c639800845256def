//! Shared key-value state for one pipeline run.
//!
//! [`PipelineState`] is the plain map. [`StateHandle`] wraps it in an
//! `Arc<Mutex<_>>` so steps running on worker threads (timeouts, parallel
//! waves) mutate it one at a time.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{FlowError, Result};

/// Mapping from string key to arbitrary value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PipelineState {
    values: BTreeMap<String, Value>,
}

impl PipelineState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a stored value.
    pub fn get(&self, key: &str) -> Result<&Value> {
        self.values.get(key).ok_or_else(|| FlowError::MissingKey {
            key: key.to_string(),
        })
    }

    /// Store a value, replacing any previous one.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Remove a value, returning it if present.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Check if a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// All keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Key-value pairs in sorted key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the state is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Cloneable, thread-safe accessor for a [`PipelineState`].
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<Mutex<PipelineState>>,
}

impl StateHandle {
    /// Create a handle over an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle over an existing state.
    pub fn from_state(state: PipelineState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    // A step that panicked while holding the lock leaves the map intact,
    // so a poisoned lock is still safe to read.
    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get a copy of a stored value.
    pub fn get(&self, key: &str) -> Result<Value> {
        self.lock().get(key).cloned()
    }

    /// Get a stored value decoded into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.get(key)?;
        serde_json::from_value(value).map_err(|e| FlowError::StateDecode {
            key: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Store a value, replacing any previous one.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.lock().set(key, value);
    }

    /// Serialize and store a value.
    pub fn set_as<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|e| FlowError::StateDecode {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.set(key, value);
        Ok(())
    }

    /// Remove a value, returning it if present.
    pub fn remove(&self, key: &str) -> Option<Value> {
        self.lock().remove(key)
    }

    /// Check if a key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains(key)
    }

    /// All keys in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().map(String::from).collect()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> PipelineState {
        self.lock().clone()
    }
}
