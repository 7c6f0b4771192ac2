//! Key/value persistence seam.
//!
//! Every component reads and writes its state through [`KeyValueStore`], so the
//! engine can run over SQLite in the binary and over [`MemoryStore`] in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Async get/set store of JSON values
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` when the key was never written
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Overwrite the value at `key`
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Delete the value at `key` (no-op if absent)
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Typed helpers over any [`KeyValueStore`]
#[async_trait]
pub trait StoreExt: KeyValueStore {
    /// Load and deserialize; JSON `null` reads as `None`
    async fn load<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(Value::Null) | None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .with_context(|| format!("Failed to decode stored value for '{key}'")),
        }
    }

    /// Load, or the type's default when absent
    async fn load_or_default<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Default + Send,
    {
        Ok(self.load(key).await?.unwrap_or_default())
    }

    /// Serialize and store
    async fn save<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value)
            .with_context(|| format!("Failed to encode value for '{key}'"))?;
        self.set(key, value).await
    }

    /// Append to a JSON array stored at `key`, keeping only the newest `cap` items
    async fn append_capped<T>(&self, key: &str, item: T, cap: Option<usize>) -> Result<()>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let mut items: Vec<T> = self.load(key).await?.unwrap_or_default();
        items.push(item);
        if let Some(cap) = cap {
            if items.len() > cap {
                let excess = items.len() - cap;
                items.drain(..excess);
            }
        }
        self.save(key, &items).await
    }
}

impl<S: KeyValueStore + ?Sized> StoreExt for S {}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.values.write().await.remove(key);
        Ok(())
    }
}
