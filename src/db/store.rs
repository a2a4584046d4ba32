use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use super::queries;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub trait KeyValueStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("database lock poisoned".to_string()))
    }
}

impl KeyValueStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let db = self.lock()?;
        Ok(queries::get_value(&db, key)?)
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let db = self.lock()?;
        queries::put_value(&db, key, value)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self
            .values
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    #[test]
    fn test_sqlite_store_round_trip() {
        let store = SqliteStore::new(init_db(":memory:").unwrap());
        assert!(store.load("k").unwrap().is_none());
        store.save("k", "v").unwrap();
        assert_eq!(store.load("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        store.save("k", "v1").unwrap();
        store.save("k", "v2").unwrap();
        assert_eq!(store.load("k").unwrap().as_deref(), Some("v2"));
    }
}
