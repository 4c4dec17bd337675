use anyhow::{anyhow, Context, Result};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;

/// Byte-oriented key/value medium the expiring cache writes through
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

/// In-process store, lost on exit
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|entry| entry.key().clone()).collect())
    }
}

/// SQLite-backed store so cached responses survive between runs
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open cache database: {}", db_path))?;
        Self::init(conn)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("Cache database lock poisoned"))?;
        Ok(f(&conn)?)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT value FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
        })
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
        })?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key]))?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT key FROM kv_entries")?;
            let keys = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(keys)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get("quote:AAPL").unwrap(), None);

        store.set("quote:AAPL", b"178.25").unwrap();
        store.set("quote:AAPL", b"180.00").unwrap();
        store.set("news:apple", b"[]").unwrap();

        assert_eq!(store.get("quote:AAPL").unwrap(), Some(b"180.00".to_vec()));

        let mut keys = store.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["news:apple".to_string(), "quote:AAPL".to_string()]);

        store.delete("quote:AAPL").unwrap();
        assert_eq!(store.get("quote:AAPL").unwrap(), None);
        assert_eq!(store.keys().unwrap().len(), 1);
    }

    #[test]
    fn test_memory_store() {
        assert!(MemoryStore::default().keys().unwrap().is_empty());
        exercise(&MemoryStore::new());
    }

    #[test]
    fn test_sqlite_store() {
        let store = SqliteStore::in_memory().unwrap();
        exercise(&store);
    }
}
