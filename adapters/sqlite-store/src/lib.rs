//! sqlite-store — SQLite implementation of the slot-store port for local/dev.
//!
//! Purpose
//! - Provide a lightweight, file-based slot store so synced state survives
//!   process restarts without cloud dependencies.
//! - Implements the `SlotStore` trait from the `state-sync` crate: a flat
//!   keyspace of serialized values, upserted whole on every write.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.

use std::path::Path;

use rusqlite::{params, Connection};
use state_sync::{SlotStore, StoreError};

/// SQLite-backed slot store for local development.
pub struct SqliteSlotStore {
    conn: std::sync::Mutex<Connection>,
}

impl SqliteSlotStore {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }

    /// Construct from env var `DB_PATH` (defaults to `./data/linklet.db`).
    pub fn from_env() -> Result<Self, StoreError> {
        let path = std::env::var("DB_PATH").unwrap_or_else(|_| "./data/linklet.db".to_string());
        // Ensure directory exists
        if let Some(dir) = std::path::Path::new(&path).parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        Self::new(path)
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS slots (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
    .map_err(map_sqerr)?;
    Ok(())
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Backend(format!("sqlite error: {e}"))
}

impl SlotStore for SqliteSlotStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("mutex poisoned".into()))?;
        let mut stmt = conn
            .prepare("SELECT value FROM slots WHERE key = ?1")
            .map_err(map_sqerr)?;
        let mut rows = stmt.query(params![key]).map_err(map_sqerr)?;
        match rows.next().map_err(map_sqerr)? {
            Some(row) => Ok(Some(row.get::<_, String>(0).map_err(map_sqerr)?)),
            None => Ok(None),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("mutex poisoned".into()))?;
        conn.execute(
            "INSERT INTO slots(key, value) VALUES(?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(map_sqerr)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn temp_store() -> (tempfile::TempDir, SqliteSlotStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteSlotStore::new(dir.path().join("slots.db")).expect("open");
        (dir, store)
    }

    #[test]
    fn absent_key_reads_as_none() {
        let (_dir, store) = temp_store();
        assert!(store.read("links").expect("read").is_none());
    }

    #[test]
    fn write_then_read_roundtrips() {
        let (_dir, store) = temp_store();
        store.write("links", r#"[{"code":"abc123"}]"#).expect("written");
        let raw = store.read("links").expect("read").expect("present");
        assert_eq!(raw, r#"[{"code":"abc123"}]"#);
    }

    #[test]
    fn write_overwrites_existing_value() {
        let (_dir, store) = temp_store();
        store.write("links", "[]").expect("written");
        store.write("links", r#"["x"]"#).expect("overwritten");
        assert_eq!(store.read("links").expect("read").as_deref(), Some(r#"["x"]"#));
    }

    #[test]
    fn values_survive_reopening_the_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("slots.db");
        {
            let store = SqliteSlotStore::new(&path).expect("open");
            store.write("links", "[1,2,3]").expect("written");
        }
        let store = SqliteSlotStore::new(&path).expect("reopen");
        assert_eq!(store.read("links").expect("read").as_deref(), Some("[1,2,3]"));
    }

    #[test]
    fn works_as_a_synced_state_backend() {
        let (_dir, store) = temp_store();
        let store: Arc<dyn SlotStore> = Arc::new(store);
        let hub = state_sync::ChangeHub::new();
        let state = state_sync::SyncedState::new(store.clone(), hub, "links", Vec::<u64>::new())
            .expect("bound");
        state.update(|v| {
            let mut v = v.clone();
            v.push(42);
            v
        })
        .expect("updated");
        assert_eq!(state.read(), vec![42]);

        let raw = store.read("links").expect("read").expect("present");
        assert_eq!(serde_json::from_str::<Vec<u64>>(&raw).expect("parse"), vec![42]);
    }
}
