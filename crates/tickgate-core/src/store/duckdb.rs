use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ::duckdb::{Connection, ToSql};
use serde_json::Value;

use super::{Collection, DurableStore, StoreBackend};
use crate::sync::lock_or_recover;
use crate::StoreError;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: "0001_documents",
    sql: r#"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    key TEXT NOT NULL,
    body TEXT NOT NULL,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY(collection, key)
);
"#,
}];

fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let params: [&dyn ToSql; 1] = [&migration.version];
        let applied_count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            params.as_slice(),
            |row| row.get(0),
        )?;

        if applied_count == 0 {
            connection.execute_batch(migration.sql)?;
            connection.execute(
                "INSERT INTO schema_migrations (version) VALUES (?)",
                params.as_slice(),
            )?;
        }
    }

    Ok(())
}

/// Embedded DuckDB database holding every collection as JSON text rows.
pub struct DuckDbStore {
    path: Option<PathBuf>,
    connection: Mutex<Connection>,
}

impl DuckDbStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let connection = Connection::open(&path)?;
        apply_migrations(&connection)?;
        Ok(Self {
            path: Some(path),
            connection: Mutex::new(connection),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let connection = Connection::open_in_memory()?;
        apply_migrations(&connection)?;
        Ok(Self {
            path: None,
            connection: Mutex::new(connection),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl DurableStore for DuckDbStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::DuckDb
    }

    fn read(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError> {
        let connection = lock_or_recover(&self.connection, "duckdb store");
        let name = collection.as_str();
        let params: [&dyn ToSql; 2] = [&name, &key];
        let body = connection.query_row(
            "SELECT body FROM documents WHERE collection = ? AND key = ?",
            params.as_slice(),
            |row| row.get::<_, String>(0),
        );

        match body {
            Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
            Err(::duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn upsert(&self, collection: Collection, key: &str, document: &Value) -> Result<(), StoreError> {
        let body = serde_json::to_string(document)?;
        let connection = lock_or_recover(&self.connection, "duckdb store");
        let name = collection.as_str();
        let params: [&dyn ToSql; 3] = [&name, &key, &body];
        connection.execute(
            "INSERT OR REPLACE INTO documents (collection, key, body, updated_at) \
             VALUES (?, ?, ?, CURRENT_TIMESTAMP)",
            params.as_slice(),
        )?;
        Ok(())
    }

    fn remove(&self, collection: Collection, key: &str) -> Result<bool, StoreError> {
        let connection = lock_or_recover(&self.connection, "duckdb store");
        let name = collection.as_str();
        let params: [&dyn ToSql; 2] = [&name, &key];
        let removed = connection.execute(
            "DELETE FROM documents WHERE collection = ? AND key = ?",
            params.as_slice(),
        )?;
        Ok(removed > 0)
    }

    fn scan(&self, collection: Collection) -> Result<Vec<(String, Value)>, StoreError> {
        let connection = lock_or_recover(&self.connection, "duckdb store");
        let mut statement =
            connection.prepare("SELECT key, body FROM documents WHERE collection = ? ORDER BY key")?;
        let name = collection.as_str();
        let params: [&dyn ToSql; 1] = [&name];
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (key, body) = row?;
            documents.push((key, serde_json::from_str(&body)?));
        }
        Ok(documents)
    }

    fn clear(&self, collection: Collection) -> Result<(), StoreError> {
        let connection = lock_or_recover(&self.connection, "duckdb store");
        let name = collection.as_str();
        let params: [&dyn ToSql; 1] = [&name];
        connection.execute("DELETE FROM documents WHERE collection = ?", params.as_slice())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("tickgate.duckdb");
        drop(DuckDbStore::open(&path).expect("first open"));
        let store = DuckDbStore::open(&path).expect("second open");
        assert_eq!(store.path(), Some(path.as_path()));
    }

    #[test]
    fn upsert_replaces_existing_document() {
        let store = DuckDbStore::open_in_memory().expect("open store");
        store
            .upsert(Collection::ApiConfig, "finnhub", &json!({"priority": 4}))
            .expect("first upsert");
        store
            .upsert(Collection::ApiConfig, "finnhub", &json!({"priority": 1}))
            .expect("second upsert");

        let documents = store.scan(Collection::ApiConfig).expect("scan");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].1["priority"], 1);
    }

    #[test]
    fn read_missing_key_is_none() {
        let store = DuckDbStore::open_in_memory().expect("open store");
        assert!(store
            .read(Collection::RateLimits, "polygon")
            .expect("read")
            .is_none());
    }
}
