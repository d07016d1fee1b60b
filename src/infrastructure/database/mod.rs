//! SQLite storage
//!
//! [`Storage`] is a cheap handle that every execution context clones and then
//! connects on its own, so no connection is ever shared between threads.

use crate::application::errors::StorageError;
use rusqlite::{Connection, OptionalExtension, Params, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new connection to the database file.
    pub fn connect(&self) -> Result<Database, StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Conflict(format!("cannot create {}: {}", parent.display(), e)))?;
            }
        }
        Database::open(&self.path)
    }
}

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn })
    }

    /// Create `name` with the given column definitions unless it exists.
    pub fn checkout_table(&self, name: &str, schema: &str) -> Result<(), StorageError> {
        debug!(table = %name, "Checking out table");
        self.conn
            .execute(&format!("CREATE TABLE IF NOT EXISTS {} ({})", name, schema), [])?;
        Ok(())
    }

    /// Run a statement, returning the number of affected rows.
    pub fn execute<P: Params>(&self, sql: &str, params: P) -> Result<usize, StorageError> {
        Ok(self.conn.execute(sql, params)?)
    }

    pub fn query<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Vec<T>, StorageError>
    where
        P: Params,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, f)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn query_opt<T, P, F>(&self, sql: &str, params: P, f: F) -> Result<Option<T>, StorageError>
    where
        P: Params,
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        Ok(self.conn.query_row(sql, params, f).optional()?)
    }

    /// Run `f` inside a transaction, committing only if it succeeds.
    pub fn transaction<T>(
        &mut self,
        f: impl FnOnce(&Connection) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let tx = self.conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Key/value configuration table shared by all plugins
pub struct Conf {
    db: Database,
}

impl Conf {
    pub const TABLE: &'static str = "Conf";
    const SCHEMA: &'static str = "Key TEXT PRIMARY KEY, Value TEXT NOT NULL";

    pub fn new(storage: &Storage) -> Result<Self, StorageError> {
        Self::with_database(storage.connect()?)
    }

    pub fn with_database(db: Database) -> Result<Self, StorageError> {
        db.checkout_table(Self::TABLE, Self::SCHEMA)?;
        Ok(Self { db })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.db
            .query_opt("SELECT Value FROM Conf WHERE Key = ?1", [key], |row| row.get(0))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.db
            .execute("REPLACE INTO Conf (Key, Value) VALUES (?1, ?2)", [key, value])?;
        Ok(())
    }

    /// Returns whether the key existed.
    pub fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.db.execute("DELETE FROM Conf WHERE Key = ?1", [key])? > 0)
    }

    pub fn list(&self) -> Result<Vec<(String, String)>, StorageError> {
        self.db.query("SELECT Key, Value FROM Conf ORDER BY Key", [], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })
    }
}
