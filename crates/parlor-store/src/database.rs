//! Database connection management.
//!
//! The [`Store`] owns a single [`rusqlite::Connection`] behind a mutex and
//! guarantees that migrations have run before any other operation. All
//! operations are brief synchronous calls; connection tasks invoke them
//! inline.
//!
//! Transactional composition: public operations open one transaction and
//! delegate to `*_tx` helpers that take the open transaction, so operations
//! built out of other operations share a single commit.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::Result;
use crate::migrations;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "opening database");
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// An in-memory database, for tests and ephemeral deployments.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Lock the connection. A poisoned lock is recovered: SQLite state is
    /// consistent after a panicked statement, the transaction rolled back.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_at_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = Store::open_at(&path).expect("should open");
        drop(store);
        assert!(path.exists());
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        Store::open_at(&path).unwrap();
        Store::open_at(&path).unwrap();
    }
}
