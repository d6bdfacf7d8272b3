// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Entry persistence: where sealed values live at rest.
//
// Schema:
//   entries(
//     row_id     TEXT PRIMARY KEY,   -- SHA-256 hex of the logical key
//     sealed     BLOB NOT NULL,      -- nonce || ciphertext || tag
//     updated_at TEXT NOT NULL       -- RFC 3339
//   )

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, instrument};
use trustkit_core::error::{Result, TrustKitError};

use crate::entry::EncryptedEntry;

/// Convert a `rusqlite::Error` into a `TrustKitError::Storage`.
fn db_err(e: rusqlite::Error) -> TrustKitError {
    TrustKitError::Storage(e.to_string())
}

fn poisoned() -> TrustKitError {
    TrustKitError::Storage("entry store lock poisoned".into())
}

/// Backing store for sealed entries. Implementations only ever see row ids
/// and ciphertext.
pub trait EntryPersistence: Send + Sync {
    fn get(&self, row_id: &str) -> Result<Option<EncryptedEntry>>;

    /// Insert or replace. Last write wins.
    fn put(&self, entry: &EncryptedEntry) -> Result<()>;

    /// Remove one row. Missing rows are not an error.
    fn remove(&self, row_id: &str) -> Result<()>;

    /// Remove every row.
    fn clear(&self) -> Result<()>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl<T: EntryPersistence + ?Sized> EntryPersistence for Arc<T> {
    fn get(&self, row_id: &str) -> Result<Option<EncryptedEntry>> {
        (**self).get(row_id)
    }

    fn put(&self, entry: &EncryptedEntry) -> Result<()> {
        (**self).put(entry)
    }

    fn remove(&self, row_id: &str) -> Result<()> {
        (**self).remove(row_id)
    }

    fn clear(&self) -> Result<()> {
        (**self).clear()
    }

    fn len(&self) -> Result<usize> {
        (**self).len()
    }
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// Entries in a SQLite database in the app's private data directory.
pub struct SqliteEntryStore {
    conn: Mutex<Connection>,
}

impl SqliteEntryStore {
    /// Open (or create) the entry database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                row_id     TEXT PRIMARY KEY,
                sealed     BLOB NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .map_err(db_err)?;

        debug!("entry store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| poisoned())
    }
}

impl EntryPersistence for SqliteEntryStore {
    fn get(&self, row_id: &str) -> Result<Option<EncryptedEntry>> {
        let conn = self.conn()?;
        let sealed: Option<Vec<u8>> = conn
            .query_row(
                "SELECT sealed FROM entries WHERE row_id = ?1",
                params![row_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(sealed.map(|s| EncryptedEntry::new(row_id, s)))
    }

    fn put(&self, entry: &EncryptedEntry) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn()?
            .execute(
                "INSERT INTO entries (row_id, sealed, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(row_id) DO UPDATE SET
                    sealed = excluded.sealed,
                    updated_at = excluded.updated_at",
                params![entry.row_id, entry.sealed, now],
            )
            .map_err(db_err)?;
        Ok(())
    }

    fn remove(&self, row_id: &str) -> Result<()> {
        let removed = self
            .conn()?
            .execute("DELETE FROM entries WHERE row_id = ?1", params![row_id])
            .map_err(db_err)?;
        debug!(removed, "entry removed");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let removed = self
            .conn()?
            .execute("DELETE FROM entries", [])
            .map_err(db_err)?;
        debug!(removed, "entry store cleared");
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as usize)
    }
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// Process-lifetime entries, for tests and ephemeral hosts.
#[derive(Default)]
pub struct MemoryEntryStore {
    rows: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntryPersistence for MemoryEntryStore {
    fn get(&self, row_id: &str) -> Result<Option<EncryptedEntry>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows
            .get(row_id)
            .map(|s| EncryptedEntry::new(row_id, s.clone())))
    }

    fn put(&self, entry: &EncryptedEntry) -> Result<()> {
        self.rows
            .write()
            .map_err(|_| poisoned())?
            .insert(entry.row_id.clone(), entry.sealed.clone());
        Ok(())
    }

    fn remove(&self, row_id: &str) -> Result<()> {
        self.rows.write().map_err(|_| poisoned())?.remove(row_id);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.rows.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.rows.read().map_err(|_| poisoned())?.len())
    }
}
