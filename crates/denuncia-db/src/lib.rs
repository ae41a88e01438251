pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

pub use models::{CountWindow, NewReport, ReportPage, ReportRow};

pub struct Database {
    conn: Mutex<Connection>,
}

/// Exclusive access to the connection for as long as it is held.
///
/// Lets a caller take the lock first and decide whether to run anything at
/// all before touching the database.
pub struct Session<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl Session<'_> {
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

impl Database {
    /// Open (or create) the report database at `path`.
    ///
    /// `busy_timeout` bounds how long a statement waits on a locked database
    /// before failing.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(busy_timeout)?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Block until the connection is free and hold it.
    pub fn session(&self) -> Result<Session<'_>> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        Ok(Session { conn })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let session = self.session()?;
        f(session.conn())
    }

    /// Close the underlying connection, reporting any error SQLite raises
    /// while finalizing it.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        conn.close().map_err(|(_, e)| e)?;
        info!("Database connection closed");
        Ok(())
    }
}
