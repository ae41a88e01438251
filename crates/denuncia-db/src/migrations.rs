use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Create the schema if it is not there yet. Safe to run on every start.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS denuncias (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            latitude      REAL NOT NULL,
            longitude     REAL NOT NULL,
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            client_ip     TEXT,
            client_agent  TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_denuncias_created_at
            ON denuncias(created_at);
        ",
    )?;

    info!("Database schema ready");
    Ok(())
}
