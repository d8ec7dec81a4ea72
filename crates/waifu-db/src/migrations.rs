use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            user_id     INTEGER PRIMARY KEY,
            last_roll   TEXT,
            quote       TEXT NOT NULL DEFAULT '',
            favorite    INTEGER,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- One row per (owner, character); the same character ID may be
        -- owned by many users.
        CREATE TABLE IF NOT EXISTS characters (
            user_id     INTEGER NOT NULL REFERENCES users(user_id),
            id          INTEGER NOT NULL,
            name        TEXT NOT NULL,
            image       TEXT NOT NULL,
            type        TEXT NOT NULL,
            acquired_at TEXT NOT NULL,
            PRIMARY KEY (user_id, id)
        );

        CREATE INDEX IF NOT EXISTS idx_characters_user_name
            ON characters(user_id, name);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
