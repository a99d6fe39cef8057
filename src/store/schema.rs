//! SQLite schema, applied idempotently on startup.

use rusqlite::Connection;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    telegram_id   INTEGER NOT NULL UNIQUE,
    username      TEXT,
    first_name    TEXT,
    last_name     TEXT,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    last_notified TEXT
);

CREATE TABLE IF NOT EXISTS units (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    city         TEXT NOT NULL,
    storage_name TEXT NOT NULL,
    size         TEXT NOT NULL,
    dimension    TEXT NOT NULL DEFAULT '',
    price        REAL,
    available    INTEGER NOT NULL DEFAULT 0,
    description  TEXT NOT NULL DEFAULT '',
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    UNIQUE (city, storage_name, size)
);

CREATE TABLE IF NOT EXISTS subscriptions (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id      INTEGER NOT NULL REFERENCES users(id),
    city         TEXT NOT NULL,
    storage_name TEXT NOT NULL,
    unit_size    TEXT NOT NULL,
    status       TEXT NOT NULL DEFAULT 'active',
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    UNIQUE (user_id, city, storage_name, unit_size)
);

CREATE INDEX IF NOT EXISTS idx_subscriptions_status ON subscriptions(status);
";

/// Creates the tables if they do not exist yet.
pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)?;
    debug!("Database schema is up to date");
    Ok(())
}
