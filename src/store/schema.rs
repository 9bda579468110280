//! SQLite DDL for the task database.
//!
//! All `CREATE TABLE` / `CREATE INDEX` statements live here so they are
//! reviewable and testable in isolation.

use rusqlite::Connection;

pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Complete DDL. Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    user_id    INTEGER PRIMARY KEY,
    timezone   TEXT NOT NULL,
    created_at INTEGER NOT NULL DEFAULT 0
);

-- `day` is the user's local calendar date (YYYY-MM-DD), never UTC.
CREATE TABLE IF NOT EXISTS tasks (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id      INTEGER NOT NULL,
    title        TEXT NOT NULL,
    day          TEXT NOT NULL,
    due_time     TEXT,                        -- HH:MM or NULL
    priority     TEXT NOT NULL DEFAULT 'med',
    tags         TEXT NOT NULL DEFAULT '[]',  -- JSON array of strings
    status       TEXT NOT NULL DEFAULT 'open',
    carried_from INTEGER,                     -- source task id for carry-over copies
    created_at   INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_tasks_user_day ON tasks(user_id, day);

-- Send ledger: one row per delivered logical slot.
CREATE TABLE IF NOT EXISTS sends (
    user_id INTEGER NOT NULL,
    kind    TEXT NOT NULL,
    day     TEXT NOT NULL,
    hour    INTEGER NOT NULL,
    sent_at INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, kind, day, hour)
);

-- Named ownership rows; a row whose expiry has passed may be taken over.
CREATE TABLE IF NOT EXISTS leases (
    name          TEXT PRIMARY KEY,
    holder        TEXT NOT NULL,
    acquired_at   INTEGER NOT NULL,   -- epoch millis of the current holder's first claim
    expires_at_ms INTEGER NOT NULL
);
"#;

/// Apply the full schema and seed the schema version on a fresh database.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Read the schema version, `None` when it was never seeded.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}
