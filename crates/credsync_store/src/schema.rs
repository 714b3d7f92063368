//! Table and index creation.

use crate::error::StoreResult;
use rusqlite::Connection;

/// Schema version recorded in `sync_meta`. Incremented when the shape of the
/// tables changes.
pub const SCHEMA_VERSION: i64 = 1;

const CREATE_MIRROR: &str = "CREATE TABLE IF NOT EXISTS mirror (
    guid                  TEXT PRIMARY KEY NOT NULL,
    hostname              TEXT NOT NULL,
    username              TEXT NOT NULL,
    password              TEXT NOT NULL,
    username_field        TEXT NOT NULL DEFAULT '',
    password_field        TEXT NOT NULL DEFAULT '',
    form_submit_url       TEXT,
    http_realm            TEXT,
    time_created          INTEGER NOT NULL DEFAULT 0,
    time_last_used        INTEGER NOT NULL DEFAULT 0,
    time_password_changed INTEGER NOT NULL DEFAULT 0,
    server_modified       INTEGER NOT NULL,
    is_overridden         INTEGER NOT NULL DEFAULT 0
)";

const CREATE_OVERLAY: &str = "CREATE TABLE IF NOT EXISTS overlay (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    guid                  TEXT UNIQUE,
    hostname              TEXT NOT NULL,
    username              TEXT NOT NULL,
    password              TEXT NOT NULL,
    username_field        TEXT NOT NULL DEFAULT '',
    password_field        TEXT NOT NULL DEFAULT '',
    form_submit_url       TEXT,
    http_realm            TEXT,
    time_created          INTEGER NOT NULL DEFAULT 0,
    time_last_used        INTEGER NOT NULL DEFAULT 0,
    time_password_changed INTEGER NOT NULL DEFAULT 0,
    local_modified        INTEGER,
    is_deleted            INTEGER NOT NULL DEFAULT 0,
    should_upload         INTEGER NOT NULL DEFAULT 0
)";

const CREATE_SYNC_META: &str = "CREATE TABLE IF NOT EXISTS sync_meta (
    key   TEXT PRIMARY KEY NOT NULL,
    value INTEGER NOT NULL
)";

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_mirror_hostname ON mirror (hostname)",
    "CREATE INDEX IF NOT EXISTS idx_overlay_hostname ON overlay (hostname)",
    "CREATE INDEX IF NOT EXISTS idx_overlay_upload ON overlay (should_upload)",
];

/// Creates the two login tables, the sync metadata table and their indexes.
pub fn init(conn: &Connection) -> StoreResult<()> {
    conn.execute(CREATE_MIRROR, [])?;
    conn.execute(CREATE_OVERLAY, [])?;
    conn.execute(CREATE_SYNC_META, [])?;
    for index in CREATE_INDEXES {
        conn.execute(index, [])?;
    }
    conn.execute(
        "INSERT OR IGNORE INTO sync_meta (key, value) VALUES ('schema_version', ?)",
        rusqlite::params![SCHEMA_VERSION],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init(&conn).unwrap();
        init(&conn).unwrap();

        let version: i64 = conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
