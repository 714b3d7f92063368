//! The login store.

use crate::error::{StoreError, StoreResult};
use crate::login::{Login, MirrorRow, MirrorUpdate, OverlayRow, ReconciledChange};
use crate::{now_ms, schema};
use credsync_records::{Guid, LoginContent, Record};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

const CONTENT_COLUMNS: &str = "guid, hostname, username, password, username_field, \
     password_field, form_submit_url, http_realm, time_created, time_last_used, \
     time_password_changed";

/// SQLite-backed store for saved logins.
///
/// Owns both the mirror and overlay tables; see the crate docs for the
/// two-tier model. All mutating operations run in one transaction.
pub struct LoginStore {
    conn: Connection,
}

impl LoginStore {
    /// Opens (and if necessary creates) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens an in-memory store, useful for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        schema::init(&conn)?;
        Ok(Self { conn })
    }

    // ---- Local CRUD -------------------------------------------------------

    /// Returns the logins saved for one origin, most recently used first.
    ///
    /// Overlay rows shadow their mirror counterparts; locally deleted logins
    /// are excluded.
    pub fn find_by_hostname(&self, hostname: &str) -> StoreResult<Vec<Login>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONTENT_COLUMNS} FROM overlay
              WHERE hostname = ?1 AND is_deleted = 0
             UNION ALL
             SELECT {CONTENT_COLUMNS} FROM mirror
              WHERE hostname = ?1 AND is_overridden = 0
             ORDER BY time_last_used DESC"
        ))?;
        let logins = stmt
            .query_map(params![hostname], parse_login)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logins)
    }

    /// Looks up a single login by guid.
    pub fn get(&self, guid: &Guid) -> StoreResult<Option<Login>> {
        if let Some(overlay) = self.get_overlay(guid)? {
            if overlay.is_deleted {
                return Ok(None);
            }
            return Ok(Some(Login {
                guid: guid.clone(),
                content: overlay.content,
                time_created: overlay.time_created,
                time_last_used: overlay.time_last_used,
                time_password_changed: overlay.time_password_changed,
            }));
        }
        Ok(self.get_mirror(guid)?.map(|mirror| Login {
            guid: mirror.guid,
            content: mirror.content,
            time_created: mirror.time_created,
            time_last_used: mirror.time_last_used,
            time_password_changed: mirror.time_password_changed,
        }))
    }

    /// Adds a new login.
    ///
    /// Assigns a fresh guid when the caller supplies none, stamps all three
    /// timestamps to now and queues the row for upload.
    pub fn add(&mut self, content: LoginContent, guid: Option<Guid>) -> StoreResult<Login> {
        validate_entry(&content)?;
        let guid = guid.unwrap_or_else(Guid::random);
        let now = now_ms();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO overlay (guid, hostname, username, password, username_field,
                                  password_field, form_submit_url, http_realm,
                                  time_created, time_last_used, time_password_changed,
                                  local_modified, is_deleted, should_upload)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 1)",
            params![
                guid.as_str(),
                content.hostname,
                content.username,
                content.password,
                content.username_field,
                content.password_field,
                content.form_submit_url,
                content.http_realm,
                now,
                now,
                now,
                now,
            ],
        )?;
        tx.execute(
            "UPDATE mirror SET is_overridden = 1 WHERE guid = ?",
            params![guid.as_str()],
        )?;
        tx.commit()?;

        Ok(Login {
            guid,
            content,
            time_created: now,
            time_last_used: now,
            time_password_changed: now,
        })
    }

    /// Records a use of the login: bumps `time_last_used` only, no new
    /// revision and no upload.
    pub fn touch(&mut self, guid: &Guid) -> StoreResult<()> {
        let now = now_ms();
        let tx = self.conn.transaction()?;
        let rows = tx.execute(
            "UPDATE overlay SET time_last_used = MAX(time_last_used, ?)
              WHERE guid = ? AND is_deleted = 0",
            params![now, guid.as_str()],
        )?;
        let rows = if rows == 0 {
            tx.execute(
                "UPDATE mirror SET time_last_used = MAX(time_last_used, ?)
                  WHERE guid = ? AND is_overridden = 0",
                params![now, guid.as_str()],
            )?
        } else {
            rows
        };
        tx.commit()?;

        if rows == 0 {
            return Err(StoreError::NoSuchRecord(guid.to_string()));
        }
        Ok(())
    }

    /// Replaces the content of an existing login and queues it for upload.
    ///
    /// `time_password_changed` moves forward only when the password field
    /// actually changed.
    pub fn update(&mut self, guid: &Guid, content: LoginContent) -> StoreResult<Login> {
        validate_entry(&content)?;
        let now = now_ms();

        let tx = self.conn.transaction()?;
        let updated = if let Some(overlay) = overlay_on(&tx, guid)? {
            if overlay.is_deleted {
                None
            } else {
                let changed = bump_if_password_changed(
                    &overlay.content.password,
                    &content.password,
                    overlay.time_password_changed,
                    now,
                );
                tx.execute(
                    "UPDATE overlay SET hostname = ?, username = ?, password = ?,
                         username_field = ?, password_field = ?, form_submit_url = ?,
                         http_realm = ?, time_password_changed = ?, local_modified = ?,
                         should_upload = 1
                      WHERE guid = ?",
                    params![
                        content.hostname,
                        content.username,
                        content.password,
                        content.username_field,
                        content.password_field,
                        content.form_submit_url,
                        content.http_realm,
                        changed,
                        now,
                        guid.as_str(),
                    ],
                )?;
                Some(())
            }
        } else if let Some(mirror) = mirror_on(&tx, guid)? {
            // First local edit of a server-backed login: shadow the mirror row.
            let changed = bump_if_password_changed(
                &mirror.content.password,
                &content.password,
                mirror.time_password_changed,
                now,
            );
            tx.execute(
                "INSERT INTO overlay (guid, hostname, username, password, username_field,
                                      password_field, form_submit_url, http_realm,
                                      time_created, time_last_used, time_password_changed,
                                      local_modified, is_deleted, should_upload)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 1)",
                params![
                    guid.as_str(),
                    content.hostname,
                    content.username,
                    content.password,
                    content.username_field,
                    content.password_field,
                    content.form_submit_url,
                    content.http_realm,
                    mirror.time_created,
                    mirror.time_last_used,
                    changed,
                    now,
                ],
            )?;
            tx.execute(
                "UPDATE mirror SET is_overridden = 1 WHERE guid = ?",
                params![guid.as_str()],
            )?;
            Some(())
        } else {
            None
        };
        tx.commit()?;

        if updated.is_none() {
            return Err(StoreError::NoSuchRecord(guid.to_string()));
        }
        self.get(guid)?
            .ok_or_else(|| StoreError::NoSuchRecord(guid.to_string()))
    }

    /// Soft-deletes a login: the overlay row becomes a local tombstone queued
    /// for upload; physical removal waits for upload confirmation.
    ///
    /// Returns true if a login existed.
    pub fn delete(&mut self, guid: &Guid) -> StoreResult<bool> {
        let now = now_ms();
        let tx = self.conn.transaction()?;
        let existed = soft_delete_on(&tx, guid, now)?;
        tx.commit()?;
        Ok(existed)
    }

    /// Removes every login and all sync bookkeeping. Used only for account
    /// wipe.
    pub fn wipe(&mut self) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM overlay", [])?;
        tx.execute("DELETE FROM mirror", [])?;
        tx.execute("DELETE FROM sync_meta WHERE key = 'last_sync'", [])?;
        tx.commit()?;
        Ok(())
    }

    /// Clears sync bookkeeping (watermark and upload flags) without touching
    /// user content. Called when the account is removed.
    pub fn reset_sync(&mut self) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM sync_meta WHERE key = 'last_sync'", [])?;
        tx.execute("UPDATE overlay SET should_upload = 0", [])?;
        tx.commit()?;
        Ok(())
    }

    // ---- Sync support -----------------------------------------------------

    /// Applies a remote deletion: drops both rows for the guid. Idempotent —
    /// succeeds even when the guid is unknown.
    pub fn delete_by_guid(&mut self, guid: &Guid, deleted_at: i64) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        let overlay = tx.execute("DELETE FROM overlay WHERE guid = ?", params![guid.as_str()])?;
        let mirror = tx.execute("DELETE FROM mirror WHERE guid = ?", params![guid.as_str()])?;
        tx.commit()?;
        debug!(
            guid = %guid,
            deleted_at,
            had_overlay = overlay > 0,
            had_mirror = mirror > 0,
            "applied remote deletion"
        );
        Ok(())
    }

    /// Soft-deletes a set of logins in one transaction, queueing tombstones
    /// for upload. Unknown guids are skipped.
    pub fn mark_as_deleted(&mut self, guids: &[Guid]) -> StoreResult<()> {
        let now = now_ms();
        let tx = self.conn.transaction()?;
        for guid in guids {
            soft_delete_on(&tx, guid, now)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Confirms a successful upload: copies each overlay row into the mirror
    /// stamped with the server's timestamp, clears the pending state, and
    /// purges tombstones the server now knows about.
    ///
    /// Returns the new watermark.
    pub fn mark_as_synchronized(&mut self, guids: &[Guid], server_modified: i64) -> StoreResult<i64> {
        let tx = self.conn.transaction()?;
        for guid in guids {
            let Some(overlay) = overlay_on(&tx, guid)? else {
                continue;
            };
            if overlay.is_deleted {
                tx.execute("DELETE FROM overlay WHERE guid = ?", params![guid.as_str()])?;
                tx.execute("DELETE FROM mirror WHERE guid = ?", params![guid.as_str()])?;
            } else {
                upsert_mirror_on(
                    &tx,
                    guid,
                    &overlay.content,
                    overlay.time_created,
                    overlay.time_last_used,
                    overlay.time_password_changed,
                    server_modified,
                    false,
                )?;
                tx.execute("DELETE FROM overlay WHERE guid = ?", params![guid.as_str()])?;
            }
        }
        tx.commit()?;
        Ok(server_modified)
    }

    /// Applies one downloaded batch of reconciled changes in a single
    /// transaction. Either every change commits or none does.
    pub fn apply_incoming(&mut self, changes: &[ReconciledChange]) -> StoreResult<()> {
        let now = now_ms();
        let tx = self.conn.transaction()?;
        for change in changes {
            match change {
                ReconciledChange::Adopt(update) => {
                    adopt_on(&tx, update, now)?;
                    tx.execute(
                        "DELETE FROM overlay WHERE guid = ?",
                        params![update.guid.as_str()],
                    )?;
                }
                ReconciledChange::MergeWithResidual { mirror, residual } => {
                    let times = adopt_on(&tx, mirror, now)?;
                    tx.execute(
                        "UPDATE mirror SET is_overridden = 1 WHERE guid = ?",
                        params![mirror.guid.as_str()],
                    )?;
                    upsert_overlay_residual_on(&tx, &mirror.guid, residual, &times, now)?;
                }
                ReconciledChange::Delete(guid) => {
                    tx.execute("DELETE FROM overlay WHERE guid = ?", params![guid.as_str()])?;
                    tx.execute("DELETE FROM mirror WHERE guid = ?", params![guid.as_str()])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Returns the records that must be uploaded: every overlay row with
    /// `should_upload` set, with fresh guids assigned to any row that has
    /// none.
    pub fn pending_uploads(&mut self) -> StoreResult<Vec<Record>> {
        let tx = self.conn.transaction()?;
        let unassigned: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM overlay WHERE guid IS NULL")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids
        };
        for id in unassigned {
            tx.execute(
                "UPDATE overlay SET guid = ? WHERE id = ?",
                params![Guid::random().as_str(), id],
            )?;
        }

        let records = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {CONTENT_COLUMNS}, local_modified, is_deleted, should_upload
                   FROM overlay WHERE should_upload = 1"
            ))?;
            let rows = stmt
                .query_map([], parse_overlay)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        tx.commit()?;

        Ok(records
            .into_iter()
            .map(|row| {
                // guid is always present after assignment above
                let guid = row.guid.unwrap_or_else(Guid::random);
                if row.is_deleted {
                    Record::tombstone(guid)
                } else {
                    Record::content(guid, row.content)
                }
            })
            .collect())
    }

    /// Fetches the mirror row for a guid.
    pub fn get_mirror(&self, guid: &Guid) -> StoreResult<Option<MirrorRow>> {
        mirror_on(&self.conn, guid)
    }

    /// Fetches the overlay row for a guid.
    pub fn get_overlay(&self, guid: &Guid) -> StoreResult<Option<OverlayRow>> {
        overlay_on(&self.conn, guid)
    }

    /// The server timestamp up to which incoming changes have been applied.
    pub fn last_sync(&self) -> StoreResult<i64> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM sync_meta WHERE key = 'last_sync'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0))
    }

    /// Persists the watermark. Written only after a fully successful cycle.
    pub fn set_last_sync(&mut self, watermark: i64) -> StoreResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO sync_meta (key, value) VALUES ('last_sync', ?)",
            params![watermark],
        )?;
        Ok(())
    }

    /// Number of visible logins.
    pub fn count(&self) -> StoreResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM overlay WHERE is_deleted = 0)
                  + (SELECT COUNT(*) FROM mirror WHERE is_overridden = 0)",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn validate_entry(content: &LoginContent) -> StoreResult<()> {
    if content.hostname.is_empty() {
        return Err(StoreError::InvalidEntry("hostname must not be empty".into()));
    }
    if content.password.is_empty() {
        return Err(StoreError::InvalidEntry("password must not be empty".into()));
    }
    Ok(())
}

fn bump_if_password_changed(previous: &str, next: &str, current: i64, now: i64) -> i64 {
    if previous == next {
        current
    } else {
        current.max(now)
    }
}

/// Timestamps carried into a new mirror revision.
struct RevisionTimes {
    created: i64,
    last_used: i64,
    password_changed: i64,
}

/// Writes `update` into the mirror, carrying local usage timestamps forward
/// so they never decrease. Returns the timestamps written.
fn adopt_on(
    conn: &Connection,
    update: &MirrorUpdate,
    now: i64,
) -> StoreResult<RevisionTimes> {
    // Local values win for usage bookkeeping; the overlay row is the freshest.
    let existing = match overlay_on(conn, &update.guid)? {
        Some(o) if !o.is_deleted => Some((
            o.time_created,
            o.time_last_used,
            o.time_password_changed,
            o.content.password,
        )),
        _ => mirror_on(conn, &update.guid)?.map(|m| {
            (
                m.time_created,
                m.time_last_used,
                m.time_password_changed,
                m.content.password,
            )
        }),
    };
    let times = match existing {
        Some((created, last_used, changed, prev_password)) => RevisionTimes {
            created,
            last_used,
            password_changed: bump_if_password_changed(
                &prev_password,
                &update.content.password,
                changed,
                now,
            ),
        },
        None => RevisionTimes {
            created: now,
            last_used: 0,
            password_changed: now,
        },
    };
    upsert_mirror_on(
        conn,
        &update.guid,
        &update.content,
        times.created,
        times.last_used,
        times.password_changed,
        update.server_modified,
        false,
    )?;
    Ok(times)
}

#[allow(clippy::too_many_arguments)]
fn upsert_mirror_on(
    conn: &Connection,
    guid: &Guid,
    content: &LoginContent,
    time_created: i64,
    time_last_used: i64,
    time_password_changed: i64,
    server_modified: i64,
    is_overridden: bool,
) -> StoreResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO mirror (guid, hostname, username, password,
             username_field, password_field, form_submit_url, http_realm,
             time_created, time_last_used, time_password_changed,
             server_modified, is_overridden)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            guid.as_str(),
            content.hostname,
            content.username,
            content.password,
            content.username_field,
            content.password_field,
            content.form_submit_url,
            content.http_realm,
            time_created,
            time_last_used,
            time_password_changed,
            server_modified,
            is_overridden,
        ],
    )?;
    Ok(())
}

fn upsert_overlay_residual_on(
    conn: &Connection,
    guid: &Guid,
    residual: &LoginContent,
    times: &RevisionTimes,
    now: i64,
) -> StoreResult<()> {
    let updated = conn.execute(
        "UPDATE overlay SET hostname = ?, username = ?, password = ?,
             username_field = ?, password_field = ?, form_submit_url = ?,
             http_realm = ?, local_modified = ?, is_deleted = 0, should_upload = 1
          WHERE guid = ?",
        params![
            residual.hostname,
            residual.username,
            residual.password,
            residual.username_field,
            residual.password_field,
            residual.form_submit_url,
            residual.http_realm,
            now,
            guid.as_str(),
        ],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO overlay (guid, hostname, username, password, username_field,
                 password_field, form_submit_url, http_realm,
                 time_created, time_last_used, time_password_changed,
                 local_modified, is_deleted, should_upload)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, 1)",
            params![
                guid.as_str(),
                residual.hostname,
                residual.username,
                residual.password,
                residual.username_field,
                residual.password_field,
                residual.form_submit_url,
                residual.http_realm,
                times.created,
                times.last_used,
                times.password_changed,
                now,
            ],
        )?;
    }
    Ok(())
}

/// Soft-deletes one login. Returns true if a login existed.
fn soft_delete_on(conn: &Connection, guid: &Guid, now: i64) -> StoreResult<bool> {
    // The tombstone keeps no content; secrets are cleared eagerly.
    let overlay = conn.execute(
        "UPDATE overlay SET hostname = '', username = '', password = '',
             username_field = '', password_field = '', form_submit_url = NULL,
             http_realm = NULL, local_modified = ?, is_deleted = 1, should_upload = 1
          WHERE guid = ?",
        params![now, guid.as_str()],
    )?;
    let mirror = conn.execute(
        "UPDATE mirror SET is_overridden = 1 WHERE guid = ?",
        params![guid.as_str()],
    )?;
    if overlay == 0 && mirror > 0 {
        conn.execute(
            "INSERT INTO overlay (guid, hostname, username, password, username_field,
                 password_field, form_submit_url, http_realm,
                 time_created, time_last_used, time_password_changed,
                 local_modified, is_deleted, should_upload)
             VALUES (?, '', '', '', '', '', NULL, NULL, 0, 0, 0, ?, 1, 1)",
            params![guid.as_str(), now],
        )?;
    }
    Ok(overlay > 0 || mirror > 0)
}

fn mirror_on(conn: &Connection, guid: &Guid) -> StoreResult<Option<MirrorRow>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {CONTENT_COLUMNS}, server_modified, is_overridden
                   FROM mirror WHERE guid = ?"
            ),
            params![guid.as_str()],
            parse_mirror,
        )
        .optional()?;
    Ok(row)
}

fn overlay_on(conn: &Connection, guid: &Guid) -> StoreResult<Option<OverlayRow>> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {CONTENT_COLUMNS}, local_modified, is_deleted, should_upload
                   FROM overlay WHERE guid = ?"
            ),
            params![guid.as_str()],
            parse_overlay,
        )
        .optional()?;
    Ok(row)
}

fn parse_content(row: &rusqlite::Row<'_>) -> rusqlite::Result<LoginContent> {
    Ok(LoginContent {
        hostname: row.get(1)?,
        username: row.get(2)?,
        password: row.get(3)?,
        username_field: row.get(4)?,
        password_field: row.get(5)?,
        form_submit_url: row.get(6)?,
        http_realm: row.get(7)?,
    })
}

fn parse_login(row: &rusqlite::Row<'_>) -> rusqlite::Result<Login> {
    let guid: Option<String> = row.get(0)?;
    Ok(Login {
        guid: Guid::new(guid.unwrap_or_default()),
        content: parse_content(row)?,
        time_created: row.get(8)?,
        time_last_used: row.get(9)?,
        time_password_changed: row.get(10)?,
    })
}

fn parse_mirror(row: &rusqlite::Row<'_>) -> rusqlite::Result<MirrorRow> {
    let guid: String = row.get(0)?;
    Ok(MirrorRow {
        guid: Guid::new(guid),
        content: parse_content(row)?,
        time_created: row.get(8)?,
        time_last_used: row.get(9)?,
        time_password_changed: row.get(10)?,
        server_modified: row.get(11)?,
        is_overridden: row.get::<_, i64>(12)? != 0,
    })
}

fn parse_overlay(row: &rusqlite::Row<'_>) -> rusqlite::Result<OverlayRow> {
    let guid: Option<String> = row.get(0)?;
    Ok(OverlayRow {
        guid: guid.map(Guid::new),
        content: parse_content(row)?,
        time_created: row.get(8)?,
        time_last_used: row.get(9)?,
        time_password_changed: row.get(10)?,
        local_modified: row.get(11)?,
        is_deleted: row.get::<_, i64>(12)? != 0,
        should_upload: row.get::<_, i64>(13)? != 0,
    })
}
