//! Three-way reconciliation of one incoming record.

use credsync_records::{LoginContent, Record};
use credsync_store::{MirrorRow, MirrorUpdate, OverlayRow, ReconciledChange};

/// Merges one incoming record against the local mirror and overlay state for
/// its guid.
///
/// Pure function: it performs no I/O and returns a [`ReconciledChange`] for
/// the store to apply. Every (mirror, overlay, incoming) combination maps to
/// exactly one decision:
///
/// - incoming tombstone → delete locally, regardless of overlay state;
/// - no pending local change → adopt the incoming revision (fast-forward);
/// - no mirror but a pending local row (co-creation) → adopt when the
///   contents match, otherwise merge preferring non-empty remote fields;
/// - mirror plus pending local row → field-level three-way merge against the
///   mirror baseline; a field changed on both sides to different values goes
///   to the incoming value.
///
/// Whenever the merged result still differs from what the server sent, the
/// residual is re-queued for upload so neither side's edit is dropped.
pub fn reconcile(
    mirror: Option<&MirrorRow>,
    overlay: Option<&OverlayRow>,
    incoming: &Record,
) -> ReconciledChange {
    let theirs = match incoming.payload.content() {
        Some(content) => content,
        None => return ReconciledChange::Delete(incoming.guid.clone()),
    };

    let update = |content: LoginContent| {
        MirrorUpdate {
            guid: incoming.guid.clone(),
            content,
            server_modified: incoming.server_modified,
        }
    };

    // A local tombstone carries no fields to merge; the incoming revision
    // revives the login.
    let ours = overlay.filter(|o| !o.is_deleted);

    let merged = match (mirror, ours) {
        (_, None) => return ReconciledChange::Adopt(update(theirs.clone())),
        (None, Some(ours)) => {
            if ours.content == *theirs {
                return ReconciledChange::Adopt(update(theirs.clone()));
            }
            merge_preferring_remote(&ours.content, theirs)
        }
        (Some(base), Some(ours)) => merge_three_way(&base.content, &ours.content, theirs),
    };

    if fields_match(&merged, theirs) {
        ReconciledChange::Adopt(update(merged))
    } else {
        ReconciledChange::MergeWithResidual {
            mirror: update(merged.clone()),
            residual: merged,
        }
    }
}

/// Full seven-field comparison. Payload equality alone ignores the optional
/// fields, which is too coarse for deciding whether a re-upload is needed.
fn fields_match(a: &LoginContent, b: &LoginContent) -> bool {
    a == b && a.form_submit_url == b.form_submit_url && a.http_realm == b.http_realm
}

/// Co-creation merge: there is no common baseline, so any field the server
/// has a non-empty value for wins, and local values fill the gaps.
fn merge_preferring_remote(ours: &LoginContent, theirs: &LoginContent) -> LoginContent {
    fn pick(ours: &str, theirs: &str) -> String {
        if theirs.is_empty() { ours } else { theirs }.to_string()
    }
    fn pick_opt(ours: &Option<String>, theirs: &Option<String>) -> Option<String> {
        match theirs {
            Some(t) if !t.is_empty() => Some(t.clone()),
            _ => ours.clone(),
        }
    }

    LoginContent {
        hostname: pick(&ours.hostname, &theirs.hostname),
        username: pick(&ours.username, &theirs.username),
        password: pick(&ours.password, &theirs.password),
        username_field: pick(&ours.username_field, &theirs.username_field),
        password_field: pick(&ours.password_field, &theirs.password_field),
        form_submit_url: pick_opt(&ours.form_submit_url, &theirs.form_submit_url),
        http_realm: pick_opt(&ours.http_realm, &theirs.http_realm),
    }
}

/// Conflict merge: both sides diverged from a shared mirror baseline.
fn merge_three_way(base: &LoginContent, ours: &LoginContent, theirs: &LoginContent) -> LoginContent {
    fn choose<T: PartialEq + Clone>(base: &T, ours: &T, theirs: &T) -> T {
        if ours == base {
            // Unchanged locally; take the incoming value (which may also be
            // unchanged).
            theirs.clone()
        } else if theirs == base {
            ours.clone()
        } else {
            // Changed on both sides to different values: server wins.
            theirs.clone()
        }
    }

    LoginContent {
        hostname: choose(&base.hostname, &ours.hostname, &theirs.hostname),
        username: choose(&base.username, &ours.username, &theirs.username),
        password: choose(&base.password, &ours.password, &theirs.password),
        username_field: choose(&base.username_field, &ours.username_field, &theirs.username_field),
        password_field: choose(&base.password_field, &ours.password_field, &theirs.password_field),
        form_submit_url: choose(&base.form_submit_url, &ours.form_submit_url, &theirs.form_submit_url),
        http_realm: choose(&base.http_realm, &ours.http_realm, &theirs.http_realm),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credsync_records::Guid;
    use proptest::prelude::*;

    fn content(username: &str, password: &str, username_field: &str) -> LoginContent {
        LoginContent {
            hostname: "https://example.com".into(),
            username: username.into(),
            password: password.into(),
            username_field: username_field.into(),
            password_field: "pass".into(),
            form_submit_url: None,
            http_realm: None,
        }
    }

    fn incoming(content: LoginContent) -> Record {
        let mut record = Record::content(Guid::from("g1"), content);
        record.server_modified = 1_000;
        record
    }

    fn mirror(content: LoginContent) -> MirrorRow {
        MirrorRow {
            guid: Guid::from("g1"),
            content,
            time_created: 0,
            time_last_used: 0,
            time_password_changed: 0,
            server_modified: 500,
            is_overridden: false,
        }
    }

    fn overlay(content: LoginContent) -> OverlayRow {
        OverlayRow {
            guid: Some(Guid::from("g1")),
            content,
            time_created: 0,
            time_last_used: 0,
            time_password_changed: 0,
            local_modified: None,
            is_deleted: false,
            should_upload: true,
        }
    }

    #[test]
    fn adopts_record_with_no_local_state() {
        let record = incoming(content("alice", "pw", "user"));
        let change = reconcile(None, None, &record);
        assert_eq!(
            change,
            ReconciledChange::Adopt(MirrorUpdate {
                guid: Guid::from("g1"),
                content: content("alice", "pw", "user"),
                server_modified: 1_000,
            })
        );
    }

    #[test]
    fn fast_forwards_when_no_pending_local_change() {
        let base = mirror(content("alice", "old", "user"));
        let record = incoming(content("alice", "new", "user"));
        let change = reconcile(Some(&base), None, &record);
        assert!(change.is_settled());
        assert!(matches!(change, ReconciledChange::Adopt(u) if u.content.password == "new"));
    }

    #[test]
    fn co_creation_with_identical_content_settles() {
        let ours = overlay(content("alice", "pw", "user"));
        let record = incoming(content("alice", "pw", "user"));
        let change = reconcile(None, Some(&ours), &record);
        assert!(change.is_settled());
        assert!(matches!(change, ReconciledChange::Adopt(_)));
    }

    #[test]
    fn co_creation_equality_ignores_optional_fields() {
        let mut local = content("alice", "pw", "user");
        local.http_realm = Some("local realm".into());
        let ours = overlay(local);
        let record = incoming(content("alice", "pw", "user"));

        // Same five content fields: adopted as-is, the local optional field
        // is not preserved and nothing re-uploads.
        let change = reconcile(None, Some(&ours), &record);
        assert!(matches!(
            change,
            ReconciledChange::Adopt(u) if u.content.http_realm.is_none()
        ));
    }

    #[test]
    fn co_creation_merge_prefers_non_empty_remote_fields() {
        let ours = overlay(content("alice", "local-pw", "user"));
        let record = incoming(content("alice", "remote-pw", ""));
        let change = reconcile(None, Some(&ours), &record);

        match change {
            ReconciledChange::MergeWithResidual { mirror, residual } => {
                // Remote password wins; the empty remote usernameField does not.
                assert_eq!(mirror.content.password, "remote-pw");
                assert_eq!(mirror.content.username_field, "user");
                assert_eq!(residual, mirror.content);
            }
            other => panic!("expected merge with residual, got {other:?}"),
        }
    }

    #[test]
    fn conflict_keeps_local_change_and_takes_remote_change() {
        // Local edit of the password, remote edit of usernameField.
        let base = mirror(content("alice", "old-pw", "user"));
        let ours = overlay(content("alice", "new-pw", "user"));
        let record = incoming(content("alice", "old-pw", "login"));

        let change = reconcile(Some(&base), Some(&ours), &record);
        match change {
            ReconciledChange::MergeWithResidual { mirror, residual } => {
                assert_eq!(mirror.content.password, "new-pw");
                assert_eq!(mirror.content.username_field, "login");
                assert_eq!(residual.password, "new-pw");
                assert_eq!(residual.username_field, "login");
            }
            other => panic!("expected merge with residual, got {other:?}"),
        }
    }

    #[test]
    fn conflict_on_same_field_takes_incoming_and_settles() {
        let base = mirror(content("alice", "old", "user"));
        let ours = overlay(content("alice", "local", "user"));
        let record = incoming(content("alice", "remote", "user"));

        let change = reconcile(Some(&base), Some(&ours), &record);
        assert!(change.is_settled());
        assert!(matches!(change, ReconciledChange::Adopt(u) if u.content.password == "remote"));
    }

    #[test]
    fn tombstone_deletes_regardless_of_pending_edit() {
        let base = mirror(content("alice", "pw", "user"));
        let ours = overlay(content("alice", "edited", "user"));
        let record = Record::tombstone(Guid::from("g1"));

        let change = reconcile(Some(&base), Some(&ours), &record);
        assert_eq!(change, ReconciledChange::Delete(Guid::from("g1")));
    }

    #[test]
    fn remote_content_revives_locally_deleted_login() {
        let base = mirror(content("alice", "pw", "user"));
        let mut tombstone = overlay(content("", "", ""));
        tombstone.is_deleted = true;
        let record = incoming(content("alice", "rotated", "user"));

        let change = reconcile(Some(&base), Some(&tombstone), &record);
        assert!(change.is_settled());
        assert!(matches!(change, ReconciledChange::Adopt(u) if u.content.password == "rotated"));
    }

    fn field() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["", "a", "b"]).prop_map(str::to_string)
    }

    fn content_strategy() -> impl Strategy<Value = LoginContent> {
        (
            field(),
            field(),
            field(),
            field(),
            field(),
            prop::option::of(field()),
            prop::option::of(field()),
        )
            .prop_map(|(h, u, p, uf, pf, fs, hr)| LoginContent {
                hostname: h,
                username: u,
                password: p,
                username_field: uf,
                password_field: pf,
                form_submit_url: fs,
                http_realm: hr,
            })
    }

    proptest! {
        // The decision table is total and deterministic: every combination of
        // inputs maps to exactly one decision, and tombstones always win.
        #[test]
        fn decision_is_total_and_deterministic(
            base in prop::option::of(content_strategy()),
            local in prop::option::of((content_strategy(), any::<bool>())),
            tombstone in any::<bool>(),
            theirs in content_strategy(),
        ) {
            let guid = Guid::from("g1");
            let mirror_row = base.map(|content| MirrorRow {
                guid: guid.clone(),
                content,
                time_created: 0,
                time_last_used: 0,
                time_password_changed: 0,
                server_modified: 500,
                is_overridden: false,
            });
            let overlay_row = local.map(|(content, is_deleted)| OverlayRow {
                guid: Some(guid.clone()),
                content,
                time_created: 0,
                time_last_used: 0,
                time_password_changed: 0,
                local_modified: None,
                is_deleted,
                should_upload: true,
            });
            let record = if tombstone {
                Record::tombstone(guid.clone())
            } else {
                Record::content(guid.clone(), theirs)
            };

            let first = reconcile(mirror_row.as_ref(), overlay_row.as_ref(), &record);
            let second = reconcile(mirror_row.as_ref(), overlay_row.as_ref(), &record);
            prop_assert_eq!(&first, &second);

            if tombstone {
                prop_assert_eq!(first, ReconciledChange::Delete(guid));
            }
        }
    }
}
