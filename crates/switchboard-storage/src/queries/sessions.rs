// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session row operations.

use chrono::{DateTime, Utc};
use rusqlite::params;
use switchboard_core::types::ConnectionStatus;
use switchboard_core::SwitchboardError;

use crate::database::Database;
use crate::models::{format_ts, session_from_row, to_json, SessionRecord, NOW, SESSION_COLUMNS};

/// Insert a session, or overwrite every mutable column of an existing one.
///
/// `created_at` of an existing row is preserved.
pub async fn upsert_session(db: &Database, record: &SessionRecord) -> Result<(), SwitchboardError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "INSERT INTO sessions ({SESSION_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(id) DO UPDATE SET
                        device_identity = excluded.device_identity,
                        status = excluded.status,
                        pairing_code = excluded.pairing_code,
                        pairing_expires_at = excluded.pairing_expires_at,
                        last_seen_at = excluded.last_seen_at,
                        last_error = excluded.last_error,
                        proxy = excluded.proxy,
                        helpdesk = excluded.helpdesk,
                        updated_at = {NOW}"
                ),
                params![
                    record.id,
                    record.device_identity,
                    record.status.to_string(),
                    record.pairing_code,
                    record.pairing_expires_at.as_ref().map(format_ts),
                    record.last_seen_at.as_ref().map(format_ts),
                    record.last_error,
                    to_json(record.proxy.as_ref())?,
                    to_json(record.helpdesk.as_ref())?,
                    format_ts(&record.created_at),
                    format_ts(&record.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a session by ID.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<SessionRecord>, SwitchboardError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<SessionRecord>, rusqlite::Error> {
            let mut stmt =
                conn.prepare(&format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"))?;
            match stmt.query_row(params![id], session_from_row) {
                Ok(record) => Ok(Some(record)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All sessions, oldest first.
pub async fn list_sessions(db: &Database) -> Result<Vec<SessionRecord>, SwitchboardError> {
    db.connection()
        .call(|conn| -> Result<Vec<SessionRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map([], session_from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete a session row. Mapping records are kept for auditing.
pub async fn delete_session(db: &Database, id: &str) -> Result<bool, SwitchboardError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let removed = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
            Ok(removed > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set the connection status. `last_error` replaces the stored error, so a
/// successful transition clears it.
pub async fn set_status(
    db: &Database,
    id: &str,
    status: ConnectionStatus,
    last_error: Option<&str>,
) -> Result<(), SwitchboardError> {
    let id = id.to_string();
    let status = status.to_string();
    let last_error = last_error.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE sessions SET status = ?1, last_error = ?2, updated_at = {NOW}
                     WHERE id = ?3"
                ),
                params![status, last_error, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn set_pairing_code(
    db: &Database,
    id: &str,
    code: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
) -> Result<(), SwitchboardError> {
    let id = id.to_string();
    let code = code.map(str::to_string);
    let expires_at = expires_at.as_ref().map(format_ts);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE sessions SET pairing_code = ?1, pairing_expires_at = ?2,
                     updated_at = {NOW} WHERE id = ?3"
                ),
                params![code, expires_at, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn set_device_identity(
    db: &Database,
    id: &str,
    device_identity: Option<&str>,
) -> Result<(), SwitchboardError> {
    let id = id.to_string();
    let device_identity = device_identity.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE sessions SET device_identity = ?1, updated_at = {NOW} WHERE id = ?2"
                ),
                params![device_identity, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn touch_last_seen(
    db: &Database,
    id: &str,
    at: DateTime<Utc>,
) -> Result<(), SwitchboardError> {
    let id = id.to_string();
    let at = format_ts(&at);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!("UPDATE sessions SET last_seen_at = ?1, updated_at = {NOW} WHERE id = ?2"),
                params![at, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::types::{HelpdeskSettings, ProxyConfig, ProxyKind};
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn make_session(id: &str) -> SessionRecord {
        let mut record = SessionRecord::new(id);
        record.proxy = Some(ProxyConfig {
            kind: ProxyKind::Socks5,
            host: "127.0.0.1".into(),
            port: 1080,
            username: None,
            password: None,
        });
        record.helpdesk = Some(HelpdeskSettings {
            enabled: true,
            account_id: 1,
            inbox_id: 7,
            reopen_conversation: true,
            conversation_pending: false,
            merge_alternate_numbering_form: true,
            import_days: 3,
            sign_messages: false,
        });
        record
    }

    #[tokio::test]
    async fn upsert_and_get_roundtrips() {
        let (db, _dir) = setup_db().await;
        let session = make_session("s1");

        upsert_session(&db, &session).await.unwrap();
        let stored = get_session(&db, "s1").await.unwrap().unwrap();
        assert_eq!(stored.id, "s1");
        assert_eq!(stored.status, ConnectionStatus::Disconnected);
        assert_eq!(stored.proxy, session.proxy);
        assert_eq!(stored.helpdesk, session.helpdesk);
        assert!(stored.device_identity.is_none());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn upsert_preserves_created_at() {
        let (db, _dir) = setup_db().await;
        let session = make_session("s1");
        upsert_session(&db, &session).await.unwrap();
        let first = get_session(&db, "s1").await.unwrap().unwrap();

        let mut changed = session.clone();
        changed.created_at = Utc::now() + chrono::Duration::days(1);
        changed.proxy = None;
        upsert_session(&db, &changed).await.unwrap();

        let second = get_session(&db, "s1").await.unwrap().unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.proxy.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn get_nonexistent_session_returns_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_session(&db, "missing").await.unwrap().is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn status_and_error_update_together() {
        let (db, _dir) = setup_db().await;
        upsert_session(&db, &make_session("s1")).await.unwrap();

        set_status(&db, "s1", ConnectionStatus::Disconnected, Some("refused"))
            .await
            .unwrap();
        let stored = get_session(&db, "s1").await.unwrap().unwrap();
        assert_eq!(stored.last_error.as_deref(), Some("refused"));

        set_status(&db, "s1", ConnectionStatus::Connected, None)
            .await
            .unwrap();
        let stored = get_session(&db, "s1").await.unwrap().unwrap();
        assert_eq!(stored.status, ConnectionStatus::Connected);
        assert!(stored.last_error.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn pairing_code_set_and_cleared() {
        let (db, _dir) = setup_db().await;
        upsert_session(&db, &make_session("s1")).await.unwrap();

        let expires = Utc::now() + chrono::Duration::seconds(60);
        set_pairing_code(&db, "s1", Some("2@abc"), Some(expires))
            .await
            .unwrap();
        let stored = get_session(&db, "s1").await.unwrap().unwrap();
        assert_eq!(stored.pairing_code.as_deref(), Some("2@abc"));
        assert_eq!(
            stored.pairing_expires_at.unwrap().timestamp_millis(),
            expires.timestamp_millis()
        );

        set_pairing_code(&db, "s1", None, None).await.unwrap();
        let stored = get_session(&db, "s1").await.unwrap().unwrap();
        assert!(stored.pairing_code.is_none());
        assert!(stored.pairing_expires_at.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn device_identity_and_last_seen() {
        let (db, _dir) = setup_db().await;
        upsert_session(&db, &make_session("s1")).await.unwrap();

        set_device_identity(&db, "s1", Some("5511:3@s.whatsapp.net"))
            .await
            .unwrap();
        touch_last_seen(&db, "s1", Utc::now()).await.unwrap();
        let stored = get_session(&db, "s1").await.unwrap().unwrap();
        assert_eq!(
            stored.registration(),
            switchboard_core::types::Registration::Registered
        );
        assert!(stored.last_seen_at.is_some());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn list_and_delete() {
        let (db, _dir) = setup_db().await;
        upsert_session(&db, &make_session("a")).await.unwrap();
        upsert_session(&db, &make_session("b")).await.unwrap();

        assert_eq!(list_sessions(&db).await.unwrap().len(), 2);
        assert!(delete_session(&db, "a").await.unwrap());
        assert!(!delete_session(&db, "a").await.unwrap());

        let remaining = list_sessions(&db).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "b");
        db.close().await.unwrap();
    }
}
