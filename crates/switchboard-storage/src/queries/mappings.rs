// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity mapping operations.
//!
//! A mapping row is claimed `pending` when a message first enters the bridge and
//! moves to `synced` or `failed` exactly once. Rows are never deleted here.

use rusqlite::{params, Connection, OptionalExtension};
use switchboard_core::types::SyncStatus;
use switchboard_core::SwitchboardError;

use crate::database::Database;
use crate::models::{format_ts, mapping_from_row, MappingRecord, NewMapping, MAPPING_COLUMNS, NOW};

fn select_by_identity(
    conn: &Connection,
    session_id: &str,
    protocol_message_id: &str,
) -> Result<Option<MappingRecord>, rusqlite::Error> {
    conn.query_row(
        &format!(
            "SELECT {MAPPING_COLUMNS} FROM message_mappings
             WHERE session_id = ?1 AND protocol_message_id = ?2"
        ),
        params![session_id, protocol_message_id],
        mapping_from_row,
    )
    .optional()
}

fn select_by_id(conn: &Connection, id: i64) -> Result<MappingRecord, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {MAPPING_COLUMNS} FROM message_mappings WHERE id = ?1"),
        params![id],
        mapping_from_row,
    )
}

/// Insert a `pending` row unless the identity is already mapped.
///
/// Returns the stored row and `true` when this call inserted it.
pub async fn claim(
    db: &Database,
    mapping: &NewMapping,
) -> Result<(MappingRecord, bool), SwitchboardError> {
    let mapping = mapping.clone();
    db.connection()
        .call(move |conn| -> Result<(MappingRecord, bool), rusqlite::Error> {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO message_mappings
                    (session_id, protocol_message_id, chat_identifier, sender_identifier,
                     direction, protocol_timestamp, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    mapping.session_id,
                    mapping.protocol_message_id,
                    mapping.chat_identifier,
                    mapping.sender_identifier,
                    mapping.direction.to_string(),
                    format_ts(&mapping.protocol_timestamp),
                    mapping.payload,
                ],
            )?;
            let record = select_by_identity(&tx, &mapping.session_id, &mapping.protocol_message_id)?
                .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            tx.commit()?;
            Ok((record, inserted > 0))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn get(
    db: &Database,
    session_id: &str,
    protocol_message_id: &str,
) -> Result<Option<MappingRecord>, SwitchboardError> {
    let session_id = session_id.to_string();
    let protocol_message_id = protocol_message_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<MappingRecord>, rusqlite::Error> {
            select_by_identity(conn, &session_id, &protocol_message_id)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn find_by_helpdesk_message(
    db: &Database,
    session_id: &str,
    helpdesk_message_id: i64,
) -> Result<Option<MappingRecord>, SwitchboardError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<MappingRecord>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {MAPPING_COLUMNS} FROM message_mappings
                     WHERE session_id = ?1 AND helpdesk_message_id = ?2
                     ORDER BY id ASC LIMIT 1"
                ),
                params![session_id, helpdesk_message_id],
                mapping_from_row,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn record_conversation(
    db: &Database,
    id: i64,
    conversation_id: i64,
) -> Result<(), SwitchboardError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE message_mappings SET helpdesk_conversation_id = ?1, updated_at = {NOW}
                     WHERE id = ?2"
                ),
                params![conversation_id, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn mark_synced(
    db: &Database,
    id: i64,
    helpdesk_message_id: i64,
    conversation_id: i64,
) -> Result<(), SwitchboardError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE message_mappings
                     SET sync_status = 'synced', helpdesk_message_id = ?1,
                         helpdesk_conversation_id = ?2, last_error = NULL,
                         synced_at = {NOW}, updated_at = {NOW}
                     WHERE id = ?3"
                ),
                params![helpdesk_message_id, conversation_id, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Count a transient failure on a `pending` row.
///
/// The row becomes `failed` once its attempt counter reaches `max_attempts`.
/// Rows that already left `pending` are not touched. Returns the row's status
/// after the update.
pub async fn record_failure(
    db: &Database,
    id: i64,
    error: &str,
    max_attempts: u32,
) -> Result<SyncStatus, SwitchboardError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| -> Result<SyncStatus, rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                &format!(
                    "UPDATE message_mappings
                     SET attempts = attempts + 1,
                         last_error = ?1,
                         sync_status = CASE WHEN attempts + 1 >= ?2 THEN 'failed' ELSE 'pending' END,
                         updated_at = {NOW}
                     WHERE id = ?3 AND sync_status = 'pending'"
                ),
                params![error, max_attempts, id],
            )?;
            let record = select_by_id(&tx, id)?;
            tx.commit()?;
            Ok(record.sync_status)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Mark a row `failed` after an explicit rejection.
pub async fn mark_failed(db: &Database, id: i64, error: &str) -> Result<(), SwitchboardError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                &format!(
                    "UPDATE message_mappings
                     SET sync_status = 'failed', last_error = ?1, updated_at = {NOW}
                     WHERE id = ?2 AND sync_status != 'synced'"
                ),
                params![error, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Write a `synced` row for a message the gateway itself sent to the network.
///
/// If the protocol echo already claimed the identity, that row is promoted.
pub async fn insert_synced(
    db: &Database,
    mapping: &NewMapping,
    helpdesk_message_id: i64,
    conversation_id: i64,
) -> Result<MappingRecord, SwitchboardError> {
    let mapping = mapping.clone();
    db.connection()
        .call(move |conn| -> Result<MappingRecord, rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute(
                &format!(
                    "INSERT INTO message_mappings
                        (session_id, protocol_message_id, chat_identifier, sender_identifier,
                         direction, protocol_timestamp, payload, helpdesk_message_id,
                         helpdesk_conversation_id, sync_status, synced_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'synced', {NOW})
                     ON CONFLICT(session_id, protocol_message_id) DO UPDATE SET
                        helpdesk_message_id = excluded.helpdesk_message_id,
                        helpdesk_conversation_id = excluded.helpdesk_conversation_id,
                        sync_status = 'synced',
                        last_error = NULL,
                        synced_at = excluded.synced_at,
                        updated_at = {NOW}"
                ),
                params![
                    mapping.session_id,
                    mapping.protocol_message_id,
                    mapping.chat_identifier,
                    mapping.sender_identifier,
                    mapping.direction.to_string(),
                    format_ts(&mapping.protocol_timestamp),
                    mapping.payload,
                    helpdesk_message_id,
                    conversation_id,
                ],
            )?;
            let record = select_by_identity(&tx, &mapping.session_id, &mapping.protocol_message_id)?
                .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            tx.commit()?;
            Ok(record)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Pending rows of a session in claim order.
pub async fn list_pending(
    db: &Database,
    session_id: &str,
    limit: usize,
) -> Result<Vec<MappingRecord>, SwitchboardError> {
    let session_id = session_id.to_string();
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<MappingRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MAPPING_COLUMNS} FROM message_mappings
                 WHERE session_id = ?1 AND sync_status = 'pending'
                 ORDER BY id ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![session_id, limit], mapping_from_row)?;
            rows.collect()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

pub async fn count_by_status(
    db: &Database,
    session_id: &str,
    status: SyncStatus,
) -> Result<u64, SwitchboardError> {
    let session_id = session_id.to_string();
    let status = status.to_string();
    db.connection()
        .call(move |conn| -> Result<u64, rusqlite::Error> {
            conn.query_row(
                "SELECT COUNT(*) FROM message_mappings WHERE session_id = ?1 AND sync_status = ?2",
                params![session_id, status],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count.max(0) as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}
