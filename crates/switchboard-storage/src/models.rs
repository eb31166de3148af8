// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite rows and the core record types.
//!
//! Timestamps are stored as RFC 3339 text with millisecond precision and a `Z`
//! suffix, the same shape `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')` produces.
//! Enums are stored as their lowercase names; proxy and helpdesk settings as JSON.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

pub use switchboard_core::types::{MappingRecord, NewMapping, SessionRecord};

/// SQL expression for the current time in the stored timestamp format.
pub(crate) const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

pub(crate) const SESSION_COLUMNS: &str = "id, device_identity, status, pairing_code, \
     pairing_expires_at, last_seen_at, last_error, proxy, helpdesk, created_at, updated_at";

pub(crate) const MAPPING_COLUMNS: &str = "id, session_id, protocol_message_id, \
     chat_identifier, sender_identifier, direction, protocol_timestamp, helpdesk_message_id, \
     helpdesk_conversation_id, sync_status, attempts, last_error, payload, created_at, \
     updated_at, synced_at";

pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_ts_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => ts_at(row, idx).map(Some),
        None => Ok(None),
    }
}

fn enum_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn json_at<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}

pub(crate) fn to_json<T: serde::Serialize>(value: Option<&T>) -> rusqlite::Result<Option<String>> {
    value
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Maps a row selected with [`SESSION_COLUMNS`].
pub(crate) fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    Ok(SessionRecord {
        id: row.get(0)?,
        device_identity: row.get(1)?,
        status: enum_at(row, 2)?,
        pairing_code: row.get(3)?,
        pairing_expires_at: opt_ts_at(row, 4)?,
        last_seen_at: opt_ts_at(row, 5)?,
        last_error: row.get(6)?,
        proxy: json_at(row, 7)?,
        helpdesk: json_at(row, 8)?,
        created_at: ts_at(row, 9)?,
        updated_at: ts_at(row, 10)?,
    })
}

/// Maps a row selected with [`MAPPING_COLUMNS`].
pub(crate) fn mapping_from_row(row: &Row<'_>) -> rusqlite::Result<MappingRecord> {
    Ok(MappingRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        protocol_message_id: row.get(2)?,
        chat_identifier: row.get(3)?,
        sender_identifier: row.get(4)?,
        direction: enum_at(row, 5)?,
        protocol_timestamp: ts_at(row, 6)?,
        helpdesk_message_id: row.get(7)?,
        helpdesk_conversation_id: row.get(8)?,
        sync_status: enum_at(row, 9)?,
        attempts: row.get(10)?,
        last_error: row.get(11)?,
        payload: row.get(12)?,
        created_at: ts_at(row, 13)?,
        updated_at: ts_at(row, 14)?,
        synced_at: opt_ts_at(row, 15)?,
    })
}
