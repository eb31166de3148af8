// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence traits: backend lifecycle, session rows and identity mappings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SwitchboardError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ConnectionStatus, MappingRecord, NewMapping, SessionRecord, SyncStatus};

/// Adapter for storage and persistence backends.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection setup).
    async fn initialize(&self) -> Result<(), SwitchboardError>;

    /// Closes the storage backend, flushing pending writes and releasing connections.
    async fn close(&self) -> Result<(), SwitchboardError>;
}

/// Durable session state.
///
/// Every mutation touches `updated_at`. Mutating an absent session is a no-op.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn upsert_session(&self, record: &SessionRecord) -> Result<(), SwitchboardError>;

    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, SwitchboardError>;

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, SwitchboardError>;

    /// Removes the row. Returns whether a row existed.
    async fn delete_session(&self, id: &str) -> Result<bool, SwitchboardError>;

    async fn set_status(
        &self,
        id: &str,
        status: ConnectionStatus,
        last_error: Option<&str>,
    ) -> Result<(), SwitchboardError>;

    /// Overwrites (or clears, with `None`) the current pairing code.
    async fn set_pairing_code(
        &self,
        id: &str,
        code: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), SwitchboardError>;

    async fn set_device_identity(
        &self,
        id: &str,
        device_identity: Option<&str>,
    ) -> Result<(), SwitchboardError>;

    async fn touch_last_seen(&self, id: &str, at: DateTime<Utc>) -> Result<(), SwitchboardError>;
}

/// The identity mapping store: one record per relayed message, unique on
/// `(session_id, protocol_message_id)`.
#[async_trait]
pub trait MappingStore: Send + Sync + 'static {
    /// Inserts a `pending` record unless one exists for the same identity.
    ///
    /// Returns the stored record and whether this call created it.
    async fn claim_mapping(
        &self,
        mapping: &NewMapping,
    ) -> Result<(MappingRecord, bool), SwitchboardError>;

    async fn get_mapping(
        &self,
        session_id: &str,
        protocol_message_id: &str,
    ) -> Result<Option<MappingRecord>, SwitchboardError>;

    async fn find_by_helpdesk_message(
        &self,
        session_id: &str,
        helpdesk_message_id: i64,
    ) -> Result<Option<MappingRecord>, SwitchboardError>;

    /// Remembers the resolved conversation before the message is submitted.
    async fn record_conversation(
        &self,
        id: i64,
        conversation_id: i64,
    ) -> Result<(), SwitchboardError>;

    async fn mark_synced(
        &self,
        id: i64,
        helpdesk_message_id: i64,
        conversation_id: i64,
    ) -> Result<(), SwitchboardError>;

    /// Counts a transient failure. The record turns `failed` once `attempts`
    /// reaches `max_attempts`; the resulting status is returned.
    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        max_attempts: u32,
    ) -> Result<SyncStatus, SwitchboardError>;

    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), SwitchboardError>;

    /// Writes an already-`synced` record for a message the gateway sent itself.
    /// An existing record for the same identity is promoted to `synced`.
    async fn insert_synced(
        &self,
        mapping: &NewMapping,
        helpdesk_message_id: i64,
        conversation_id: i64,
    ) -> Result<MappingRecord, SwitchboardError>;

    /// Pending records of a session, oldest first.
    async fn list_pending(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<MappingRecord>, SwitchboardError>;

    async fn count_by_status(
        &self,
        session_id: &str,
        status: SyncStatus,
    ) -> Result<u64, SwitchboardError>;
}
