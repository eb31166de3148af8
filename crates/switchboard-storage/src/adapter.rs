// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage, session and mapping traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use switchboard_config::model::StorageConfig;
use switchboard_core::types::{ConnectionStatus, MappingRecord, NewMapping, SessionRecord, SyncStatus};
use switchboard_core::{
    AdapterType, HealthStatus, MappingStore, PluginAdapter, SessionStore, StorageAdapter,
    SwitchboardError,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules. The
/// database is opened by [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// The database is not opened until [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, SwitchboardError> {
        self.db.get().ok_or_else(|| SwitchboardError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, SwitchboardError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SwitchboardError> {
        if self.db.get().is_some() {
            self.close().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), SwitchboardError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| SwitchboardError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), SwitchboardError> {
        let db = self.db()?;
        if self.config.wal_mode {
            db.checkpoint().await?;
            debug!("WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for SqliteStorage {
    async fn upsert_session(&self, record: &SessionRecord) -> Result<(), SwitchboardError> {
        queries::sessions::upsert_session(self.db()?, record).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, SwitchboardError> {
        queries::sessions::get_session(self.db()?, id).await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionRecord>, SwitchboardError> {
        queries::sessions::list_sessions(self.db()?).await
    }

    async fn delete_session(&self, id: &str) -> Result<bool, SwitchboardError> {
        queries::sessions::delete_session(self.db()?, id).await
    }

    async fn set_status(
        &self,
        id: &str,
        status: ConnectionStatus,
        last_error: Option<&str>,
    ) -> Result<(), SwitchboardError> {
        queries::sessions::set_status(self.db()?, id, status, last_error).await
    }

    async fn set_pairing_code(
        &self,
        id: &str,
        code: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), SwitchboardError> {
        queries::sessions::set_pairing_code(self.db()?, id, code, expires_at).await
    }

    async fn set_device_identity(
        &self,
        id: &str,
        device_identity: Option<&str>,
    ) -> Result<(), SwitchboardError> {
        queries::sessions::set_device_identity(self.db()?, id, device_identity).await
    }

    async fn touch_last_seen(&self, id: &str, at: DateTime<Utc>) -> Result<(), SwitchboardError> {
        queries::sessions::touch_last_seen(self.db()?, id, at).await
    }
}

#[async_trait]
impl MappingStore for SqliteStorage {
    async fn claim_mapping(
        &self,
        mapping: &NewMapping,
    ) -> Result<(MappingRecord, bool), SwitchboardError> {
        queries::mappings::claim(self.db()?, mapping).await
    }

    async fn get_mapping(
        &self,
        session_id: &str,
        protocol_message_id: &str,
    ) -> Result<Option<MappingRecord>, SwitchboardError> {
        queries::mappings::get(self.db()?, session_id, protocol_message_id).await
    }

    async fn find_by_helpdesk_message(
        &self,
        session_id: &str,
        helpdesk_message_id: i64,
    ) -> Result<Option<MappingRecord>, SwitchboardError> {
        queries::mappings::find_by_helpdesk_message(self.db()?, session_id, helpdesk_message_id)
            .await
    }

    async fn record_conversation(
        &self,
        id: i64,
        conversation_id: i64,
    ) -> Result<(), SwitchboardError> {
        queries::mappings::record_conversation(self.db()?, id, conversation_id).await
    }

    async fn mark_synced(
        &self,
        id: i64,
        helpdesk_message_id: i64,
        conversation_id: i64,
    ) -> Result<(), SwitchboardError> {
        queries::mappings::mark_synced(self.db()?, id, helpdesk_message_id, conversation_id).await
    }

    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        max_attempts: u32,
    ) -> Result<SyncStatus, SwitchboardError> {
        queries::mappings::record_failure(self.db()?, id, error, max_attempts).await
    }

    async fn mark_failed(&self, id: i64, error: &str) -> Result<(), SwitchboardError> {
        queries::mappings::mark_failed(self.db()?, id, error).await
    }

    async fn insert_synced(
        &self,
        mapping: &NewMapping,
        helpdesk_message_id: i64,
        conversation_id: i64,
    ) -> Result<MappingRecord, SwitchboardError> {
        queries::mappings::insert_synced(self.db()?, mapping, helpdesk_message_id, conversation_id)
            .await
    }

    async fn list_pending(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<MappingRecord>, SwitchboardError> {
        queries::mappings::list_pending(self.db()?, session_id, limit).await
    }

    async fn count_by_status(
        &self,
        session_id: &str,
        status: SyncStatus,
    ) -> Result<u64, SwitchboardError> {
        queries::mappings::count_by_status(self.db()?, session_id, status).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::types::Direction;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("double_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_init.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert!(storage.health_check().await.is_err());
        assert!(matches!(
            storage.get_session("s1").await,
            Err(SwitchboardError::Storage { .. })
        ));
    }

    #[tokio::test]
    async fn session_and_mapping_through_traits() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("lifecycle.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));
        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);

        let sessions: &dyn SessionStore = &storage;
        sessions.upsert_session(&SessionRecord::new("s1")).await.unwrap();
        sessions
            .set_status("s1", ConnectionStatus::Connecting, None)
            .await
            .unwrap();
        let stored = sessions.get_session("s1").await.unwrap().unwrap();
        assert_eq!(stored.status, ConnectionStatus::Connecting);

        let mappings: &dyn MappingStore = &storage;
        let new = NewMapping {
            session_id: "s1".into(),
            protocol_message_id: "m1".into(),
            chat_identifier: "5511987654321@s.whatsapp.net".into(),
            sender_identifier: "5511987654321@s.whatsapp.net".into(),
            direction: Direction::Incoming,
            protocol_timestamp: Utc::now(),
            payload: None,
        };
        let (record, created) = mappings.claim_mapping(&new).await.unwrap();
        assert!(created);
        mappings.mark_synced(record.id, 10, 20).await.unwrap();
        assert_eq!(
            mappings.count_by_status("s1", SyncStatus::Synced).await.unwrap(),
            1
        );

        storage.shutdown().await.unwrap();
    }
}
