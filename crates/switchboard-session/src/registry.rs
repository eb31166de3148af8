// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The session registry: the control surface over all tenant sessions.
//!
//! Live handles sit in a sharded [`DashMap`]. Handles are fully built (client
//! created, dispatch channel opened) before they are inserted, so no map shard
//! lock is held across a factory or storage call.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use switchboard_core::identifier::{self, Jid};
use switchboard_core::types::{
    MediaHandle, MediaUpload, PairingCode, ProxyConfig, SendReceipt, SendRequest, SessionStatus,
};
use switchboard_core::{
    HelpdeskSettings, ProtocolClientFactory, ProtocolEvent, ProtocolSender, SessionRecord,
    SessionStore, SwitchboardError,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dispatch::Dispatcher;
use crate::handle::{SessionHandle, SessionSnapshot};
use crate::SessionSettings;

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionHandle>>,
    store: Arc<dyn SessionStore>,
    factory: Arc<dyn ProtocolClientFactory>,
    dispatcher: Dispatcher,
    settings: SessionSettings,
}

/// Result of the startup reconnection sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub connected: Vec<String>,
    pub failed: Vec<(String, String)>,
}

fn validate_session_id(id: &str) -> Result<(), SwitchboardError> {
    if id.is_empty() || id.chars().any(char::is_whitespace) {
        return Err(SwitchboardError::Validation(format!(
            "invalid session id `{id}`"
        )));
    }
    Ok(())
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn SessionStore>,
        factory: Arc<dyn ProtocolClientFactory>,
        dispatcher: Dispatcher,
        settings: SessionSettings,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            store,
            factory,
            dispatcher,
            settings,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn live_sessions(&self) -> Vec<Arc<SessionHandle>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.sessions.len()
    }

    async fn build_handle(
        &self,
        record: &SessionRecord,
    ) -> Result<(Arc<SessionHandle>, mpsc::Receiver<ProtocolEvent>), SwitchboardError> {
        let (tx, rx) = mpsc::channel(self.settings.queue_capacity);
        let client = self.factory.create(record, tx).await?;
        let handle = SessionHandle::new(record, client, Arc::clone(&self.store), self.settings);
        Ok((handle, rx))
    }

    /// Insert a built handle and start its dispatch task. Loses to a handle
    /// inserted concurrently for the same id.
    fn insert(
        &self,
        handle: Arc<SessionHandle>,
        events: mpsc::Receiver<ProtocolEvent>,
    ) -> Result<Arc<SessionHandle>, Arc<SessionHandle>> {
        match self.sessions.entry(handle.id().to_string()) {
            Entry::Occupied(existing) => Err(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&handle));
                self.dispatcher.spawn(Arc::clone(&handle), events);
                Ok(handle)
            }
        }
    }

    fn ensure_capacity(&self) -> Result<(), SwitchboardError> {
        if self.sessions.len() >= self.settings.max_sessions {
            return Err(SwitchboardError::Validation(format!(
                "session limit of {} reached",
                self.settings.max_sessions
            )));
        }
        Ok(())
    }

    /// Register a live handle for `id`. The durable row is created, or updated
    /// with the given proxy and bridge settings when it already exists.
    pub async fn create_session(
        &self,
        id: &str,
        proxy: Option<ProxyConfig>,
        helpdesk: Option<HelpdeskSettings>,
    ) -> Result<Arc<SessionHandle>, SwitchboardError> {
        validate_session_id(id)?;
        if self.sessions.contains_key(id) {
            return Err(SwitchboardError::SessionExists(id.to_string()));
        }
        self.ensure_capacity()?;

        let mut record = self
            .store
            .get_session(id)
            .await?
            .unwrap_or_else(|| SessionRecord::new(id));
        if proxy.is_some() {
            record.proxy = proxy;
        }
        if helpdesk.is_some() {
            record.helpdesk = helpdesk;
        }
        self.store.upsert_session(&record).await?;

        let (handle, events) = self.build_handle(&record).await?;
        let handle = self
            .insert(handle, events)
            .map_err(|_| SwitchboardError::SessionExists(id.to_string()))?;
        info!(session_id = %id, registration = %record.registration(), "session created");
        Ok(handle)
    }

    /// The live handle for `id`, building one from the durable row (or a fresh
    /// row) when there is none.
    async fn ensure_handle(&self, id: &str) -> Result<Arc<SessionHandle>, SwitchboardError> {
        if let Some(handle) = self.get(id) {
            return Ok(handle);
        }
        validate_session_id(id)?;
        self.ensure_capacity()?;
        let record = match self.store.get_session(id).await? {
            Some(record) => record,
            None => {
                let record = SessionRecord::new(id);
                self.store.upsert_session(&record).await?;
                record
            }
        };
        let (handle, events) = self.build_handle(&record).await?;
        Ok(self.insert(handle, events).unwrap_or_else(|existing| existing))
    }

    pub async fn connect(&self, id: &str) -> Result<(), SwitchboardError> {
        self.ensure_handle(id).await?.connect().await
    }

    /// Connect under the bounded reconnect policy.
    pub async fn connect_with_retry(&self, id: &str) -> Result<(), SwitchboardError> {
        self.ensure_handle(id).await?.connect_with_retry().await
    }

    async fn require_known(&self, id: &str) -> Result<SessionRecord, SwitchboardError> {
        self.store
            .get_session(id)
            .await?
            .ok_or_else(|| SwitchboardError::SessionNotFound(id.to_string()))
    }

    /// Disconnect and release the live handle. The durable row stays.
    pub async fn disconnect(&self, id: &str) -> Result<(), SwitchboardError> {
        let Some((_, handle)) = self.sessions.remove(id) else {
            self.require_known(id).await?;
            debug!(session_id = %id, "disconnect on session without live handle");
            return Ok(());
        };
        let result = handle.disconnect().await;
        handle.release();
        result
    }

    /// Log out, clearing the device identity, and release the live handle.
    pub async fn logout(&self, id: &str) -> Result<(), SwitchboardError> {
        let handle = match self.sessions.remove(id) {
            Some((_, handle)) => handle,
            None => {
                let record = self.require_known(id).await?;
                // The unlink still has to go through a protocol client.
                let (handle, _events) = self.build_handle(&record).await?;
                handle
            }
        };
        let result = handle.logout().await;
        handle.release();
        result
    }

    pub async fn status(&self, id: &str) -> Result<SessionStatus, SwitchboardError> {
        if let Some(handle) = self.get(id) {
            return Ok(handle.status().await);
        }
        let record = self.require_known(id).await?;
        Ok(SessionStatus {
            connected: false,
            logged_in: record.device_identity.is_some(),
            pairing: false,
        })
    }

    pub async fn pairing_code(&self, id: &str) -> Result<PairingCode, SwitchboardError> {
        if let Some(handle) = self.get(id) {
            return handle.pairing_code().await;
        }
        self.require_known(id).await?;
        Err(SwitchboardError::NoPairingCode(id.to_string()))
    }

    /// Every durable session, with live state where a handle exists.
    pub async fn list_sessions(&self) -> Result<Vec<SessionSnapshot>, SwitchboardError> {
        let records = self.store.list_sessions().await?;
        let mut snapshots = Vec::with_capacity(records.len());
        for record in &records {
            match self.get(&record.id) {
                Some(handle) => snapshots.push(handle.snapshot().await),
                None => snapshots.push(SessionSnapshot::from_record(record)),
            }
        }
        Ok(snapshots)
    }

    /// Disconnect the live handle if any and delete the durable row.
    pub async fn delete_session(&self, id: &str) -> Result<(), SwitchboardError> {
        let was_live = match self.sessions.remove(id) {
            Some((_, handle)) => {
                if let Err(e) = handle.disconnect().await {
                    warn!(session_id = %id, error = %e, "disconnect before delete failed");
                }
                handle.release();
                true
            }
            None => false,
        };
        let removed = self.store.delete_session(id).await?;
        if !removed && !was_live {
            return Err(SwitchboardError::SessionNotFound(id.to_string()));
        }
        info!(session_id = %id, "session deleted");
        Ok(())
    }

    async fn live_handle(&self, id: &str) -> Result<Arc<SessionHandle>, SwitchboardError> {
        match self.get(id) {
            Some(handle) => Ok(handle),
            None => {
                self.require_known(id).await?;
                Err(SwitchboardError::NotConnected(id.to_string()))
            }
        }
    }

    /// Send text to a raw recipient address.
    pub async fn send_text(
        &self,
        id: &str,
        to: &str,
        text: &str,
    ) -> Result<SendReceipt, SwitchboardError> {
        let recipient = identifier::resolve(to)?;
        let handle = self.live_handle(id).await?;
        send_with_fallback(&handle, &recipient, text).await
    }

    pub async fn upload_media(
        &self,
        id: &str,
        upload: MediaUpload,
    ) -> Result<MediaHandle, SwitchboardError> {
        self.live_handle(id).await?.upload_media(upload).await
    }

    /// Rebuild and reconnect every registered session from durable storage.
    pub async fn restore_sessions(&self) -> Result<RestoreReport, SwitchboardError> {
        let records = self.store.list_sessions().await?;
        let registered: Vec<SessionRecord> = records
            .into_iter()
            .filter(|r| r.device_identity.is_some())
            .collect();
        info!(count = registered.len(), "restoring registered sessions");

        let attempts = registered.iter().map(|record| async move {
            let result = self.connect_with_retry(&record.id).await;
            (record.id.clone(), result)
        });

        let mut report = RestoreReport::default();
        for (id, result) in join_all(attempts).await {
            match result {
                Ok(()) => report.connected.push(id),
                Err(e) => {
                    warn!(session_id = %id, error = %e, "session could not be restored");
                    report.failed.push((id, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    /// Disconnect and release every live handle.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let handles: Vec<Arc<SessionHandle>> = ids
            .iter()
            .filter_map(|id| self.sessions.remove(id).map(|(_, handle)| handle))
            .collect();
        info!(count = handles.len(), "disconnecting live sessions");
        join_all(handles.iter().map(|handle| async move {
            if let Err(e) = handle.disconnect().await {
                warn!(session_id = %handle.id(), error = %e, "disconnect during shutdown failed");
            }
            handle.release();
        }))
        .await;
    }
}

/// Send to `recipient`, retrying once with the alternate numbering form when
/// the protocol layer rejects the primary one.
async fn send_with_fallback(
    handle: &SessionHandle,
    recipient: &Jid,
    text: &str,
) -> Result<SendReceipt, SwitchboardError> {
    let request = SendRequest {
        to: recipient.to_string(),
        text: text.to_string(),
    };
    match handle.send(request).await {
        Err(SwitchboardError::InvalidRecipient(reason)) => {
            let Some(alternate) = identifier::alternate_form(recipient) else {
                return Err(SwitchboardError::InvalidRecipient(reason));
            };
            debug!(
                session_id = %handle.id(),
                primary = %recipient,
                alternate = %alternate,
                "recipient rejected, retrying alternate form"
            );
            handle
                .send(SendRequest {
                    to: alternate.to_string(),
                    text: text.to_string(),
                })
                .await
        }
        other => other,
    }
}

#[async_trait]
impl ProtocolSender for SessionRegistry {
    async fn send_text(
        &self,
        session_id: &str,
        to: &Jid,
        text: &str,
    ) -> Result<SendReceipt, SwitchboardError> {
        let handle = self.live_handle(session_id).await?;
        send_with_fallback(&handle, to, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use switchboard_core::{ConnectionStatus, PairingSignal};
    use switchboard_test_utils::{CountingSessionStore, MockProtocolFactory};

    use crate::reconnect::ReconnectPolicy;

    fn settings(max_sessions: usize) -> SessionSettings {
        SessionSettings {
            pairing_timeout: Duration::from_secs(5),
            code_ttl: Duration::from_secs(60),
            stop_grace: Duration::from_millis(100),
            reconnect: ReconnectPolicy {
                max_retries: 1,
                delay: Duration::from_millis(1),
            },
            queue_capacity: 16,
            max_sessions,
        }
    }

    fn registry(
        max_sessions: usize,
    ) -> (SessionRegistry, Arc<CountingSessionStore>, Arc<MockProtocolFactory>) {
        let store = Arc::new(CountingSessionStore::new());
        let factory = Arc::new(MockProtocolFactory::new());
        let registry = SessionRegistry::new(
            store.clone(),
            factory.clone(),
            Dispatcher::default(),
            settings(max_sessions),
        );
        (registry, store, factory)
    }

    async fn registered_row(store: &CountingSessionStore, id: &str) {
        let mut record = SessionRecord::new(id);
        record.device_identity = Some(format!("{id}:1@s.whatsapp.net"));
        store.upsert_session(&record).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let (registry, _store, factory) = registry(10);
        registry.create_session("s1", None, None).await.unwrap();
        assert!(matches!(
            registry.create_session("s1", None, None).await,
            Err(SwitchboardError::SessionExists(_))
        ));
        assert_eq!(factory.created_count(), 1);
        assert_eq!(registry.live_count(), 1);
    }

    #[tokio::test]
    async fn invalid_id_and_limit_are_validation_errors() {
        let (registry, _store, _factory) = registry(1);
        assert!(matches!(
            registry.create_session("has space", None, None).await,
            Err(SwitchboardError::Validation(_))
        ));
        registry.create_session("a", None, None).await.unwrap();
        assert!(matches!(
            registry.create_session("b", None, None).await,
            Err(SwitchboardError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unknown_session_errors() {
        let (registry, _store, _factory) = registry(10);
        assert!(matches!(
            registry.status("ghost").await,
            Err(SwitchboardError::SessionNotFound(_))
        ));
        assert!(matches!(
            registry.disconnect("ghost").await,
            Err(SwitchboardError::SessionNotFound(_))
        ));
        assert!(matches!(
            registry.delete_session("ghost").await,
            Err(SwitchboardError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn connect_creates_and_pairs_unknown_session() {
        let (registry, store, factory) = registry(10);
        registry.connect("fresh").await.unwrap();

        let client = factory.client("fresh").unwrap();
        client
            .pairing_sender()
            .unwrap()
            .send(PairingSignal::Code("2@code".into()))
            .await
            .unwrap();
        for _ in 0..100 {
            if store.pairing_code_writes() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(registry.pairing_code("fresh").await.unwrap().code, "2@code");
        assert!(registry.status("fresh").await.unwrap().pairing);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn disconnect_releases_handle_but_keeps_row() {
        let (registry, store, _factory) = registry(10);
        registered_row(&store, "s1").await;
        registry.connect("s1").await.unwrap();
        assert!(registry.status("s1").await.unwrap().connected);

        registry.disconnect("s1").await.unwrap();
        assert!(registry.get("s1").is_none());
        let status = registry.status("s1").await.unwrap();
        assert!(!status.connected);
        assert!(status.logged_in);
        assert_eq!(
            store.session("s1").unwrap().status,
            ConnectionStatus::Disconnected
        );
        assert!(matches!(
            registry.pairing_code("s1").await,
            Err(SwitchboardError::NoPairingCode(_))
        ));
    }

    #[tokio::test]
    async fn send_falls_back_to_alternate_form() {
        let (registry, store, factory) = registry(10);
        registered_row(&store, "s1").await;
        registry.connect("s1").await.unwrap();
        let client = factory.client("s1").unwrap();
        client.reject_recipient("551187654321@s.whatsapp.net");

        // Area code 11 keeps the ninth digit; the primary form is 13 digits.
        registry
            .send_text("s1", "+55 (11) 98765-4321", "hello")
            .await
            .unwrap();
        let sent = client.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "5511987654321@s.whatsapp.net");

        client.reject_recipient("5511987654321@s.whatsapp.net");
        client.allow_recipient("551187654321@s.whatsapp.net");
        registry
            .send_text("s1", "5511987654321", "again")
            .await
            .unwrap();
        let sent = client.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].to, "551187654321@s.whatsapp.net");
    }

    #[tokio::test]
    async fn send_on_offline_session_is_not_connected() {
        let (registry, store, _factory) = registry(10);
        registered_row(&store, "s1").await;
        assert!(matches!(
            registry.send_text("s1", "5511987654321", "x").await,
            Err(SwitchboardError::NotConnected(_))
        ));
        assert!(matches!(
            registry.send_text("s1", "not-a-number", "x").await,
            Err(SwitchboardError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn restore_reconnects_registered_sessions_only() {
        let (registry, store, factory) = registry(10);
        registered_row(&store, "a").await;
        registered_row(&store, "b").await;
        store.upsert_session(&SessionRecord::new("fresh")).await.unwrap();
        factory.fail_connects_for("b", u32::MAX);

        let report = registry.restore_sessions().await.unwrap();
        assert_eq!(report.connected, vec!["a".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "b");
        assert!(registry.get("fresh").is_none());
        // One retry configured: two attempts for the failing session.
        assert_eq!(factory.client("b").unwrap().connect_calls(), 2);
    }

    #[tokio::test]
    async fn list_and_delete() {
        let (registry, store, _factory) = registry(10);
        registered_row(&store, "offline").await;
        registry.create_session("live", None, None).await.unwrap();

        let listed = registry.list_sessions().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|s| s.id == "live" && s.live));
        assert!(listed.iter().any(|s| s.id == "offline" && !s.live));

        registry.delete_session("live").await.unwrap();
        assert!(registry.get("live").is_none());
        assert!(store.session("live").is_none());
    }

    #[tokio::test]
    async fn logout_without_live_handle_uses_fresh_client() {
        let (registry, store, factory) = registry(10);
        registered_row(&store, "s1").await;
        registry.logout("s1").await.unwrap();

        assert_eq!(factory.client("s1").unwrap().logout_calls(), 1);
        assert!(store.session("s1").unwrap().device_identity.is_none());
        assert!(!registry.status("s1").await.unwrap().logged_in);
    }
}
