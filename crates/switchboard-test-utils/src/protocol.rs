// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock protocol client and factory.
//!
//! `MockProtocolClient` records every call, lets tests drive the pairing
//! channel and inject protocol events, and can be told to refuse connections
//! or recipients.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use switchboard_core::identifier::Jid;
use switchboard_core::types::{MediaHandle, MediaUpload, SendReceipt, SendRequest};
use switchboard_core::{
    PairingSignal, ProtocolClient, ProtocolClientFactory, ProtocolEvent, ProtocolSender,
    SessionRecord, SwitchboardError,
};
use tokio::sync::mpsc;

/// Protocol-style message id, e.g. `3EB0A1B2...`.
pub fn message_id() -> String {
    format!("3EB0{}", uuid::Uuid::new_v4().simple()).to_uppercase()
}

/// A mock protocol connection.
pub struct MockProtocolClient {
    device_identity: Mutex<Option<String>>,
    pairing: Mutex<Option<mpsc::Sender<PairingSignal>>>,
    events: Mutex<Option<mpsc::Sender<ProtocolEvent>>>,
    failing_connects: AtomicU32,
    connect_calls: AtomicU32,
    disconnect_calls: AtomicU32,
    logout_calls: AtomicU32,
    pair_calls: AtomicU32,
    rejected: Mutex<HashSet<String>>,
    sent: Mutex<Vec<SendRequest>>,
}

impl MockProtocolClient {
    pub fn new() -> Self {
        Self {
            device_identity: Mutex::new(None),
            pairing: Mutex::new(None),
            events: Mutex::new(None),
            failing_connects: AtomicU32::new(0),
            connect_calls: AtomicU32::new(0),
            disconnect_calls: AtomicU32::new(0),
            logout_calls: AtomicU32::new(0),
            pair_calls: AtomicU32::new(0),
            rejected: Mutex::new(HashSet::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// A client wired to a session's event channel, as the factory builds it.
    pub fn with_events(
        events: mpsc::Sender<ProtocolEvent>,
        device_identity: Option<String>,
    ) -> Self {
        let client = Self::new();
        *client.events.lock().unwrap() = Some(events);
        *client.device_identity.lock().unwrap() = device_identity;
        client
    }

    /// Sender half of the most recent pairing channel, once `pair` ran.
    pub fn pairing_sender(&self) -> Option<mpsc::Sender<PairingSignal>> {
        self.pairing.lock().unwrap().clone()
    }

    /// Push a protocol event into the session's event channel.
    pub async fn emit(&self, event: ProtocolEvent) {
        let tx = self.events.lock().unwrap().clone();
        let tx = tx.expect("client has no event channel");
        tx.send(event).await.expect("event channel closed");
    }

    /// Refuse the next `n` connect calls.
    pub fn fail_connects(&self, n: u32) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    pub fn reject_recipient(&self, to: &str) {
        self.rejected.lock().unwrap().insert(to.to_string());
    }

    pub fn allow_recipient(&self, to: &str) {
        self.rejected.lock().unwrap().remove(to);
    }

    pub fn sent(&self) -> Vec<SendRequest> {
        self.sent.lock().unwrap().clone()
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> u32 {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> u32 {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn pair_calls(&self) -> u32 {
        self.pair_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockProtocolClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolClient for MockProtocolClient {
    fn device_identity(&self) -> Option<String> {
        self.device_identity.lock().unwrap().clone()
    }

    async fn pair(&self) -> Result<mpsc::Receiver<PairingSignal>, SwitchboardError> {
        self.pair_calls.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel(16);
        *self.pairing.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn connect(&self) -> Result<(), SwitchboardError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            tracing::debug!("mock protocol client refusing connect");
            return Err(SwitchboardError::protocol("connection refused by mock"));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), SwitchboardError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn logout(&self) -> Result<(), SwitchboardError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        *self.device_identity.lock().unwrap() = None;
        Ok(())
    }

    async fn send(&self, request: SendRequest) -> Result<SendReceipt, SwitchboardError> {
        if self.rejected.lock().unwrap().contains(&request.to) {
            return Err(SwitchboardError::InvalidRecipient(request.to));
        }
        self.sent.lock().unwrap().push(request);
        Ok(SendReceipt {
            message_id: message_id(),
            timestamp: Utc::now(),
        })
    }

    async fn upload_media(&self, upload: MediaUpload) -> Result<MediaHandle, SwitchboardError> {
        Ok(MediaHandle {
            url: format!("https://media.invalid/{}", uuid::Uuid::new_v4()),
            direct_path: None,
            size: upload.data.len() as u64,
        })
    }
}

/// Builds [`MockProtocolClient`]s and keeps the latest one per session.
pub struct MockProtocolFactory {
    clients: Mutex<HashMap<String, Arc<MockProtocolClient>>>,
    failing_connects: Mutex<HashMap<String, u32>>,
    created: AtomicU32,
}

impl MockProtocolFactory {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            failing_connects: Mutex::new(HashMap::new()),
            created: AtomicU32::new(0),
        }
    }

    /// The most recent client built for `session_id`.
    pub fn client(&self, session_id: &str) -> Option<Arc<MockProtocolClient>> {
        self.clients.lock().unwrap().get(session_id).cloned()
    }

    pub fn created_count(&self) -> u32 {
        self.created.load(Ordering::SeqCst)
    }

    /// Clients built for `session_id` from now on refuse `n` connects.
    pub fn fail_connects_for(&self, session_id: &str, n: u32) {
        self.failing_connects
            .lock()
            .unwrap()
            .insert(session_id.to_string(), n);
    }
}

impl Default for MockProtocolFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolClientFactory for MockProtocolFactory {
    async fn create(
        &self,
        record: &SessionRecord,
        events: mpsc::Sender<ProtocolEvent>,
    ) -> Result<Arc<dyn ProtocolClient>, SwitchboardError> {
        let client = Arc::new(MockProtocolClient::with_events(
            events,
            record.device_identity.clone(),
        ));
        if let Some(n) = self.failing_connects.lock().unwrap().get(&record.id) {
            client.fail_connects(*n);
        }
        self.clients
            .lock()
            .unwrap()
            .insert(record.id.clone(), Arc::clone(&client));
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(client)
    }
}

/// A [`ProtocolSender`] that records what it was asked to send.
pub struct RecordingSender {
    sent: Mutex<Vec<SendRequest>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<SendRequest> {
        self.sent.lock().unwrap().clone()
    }
}

impl Default for RecordingSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtocolSender for RecordingSender {
    async fn send_text(
        &self,
        _session_id: &str,
        to: &Jid,
        text: &str,
    ) -> Result<SendReceipt, SwitchboardError> {
        self.sent.lock().unwrap().push(SendRequest {
            to: to.to_string(),
            text: text.to_string(),
        });
        Ok(SendReceipt {
            message_id: message_id(),
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_failures_count_down() {
        let client = MockProtocolClient::new();
        client.fail_connects(2);
        assert!(client.connect().await.is_err());
        assert!(client.connect().await.is_err());
        assert!(client.connect().await.is_ok());
        assert_eq!(client.connect_calls(), 3);
    }

    #[tokio::test]
    async fn rejected_recipients_fail_send() {
        let client = MockProtocolClient::new();
        client.reject_recipient("1@s.whatsapp.net");
        let err = client
            .send(SendRequest {
                to: "1@s.whatsapp.net".into(),
                text: "x".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchboardError::InvalidRecipient(_)));
        assert!(client.sent().is_empty());
    }

    #[tokio::test]
    async fn factory_applies_pending_failures() {
        let factory = MockProtocolFactory::new();
        factory.fail_connects_for("b", 1);
        let (tx, _rx) = mpsc::channel(1);
        let client = factory.create(&SessionRecord::new("b"), tx).await.unwrap();
        assert!(client.connect().await.is_err());
        assert!(client.connect().await.is_ok());
        assert_eq!(factory.created_count(), 1);
    }
}
