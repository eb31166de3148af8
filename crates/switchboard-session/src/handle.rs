// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session connection state machine.
//!
//! A [`SessionHandle`] owns one protocol client and drives it through
//! registration (pairing) and connection transitions. Every transition is
//! mirrored to the [`SessionStore`]; no lock is held across a client or store
//! call except the pairing display lock, which orders code writes against
//! [`SessionHandle::stop_pairing`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use switchboard_core::types::{
    MediaHandle, MediaUpload, PairingCode, ProxyConfig, Registration, SendReceipt, SendRequest,
    SessionStatus,
};
use switchboard_core::{
    ConnectionStatus, HelpdeskSettings, ProtocolClient, SessionRecord, SessionStore,
    SwitchboardError,
};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::pairing::{run_pairing_loop, PairingDisplay, PairingOutcome, PairingTask};
use crate::stats::{SessionStats, StatsSnapshot};
use crate::SessionSettings;

#[derive(Debug, Clone)]
struct HandleState {
    status: ConnectionStatus,
    device_identity: Option<String>,
    last_error: Option<String>,
    helpdesk: Option<HelpdeskSettings>,
    proxy: Option<ProxyConfig>,
}

/// Point-in-time view of a session for listing and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub status: ConnectionStatus,
    pub registration: Registration,
    pub pairing: bool,
    pub device_identity: Option<String>,
    pub last_error: Option<String>,
    pub stats: StatsSnapshot,
    /// False for sessions known only from durable storage.
    pub live: bool,
}

impl SessionSnapshot {
    /// Snapshot of a durable row with no live handle.
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            id: record.id.clone(),
            status: record.status,
            registration: record.registration(),
            pairing: false,
            device_identity: record.device_identity.clone(),
            last_error: record.last_error.clone(),
            stats: StatsSnapshot::default(),
            live: false,
        }
    }
}

pub struct SessionHandle {
    id: String,
    client: Arc<dyn ProtocolClient>,
    store: Arc<dyn SessionStore>,
    settings: SessionSettings,
    state: RwLock<HandleState>,
    display: Mutex<PairingDisplay>,
    pairing: Mutex<Option<PairingTask>>,
    /// Bumped whenever a pairing loop starts or is retired; a loop only writes
    /// state while its generation is current.
    generation: AtomicU64,
    stats: SessionStats,
    released: AtomicBool,
    closed: CancellationToken,
}

impl SessionHandle {
    pub fn new(
        record: &SessionRecord,
        client: Arc<dyn ProtocolClient>,
        store: Arc<dyn SessionStore>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        let device_identity = record
            .device_identity
            .clone()
            .or_else(|| client.device_identity());
        Arc::new(Self {
            id: record.id.clone(),
            client,
            store,
            settings,
            state: RwLock::new(HandleState {
                // A fresh handle has no live connection, whatever the row says.
                status: ConnectionStatus::Disconnected,
                device_identity,
                last_error: record.last_error.clone(),
                helpdesk: record.helpdesk.clone(),
                proxy: record.proxy.clone(),
            }),
            display: Mutex::new(PairingDisplay::default()),
            pairing: Mutex::new(None),
            generation: AtomicU64::new(0),
            stats: SessionStats::default(),
            released: AtomicBool::new(false),
            closed: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub async fn helpdesk_settings(&self) -> Option<HelpdeskSettings> {
        self.state.read().await.helpdesk.clone()
    }

    pub async fn proxy(&self) -> Option<ProxyConfig> {
        self.state.read().await.proxy.clone()
    }

    pub async fn connection_status(&self) -> ConnectionStatus {
        self.state.read().await.status
    }

    pub async fn registration(&self) -> Registration {
        if self.state.read().await.device_identity.is_some() {
            Registration::Registered
        } else {
            Registration::Unregistered
        }
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// Marks the handle as removed from the registry. Callbacks and the
    /// dispatch task become no-ops afterwards.
    pub fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.closed.cancel();
    }

    /// Cancelled once the handle is released.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    async fn pairing_running(&self) -> bool {
        self.pairing
            .lock()
            .await
            .as_ref()
            .is_some_and(PairingTask::is_running)
    }

    /// Update the in-memory status and mirror it to the store.
    async fn transition(&self, status: ConnectionStatus, last_error: Option<String>) {
        {
            let mut state = self.state.write().await;
            state.status = status;
            state.last_error = last_error.clone();
        }
        if let Err(e) = self
            .store
            .set_status(&self.id, status, last_error.as_deref())
            .await
        {
            error!(session_id = %self.id, status = %status, error = %e, "failed to persist session status");
        }
    }

    /// Start pairing (unregistered) or reconnect with the stored identity
    /// (registered). A connected or pairing session is left as it is.
    pub async fn connect(self: &Arc<Self>) -> Result<(), SwitchboardError> {
        // Held until a new loop is stored: concurrent connects start one loop.
        let mut pairing = self.pairing.lock().await;
        if pairing.as_ref().is_some_and(PairingTask::is_running) {
            debug!(session_id = %self.id, "pairing already in progress");
            return Ok(());
        }
        let registered = {
            let mut state = self.state.write().await;
            if state.status == ConnectionStatus::Connected {
                return Ok(());
            }
            state.status = ConnectionStatus::Connecting;
            state.device_identity.is_some()
        };
        self.transition(ConnectionStatus::Connecting, None).await;

        if registered {
            drop(pairing);
            self.reconnect().await
        } else {
            *pairing = Some(self.start_pairing().await?);
            Ok(())
        }
    }

    /// [`connect`](Self::connect) under the bounded reconnect policy.
    ///
    /// Pairing is never retried; an unregistered session connects once.
    pub async fn connect_with_retry(self: &Arc<Self>) -> Result<(), SwitchboardError> {
        if self.registration().await == Registration::Unregistered {
            return self.connect().await;
        }
        let policy = self.settings.reconnect;
        policy.run(|_| self.connect()).await
    }

    async fn reconnect(&self) -> Result<(), SwitchboardError> {
        match self.client.connect().await {
            Ok(()) => {
                info!(session_id = %self.id, "session reconnected");
                self.mark_connected().await;
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "reconnect failed");
                self.transition(ConnectionStatus::Disconnected, Some(e.to_string()))
                    .await;
                Err(e)
            }
        }
    }

    async fn mark_connected(&self) {
        self.transition(ConnectionStatus::Connected, None).await;
        if let Err(e) = self.store.touch_last_seen(&self.id, Utc::now()).await {
            warn!(session_id = %self.id, error = %e, "failed to record last seen");
        }
    }

    async fn start_pairing(self: &Arc<Self>) -> Result<PairingTask, SwitchboardError> {
        let signals = match self.client.pair().await {
            Ok(rx) => rx,
            Err(e) => {
                self.transition(ConnectionStatus::Disconnected, Some(e.to_string()))
                    .await;
                return Err(e);
            }
        };

        let generation = {
            let mut display = self.display.lock().await;
            display.clear();
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        let token = CancellationToken::new();
        let join = tokio::spawn(run_pairing_loop(
            Arc::clone(self),
            signals,
            token.clone(),
            generation,
            self.settings.pairing_timeout,
        ));
        info!(session_id = %self.id, generation, "pairing started");
        Ok(PairingTask { token, join })
    }

    /// Display a code from the pairing channel. Returns whether it was new.
    pub(crate) async fn offer_pairing_code(&self, generation: u64, code: &str) -> bool {
        let mut display = self.display.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        let Some(shown) = display.offer(code, self.settings.code_ttl) else {
            debug!(session_id = %self.id, "duplicate pairing code suppressed");
            return false;
        };
        if let Err(e) = self
            .store
            .set_pairing_code(&self.id, Some(&shown.code), Some(shown.expires_at))
            .await
        {
            error!(session_id = %self.id, error = %e, "failed to persist pairing code");
        }
        info!(session_id = %self.id, expires_at = %shown.expires_at, "pairing code refreshed\n{}", shown.rendered);
        true
    }

    pub(crate) async fn finish_pairing(&self, generation: u64, outcome: PairingOutcome) {
        if outcome == PairingOutcome::Cancelled {
            return;
        }
        let mut display = self.display.lock().await;
        if self.generation.load(Ordering::SeqCst) != generation || self.is_released() {
            debug!(session_id = %self.id, generation, "stale pairing loop ignored");
            return;
        }
        display.clear();
        if let Err(e) = self.store.set_pairing_code(&self.id, None, None).await {
            error!(session_id = %self.id, error = %e, "failed to clear pairing code");
        }

        match outcome {
            PairingOutcome::Paired { device_identity } => {
                self.state.write().await.device_identity = Some(device_identity.clone());
                if let Err(e) = self
                    .store
                    .set_device_identity(&self.id, Some(&device_identity))
                    .await
                {
                    error!(session_id = %self.id, error = %e, "failed to persist device identity");
                }
                info!(session_id = %self.id, device_identity = %device_identity, "pairing succeeded");
                self.mark_connected().await;
            }
            PairingOutcome::TimedOut => {
                warn!(session_id = %self.id, "pairing timed out");
                self.transition(
                    ConnectionStatus::Disconnected,
                    Some("pairing timed out".to_string()),
                )
                .await;
            }
            PairingOutcome::Failed(reason) => {
                warn!(session_id = %self.id, reason = %reason, "pairing failed");
                self.transition(ConnectionStatus::Disconnected, Some(reason))
                    .await;
            }
            PairingOutcome::Cancelled => {}
        }
    }

    /// Invalidate the running pairing loop without waiting for it.
    async fn retire_pairing(&self) -> Option<PairingTask> {
        let task = self.pairing.lock().await.take();
        {
            let mut display = self.display.lock().await;
            self.generation.fetch_add(1, Ordering::SeqCst);
            display.clear();
        }
        if let Some(task) = &task {
            task.token.cancel();
        }
        task
    }

    /// Cancel the pairing loop and wait up to the stop grace for it to exit.
    /// A loop that overruns is detached; its generation is already stale.
    pub async fn stop_pairing(&self) {
        let Some(PairingTask { mut join, .. }) = self.retire_pairing().await else {
            return;
        };
        if let Err(e) = self.store.set_pairing_code(&self.id, None, None).await {
            warn!(session_id = %self.id, error = %e, "failed to clear pairing code");
        }
        match tokio::time::timeout(self.settings.stop_grace, &mut join).await {
            Ok(_) => debug!(session_id = %self.id, "pairing loop stopped"),
            Err(_) => warn!(
                session_id = %self.id,
                grace_ms = self.settings.stop_grace.as_millis() as u64,
                "pairing loop did not stop in time, detaching"
            ),
        }
    }

    pub async fn disconnect(&self) -> Result<(), SwitchboardError> {
        self.stop_pairing().await;
        self.transition(ConnectionStatus::Disconnecting, None).await;
        if let Err(e) = self.client.disconnect().await {
            warn!(session_id = %self.id, error = %e, "protocol disconnect failed");
        }
        self.transition(ConnectionStatus::Disconnected, None).await;
        info!(session_id = %self.id, "session disconnected");
        Ok(())
    }

    /// Disconnect and unlink the device; the session returns to unregistered.
    pub async fn logout(&self) -> Result<(), SwitchboardError> {
        self.stop_pairing().await;
        self.transition(ConnectionStatus::Disconnecting, None).await;
        if let Err(e) = self.client.logout().await {
            warn!(session_id = %self.id, error = %e, "protocol logout failed");
        }
        self.forget_device().await;
        self.transition(ConnectionStatus::Disconnected, None).await;
        info!(session_id = %self.id, "session logged out");
        Ok(())
    }

    async fn forget_device(&self) {
        self.state.write().await.device_identity = None;
        if let Err(e) = self.store.set_device_identity(&self.id, None).await {
            error!(session_id = %self.id, error = %e, "failed to clear device identity");
        }
    }

    pub async fn status(&self) -> SessionStatus {
        let (connected, logged_in) = {
            let state = self.state.read().await;
            (
                state.status == ConnectionStatus::Connected,
                state.device_identity.is_some(),
            )
        };
        let pairing = self.pairing_running().await
            && self.display.lock().await.current(Utc::now()).is_some();
        SessionStatus {
            connected,
            logged_in,
            pairing,
        }
    }

    /// The current pairing code. Fails when none is displayed or it expired.
    pub async fn pairing_code(&self) -> Result<PairingCode, SwitchboardError> {
        self.display
            .lock()
            .await
            .current(Utc::now())
            .cloned()
            .ok_or_else(|| SwitchboardError::NoPairingCode(self.id.clone()))
    }

    async fn ensure_connected(&self) -> Result<(), SwitchboardError> {
        if self.state.read().await.status == ConnectionStatus::Connected {
            Ok(())
        } else {
            Err(SwitchboardError::NotConnected(self.id.clone()))
        }
    }

    pub async fn send(&self, request: SendRequest) -> Result<SendReceipt, SwitchboardError> {
        self.ensure_connected().await?;
        let receipt = self.client.send(request).await?;
        self.stats.record_sent();
        Ok(receipt)
    }

    pub async fn upload_media(&self, upload: MediaUpload) -> Result<MediaHandle, SwitchboardError> {
        self.ensure_connected().await?;
        self.client.upload_media(upload).await
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await.clone();
        let pairing = self.status().await.pairing;
        SessionSnapshot {
            id: self.id.clone(),
            status: state.status,
            registration: if state.device_identity.is_some() {
                Registration::Registered
            } else {
                Registration::Unregistered
            },
            pairing,
            device_identity: state.device_identity,
            last_error: state.last_error,
            stats: self.stats.snapshot(),
            live: !self.is_released(),
        }
    }

    // Protocol event callbacks, invoked by the session's dispatch task.

    pub async fn on_connected(&self) {
        if self.is_released() {
            return;
        }
        self.mark_connected().await;
    }

    pub async fn on_disconnected(&self, reason: Option<String>) {
        if self.is_released() {
            return;
        }
        self.transition(ConnectionStatus::Disconnected, reason).await;
    }

    pub async fn on_logged_out(&self, reason: Option<String>) {
        if self.is_released() {
            return;
        }
        self.stop_pairing().await;
        self.forget_device().await;
        self.transition(ConnectionStatus::Disconnected, reason).await;
        warn!(session_id = %self.id, "device unlinked by the network");
    }

    pub async fn on_pair_success(&self, device_identity: String) {
        if self.is_released() {
            return;
        }
        self.retire_pairing().await;
        self.state.write().await.device_identity = Some(device_identity.clone());
        if let Err(e) = self
            .store
            .set_device_identity(&self.id, Some(&device_identity))
            .await
        {
            error!(session_id = %self.id, error = %e, "failed to persist device identity");
        }
        if let Err(e) = self.store.set_pairing_code(&self.id, None, None).await {
            warn!(session_id = %self.id, error = %e, "failed to clear pairing code");
        }
        info!(session_id = %self.id, device_identity = %device_identity, "pairing succeeded");
        self.mark_connected().await;
    }

    pub async fn on_message_received(&self, at: DateTime<Utc>) {
        if self.is_released() {
            return;
        }
        self.stats.record_received();
        if let Err(e) = self.store.touch_last_seen(&self.id, at).await {
            debug!(session_id = %self.id, error = %e, "failed to record last seen");
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use switchboard_core::PairingSignal;
    use switchboard_test_utils::{CountingSessionStore, MockProtocolClient};

    use crate::reconnect::ReconnectPolicy;

    fn settings() -> SessionSettings {
        SessionSettings {
            pairing_timeout: Duration::from_secs(5),
            code_ttl: Duration::from_secs(60),
            stop_grace: Duration::from_millis(500),
            reconnect: ReconnectPolicy {
                max_retries: 3,
                delay: Duration::from_millis(1),
            },
            queue_capacity: 16,
            max_sessions: 10,
        }
    }

    async fn make_handle(
        client: Arc<MockProtocolClient>,
        registered: bool,
    ) -> (Arc<SessionHandle>, Arc<CountingSessionStore>) {
        let store = Arc::new(CountingSessionStore::new());
        let mut record = SessionRecord::new("s1");
        if registered {
            record.device_identity = Some("5511987654321:2@s.whatsapp.net".into());
        }
        store.upsert_session(&record).await.unwrap();
        let handle = SessionHandle::new(&record, client, store.clone(), settings());
        (handle, store)
    }

    async fn wait_until<F: Fn() -> bool>(check: F) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn duplicate_pairing_codes_write_once_per_change() {
        let client = Arc::new(MockProtocolClient::new());
        let (handle, store) = make_handle(client.clone(), false).await;

        handle.connect().await.unwrap();
        let signals = client.pairing_sender().unwrap();
        for code in ["A", "A", "B", "B", "A"] {
            signals.send(PairingSignal::Code(code.into())).await.unwrap();
        }
        wait_until(|| store.pairing_code_writes() >= 3).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(store.pairing_code_writes(), 3);
        assert_eq!(handle.pairing_code().await.unwrap().code, "A");
        assert!(handle.status().await.pairing);
        handle.stop_pairing().await;
    }

    #[tokio::test]
    async fn pairing_success_connects_and_clears_code() {
        let client = Arc::new(MockProtocolClient::new());
        let (handle, store) = make_handle(client.clone(), false).await;

        handle.connect().await.unwrap();
        let signals = client.pairing_sender().unwrap();
        signals.send(PairingSignal::Code("A".into())).await.unwrap();
        signals
            .send(PairingSignal::Success {
                device_identity: "5511987654321:7@s.whatsapp.net".into(),
            })
            .await
            .unwrap();

        wait_until(|| {
            store
                .session("s1")
                .is_some_and(|r| r.status == ConnectionStatus::Connected)
        })
        .await;
        let status = handle.status().await;
        assert!(status.connected && status.logged_in && !status.pairing);
        assert!(matches!(
            handle.pairing_code().await,
            Err(SwitchboardError::NoPairingCode(_))
        ));
        let row = store.session("s1").unwrap();
        assert!(row.pairing_code.is_none());
        assert_eq!(
            row.device_identity.as_deref(),
            Some("5511987654321:7@s.whatsapp.net")
        );
    }

    #[tokio::test]
    async fn concurrent_connects_start_one_pairing_loop() {
        let client = Arc::new(MockProtocolClient::new());
        let (handle, store) = make_handle(client.clone(), false).await;

        let (a, b) = tokio::join!(handle.connect(), handle.connect());
        a.unwrap();
        b.unwrap();
        assert_eq!(client.pair_calls(), 1);

        client
            .pairing_sender()
            .unwrap()
            .send(PairingSignal::Code("A".into()))
            .await
            .unwrap();
        wait_until(|| store.pairing_code_writes() >= 1).await;
        assert!(handle.status().await.pairing);

        handle.stop_pairing().await;
        assert!(!handle.status().await.pairing);
        assert!(handle.pairing.lock().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn local_pairing_timeout_disconnects() {
        let client = Arc::new(MockProtocolClient::new());
        let (handle, store) = make_handle(client.clone(), false).await;

        handle.connect().await.unwrap();
        client
            .pairing_sender()
            .unwrap()
            .send(PairingSignal::Code("A".into()))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        let row = store.session("s1").unwrap();
        assert_eq!(row.status, ConnectionStatus::Disconnected);
        assert_eq!(row.last_error.as_deref(), Some("pairing timed out"));
        assert!(row.pairing_code.is_none());
        assert!(!handle.status().await.pairing);
    }

    #[tokio::test]
    async fn reconnect_ceiling_is_four_attempts() {
        let client = Arc::new(MockProtocolClient::new());
        client.fail_connects(u32::MAX);
        let (handle, store) = make_handle(client.clone(), true).await;

        let err = handle.connect_with_retry().await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(client.connect_calls(), 4);

        let row = store.session("s1").unwrap();
        assert_eq!(row.status, ConnectionStatus::Disconnected);
        assert_eq!(row.last_error, Some(err.to_string()));
        assert_eq!(handle.last_error().await, Some(err.to_string()));
    }

    #[tokio::test]
    async fn reconnect_stops_after_success() {
        let client = Arc::new(MockProtocolClient::new());
        client.fail_connects(2);
        let (handle, _store) = make_handle(client.clone(), true).await;

        handle.connect_with_retry().await.unwrap();
        assert_eq!(client.connect_calls(), 3);
        assert!(handle.status().await.connected);
    }

    #[tokio::test]
    async fn logout_clears_registration() {
        let client = Arc::new(MockProtocolClient::new());
        let (handle, store) = make_handle(client.clone(), true).await;

        handle.connect().await.unwrap();
        handle.logout().await.unwrap();

        assert_eq!(client.logout_calls(), 1);
        assert_eq!(handle.registration().await, Registration::Unregistered);
        let row = store.session("s1").unwrap();
        assert!(row.device_identity.is_none());
        assert_eq!(row.status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_cancels_pairing_loop() {
        let client = Arc::new(MockProtocolClient::new());
        let (handle, store) = make_handle(client.clone(), false).await;

        handle.connect().await.unwrap();
        let signals = client.pairing_sender().unwrap();
        signals.send(PairingSignal::Code("A".into())).await.unwrap();
        wait_until(|| store.pairing_code_writes() == 1).await;

        handle.disconnect().await.unwrap();
        assert!(!handle.status().await.pairing);

        // The retired loop must not write anything further.
        let _ = signals.send(PairingSignal::Code("B".into())).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.pairing_code_writes(), 1);
        assert_eq!(client.disconnect_calls(), 1);
    }

    #[tokio::test]
    async fn send_requires_connection() {
        let client = Arc::new(MockProtocolClient::new());
        let (handle, _store) = make_handle(client.clone(), true).await;
        let request = SendRequest {
            to: "5511987654321@s.whatsapp.net".into(),
            text: "hi".into(),
        };

        assert!(matches!(
            handle.send(request.clone()).await,
            Err(SwitchboardError::NotConnected(_))
        ));
        handle.connect().await.unwrap();
        handle.send(request).await.unwrap();
        assert_eq!(handle.stats().snapshot().messages_sent, 1);
    }

    #[tokio::test]
    async fn released_handle_ignores_callbacks() {
        let client = Arc::new(MockProtocolClient::new());
        let (handle, store) = make_handle(client, true).await;
        handle.release();
        handle.on_connected().await;
        assert_eq!(
            store.session("s1").unwrap().status,
            ConnectionStatus::Disconnected
        );
        assert!(!handle.snapshot().await.live);
    }
}
