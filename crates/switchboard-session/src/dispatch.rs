// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session event dispatch.
//!
//! Each live session gets one dispatch task consuming its protocol event
//! channel in arrival order. Every event is offered to the webhook sink, then
//! applied to session state, then (for message events) relayed to the helpdesk
//! bridge. A panic while handling one event is caught and logged; the task
//! moves on to the next event.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use switchboard_core::events::MessageEvent;
use switchboard_core::{HelpdeskSettings, InboundRelay, ProtocolEvent, WebhookSink};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::handle::SessionHandle;

/// Fans protocol events out to the optional collaborators.
#[derive(Clone, Default)]
pub struct Dispatcher {
    webhook: Option<Arc<dyn WebhookSink>>,
    relay: Option<Arc<dyn InboundRelay>>,
}

impl Dispatcher {
    pub fn new(
        webhook: Option<Arc<dyn WebhookSink>>,
        relay: Option<Arc<dyn InboundRelay>>,
    ) -> Self {
        Self { webhook, relay }
    }

    /// Spawn the dispatch task for `handle`. It ends when the channel closes or
    /// the handle is released.
    pub fn spawn(
        &self,
        handle: Arc<SessionHandle>,
        mut events: mpsc::Receiver<ProtocolEvent>,
    ) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let closed = handle.closed();
            loop {
                let event = tokio::select! {
                    biased;
                    _ = closed.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let kind = event.kind();
                let outcome = AssertUnwindSafe(dispatcher.dispatch(&handle, event))
                    .catch_unwind()
                    .await;
                if let Err(panic) = outcome {
                    error!(
                        session_id = %handle.id(),
                        event = %kind,
                        panic = %panic_message(panic.as_ref()),
                        "event handler panicked"
                    );
                }
            }
            debug!(session_id = %handle.id(), "dispatch task finished");
        })
    }

    /// Handle one event for `handle`.
    pub async fn dispatch(&self, handle: &SessionHandle, event: ProtocolEvent) {
        let kind = event.kind();

        if let Some(webhook) = &self.webhook
            && let Err(e) = webhook
                .deliver(handle.id(), &kind.to_string(), event.payload(), Utc::now())
                .await
        {
            warn!(session_id = %handle.id(), event = %kind, error = %e, "webhook delivery not accepted");
        }

        match event {
            ProtocolEvent::Connected => handle.on_connected().await,
            ProtocolEvent::Disconnected { reason } => handle.on_disconnected(reason).await,
            ProtocolEvent::ConnectFailure { reason } => {
                handle.on_disconnected(Some(reason)).await
            }
            ProtocolEvent::LoggedOut { reason } => handle.on_logged_out(reason).await,
            ProtocolEvent::PairSuccess {
                device_identity,
                platform,
            } => {
                debug!(session_id = %handle.id(), platform = ?platform, "pair success event");
                handle.on_pair_success(device_identity).await;
            }
            ProtocolEvent::Message(message) => {
                handle.on_message_received(message.timestamp).await;
                if let Some(settings) = self.relay_settings(handle).await {
                    self.relay(handle, &settings, std::iter::once(message)).await;
                }
            }
            ProtocolEvent::HistorySync { messages } => {
                self.import_history(handle, messages).await;
            }
            ProtocolEvent::Receipt { .. }
            | ProtocolEvent::Presence { .. }
            | ProtocolEvent::CallOffer { .. } => {}
            ProtocolEvent::Unknown { kind, .. } => {
                debug!(session_id = %handle.id(), kind = %kind, "ignoring unknown protocol event");
            }
        }
    }

    /// Bridge settings when a relay is configured and enabled for the session.
    async fn relay_settings(&self, handle: &SessionHandle) -> Option<HelpdeskSettings> {
        self.relay.as_ref()?;
        handle.helpdesk_settings().await.filter(|s| s.enabled)
    }

    async fn import_history(&self, handle: &SessionHandle, messages: Vec<MessageEvent>) {
        let Some(settings) = self.relay_settings(handle).await else {
            return;
        };
        if settings.import_days == 0 {
            debug!(session_id = %handle.id(), count = messages.len(), "history import disabled");
            return;
        }
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(settings.import_days));
        let recent: Vec<MessageEvent> = messages
            .into_iter()
            .filter(|m| m.timestamp >= cutoff)
            .collect();
        debug!(session_id = %handle.id(), count = recent.len(), "importing history");
        self.relay(handle, &settings, recent).await;
    }

    async fn relay(
        &self,
        handle: &SessionHandle,
        settings: &HelpdeskSettings,
        messages: impl IntoIterator<Item = MessageEvent>,
    ) {
        let Some(relay) = &self.relay else {
            return;
        };
        for message in messages {
            let Some(normalized) = message.normalize(handle.id()) else {
                debug!(session_id = %handle.id(), message_id = %message.id, "message not relayable");
                continue;
            };
            match relay.relay_inbound(settings, normalized).await {
                Ok(outcome) => {
                    debug!(session_id = %handle.id(), message_id = %message.id, ?outcome, "message relayed");
                }
                Err(e) => {
                    warn!(session_id = %handle.id(), message_id = %message.id, error = %e, "helpdesk relay failed");
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use switchboard_core::events::MessageContent;
    use switchboard_core::{ConnectionStatus, PairingSignal, SessionRecord, SessionStore};
    use switchboard_test_utils::{
        CountingSessionStore, MockProtocolClient, RecordingRelay, RecordingWebhookSink,
    };
    use tracing_test::traced_test;

    use crate::reconnect::ReconnectPolicy;
    use crate::SessionSettings;

    fn settings() -> SessionSettings {
        SessionSettings {
            pairing_timeout: Duration::from_secs(5),
            code_ttl: Duration::from_secs(60),
            stop_grace: Duration::from_millis(100),
            reconnect: ReconnectPolicy::default(),
            queue_capacity: 16,
            max_sessions: 10,
        }
    }

    fn helpdesk(import_days: u32) -> HelpdeskSettings {
        HelpdeskSettings {
            enabled: true,
            account_id: 1,
            inbox_id: 1,
            reopen_conversation: true,
            conversation_pending: false,
            merge_alternate_numbering_form: true,
            import_days,
            sign_messages: false,
        }
    }

    async fn handle(id: &str, bridge: Option<HelpdeskSettings>) -> Arc<SessionHandle> {
        let store = Arc::new(CountingSessionStore::new());
        let mut record = SessionRecord::new(id);
        record.helpdesk = bridge;
        store.upsert_session(&record).await.unwrap();
        SessionHandle::new(
            &record,
            Arc::new(MockProtocolClient::new()),
            store,
            settings(),
        )
    }

    fn text(id: &str, age: chrono::Duration) -> MessageEvent {
        MessageEvent {
            id: id.into(),
            chat: "5511987654321@s.whatsapp.net".into(),
            sender: "5511987654321@s.whatsapp.net".into(),
            from_me: false,
            push_name: Some("Ana".into()),
            timestamp: Utc::now() - age,
            is_group: false,
            content: MessageContent::Text { body: "oi".into() },
        }
    }

    async fn wait_for(relay: &RecordingRelay, n: usize) {
        for _ in 0..200 {
            if relay.relayed().len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("expected {n} relayed messages");
    }

    #[tokio::test]
    async fn every_event_reaches_webhook_untransformed() {
        let sink = Arc::new(RecordingWebhookSink::new());
        let dispatcher = Dispatcher::new(Some(sink.clone()), None);
        let handle = handle("s1", None).await;

        dispatcher
            .dispatch(
                &handle,
                ProtocolEvent::Presence {
                    from: "5511987654321@s.whatsapp.net".into(),
                    available: true,
                },
            )
            .await;
        dispatcher
            .dispatch(
                &handle,
                ProtocolEvent::Unknown {
                    kind: "newsletter_join".into(),
                    payload: serde_json::json!({"id": 1}),
                },
            )
            .await;

        let deliveries = sink.deliveries();
        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].session_id, "s1");
        assert_eq!(deliveries[0].event_kind, "presence");
        assert_eq!(deliveries[0].payload["available"], true);
        assert_eq!(deliveries[1].event_kind, "unknown");
    }

    #[tokio::test]
    async fn webhook_failure_does_not_block_state_effects() {
        let sink = Arc::new(RecordingWebhookSink::failing());
        let dispatcher = Dispatcher::new(Some(sink), None);
        let handle = handle("s1", None).await;

        dispatcher.dispatch(&handle, ProtocolEvent::Connected).await;
        assert_eq!(handle.connection_status().await, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn pair_success_event_connects_the_session() {
        let client = Arc::new(MockProtocolClient::new());
        let store = Arc::new(CountingSessionStore::new());
        let record = SessionRecord::new("s1");
        store.upsert_session(&record).await.unwrap();
        let handle = SessionHandle::new(&record, client.clone(), store.clone(), settings());
        let dispatcher = Dispatcher::new(None, None);

        handle.connect().await.unwrap();
        let signals = client.pairing_sender().unwrap();
        signals.send(PairingSignal::Code("A".into())).await.unwrap();
        dispatcher
            .dispatch(
                &handle,
                ProtocolEvent::PairSuccess {
                    device_identity: "s1-device".into(),
                    platform: None,
                },
            )
            .await;
        // The loop is retired, so a late channel signal changes nothing.
        let _ = signals
            .send(PairingSignal::Success {
                device_identity: "s1-device".into(),
            })
            .await;

        let status = handle.status().await;
        assert!(status.connected && status.logged_in && !status.pairing);
        let row = store.session("s1").unwrap();
        assert_eq!(row.status, ConnectionStatus::Connected);
        assert_eq!(row.device_identity.as_deref(), Some("s1-device"));
        assert!(row.pairing_code.is_none());
        assert!(row.last_seen_at.is_some());
    }

    #[tokio::test]
    async fn messages_relay_only_when_bridge_enabled() {
        let relay = Arc::new(RecordingRelay::new());
        let dispatcher = Dispatcher::new(None, Some(relay.clone()));

        let plain = handle("plain", None).await;
        dispatcher
            .dispatch(&plain, ProtocolEvent::Message(text("m1", chrono::Duration::zero())))
            .await;
        assert!(relay.relayed().is_empty());

        let bridged = handle("bridged", Some(helpdesk(0))).await;
        dispatcher
            .dispatch(&bridged, ProtocolEvent::Message(text("m2", chrono::Duration::zero())))
            .await;
        let relayed = relay.relayed();
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].session_id, "bridged");
        assert_eq!(relayed[0].message_id, "m2");
        assert_eq!(bridged.stats().snapshot().messages_received, 1);
    }

    #[tokio::test]
    async fn history_import_respects_window() {
        let relay = Arc::new(RecordingRelay::new());
        let dispatcher = Dispatcher::new(None, Some(relay.clone()));

        let disabled = handle("s0", Some(helpdesk(0))).await;
        dispatcher
            .dispatch(
                &disabled,
                ProtocolEvent::HistorySync {
                    messages: vec![text("h0", chrono::Duration::hours(1))],
                },
            )
            .await;
        assert!(relay.relayed().is_empty());

        let windowed = handle("s1", Some(helpdesk(2))).await;
        dispatcher
            .dispatch(
                &windowed,
                ProtocolEvent::HistorySync {
                    messages: vec![
                        text("old", chrono::Duration::days(5)),
                        text("new", chrono::Duration::hours(3)),
                    ],
                },
            )
            .await;
        let ids: Vec<String> = relay.relayed().into_iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec!["new".to_string()]);
    }

    #[tokio::test]
    #[traced_test]
    async fn panic_in_one_session_leaves_others_running() {
        let relay = Arc::new(RecordingRelay::new());
        relay.panic_on("boom");
        let dispatcher = Dispatcher::new(None, Some(relay.clone()));

        let x = handle("x", Some(helpdesk(0))).await;
        let y = handle("y", Some(helpdesk(0))).await;
        let (tx_x, rx_x) = mpsc::channel(8);
        let (tx_y, rx_y) = mpsc::channel(8);
        let task_x = dispatcher.spawn(x.clone(), rx_x);
        let task_y = dispatcher.spawn(y.clone(), rx_y);

        tx_x.send(ProtocolEvent::Message(text("boom", chrono::Duration::zero())))
            .await
            .unwrap();
        tx_y.send(ProtocolEvent::Message(text("y1", chrono::Duration::zero())))
            .await
            .unwrap();
        tx_x.send(ProtocolEvent::Message(text("x2", chrono::Duration::zero())))
            .await
            .unwrap();

        wait_for(&relay, 2).await;
        let mut ids: Vec<String> = relay.relayed().into_iter().map(|m| m.message_id).collect();
        ids.sort();
        assert_eq!(ids, vec!["x2".to_string(), "y1".to_string()]);
        assert!(!task_x.is_finished());
        assert!(logs_contain("event handler panicked"));

        x.release();
        drop(tx_y);
        task_x.await.unwrap();
        task_y.await.unwrap();
    }
}
