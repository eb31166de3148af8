// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete [`Gateway`] around a temp SQLite
//! database, the mock protocol factory, an optional in-memory helpdesk and a
//! recording webhook sink. Helpers drive pairing and inbound traffic the way
//! a real protocol client would.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use switchboard::Gateway;
use switchboard_config::model::SwitchboardConfig;
use switchboard_core::events::{MessageContent, MessageEvent};
use switchboard_core::{
    HelpdeskSettings, MappingRecord, MappingStore, PairingSignal, ProtocolEvent,
    SwitchboardError, SyncStatus,
};

use crate::helpdesk::MockHelpdesk;
use crate::protocol::{MockProtocolClient, MockProtocolFactory};
use crate::sinks::RecordingWebhookSink;

/// Account and inbox ids used by [`TestHarness::helpdesk_settings`].
pub const ACCOUNT_ID: i64 = 1;
pub const INBOX_ID: i64 = 7;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const WAIT_STEP: Duration = Duration::from_millis(10);

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: SwitchboardConfig,
    helpdesk: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = SwitchboardConfig::default();
        config.pairing.timeout_secs = 5;
        config.reconnect.delay_ms = 10;
        config.helpdesk.sweep_interval_secs = 0;
        Self {
            config,
            helpdesk: false,
        }
    }

    /// Install the in-memory helpdesk platform.
    pub fn with_helpdesk(mut self) -> Self {
        self.helpdesk = true;
        self
    }

    /// Adjust the configuration before the gateway is built.
    pub fn configure(mut self, apply: impl FnOnce(&mut SwitchboardConfig)) -> Self {
        apply(&mut self.config);
        self
    }

    pub async fn build(self) -> Result<TestHarness, SwitchboardError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| SwitchboardError::Storage { source: e.into() })?;
        let mut config = self.config;
        config.storage.database_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();

        let protocol = Arc::new(MockProtocolFactory::new());
        let webhook = Arc::new(RecordingWebhookSink::new());
        let helpdesk = self.helpdesk.then(|| Arc::new(MockHelpdesk::new()));

        let mut builder = Gateway::builder(config, protocol.clone()).webhook_sink(webhook.clone());
        if let Some(helpdesk) = &helpdesk {
            builder = builder.helpdesk_platform(helpdesk.clone());
        }
        let gateway = Arc::new(builder.build().await?);

        Ok(TestHarness {
            gateway,
            protocol,
            helpdesk,
            webhook,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete gateway wired to mocks, isolated in its own temp directory.
pub struct TestHarness {
    pub gateway: Arc<Gateway>,
    pub protocol: Arc<MockProtocolFactory>,
    pub helpdesk: Option<Arc<MockHelpdesk>>,
    pub webhook: Arc<RecordingWebhookSink>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Bridge settings pointing at [`ACCOUNT_ID`]/[`INBOX_ID`].
    pub fn helpdesk_settings() -> HelpdeskSettings {
        HelpdeskSettings {
            enabled: true,
            account_id: ACCOUNT_ID,
            inbox_id: INBOX_ID,
            reopen_conversation: true,
            conversation_pending: false,
            merge_alternate_numbering_form: true,
            import_days: 0,
            sign_messages: false,
        }
    }

    /// The mock helpdesk. Panics when the harness was built without one.
    pub fn helpdesk(&self) -> &Arc<MockHelpdesk> {
        self.helpdesk
            .as_ref()
            .expect("harness built without with_helpdesk()")
    }

    /// The latest protocol client built for `session_id`.
    pub fn client(&self, session_id: &str) -> Arc<MockProtocolClient> {
        self.protocol
            .client(session_id)
            .unwrap_or_else(|| panic!("no protocol client for {session_id}"))
    }

    /// Create, connect and pair a session, waiting until it is connected.
    pub async fn paired_session(
        &self,
        session_id: &str,
        helpdesk: Option<HelpdeskSettings>,
    ) -> Arc<MockProtocolClient> {
        self.gateway
            .create_session(session_id, None, helpdesk)
            .await
            .expect("create session");
        self.gateway.connect(session_id).await.expect("connect");
        let client = self.client(session_id);
        let pairing = client.pairing_sender().expect("pairing started");
        pairing
            .send(PairingSignal::Code("2@PAIR,CODE".into()))
            .await
            .expect("pairing channel open");
        pairing
            .send(PairingSignal::Success {
                device_identity: format!("{session_id}-device"),
            })
            .await
            .expect("pairing channel open");
        self.wait_for("session to connect", || async {
            self.gateway
                .status(session_id)
                .await
                .is_ok_and(|s| s.connected)
        })
        .await;
        client
    }

    /// Inject a text message from `from` into the session's event stream.
    pub async fn inbound_text(&self, session_id: &str, message_id: &str, from: &str, body: &str) {
        let event = ProtocolEvent::Message(text_message(message_id, from, false, body));
        self.client(session_id).emit(event).await;
    }

    pub async fn mapping(&self, session_id: &str, message_id: &str) -> Option<MappingRecord> {
        self.gateway
            .storage()
            .get_mapping(session_id, message_id)
            .await
            .expect("mapping lookup")
    }

    /// Wait until the mapping for `message_id` reaches `status`.
    pub async fn wait_for_mapping(
        &self,
        session_id: &str,
        message_id: &str,
        status: SyncStatus,
    ) -> MappingRecord {
        self.wait_for("mapping status", || async {
            self.mapping(session_id, message_id)
                .await
                .is_some_and(|m| m.sync_status == status)
        })
        .await;
        self.mapping(session_id, message_id)
            .await
            .expect("mapping present")
    }

    /// Poll `check` until it holds, panicking after a few seconds.
    pub async fn wait_for<F, Fut>(&self, what: &str, check: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        while !check().await {
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for {what}");
            }
            tokio::time::sleep(WAIT_STEP).await;
        }
    }
}

/// A protocol text message as the client would deliver it.
pub fn text_message(id: &str, from: &str, from_me: bool, body: &str) -> MessageEvent {
    MessageEvent {
        id: id.to_string(),
        chat: from.to_string(),
        sender: from.to_string(),
        from_me,
        push_name: Some("Test Contact".to_string()),
        timestamp: Utc::now(),
        is_group: false,
        content: MessageContent::Text {
            body: body.to_string(),
        },
    }
}
