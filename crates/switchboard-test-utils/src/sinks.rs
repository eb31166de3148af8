// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording implementations of the dispatcher's collaborators.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use switchboard_core::{
    HelpdeskSettings, InboundRelay, NormalizedMessage, RelayOutcome, SwitchboardError,
    WebhookSink,
};

/// One event handed to [`RecordingWebhookSink`].
#[derive(Debug, Clone)]
pub struct Delivery {
    pub session_id: String,
    pub event_kind: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

pub struct RecordingWebhookSink {
    deliveries: Mutex<Vec<Delivery>>,
    failing: bool,
}

impl RecordingWebhookSink {
    pub fn new() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            failing: false,
        }
    }

    /// A sink that refuses every event (and records nothing).
    pub fn failing() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.deliveries()
            .into_iter()
            .map(|d| d.event_kind)
            .collect()
    }
}

impl Default for RecordingWebhookSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookSink for RecordingWebhookSink {
    async fn deliver(
        &self,
        session_id: &str,
        event_kind: &str,
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SwitchboardError> {
        if self.failing {
            return Err(SwitchboardError::Webhook {
                message: "recording sink set to fail".into(),
            });
        }
        self.deliveries.lock().unwrap().push(Delivery {
            session_id: session_id.to_string(),
            event_kind: event_kind.to_string(),
            payload,
            timestamp,
        });
        Ok(())
    }
}

/// An [`InboundRelay`] that records messages and can panic on chosen ids.
pub struct RecordingRelay {
    relayed: Mutex<Vec<NormalizedMessage>>,
    panic_on: Mutex<HashSet<String>>,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self {
            relayed: Mutex::new(Vec::new()),
            panic_on: Mutex::new(HashSet::new()),
        }
    }

    /// Panic while relaying the message with this id.
    pub fn panic_on(&self, message_id: &str) {
        self.panic_on
            .lock()
            .unwrap()
            .insert(message_id.to_string());
    }

    pub fn relayed(&self) -> Vec<NormalizedMessage> {
        self.relayed.lock().unwrap().clone()
    }
}

impl Default for RecordingRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InboundRelay for RecordingRelay {
    async fn relay_inbound(
        &self,
        _settings: &HelpdeskSettings,
        message: NormalizedMessage,
    ) -> Result<RelayOutcome, SwitchboardError> {
        let explode = self.panic_on.lock().unwrap().contains(&message.message_id);
        if explode {
            panic!("relay blew up on {}", message.message_id);
        }
        let mut relayed = self.relayed.lock().unwrap();
        relayed.push(message);
        Ok(RelayOutcome::Synced {
            helpdesk_message_id: relayed.len() as i64,
            conversation_id: 1,
        })
    }
}
