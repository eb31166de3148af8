// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generic event sink contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SwitchboardError;

/// Receives every dispatched protocol event, untransformed.
///
/// Implementations must not block dispatch: an error means the event was not
/// accepted and is logged by the caller.
#[async_trait]
pub trait WebhookSink: Send + Sync + 'static {
    async fn deliver(
        &self,
        session_id: &str,
        event_kind: &str,
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SwitchboardError>;
}
