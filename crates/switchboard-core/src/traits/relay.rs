// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound relay contract between the dispatcher and the helpdesk bridge.

use async_trait::async_trait;

use crate::error::SwitchboardError;
use crate::events::NormalizedMessage;
use crate::types::HelpdeskSettings;

/// What happened to one relayed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Submitted now, or found already present on the platform.
    Synced {
        helpdesk_message_id: i64,
        conversation_id: i64,
    },
    /// A `synced` or `failed` record already existed; nothing was sent.
    Duplicate,
    /// Transient failure; the record stays `pending` for the sweep.
    Pending { error: String },
    /// Terminal failure; the record is `failed`.
    Failed { error: String },
    /// The message has no helpdesk counterpart (e.g. an unresolvable address).
    Skipped,
}

#[async_trait]
pub trait InboundRelay: Send + Sync + 'static {
    async fn relay_inbound(
        &self,
        settings: &HelpdeskSettings,
        message: NormalizedMessage,
    ) -> Result<RelayOutcome, SwitchboardError>;
}
