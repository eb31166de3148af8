// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The protocol client seam.
//!
//! The wire-level client (encryption, handshake, framing) lives outside the
//! gateway. It is consumed through [`ProtocolClient`] and created per session by
//! a [`ProtocolClientFactory`], which also receives the sender half of the
//! session's event channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SwitchboardError;
use crate::events::{PairingSignal, ProtocolEvent};
use crate::identifier::Jid;
use crate::types::{MediaHandle, MediaUpload, SendReceipt, SendRequest, SessionRecord};

/// One live protocol connection for one tenant session.
#[async_trait]
pub trait ProtocolClient: Send + Sync + 'static {
    /// The paired device identity, once known.
    fn device_identity(&self) -> Option<String>;

    /// Opens the pairing channel and starts the handshake.
    ///
    /// The channel yields [`PairingSignal::Code`] values until a terminal
    /// `Success`, `Timeout` or `Error` signal, then closes.
    async fn pair(&self) -> Result<mpsc::Receiver<PairingSignal>, SwitchboardError>;

    /// Reconnects with the stored device identity.
    async fn connect(&self) -> Result<(), SwitchboardError>;

    async fn disconnect(&self) -> Result<(), SwitchboardError>;

    /// Unlinks the device from the account.
    async fn logout(&self) -> Result<(), SwitchboardError>;

    /// Sends a message. An unknown recipient fails with
    /// [`SwitchboardError::InvalidRecipient`].
    async fn send(&self, request: SendRequest) -> Result<SendReceipt, SwitchboardError>;

    async fn upload_media(&self, upload: MediaUpload) -> Result<MediaHandle, SwitchboardError>;
}

/// Builds protocol clients from durable session rows.
#[async_trait]
pub trait ProtocolClientFactory: Send + Sync + 'static {
    async fn create(
        &self,
        record: &SessionRecord,
        events: mpsc::Sender<ProtocolEvent>,
    ) -> Result<Arc<dyn ProtocolClient>, SwitchboardError>;
}

/// Sends text through a live session, resolving the recipient on the way.
#[async_trait]
pub trait ProtocolSender: Send + Sync + 'static {
    async fn send_text(
        &self,
        session_id: &str,
        to: &Jid,
        text: &str,
    ) -> Result<SendReceipt, SwitchboardError>;
}
