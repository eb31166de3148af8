// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait seams of the gateway.
//!
//! Backends extend the [`PluginAdapter`] base trait and all traits use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod helpdesk;
pub mod protocol;
pub mod relay;
pub mod storage;
pub mod webhook;

pub use adapter::PluginAdapter;
pub use helpdesk::HelpdeskPlatform;
pub use protocol::{ProtocolClient, ProtocolClientFactory, ProtocolSender};
pub use relay::{InboundRelay, RelayOutcome};
pub use storage::{MappingStore, SessionStore, StorageAdapter};
pub use webhook::WebhookSink;
