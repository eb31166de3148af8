// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Switchboard messaging gateway.
//!
//! This crate provides the trait seams, error type, identifier resolution and
//! protocol event model shared by every other crate in the workspace.

pub mod error;
pub mod events;
pub mod identifier;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::SwitchboardError;
pub use events::{EventKind, NormalizedMessage, PairingSignal, ProtocolEvent};
pub use identifier::Jid;
pub use types::{
    AdapterType, ConnectionStatus, Direction, HealthStatus, HelpdeskSettings, MappingRecord,
    NewMapping, SessionRecord, SyncStatus,
};

pub use traits::{
    HelpdeskPlatform, InboundRelay, MappingStore, PluginAdapter, ProtocolClient,
    ProtocolClientFactory, ProtocolSender, RelayOutcome, SessionStore, StorageAdapter,
    WebhookSink,
};
