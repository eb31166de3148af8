// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpdesk integration for the Switchboard gateway.
//!
//! [`ChatwootClient`] speaks the platform's REST API. [`HelpdeskBridge`] sits on
//! top of any [`HelpdeskPlatform`](switchboard_core::HelpdeskPlatform) and relays
//! messages both ways without ever duplicating one.

pub mod bridge;
pub mod client;
pub mod format;
pub mod types;

pub use bridge::{
    BridgeSettings, HelpdeskBridge, OutboundOutcome, SOURCE_MARKER_PREFIX, SkipReason,
    SweepReport, source_marker,
};
pub use client::ChatwootClient;
pub use types::{PlatformConversation, PlatformEvent, PlatformMessage};
