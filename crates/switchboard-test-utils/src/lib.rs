// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Switchboard integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic tests without a messaging network or helpdesk server.
//!
//! # Components
//!
//! - [`MockProtocolClient`] / [`MockProtocolFactory`] - scripted protocol connections
//! - [`MockHelpdesk`] - in-memory helpdesk platform with failure injection
//! - [`RecordingWebhookSink`] / [`RecordingRelay`] - capture what the dispatcher emits
//! - [`CountingSessionStore`] - in-memory session store counting pairing-code writes
//! - [`TestHarness`] - a full gateway over temp SQLite and the mocks above

pub mod harness;
pub mod helpdesk;
pub mod protocol;
pub mod sinks;
pub mod store;

pub use harness::{TestHarness, TestHarnessBuilder, text_message};
pub use helpdesk::{MockFailure, MockHelpdesk};
pub use protocol::{MockProtocolClient, MockProtocolFactory, RecordingSender, message_id};
pub use sinks::{Delivery, RecordingRelay, RecordingWebhookSink};
pub use store::CountingSessionStore;
