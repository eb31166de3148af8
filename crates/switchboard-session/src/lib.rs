// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session orchestration for the Switchboard gateway.
//!
//! The [`SessionRegistry`] owns every live tenant session. Each session is a
//! [`SessionHandle`] (connection state machine, pairing loop, reconnect policy)
//! with its own dispatch task that fans protocol events out through the
//! [`Dispatcher`] to the webhook sink and the helpdesk relay.

pub mod dispatch;
pub mod handle;
pub mod pairing;
pub mod reconnect;
pub mod registry;
pub mod shutdown;
pub mod stats;

use std::time::Duration;

use switchboard_config::model::SwitchboardConfig;

pub use dispatch::Dispatcher;
pub use handle::{SessionHandle, SessionSnapshot};
pub use reconnect::ReconnectPolicy;
pub use registry::{RestoreReport, SessionRegistry};
pub use stats::StatsSnapshot;

/// Runtime knobs shared by every session handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Local pairing timeout, restarted by every new code.
    pub pairing_timeout: Duration,
    /// How long a displayed pairing code stays current.
    pub code_ttl: Duration,
    /// Bounded wait for a cancelled pairing loop.
    pub stop_grace: Duration,
    pub reconnect: ReconnectPolicy,
    /// Capacity of each session's protocol event channel.
    pub queue_capacity: usize,
    pub max_sessions: usize,
}

impl SessionSettings {
    pub fn from_config(config: &SwitchboardConfig) -> Self {
        Self {
            pairing_timeout: config.pairing.timeout(),
            code_ttl: config.pairing.code_ttl(),
            stop_grace: config.pairing.stop_grace(),
            reconnect: ReconnectPolicy::from_config(&config.reconnect),
            queue_capacity: config.dispatch.queue_capacity,
            max_sessions: config.gateway.max_sessions,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&SwitchboardConfig::default())
    }
}
