// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Switchboard: a multi-tenant messaging gateway.
//!
//! Each tenant session holds one protocol connection. Protocol events are
//! fanned out to a signed webhook relay and, when enabled for the session,
//! mirrored into a Chatwoot-style helpdesk through an idempotent identity
//! mapping. Agent replies from the helpdesk flow back out over the protocol.
//!
//! The protocol client is supplied by the embedder as a
//! [`ProtocolClientFactory`](switchboard_core::ProtocolClientFactory).

pub mod doctor;
pub mod gateway;
pub mod serve;
pub mod sessions;
pub mod sweeper;

use switchboard_config::model::SwitchboardConfig;
use switchboard_core::SwitchboardError;

pub use gateway::{AdapterHealth, Gateway, GatewayBuilder, MappingCounts};
pub use serve::{init_tracing, serve};
pub use sweeper::spawn_sweeper;

pub use switchboard_core as core;
pub use switchboard_helpdesk::{OutboundOutcome, SkipReason, SweepReport};
pub use switchboard_session::{RestoreReport, SessionSnapshot};

const REDACTED: &str = "********";

/// The configuration as TOML, with the helpdesk token and webhook secret
/// masked.
pub fn redacted_config(config: &SwitchboardConfig) -> Result<String, SwitchboardError> {
    let mut config = config.clone();
    if config.helpdesk.api_token.is_some() {
        config.helpdesk.api_token = Some(REDACTED.into());
    }
    if config.webhook.secret.is_some() {
        config.webhook.secret = Some(REDACTED.into());
    }
    toml::to_string_pretty(&config)
        .map_err(|e| SwitchboardError::Internal(format!("failed to render config: {e}")))
}

pub fn print_config(config: &SwitchboardConfig) -> Result<(), SwitchboardError> {
    println!("{}", redacted_config(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_masked() {
        let mut config = SwitchboardConfig::default();
        config.helpdesk.api_token = Some("tok-123".into());
        config.webhook.secret = Some("hush".into());
        let rendered = redacted_config(&config).unwrap();
        assert!(!rendered.contains("tok-123"));
        assert!(!rendered.contains("hush"));
        assert!(rendered.contains(REDACTED));
    }

    #[test]
    fn rendered_config_loads_back() {
        let rendered = redacted_config(&SwitchboardConfig::default()).unwrap();
        let config = switchboard_config::load_and_validate_str(&rendered).unwrap();
        assert_eq!(config.gateway.name, "switchboard");
    }
}
