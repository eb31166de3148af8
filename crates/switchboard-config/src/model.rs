// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Switchboard gateway.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Switchboard configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchboardConfig {
    /// Gateway identity and process-wide behavior.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Pairing handshake settings.
    #[serde(default)]
    pub pairing: PairingConfig,

    /// Bounded reconnect policy.
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Per-session event dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Generic webhook relay. Disabled when `url` is unset.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Helpdesk platform bridge. Disabled when `base_url` is unset.
    #[serde(default)]
    pub helpdesk: HelpdeskConfig,
}

/// Gateway identity and process-wide behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Instance name, used in logs and health reports.
    #[serde(default = "default_gateway_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Maximum number of live sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Reconnect registered sessions when the process starts.
    #[serde(default = "default_true")]
    pub reconnect_on_startup: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            name: default_gateway_name(),
            log_level: default_log_level(),
            max_sessions: default_max_sessions(),
            reconnect_on_startup: true,
        }
    }
}

fn default_gateway_name() -> String {
    "switchboard".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_sessions() -> usize {
    100
}

fn default_true() -> bool {
    true
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("switchboard").join("switchboard.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("switchboard.db"))
        .to_string_lossy()
        .into_owned()
}

/// Pairing handshake configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PairingConfig {
    /// Give up pairing when no new code arrives for this long.
    #[serde(default = "default_pairing_timeout_secs")]
    pub timeout_secs: u64,

    /// Lifetime recorded alongside each persisted pairing code.
    #[serde(default = "default_code_ttl_secs")]
    pub code_ttl_secs: u64,

    /// How long `disconnect`/`logout` wait for the pairing loop before detaching it.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_pairing_timeout_secs(),
            code_ttl_secs: default_code_ttl_secs(),
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

impl PairingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

fn default_pairing_timeout_secs() -> u64 {
    120
}

fn default_code_ttl_secs() -> u64 {
    60
}

fn default_stop_grace_ms() -> u64 {
    500
}

/// Bounded reconnect policy configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconnectConfig {
    /// Retries after the first failed attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts in milliseconds.
    #[serde(default = "default_reconnect_delay_ms")]
    pub delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_ms: default_reconnect_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

/// Per-session event dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchConfig {
    /// Capacity of each session's event channel.
    #[serde(default = "default_dispatch_capacity")]
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_dispatch_capacity(),
        }
    }
}

fn default_dispatch_capacity() -> usize {
    256
}

/// Generic webhook relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    /// Subscriber endpoint. `None` disables the relay.
    #[serde(default)]
    pub url: Option<String>,

    /// HMAC-SHA256 signing secret for the `X-Switchboard-Signature` header.
    #[serde(default)]
    pub secret: Option<String>,

    /// Event kinds to deliver (snake_case). Empty delivers everything.
    #[serde(default)]
    pub events: Vec<String>,

    /// Number of delivery workers.
    #[serde(default = "default_webhook_workers")]
    pub workers: usize,

    /// Capacity of the delivery queue.
    #[serde(default = "default_webhook_capacity")]
    pub queue_capacity: usize,

    /// Attempts per event, the first included.
    #[serde(default = "default_webhook_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_webhook_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Per-request timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            secret: None,
            events: Vec::new(),
            workers: default_webhook_workers(),
            queue_capacity: default_webhook_capacity(),
            max_attempts: default_webhook_attempts(),
            retry_delay_ms: default_webhook_retry_delay_ms(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_webhook_workers() -> usize {
    4
}

fn default_webhook_capacity() -> usize {
    1024
}

fn default_webhook_attempts() -> u32 {
    3
}

fn default_webhook_retry_delay_ms() -> u64 {
    1_000
}

fn default_request_timeout_secs() -> u64 {
    10
}

/// Helpdesk platform bridge configuration.
///
/// Per-session routing (account, inbox, lifecycle flags) lives on the session
/// itself; this section only holds the platform connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HelpdeskConfig {
    /// Platform base URL, e.g. `https://chatwoot.example.com`. `None` disables the bridge.
    #[serde(default)]
    pub base_url: Option<String>,

    /// API access token sent as `api_access_token`.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Transient failures tolerated per message before it is marked failed.
    #[serde(default = "default_helpdesk_attempts")]
    pub max_attempts: u32,

    /// Interval of the pending-record sweep. 0 disables the sweep.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Records re-attempted per session per sweep.
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for HelpdeskConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            max_attempts: default_helpdesk_attempts(),
            sweep_interval_secs: default_sweep_interval_secs(),
            sweep_batch_size: default_sweep_batch_size(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_helpdesk_attempts() -> u32 {
    5
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_sweep_batch_size() -> usize {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_durations() {
        let pairing = PairingConfig::default();
        assert_eq!(pairing.stop_grace(), Duration::from_millis(500));
        assert_eq!(pairing.timeout(), Duration::from_secs(120));
    }

    #[test]
    fn webhook_and_helpdesk_disabled_by_default() {
        let config = SwitchboardConfig::default();
        assert!(config.webhook.url.is_none());
        assert!(config.helpdesk.base_url.is_none());
        assert!(config.webhook.events.is_empty());
    }

    #[test]
    fn sections_deny_unknown_fields() {
        let result = toml::from_str::<SwitchboardConfig>("[reconnect]\nretries = 2\n");
        assert!(result.is_err());
    }
}
