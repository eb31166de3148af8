// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the session layer, the storage backend and the bridges.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter plugged into the gateway.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Webhook,
    Helpdesk,
}

/// Connection sub-state of a session, persisted as lowercase text.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Registration half of the session state: whether a device identity is on record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
pub enum Registration {
    Unregistered,
    Registered,
}

/// Synchronization status of an identity mapping record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

/// Whether a message was authored by the tenant or received from a counterparty.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the counterparty.
    Incoming,
    /// Sent by the tenant (from any of its devices).
    Outgoing,
}

impl Direction {
    pub fn from_me(from_me: bool) -> Self {
        if from_me {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }

    pub fn is_from_me(self) -> bool {
        self == Direction::Outgoing
    }
}

/// Outbound proxy scheme.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProxyKind {
    Http,
    Https,
    Socks5,
}

/// Per-session outbound proxy configuration, handed to the protocol client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(rename = "type")]
    pub kind: ProxyKind,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Renders the proxy as a URL, credentials included when present.
    pub fn url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                format!("{}://{user}:{pass}@{}:{}", self.kind, self.host, self.port)
            }
            (Some(user), None) => format!("{}://{user}@{}:{}", self.kind, self.host, self.port),
            _ => format!("{}://{}:{}", self.kind, self.host, self.port),
        }
    }
}

/// Per-session helpdesk bridge settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpdeskSettings {
    pub enabled: bool,
    pub account_id: i64,
    pub inbox_id: i64,
    /// Reuse a resolved conversation instead of opening a new one.
    #[serde(default = "default_true")]
    pub reopen_conversation: bool,
    /// New and reopened conversations start in `pending` instead of `open`.
    #[serde(default)]
    pub conversation_pending: bool,
    /// Treat both Brazilian numbering variants as the same contact.
    #[serde(default = "default_true")]
    pub merge_alternate_numbering_form: bool,
    /// History sync window in days; 0 disables history import.
    #[serde(default)]
    pub import_days: u32,
    /// Prefix outbound messages with the agent's name.
    #[serde(default)]
    pub sign_messages: bool,
}

fn default_true() -> bool {
    true
}

/// Durable session row.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub device_identity: Option<String>,
    pub status: ConnectionStatus,
    pub pairing_code: Option<String>,
    pub pairing_expires_at: Option<DateTime<Utc>>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub proxy: Option<ProxyConfig>,
    pub helpdesk: Option<HelpdeskSettings>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// A fresh, unregistered and disconnected session.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            device_identity: None,
            status: ConnectionStatus::Disconnected,
            pairing_code: None,
            pairing_expires_at: None,
            last_seen_at: None,
            last_error: None,
            proxy: None,
            helpdesk: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn registration(&self) -> Registration {
        if self.device_identity.is_some() {
            Registration::Registered
        } else {
            Registration::Unregistered
        }
    }
}

/// Values needed to claim a new identity mapping record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMapping {
    pub session_id: String,
    pub protocol_message_id: String,
    pub chat_identifier: String,
    pub sender_identifier: String,
    pub direction: Direction,
    pub protocol_timestamp: DateTime<Utc>,
    /// Serialized normalized message, replayed by the pending sweep.
    pub payload: Option<String>,
}

/// Durable row linking a protocol message to its helpdesk counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingRecord {
    pub id: i64,
    pub session_id: String,
    pub protocol_message_id: String,
    pub chat_identifier: String,
    pub sender_identifier: String,
    pub direction: Direction,
    pub protocol_timestamp: DateTime<Utc>,
    pub helpdesk_message_id: Option<i64>,
    pub helpdesk_conversation_id: Option<i64>,
    pub sync_status: SyncStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub payload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub synced_at: Option<DateTime<Utc>>,
}

/// Control-surface view of a session's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub connected: bool,
    pub logged_in: bool,
    /// A pairing handshake is running with a current code.
    pub pairing: bool,
}

/// The current pairing code with its terminal rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairingCode {
    pub code: String,
    pub rendered: String,
    pub expires_at: DateTime<Utc>,
}

/// Abstract send request; per-payload builders live outside the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendRequest {
    /// Canonical recipient address (`user@server`).
    pub to: String,
    pub text: String,
}

/// Result of a successful protocol send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Media to upload through the protocol client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Opaque handle returned by a media upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaHandle {
    pub url: String,
    pub direct_path: Option<String>,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn connection_status_roundtrips_lowercase() {
        for status in [
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnecting,
        ] {
            let s = status.to_string();
            assert_eq!(s, s.to_lowercase());
            assert_eq!(ConnectionStatus::from_str(&s).unwrap(), status);
        }
    }

    #[test]
    fn proxy_url_includes_credentials() {
        let proxy = ProxyConfig {
            kind: ProxyKind::Socks5,
            host: "10.0.0.1".into(),
            port: 1080,
            username: Some("u".into()),
            password: Some("p".into()),
        };
        assert_eq!(proxy.url(), "socks5://u:p@10.0.0.1:1080");
    }

    #[test]
    fn proxy_deserializes_type_field() {
        let proxy: ProxyConfig =
            serde_json::from_str(r#"{"type":"https","host":"proxy","port":8443}"#).unwrap();
        assert_eq!(proxy.kind, ProxyKind::Https);
        assert_eq!(proxy.url(), "https://proxy:8443");
    }

    #[test]
    fn helpdesk_settings_defaults() {
        let settings: HelpdeskSettings =
            serde_json::from_str(r#"{"enabled":true,"accountId":1,"inboxId":2}"#).unwrap();
        assert!(settings.reopen_conversation);
        assert!(settings.merge_alternate_numbering_form);
        assert!(!settings.conversation_pending);
        assert_eq!(settings.import_days, 0);
    }

    #[test]
    fn registration_follows_device_identity() {
        let mut record = SessionRecord::new("s1");
        assert_eq!(record.registration(), Registration::Unregistered);
        record.device_identity = Some("5511999999999:1@s.whatsapp.net".into());
        assert_eq!(record.registration(), Registration::Registered);
    }
}
