// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Switchboard configuration system.

use switchboard_config::diagnostic::ConfigError;
use switchboard_config::model::SwitchboardConfig;
use switchboard_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with every section deserializes successfully.
#[test]
fn valid_toml_deserializes_into_config() {
    let toml = r#"
[gateway]
name = "edge-1"
log_level = "debug"
max_sessions = 25
reconnect_on_startup = false

[storage]
database_path = "/tmp/switchboard-test.db"
wal_mode = false

[pairing]
timeout_secs = 90
code_ttl_secs = 20
stop_grace_ms = 250

[reconnect]
max_retries = 5
delay_ms = 100

[dispatch]
queue_capacity = 64

[webhook]
url = "https://hooks.example.com/in"
secret = "s3cret"
events = ["message", "connected"]
workers = 2

[helpdesk]
base_url = "https://desk.example.com"
api_token = "tok"
sweep_interval_secs = 0
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.gateway.name, "edge-1");
    assert_eq!(config.gateway.max_sessions, 25);
    assert!(!config.gateway.reconnect_on_startup);
    assert!(!config.storage.wal_mode);
    assert_eq!(config.pairing.stop_grace_ms, 250);
    assert_eq!(config.reconnect.max_retries, 5);
    assert_eq!(config.dispatch.queue_capacity, 64);
    assert_eq!(config.webhook.events, vec!["message", "connected"]);
    assert_eq!(config.webhook.workers, 2);
    // Unset keys inside a present section keep their defaults.
    assert_eq!(config.webhook.max_attempts, 3);
    assert_eq!(config.helpdesk.api_token.as_deref(), Some("tok"));
    assert_eq!(config.helpdesk.sweep_interval_secs, 0);
}

#[test]
fn missing_optional_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty config is valid");
    assert_eq!(config.gateway.name, "switchboard");
    assert_eq!(config.gateway.log_level, "info");
    assert!(config.gateway.reconnect_on_startup);
    assert_eq!(config.pairing.stop_grace_ms, 500);
    assert_eq!(config.reconnect.max_retries, 3);
    assert!(config.storage.wal_mode);
}

#[test]
fn unknown_field_in_section_produces_error() {
    let err = load_config_from_str("[gateway]\nnaem = \"x\"\n").expect_err("should reject");
    let err_str = err.to_string();
    assert!(
        err_str.contains("unknown field") || err_str.contains("naem"),
        "error should mention the bad key, got: {err_str}"
    );
}

#[test]
fn deny_unknown_fields_at_top_level() {
    assert!(load_config_from_str("[telemetry]\nenabled = true\n").is_err());
}

#[test]
fn dotted_override_maps_to_nested_key() {
    use figment::{providers::Serialized, Figment};

    let config: SwitchboardConfig = Figment::new()
        .merge(Serialized::defaults(SwitchboardConfig::default()))
        .merge(("helpdesk.api_token", "from-env"))
        .extract()
        .expect("dotted key should resolve");
    assert_eq!(config.helpdesk.api_token.as_deref(), Some("from-env"));
}

#[test]
fn missing_config_files_silently_skipped() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let config: SwitchboardConfig = Figment::new()
        .merge(Serialized::defaults(SwitchboardConfig::default()))
        .merge(Toml::file("/nonexistent/path/switchboard.toml"))
        .extract()
        .expect("missing file should be silently skipped");
    assert_eq!(config.gateway.name, "switchboard");
}

#[test]
fn diagnostic_unknown_key_carries_suggestion() {
    let errors = load_and_validate_str("[reconnect]\nmax_retrys = 2\n").unwrap_err();
    let unknown = errors
        .iter()
        .find_map(|e| match e {
            ConfigError::UnknownKey {
                key,
                suggestion,
                valid_keys,
                ..
            } => Some((key.clone(), suggestion.clone(), valid_keys.clone())),
            _ => None,
        })
        .expect("should produce an UnknownKey diagnostic");
    assert_eq!(unknown.0, "max_retrys");
    assert_eq!(unknown.1.as_deref(), Some("max_retries"));
    assert!(unknown.2.contains("delay_ms"));
}

#[test]
fn diagnostic_invalid_type_message() {
    let errors = load_and_validate_str("[dispatch]\nqueue_capacity = \"lots\"\n").unwrap_err();
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::InvalidType { key, .. } if key.contains("queue_capacity")
    )));
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::Validation {
        message: "gateway.max_sessions must be at least 1".into(),
    };
    assert_eq!(
        error.code().map(|c| c.to_string()).as_deref(),
        Some("switchboard::config::validation")
    );
    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("render should succeed");
    assert!(buf.contains("max_sessions"));
}

#[test]
fn load_and_validate_rejects_semantic_errors() {
    let errors = load_and_validate_str("[helpdesk]\nbase_url = \"https://desk\"\n").unwrap_err();
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::Validation { message } if message.contains("api_token")
    )));
}

#[test]
fn load_and_validate_defaults() {
    let config = load_and_validate_str("").expect("defaults should validate");
    assert!(config.webhook.url.is_none());
}
