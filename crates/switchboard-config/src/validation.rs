// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, positive capacities and well-formed URLs.

use crate::diagnostic::ConfigError;
use crate::model::SwitchboardConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Event kinds a webhook subscription may name.
const EVENT_KINDS: &[&str] = &[
    "connected",
    "disconnected",
    "connect_failure",
    "logged_out",
    "pair_success",
    "message",
    "history_sync",
    "receipt",
    "presence",
    "call_offer",
    "unknown",
];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &SwitchboardConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.gateway.name.trim().is_empty() {
        fail("gateway.name must not be empty".to_string());
    }

    if !LOG_LEVELS.contains(&config.gateway.log_level.as_str()) {
        fail(format!(
            "gateway.log_level `{}` must be one of {}",
            config.gateway.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.gateway.max_sessions == 0 {
        fail("gateway.max_sessions must be at least 1".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.pairing.timeout_secs == 0 {
        fail("pairing.timeout_secs must be at least 1".to_string());
    }

    if config.dispatch.queue_capacity == 0 {
        fail("dispatch.queue_capacity must be at least 1".to_string());
    }

    if let Some(url) = &config.webhook.url {
        if !is_http_url(url) {
            fail(format!("webhook.url `{url}` must be an http(s) URL"));
        }
        if config.webhook.workers == 0 {
            fail("webhook.workers must be at least 1".to_string());
        }
        if config.webhook.queue_capacity == 0 {
            fail("webhook.queue_capacity must be at least 1".to_string());
        }
        if config.webhook.max_attempts == 0 {
            fail("webhook.max_attempts must be at least 1".to_string());
        }
    }

    for event in &config.webhook.events {
        if !EVENT_KINDS.contains(&event.as_str()) {
            fail(format!(
                "webhook.events entry `{event}` is not a known event kind"
            ));
        }
    }

    if let Some(base_url) = &config.helpdesk.base_url {
        if !is_http_url(base_url) {
            fail(format!("helpdesk.base_url `{base_url}` must be an http(s) URL"));
        }
        if config
            .helpdesk
            .api_token
            .as_deref()
            .is_none_or(|t| t.trim().is_empty())
        {
            fail("helpdesk.api_token is required when helpdesk.base_url is set".to_string());
        }
        if config.helpdesk.max_attempts == 0 {
            fail("helpdesk.max_attempts must be at least 1".to_string());
        }
        if config.helpdesk.sweep_batch_size == 0 {
            fail("helpdesk.sweep_batch_size must be at least 1".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .is_some_and(|rest| !rest.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = SwitchboardConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = SwitchboardConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn helpdesk_requires_token() {
        let mut config = SwitchboardConfig::default();
        config.helpdesk.base_url = Some("https://desk.example.com".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "api_token"));

        config.helpdesk.api_token = Some("secret".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn errors_are_collected_not_short_circuited() {
        let mut config = SwitchboardConfig::default();
        config.gateway.log_level = "loud".into();
        config.webhook.url = Some("ftp://nope".into());
        config.webhook.events = vec!["messages".into()];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(has_error(&errors, "log_level"));
        assert!(has_error(&errors, "webhook.url"));
        assert!(has_error(&errors, "`messages`"));
    }

    #[test]
    fn known_event_kinds_pass() {
        let mut config = SwitchboardConfig::default();
        config.webhook.url = Some("http://localhost:9000/hook".into());
        config.webhook.events = vec!["message".into(), "connected".into()];
        assert!(validate_config(&config).is_ok());
    }
}
