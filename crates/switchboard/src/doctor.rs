// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `switchboard doctor` command implementation.
//!
//! Runs diagnostic checks against the configured environment: config
//! validity, database access, helpdesk reachability and webhook setup.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use switchboard_config::model::SwitchboardConfig;
use switchboard_core::{HealthStatus, PluginAdapter, StorageAdapter, SwitchboardError};
use switchboard_helpdesk::ChatwootClient;
use switchboard_storage::SqliteStorage;
use switchboard_webhook::WebhookSettings;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `switchboard doctor` command. With `plain`, disables colored output.
/// Returns the number of failed checks.
pub async fn run_doctor(config: &SwitchboardConfig, plain: bool) -> Result<usize, SwitchboardError> {
    let use_color = !plain && std::io::stdout().is_terminal();

    let results = vec![
        check_config().await,
        check_database(config).await,
        check_helpdesk(config).await,
        check_webhook(config),
        check_memory_baseline(),
    ];

    println!();
    println!("  switchboard doctor");
    println!("  {}", "-".repeat(50));

    let mut fail_count = 0;
    let mut warn_count = 0;
    for result in &results {
        match result.status {
            CheckStatus::Fail => fail_count += 1,
            CheckStatus::Warn => warn_count += 1,
            CheckStatus::Pass => {}
        }
        println!("{}", render_line(result, use_color));
    }

    println!();
    if fail_count > 0 || warn_count > 0 {
        let issues = fail_count + warn_count;
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }
    println!();

    Ok(fail_count)
}

fn render_line(result: &CheckResult, use_color: bool) -> String {
    use colored::Colorize;

    let duration_ms = result.duration.as_millis();
    let (symbol, message) = match (&result.status, use_color) {
        (CheckStatus::Pass, true) => ("✓".green().to_string(), result.message.normal()),
        (CheckStatus::Warn, true) => ("!".yellow().to_string(), result.message.yellow()),
        (CheckStatus::Fail, true) => ("✗".red().to_string(), result.message.red()),
        (CheckStatus::Pass, false) => ("[OK]  ".to_string(), result.message.normal()),
        (CheckStatus::Warn, false) => ("[WARN]".to_string(), result.message.normal()),
        (CheckStatus::Fail, false) => ("[FAIL]".to_string(), result.message.normal()),
    };
    format!(
        "    {symbol} {:<20} {message} ({duration_ms}ms)",
        result.name
    )
}

fn health_result(name: &str, check: Result<HealthStatus, SwitchboardError>, start: Instant) -> CheckResult {
    match check {
        Ok(HealthStatus::Healthy) => CheckResult::new(name, CheckStatus::Pass, "healthy", start),
        Ok(HealthStatus::Degraded(reason)) => CheckResult::new(name, CheckStatus::Warn, reason, start),
        Ok(HealthStatus::Unhealthy(reason)) => CheckResult::new(name, CheckStatus::Fail, reason, start),
        Err(e) => CheckResult::new(name, CheckStatus::Fail, e.to_string(), start),
    }
}

async fn check_config() -> CheckResult {
    let start = Instant::now();
    match switchboard_config::load_and_validate() {
        Ok(_) => CheckResult::new("Configuration", CheckStatus::Pass, "valid", start),
        Err(errors) => CheckResult::new(
            "Configuration",
            CheckStatus::Fail,
            format!("{} error(s)", errors.len()),
            start,
        ),
    }
}

/// Open the database through the storage adapter, which also runs pending
/// migrations.
async fn check_database(config: &SwitchboardConfig) -> CheckResult {
    let start = Instant::now();
    let db_path = &config.storage.database_path;
    if !std::path::Path::new(db_path).exists() {
        return CheckResult::new(
            "Database",
            CheckStatus::Warn,
            format!("not found: {db_path} (will be created on first run)"),
            start,
        );
    }

    let storage = SqliteStorage::new(config.storage.clone());
    if let Err(e) = storage.initialize().await {
        return CheckResult::new("Database", CheckStatus::Fail, format!("open failed: {e}"), start);
    }
    let result = health_result("Database", storage.health_check().await, start);
    let _ = storage.close().await;
    result
}

async fn check_helpdesk(config: &SwitchboardConfig) -> CheckResult {
    let start = Instant::now();
    if config.helpdesk.base_url.is_none() {
        return CheckResult::new(
            "Helpdesk",
            CheckStatus::Warn,
            "not configured (bridge disabled)",
            start,
        );
    }
    match ChatwootClient::from_config(&config.helpdesk) {
        Ok(client) => health_result("Helpdesk", client.health_check().await, start),
        Err(e) => CheckResult::new("Helpdesk", CheckStatus::Fail, e.to_string(), start),
    }
}

fn check_webhook(config: &SwitchboardConfig) -> CheckResult {
    let start = Instant::now();
    match WebhookSettings::from_config(&config.webhook) {
        Ok(Some(settings)) => {
            let signing = if settings.secret.is_some() { "signed" } else { "unsigned" };
            CheckResult::new(
                "Webhook",
                CheckStatus::Pass,
                format!("{} ({signing})", settings.url),
                start,
            )
        }
        Ok(None) => CheckResult::new("Webhook", CheckStatus::Warn, "not configured", start),
        Err(e) => CheckResult::new("Webhook", CheckStatus::Fail, e.to_string(), start),
    }
}

fn check_memory_baseline() -> CheckResult {
    let start = Instant::now();

    #[cfg(not(target_env = "msvc"))]
    {
        use tikv_jemalloc_ctl::{epoch, stats};
        let allocated = epoch::advance()
            .and_then(|_| stats::allocated::read())
            .map_err(|e| e.to_string());
        match allocated {
            Ok(bytes) => CheckResult::new(
                "Memory baseline",
                CheckStatus::Pass,
                format!("{:.1} MB allocated", bytes as f64 / (1024.0 * 1024.0)),
                start,
            ),
            Err(e) => CheckResult::new("Memory baseline", CheckStatus::Warn, e, start),
        }
    }

    #[cfg(target_env = "msvc")]
    {
        CheckResult::new(
            "Memory baseline",
            CheckStatus::Warn,
            "jemalloc not available on MSVC",
            start,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_carry_status_tags() {
        let result = CheckResult {
            name: "Database".to_string(),
            status: CheckStatus::Fail,
            message: "open failed".to_string(),
            duration: Duration::from_millis(5),
        };
        let line = render_line(&result, false);
        assert!(line.contains("[FAIL]"));
        assert!(line.contains("open failed"));
        assert!(line.contains("(5ms)"));
    }

    #[tokio::test]
    async fn missing_database_warns() {
        let mut config = SwitchboardConfig::default();
        config.storage.database_path = "/tmp/nonexistent-switchboard-test-xyz.db".into();
        let result = check_database(&config).await;
        assert_eq!(result.status, CheckStatus::Warn);
        assert!(result.message.contains("not found"));
    }

    #[tokio::test]
    async fn existing_database_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doctor.db");
        let mut config = SwitchboardConfig::default();
        config.storage.database_path = path.to_string_lossy().into_owned();

        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await.unwrap();
        storage.close().await.unwrap();

        let result = check_database(&config).await;
        assert_eq!(result.status, CheckStatus::Pass, "{}", result.message);
    }

    #[tokio::test]
    async fn unconfigured_helpdesk_warns() {
        let result = check_helpdesk(&SwitchboardConfig::default()).await;
        assert_eq!(result.status, CheckStatus::Warn);
    }

    #[test]
    fn webhook_without_url_warns() {
        let result = check_webhook(&SwitchboardConfig::default());
        assert_eq!(result.status, CheckStatus::Warn);
    }

    #[test]
    fn memory_baseline_reports() {
        let result = check_memory_baseline();
        assert!(result.status == CheckStatus::Pass || result.status == CheckStatus::Warn);
    }
}
