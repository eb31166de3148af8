// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `switchboard sessions` command implementation.
//!
//! Reads the session table and mapping totals straight from storage, so it
//! works whether or not a gateway process is running.

use std::io::IsTerminal;

use serde::Serialize;
use switchboard_config::model::SwitchboardConfig;
use switchboard_core::types::Registration;
use switchboard_core::{ConnectionStatus, SessionRecord, SessionStore, StorageAdapter, SwitchboardError};
use switchboard_storage::SqliteStorage;

use crate::gateway::MappingCounts;

/// One row of `--json` output.
#[derive(Debug, Serialize)]
pub struct SessionRow {
    pub id: String,
    pub status: ConnectionStatus,
    pub registration: Registration,
    pub helpdesk_enabled: bool,
    pub last_seen_secs_ago: Option<u64>,
    pub last_error: Option<String>,
    pub mappings: MappingCounts,
}

impl SessionRow {
    fn new(record: &SessionRecord, mappings: MappingCounts, now: chrono::DateTime<chrono::Utc>) -> Self {
        Self {
            id: record.id.clone(),
            status: record.status,
            registration: record.registration(),
            helpdesk_enabled: record.helpdesk.as_ref().is_some_and(|h| h.enabled),
            last_seen_secs_ago: record
                .last_seen_at
                .map(|at| (now - at).num_seconds().max(0) as u64),
            last_error: record.last_error.clone(),
            mappings,
        }
    }
}

/// Format seconds into a short "ago" string.
fn format_age(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let minutes = (secs % 3600) / 60;

    if days > 0 {
        format!("{days}d {hours}h ago")
    } else if hours > 0 {
        format!("{hours}h {minutes}m ago")
    } else if minutes > 0 {
        format!("{minutes}m ago")
    } else {
        "just now".to_string()
    }
}

/// Run the `switchboard sessions` command.
pub async fn run_sessions(
    config: &SwitchboardConfig,
    json: bool,
    plain: bool,
) -> Result<(), SwitchboardError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;

    let now = chrono::Utc::now();
    let mut rows = Vec::new();
    for record in storage.list_sessions().await? {
        let mappings = MappingCounts::load(&storage, &record.id).await?;
        rows.push(SessionRow::new(&record, mappings, now));
    }
    storage.close().await?;

    if json {
        let body = serde_json::to_string_pretty(&rows)
            .map_err(|e| SwitchboardError::Internal(format!("failed to encode sessions: {e}")))?;
        println!("{body}");
        return Ok(());
    }

    let use_color = !plain && std::io::stdout().is_terminal();
    println!();
    println!("  switchboard sessions");
    println!("  {}", "-".repeat(60));
    if rows.is_empty() {
        println!("    no sessions registered");
    }
    for row in &rows {
        println!("{}", render_row(row, use_color));
    }
    println!();
    Ok(())
}

fn render_row(row: &SessionRow, use_color: bool) -> String {
    let status = row.status.to_string();
    let status = if use_color {
        use colored::Colorize;
        match row.status {
            ConnectionStatus::Connected => status.green().to_string(),
            ConnectionStatus::Disconnected => status.red().to_string(),
            _ => status.yellow().to_string(),
        }
    } else {
        status
    };
    let seen = row
        .last_seen_secs_ago
        .map(format_age)
        .unwrap_or_else(|| "never".to_string());
    let mut line = format!(
        "    {:<16} {:<12} {:<12} seen {:<10} synced {} pending {} failed {}",
        row.id,
        status,
        row.registration.to_string(),
        seen,
        row.mappings.synced,
        row.mappings.pending,
        row.mappings.failed,
    );
    if let Some(error) = &row.last_error {
        line.push_str(&format!("\n      last error: {error}"));
    }
    line
}
