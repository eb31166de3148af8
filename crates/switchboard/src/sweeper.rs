// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic re-attempt of pending helpdesk mappings.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::gateway::Gateway;

/// Spawn the pending sweep. Returns `None` when the interval is zero or no
/// helpdesk bridge is configured.
pub fn spawn_sweeper(gateway: Arc<Gateway>, cancel: CancellationToken) -> Option<JoinHandle<()>> {
    let interval_secs = gateway.config().helpdesk.sweep_interval_secs;
    if interval_secs == 0 || gateway.bridge().is_none() {
        debug!("pending sweep disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        // First tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for (session_id, report) in gateway.sweep_pending().await {
                        info!(
                            session_id = %session_id,
                            attempted = report.attempted,
                            synced = report.synced,
                            pending = report.pending,
                            failed = report.failed,
                            "pending sweep"
                        );
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("pending sweep stopping");
                    break;
                }
            }
        }
    }))
}
