// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-running gateway process.
//!
//! [`serve`] assembles the gateway around an embedder-supplied protocol
//! client factory, restores registered sessions, runs the pending sweep and
//! blocks until SIGINT/SIGTERM, then shuts everything down in order.

use std::sync::Arc;

use switchboard_config::model::SwitchboardConfig;
use switchboard_core::{ProtocolClientFactory, SwitchboardError};
use switchboard_session::shutdown;
use tracing::{error, info, warn};

use crate::gateway::Gateway;
use crate::sweeper::spawn_sweeper;

pub async fn serve(
    config: SwitchboardConfig,
    factory: Arc<dyn ProtocolClientFactory>,
) -> Result<(), SwitchboardError> {
    init_tracing(&config.gateway.log_level);
    info!(gateway = %config.gateway.name, "starting switchboard");

    let gateway = Arc::new(Gateway::builder(config, factory).build().await?);

    if gateway.config().gateway.reconnect_on_startup {
        match gateway.restore_sessions().await {
            Ok(report) => {
                info!(
                    connected = report.connected.len(),
                    failed = report.failed.len(),
                    "startup reconnection complete"
                );
            }
            Err(e) => warn!(error = %e, "startup reconnection skipped"),
        }
    }

    let cancel = shutdown::install_signal_handler();
    let sweeper = spawn_sweeper(Arc::clone(&gateway), cancel.clone());

    cancel.cancelled().await;
    info!("shutdown requested");

    if let Some(sweeper) = sweeper {
        if let Err(e) = sweeper.await {
            error!(error = %e, "pending sweep task failed");
        }
    }
    gateway.shutdown().await
}

/// Initializes the tracing subscriber with env filter. `RUST_LOG` wins over
/// the configured level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("switchboard={log_level},warn")));

    // A subscriber may already be installed by the embedder.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}
