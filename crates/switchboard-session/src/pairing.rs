// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pairing handshake: code display with duplicate suppression, and the
//! per-session loop that consumes the protocol client's pairing channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use qrcode::render::unicode;
use qrcode::QrCode;
use switchboard_core::types::PairingCode;
use switchboard_core::PairingSignal;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::handle::SessionHandle;

/// Display state of the pairing handshake.
///
/// Remembers the last displayed code so repeated codes from the client cause no
/// store write, no re-render and no timeout reset.
#[derive(Debug, Default)]
pub struct PairingDisplay {
    last_displayed: Option<String>,
    current: Option<PairingCode>,
}

impl PairingDisplay {
    /// Accepts a code from the pairing channel.
    ///
    /// Returns the new display value when `code` differs from the last displayed
    /// one, `None` for a duplicate.
    pub fn offer(&mut self, code: &str, ttl: Duration) -> Option<PairingCode> {
        if self.last_displayed.as_deref() == Some(code) {
            return None;
        }
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::seconds(60));
        let display = PairingCode {
            code: code.to_string(),
            rendered: render(code),
            expires_at,
        };
        self.last_displayed = Some(code.to_string());
        self.current = Some(display.clone());
        Some(display)
    }

    /// The code currently on display, if it has not expired.
    pub fn current(&self, now: DateTime<Utc>) -> Option<&PairingCode> {
        self.current.as_ref().filter(|c| c.expires_at > now)
    }

    pub fn is_showing(&self) -> bool {
        self.current.is_some()
    }

    pub fn clear(&mut self) {
        self.last_displayed = None;
        self.current = None;
    }
}

/// Render a pairing code as a terminal QR code. Falls back to the raw code when
/// the payload does not fit a QR symbol.
pub fn render(code: &str) -> String {
    match QrCode::new(code.as_bytes()) {
        Ok(qr) => qr
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .quiet_zone(true)
            .build(),
        Err(e) => {
            warn!(error = %e, "pairing code cannot be rendered as QR");
            code.to_string()
        }
    }
}

/// How a pairing loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    Paired { device_identity: String },
    TimedOut,
    Failed(String),
    Cancelled,
}

/// A running pairing loop.
pub(crate) struct PairingTask {
    pub(crate) token: CancellationToken,
    pub(crate) join: tokio::task::JoinHandle<()>,
}

impl PairingTask {
    pub(crate) fn is_running(&self) -> bool {
        !self.join.is_finished()
    }
}

/// Consume pairing signals until a terminal signal, the local timeout or
/// cancellation. The timeout restarts on every newly displayed code.
pub(crate) async fn run_pairing_loop(
    handle: Arc<SessionHandle>,
    mut signals: mpsc::Receiver<PairingSignal>,
    token: CancellationToken,
    generation: u64,
    timeout: Duration,
) {
    let mut deadline = Instant::now() + timeout;

    let outcome = loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break PairingOutcome::Cancelled,
            _ = sleep_until(deadline) => break PairingOutcome::TimedOut,
            signal = signals.recv() => match signal {
                Some(PairingSignal::Code(code)) => {
                    if handle.offer_pairing_code(generation, &code).await {
                        deadline = Instant::now() + timeout;
                    }
                }
                Some(PairingSignal::Success { device_identity }) => {
                    break PairingOutcome::Paired { device_identity };
                }
                Some(PairingSignal::Timeout) => break PairingOutcome::TimedOut,
                Some(PairingSignal::Error(e)) => break PairingOutcome::Failed(e),
                None => break PairingOutcome::Failed("pairing channel closed".to_string()),
            },
        }
    };

    debug!(session_id = %handle.id(), ?outcome, generation, "pairing loop finished");
    handle.finish_pairing(generation, outcome).await;
}
