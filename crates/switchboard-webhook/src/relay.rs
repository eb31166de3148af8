// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook relay: a bounded queue drained by a fixed pool of HTTP workers.
//!
//! [`WebhookRelay::deliver`] never waits on the network. It enqueues an
//! [`Envelope`] and fails only when the queue is full or closed. Workers POST
//! each envelope as JSON, retrying transient failures a bounded number of times.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use switchboard_config::model::WebhookConfig;
use switchboard_core::events::EventKind;
use switchboard_core::{AdapterType, HealthStatus, PluginAdapter, SwitchboardError, WebhookSink};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::signature::{self, SIGNATURE_HEADER};

/// Bounded wait for workers to drain the queue on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Relay settings resolved from the `webhook` config section.
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    pub url: String,
    pub secret: Option<String>,
    /// Subscribed event kinds. Empty subscribes to everything.
    pub events: HashSet<EventKind>,
    pub workers: usize,
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl WebhookSettings {
    /// `None` when no subscriber URL is configured.
    pub fn from_config(config: &WebhookConfig) -> Result<Option<Self>, SwitchboardError> {
        let Some(url) = config.url.clone() else {
            return Ok(None);
        };
        let events = config
            .events
            .iter()
            .map(|e| {
                EventKind::from_str(e)
                    .map_err(|_| SwitchboardError::Config(format!("unknown webhook event `{e}`")))
            })
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(Some(Self {
            url,
            secret: config.secret.clone().filter(|s| !s.is_empty()),
            events,
            workers: config.workers.max(1),
            queue_capacity: config.queue_capacity.max(1),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            timeout: Duration::from_secs(config.timeout_secs),
        }))
    }

    fn subscribes(&self, event_kind: &str) -> bool {
        self.events.is_empty()
            || EventKind::from_str(event_kind).is_ok_and(|kind| self.events.contains(&kind))
    }
}

/// JSON body posted to the subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub session_id: String,
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Delivery counters.
#[derive(Debug, Default)]
pub struct RelayStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelayStatsSnapshot {
    /// Accepted by the subscriber.
    pub delivered: u64,
    /// Given up on after the last attempt.
    pub failed: u64,
    /// Refused at enqueue time (queue full or closed).
    pub rejected: u64,
}

impl RelayStats {
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

pub struct WebhookRelay {
    settings: Arc<WebhookSettings>,
    sender: StdMutex<Option<mpsc::Sender<Envelope>>>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
    stats: Arc<RelayStats>,
}

impl WebhookRelay {
    /// Start the worker pool. Must be called inside a tokio runtime.
    pub fn start(settings: WebhookSettings) -> Result<Self, SwitchboardError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| SwitchboardError::Internal(format!("failed to build HTTP client: {e}")))?;

        let settings = Arc::new(settings);
        let stats = Arc::new(RelayStats::default());
        let (tx, rx) = mpsc::channel(settings.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..settings.workers)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let client = client.clone();
                let settings = Arc::clone(&settings);
                let stats = Arc::clone(&stats);
                tokio::spawn(async move {
                    loop {
                        // Hold the receiver only while waiting for the next envelope.
                        let next = rx.lock().await.recv().await;
                        let Some(envelope) = next else { break };
                        post(&client, &settings, &stats, &envelope).await;
                    }
                    debug!(worker, "webhook worker stopped");
                })
            })
            .collect();

        info!(
            url = %settings.url,
            workers = settings.workers,
            signed = settings.secret.is_some(),
            "webhook relay started"
        );
        Ok(Self {
            settings,
            sender: StdMutex::new(Some(tx)),
            workers: StdMutex::new(workers),
            stats,
        })
    }

    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot()
    }

    fn enqueue(&self, envelope: Envelope) -> Result<(), SwitchboardError> {
        let guard = self
            .sender
            .lock()
            .map_err(|_| SwitchboardError::Internal("webhook sender lock poisoned".into()))?;
        let Some(tx) = guard.as_ref() else {
            return Err(SwitchboardError::Webhook {
                message: "webhook relay is closed".into(),
            });
        };
        tx.try_send(envelope).map_err(|e| {
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            let message = match e {
                mpsc::error::TrySendError::Full(_) => "webhook queue is full",
                mpsc::error::TrySendError::Closed(_) => "webhook relay is closed",
            };
            SwitchboardError::Webhook {
                message: message.into(),
            }
        })
    }

    /// Stop accepting events and wait (bounded) for queued ones to go out.
    pub async fn close(&self) {
        let sender = self.sender.lock().ok().and_then(|mut s| s.take());
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers: Vec<_> = self
            .workers
            .lock()
            .map(|mut w| w.drain(..).collect())
            .unwrap_or_default();
        let drain = join_workers(workers);
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            warn!("webhook workers did not drain in time");
        }
        info!(stats = ?self.stats.snapshot(), "webhook relay closed");
    }
}

async fn join_workers(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "webhook worker ended abnormally");
        }
    }
}

/// POST one envelope, retrying transport errors, 429 and 5xx.
async fn post(
    client: &reqwest::Client,
    settings: &WebhookSettings,
    stats: &RelayStats,
    envelope: &Envelope,
) {
    let body = match serde_json::to_vec(envelope) {
        Ok(body) => body,
        Err(e) => {
            warn!(session_id = %envelope.session_id, error = %e, "webhook envelope not serializable");
            stats.failed.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };
    let signature = match settings.secret.as_deref().map(|s| signature::sign(s, &body)) {
        Some(Ok(sig)) => Some(sig),
        Some(Err(e)) => {
            warn!(error = %e, "webhook signing failed");
            stats.failed.fetch_add(1, Ordering::Relaxed);
            return;
        }
        None => None,
    };

    for attempt in 1..=settings.max_attempts {
        let mut request = client
            .post(&settings.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.clone());
        if let Some(sig) = &signature {
            request = request.header(SIGNATURE_HEADER, sig);
        }

        let retryable = match request.send().await {
            Ok(resp) if resp.status().is_success() => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    session_id = %envelope.session_id,
                    event = %envelope.event,
                    attempt,
                    "webhook delivered"
                );
                return;
            }
            Ok(resp) => {
                let status = resp.status();
                warn!(
                    session_id = %envelope.session_id,
                    event = %envelope.event,
                    status = status.as_u16(),
                    attempt,
                    "webhook subscriber returned error"
                );
                status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            Err(e) => {
                warn!(
                    session_id = %envelope.session_id,
                    event = %envelope.event,
                    error = %e,
                    attempt,
                    "webhook request failed"
                );
                true
            }
        };

        if !retryable {
            break;
        }
        if attempt < settings.max_attempts {
            tokio::time::sleep(settings.retry_delay).await;
        }
    }
    stats.failed.fetch_add(1, Ordering::Relaxed);
    warn!(
        session_id = %envelope.session_id,
        event = %envelope.event,
        "webhook delivery abandoned"
    );
}

#[async_trait]
impl WebhookSink for WebhookRelay {
    async fn deliver(
        &self,
        session_id: &str,
        event_kind: &str,
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<(), SwitchboardError> {
        if !self.settings.subscribes(event_kind) {
            return Ok(());
        }
        self.enqueue(Envelope {
            session_id: session_id.to_string(),
            event: event_kind.to_string(),
            timestamp,
            data: payload,
        })
    }
}

#[async_trait]
impl PluginAdapter for WebhookRelay {
    fn name(&self) -> &str {
        "webhook"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Webhook
    }

    async fn health_check(&self) -> Result<HealthStatus, SwitchboardError> {
        let open = self.sender.lock().map(|s| s.is_some()).unwrap_or(false);
        if open {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy("relay closed".into()))
        }
    }

    async fn shutdown(&self) -> Result<(), SwitchboardError> {
        self.close().await;
        Ok(())
    }
}
