// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded reconnect policy: a fixed retry ceiling with a fixed delay.
//!
//! Only transient errors are retried. Pairing is never retried here; an
//! unregistered session has nothing to reconnect with.

use std::future::Future;
use std::time::Duration;

use switchboard_config::model::ReconnectConfig;
use switchboard_core::SwitchboardError;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Retries after the first attempt; `max_retries + 1` attempts in total.
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&ReconnectConfig::default())
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            delay: Duration::from_millis(config.delay_ms),
        }
    }

    /// Run `attempt` until it succeeds, fails terminally, or the ceiling is hit.
    ///
    /// The closure receives the zero-based attempt number. The last error is
    /// returned when every attempt failed.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, SwitchboardError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, SwitchboardError>>,
    {
        let mut n = 0;
        loop {
            match attempt(n).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && n < self.max_retries => {
                    warn!(
                        attempt = n + 1,
                        max_attempts = self.max_retries + 1,
                        error = %e,
                        "connect attempt failed, retrying"
                    );
                    n += 1;
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            max_retries,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn three_retries_means_four_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(3)
            .run(|n| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(SwitchboardError::protocol(format!("refused #{n}"))) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(result.unwrap_err().to_string().contains("refused #3"));
    }

    #[tokio::test]
    async fn stops_on_first_success() {
        let calls = AtomicU32::new(0);
        let value = policy(5)
            .run(|n| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(SwitchboardError::protocol("flaky"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy(3)
            .run(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(SwitchboardError::Validation("bad".into())) }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
