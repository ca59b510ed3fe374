//! Connection retry policy
//!
//! The dispatcher worker connects lazily, on the first command after start-up
//! or after a transport fault dropped the previous connection. Failed attempts
//! are retried with exponential backoff.

use crate::error::Result;
use crate::io::connection::Connector;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Reconnection strategy
///
/// # Examples
///
/// ```
/// use si_camera_rust::io::ReconnectConfig;
///
/// let config = ReconnectConfig::with_max_attempts(3);
/// assert_eq!(config.max_attempts, Some(3));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Maximum number of connection attempts per command (None = infinite)
    pub max_attempts: Option<usize>,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts
    pub max_delay: Duration,
    /// Delay growth factor per attempt
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter to each delay
    pub use_jitter: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: Some(3),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl ReconnectConfig {
    /// A single attempt, no retry
    pub fn disabled() -> Self {
        Self {
            max_attempts: Some(1),
            ..Default::default()
        }
    }

    /// Retry until the connection succeeds
    pub fn infinite() -> Self {
        Self {
            max_attempts: None,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(attempts: usize) -> Self {
        Self {
            max_attempts: Some(attempts.max(1)),
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub(crate) fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let factor = if self.use_jitter {
            use std::collections::hash_map::RandomState;
            use std::hash::BuildHasher;

            1.0 + (RandomState::new().hash_one(attempt) % 25) as f64 / 100.0
        } else {
            1.0
        };

        Duration::from_secs_f64(capped * factor)
    }
}

/// Connect, retrying failed attempts per `policy`
///
/// Returns the last connection error once the attempts are exhausted.
pub(crate) async fn connect_with_retry<C: Connector>(
    connector: &C,
    policy: &ReconnectConfig,
) -> Result<C::Stream> {
    let mut attempt = 0;
    loop {
        match connector.connect().await {
            Ok(stream) => {
                if attempt > 0 {
                    info!(attempts = attempt + 1, "Connection established after retry");
                }
                return Ok(stream);
            }
            Err(e) => {
                attempt += 1;
                if policy.max_attempts.is_some_and(|max| attempt >= max) {
                    warn!(attempts = attempt, error = %e, "Giving up on connection");
                    return Err(e);
                }
                let delay = policy.delay_for_attempt(attempt - 1);
                warn!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
