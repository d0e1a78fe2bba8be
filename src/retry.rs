//! Caller-side conflict retry helper
//!
//! The core never retries internally: a scale update that loses an
//! optimistic-concurrency race returns [`Error::Conflict`] to the caller,
//! who is expected to re-read and try again. This module is that caller
//! side, packaged once: retry only on conflict, with exponential backoff
//! and jitter to keep competing writers from colliding in lockstep.
//!
//! # Example
//!
//! ```ignore
//! use capi_autoscaler::retry::{retry_on_conflict, RetryConfig};
//!
//! retry_on_conflict(&RetryConfig::default(), "scale workers-a", || async {
//!     let object = controller.get_resource("MachineSet", "default", "workers-a")?;
//!     controller.scalable_resource(&object)?.set_size(5).await
//! })
//! .await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::error::Error;
use crate::Result;

/// Configuration for conflict retries
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts before giving up
    pub max_attempts: u32,
    /// Initial delay between attempts
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

/// Run `operation` until it succeeds, retrying only on conflict.
///
/// Every other error returns immediately: a missing node group or a schema
/// violation does not get better by trying again. The operation should
/// re-read the resource on each attempt so the retry carries a fresh
/// resource version.
pub async fn retry_on_conflict<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut delay = config.initial_delay;

    for attempt in 1..=config.max_attempts.max(1) {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_conflict() && attempt < config.max_attempts.max(1) => {
                // 0.5x to 1.5x jitter
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt,
                    delay_ms = jittered.as_millis(),
                    "scale conflict, retrying with a fresh read"
                );

                tokio::time::sleep(jittered).await;
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!("loop returns on the final attempt")
}
