// =============================================================================
// Re-optimization Trigger: bounded, cancellable retry around the optimizer
// =============================================================================
//
// Each attempt fetches a fresh candle window and asks the optimizer for a
// parameter set. On `None` (or a failed fetch) the trigger sleeps
// `backoff_multiplier x candle duration` and tries again, until it succeeds,
// `max_attempts` is used up, or shutdown is requested.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::market_data::CandleSource;
use crate::optimizer::Optimizer;
use crate::params::ParameterSet;
use crate::types::CandleDuration;

fn default_max_attempts() -> Option<u32> {
    Some(48)
}

fn default_backoff_multiplier() -> u32 {
    10
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// `None` retries until shutdown.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,

    /// Wait between attempts, in candle durations.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, duration: CandleDuration) -> Duration {
        duration.as_std() * self.backoff_multiplier
    }

    fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

/// Where a window for optimization comes from.
#[derive(Debug, Clone)]
pub struct OptimizationWindow {
    pub instrument: String,
    pub duration: CandleDuration,
    pub count: usize,
}

pub struct ReoptimizationTrigger {
    optimizer: Arc<dyn Optimizer>,
    policy: RetryPolicy,
}

impl ReoptimizationTrigger {
    pub fn new(optimizer: Arc<dyn Optimizer>, policy: RetryPolicy) -> Self {
        Self { optimizer, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// One fetch + optimize, no retry.
    pub async fn attempt(
        &self,
        source: &dyn CandleSource,
        window: &OptimizationWindow,
    ) -> Option<ParameterSet> {
        match source
            .get_candles(&window.instrument, window.duration, window.count)
            .await
        {
            Ok(series) if !series.is_empty() => self.optimizer.optimize(&series),
            Ok(_) => {
                warn!(action = "reoptimize", instrument = %window.instrument, "empty candle window");
                None
            }
            Err(e) => {
                warn!(action = "reoptimize", instrument = %window.instrument, error = %e, "candle fetch failed");
                None
            }
        }
    }

    /// Retry [`attempt`](Self::attempt) with backoff until a parameter set is
    /// found. Returns `ParameterUnavailable` once `max_attempts` is spent and
    /// `Cancelled` if shutdown is requested during a wait.
    pub async fn run(
        &self,
        source: &dyn CandleSource,
        window: &OptimizationWindow,
        cancel: &CancellationToken,
    ) -> Result<ParameterSet, EngineError> {
        let delay = self.policy.delay(window.duration);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            if let Some(params) = self.attempt(source, window).await {
                info!(
                    action = "reoptimize",
                    attempts,
                    enabled = params.enabled_count(),
                    "parameter set updated"
                );
                return Ok(params);
            }

            if self.policy.exhausted(attempts) {
                warn!(action = "reoptimize", attempts, "giving up on optimization");
                return Err(EngineError::ParameterUnavailable { attempts });
            }

            warn!(
                action = "reoptimize",
                attempts,
                retry_in_secs = delay.as_secs(),
                "no viable parameters, backing off"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
