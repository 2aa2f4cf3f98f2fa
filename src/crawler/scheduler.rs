//! Retry scheduling for a single page
//!
//! This module handles:
//! - Attempt counting and per-attempt timeout growth
//! - Jittered backoff before retries, scaled by the attempt index
//! - Forced penalty delays after rate-limit or auth-required signals
//! - Cancellation at every suspension point, including an in-flight request
//!
//! One `RetryScheduler` drives every attempt loop of every session.

use crate::crawler::fetcher::{FailureKind, FetchFailure, FetchOutcome, Page};
use crate::state::Cursor;
use crate::Result;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A closed range of delays sampled uniformly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// A range that always yields zero
    pub fn zero() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn from_secs_f64(min: f64, max: f64) -> Self {
        Self::new(Duration::from_secs_f64(min), Duration::from_secs_f64(max))
    }

    /// Draws a delay from the range
    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let secs = rand::rng().random_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// Tunables of the attempt loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_timeout: Duration,
    pub timeout_step: Duration,
    pub jitter: DelayRange,
    pub penalty: DelayRange,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_timeout: Duration::from_secs(20),
            timeout_step: Duration::from_secs(5),
            jitter: DelayRange::from_secs_f64(1.5, 3.0),
            penalty: DelayRange::from_secs_f64(10.0, 20.0),
        }
    }
}

/// Marker returned when a pause was interrupted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Sleeps for `delay` unless the token fires first
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> std::result::Result<(), Cancelled> {
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }
    if delay.is_zero() {
        return Ok(());
    }

    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = cancel.cancelled() => Err(Cancelled),
    }
}

/// One attempt at fetching the current page
///
/// The scheduler decides when and with which timeout; the implementor decides
/// what request to send for a given attempt index. Errors are infrastructure
/// failures that abort the session, not fetch failures.
#[async_trait]
pub trait PageAttempt: Send + Sync {
    async fn attempt(&self, index: u32, timeout: Duration) -> Result<FetchOutcome>;
}

/// How a page's attempt loop ended
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptReport {
    Success {
        page: Page,
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
        last_failure: Option<FetchFailure>,
        /// Latest cursor exposed by any failed attempt on this page
        cursor_hint: Option<Cursor>,
    },
    Cancelled {
        attempts: u32,
    },
}

impl AttemptReport {
    /// Number of requests issued
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

/// Drives the attempt loop of a page
#[derive(Debug, Clone)]
pub struct RetryScheduler {
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Timeout for attempt `index`: base plus one step per earlier attempt
    pub fn timeout_for(&self, index: u32) -> Duration {
        self.policy.base_timeout + self.policy.timeout_step * index
    }

    /// Delay before attempt `index`; the first attempt is never delayed
    pub fn backoff_for(&self, index: u32) -> Duration {
        if index == 0 {
            Duration::ZERO
        } else {
            self.policy.jitter.sample() * index
        }
    }

    /// Extra delay imposed by a failure before the next attempt
    pub fn penalty_for(&self, kind: &FailureKind) -> Duration {
        if kind.demands_penalty() {
            self.policy.penalty.sample()
        } else {
            Duration::ZERO
        }
    }

    /// Runs attempts until one succeeds, the budget is spent or the token fires
    ///
    /// # Arguments
    ///
    /// * `attempt` - Issues the request for a given attempt index
    /// * `cancel` - Cancellation token for the whole session
    ///
    /// # Returns
    ///
    /// * `Ok(AttemptReport)` - How the loop ended
    /// * `Err(TrawlError)` - An attempt hit an infrastructure failure
    pub async fn run(
        &self,
        attempt: &dyn PageAttempt,
        cancel: &CancellationToken,
    ) -> Result<AttemptReport> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_failure: Option<FetchFailure> = None;
        let mut cursor_hint: Option<Cursor> = None;
        let mut penalty = Duration::ZERO;

        for index in 0..max_attempts {
            let delay = self.backoff_for(index) + penalty;
            if index > 0 {
                debug!("Retry {} of {} after {:.1?}", index + 1, max_attempts, delay);
            }
            if pause(delay, cancel).await.is_err() {
                return Ok(AttemptReport::Cancelled { attempts: index });
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    return Ok(AttemptReport::Cancelled { attempts: index + 1 });
                }
                result = attempt.attempt(index, self.timeout_for(index)) => result?,
            };

            match outcome {
                FetchOutcome::Success(page) => {
                    return Ok(AttemptReport::Success {
                        page,
                        attempts: index + 1,
                    });
                }
                FetchOutcome::Failure(failure) => {
                    warn!(
                        "Attempt {}/{} failed: {}",
                        index + 1,
                        max_attempts,
                        failure.kind
                    );

                    penalty = self.penalty_for(&failure.kind);
                    if !penalty.is_zero() && index + 1 < max_attempts {
                        warn!("Upstream signalled throttling, backing off {:.1?}", penalty);
                    }

                    if failure.cursor_hint.is_some() {
                        cursor_hint = failure.cursor_hint.clone();
                    }
                    last_failure = Some(failure);
                }
            }
        }

        Ok(AttemptReport::Exhausted {
            attempts: max_attempts,
            last_failure,
            cursor_hint,
        })
    }
}
