//! Fixed-delay retry timer.
//!
//! A [`RetryScheduler`] holds at most one pending attempt. Scheduling again
//! replaces the pending attempt and bumps the generation, so a burst of
//! error events can never stack up several reloads.

use std::future;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct RetryScheduler {
    base_delay: Duration,
    generation: u64,
    pending: Option<Pending>,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    generation: u64,
    due: Instant,
    retry_count: u32,
}

/// A retry that came due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredRetry {
    pub generation: u64,
    pub retry_count: u32,
}

impl RetryScheduler {
    pub fn new(base_delay: Duration) -> Self {
        Self {
            base_delay,
            generation: 0,
            pending: None,
        }
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Arm the timer for `base_delay` from now, superseding any pending
    /// attempt. The delay does not grow with `retry_count`.
    pub fn schedule(&mut self, retry_count: u32) -> u64 {
        self.generation += 1;
        self.pending = Some(Pending {
            generation: self.generation,
            due: Instant::now() + self.base_delay,
            retry_count,
        });
        self.generation
    }

    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn due(&self) -> Option<Instant> {
        self.pending.map(|p| p.due)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Resolve when the pending attempt is due, consuming it. Never
    /// resolves while nothing is pending.
    ///
    /// Cancel-safe: dropping the future before it completes leaves the
    /// pending attempt in place.
    pub async fn fired(&mut self) -> FiredRetry {
        let Some(pending) = self.pending else {
            return future::pending().await;
        };
        tokio::time::sleep_until(pending.due).await;
        self.pending = None;
        FiredRetry {
            generation: pending.generation,
            retry_count: pending.retry_count,
        }
    }
}

/// Sleep until `deadline`, or forever when there is none. Lets an optional
/// timer sit in a `select!` arm.
pub(crate) async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}
