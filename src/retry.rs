//! Bounded retry policy
//!
//! Used for polling remote command invocations (fixed spacing) and for chat
//! delivery (exponential backoff). The policy only sleeps *between* attempts,
//! never after the last one.

use std::future::Future;
use std::time::Duration;

use tracing::trace;

/// Delay strategy between two attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every attempt
    Fixed(Duration),

    /// `base * 2^attempt` after attempt number `attempt` (zero based)
    Exponential { base: Duration },
}

/// Result of a single attempt
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// Terminal success, stop polling
    Ready(T),

    /// Not done yet; optionally carries the latest observed value
    Pending(Option<T>),

    /// Terminal failure, stop polling
    Failed(E),
}

/// Outcome of a whole retry run
#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// An attempt returned [`Attempt::Ready`]
    Ready(T),

    /// All attempts were used; carries the last observed pending value
    Exhausted(Option<T>),

    /// An attempt returned [`Attempt::Failed`]
    Failed(E),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn exponential(max_attempts: u32, base: Duration) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { base },
        }
    }

    /// Delay to wait after the given (zero based) attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base } => base.saturating_mul(2u32.saturating_pow(attempt)),
        }
    }

    /// Run `op` until it is ready, fails, or the attempt budget is spent
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> RetryOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T, E>>,
    {
        let mut latest = None;

        for attempt in 0..self.max_attempts {
            match op(attempt).await {
                Attempt::Ready(value) => return RetryOutcome::Ready(value),
                Attempt::Failed(err) => return RetryOutcome::Failed(err),
                Attempt::Pending(value) => {
                    if value.is_some() {
                        latest = value;
                    }
                }
            }

            if attempt + 1 < self.max_attempts {
                let delay = self.delay_for(attempt);
                trace!("attempt {}/{} pending, retrying in {delay:?}", attempt + 1, self.max_attempts);
                tokio::time::sleep(delay).await;
            }
        }

        RetryOutcome::Exhausted(latest)
    }
}
