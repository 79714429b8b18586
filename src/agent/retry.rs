//! Timeout and retry policy for agent invocations.
//!
//! Each attempt runs under a timeout. Failures the predicate marks transient
//! are retried with exponential backoff (`base * 2^attempt`) until the attempt
//! budget is spent; any other failure ends the run immediately.

use std::future::Future;
use std::time::Duration;

use tokio::time::error::Elapsed;

use crate::config::AgentConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
    /// Per-attempt timeout
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

impl From<&AgentConfig> for RetryPolicy {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            timeout: config.timeout,
            ..Self::default()
        }
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// Every attempt failed with a transient error.
    Exhausted { attempts: u32, last: E },
    /// A non-transient error; no further attempts were made.
    Fatal { attempt: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            Self::Exhausted { last, .. } => last,
            Self::Fatal { error, .. } => error,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// The full schedule of waits between attempts.
    pub fn schedule(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1))
            .map(|attempt| self.delay_for(attempt))
            .collect()
    }

    /// Run `op` until it succeeds, fails non-transiently, or attempts run out.
    ///
    /// `op` receives the 0-based attempt number. A timed-out attempt is
    /// abandoned and surfaces as `E::from(Elapsed)`, which goes through the
    /// same `is_transient` classification as any other error.
    pub async fn run<T, E, F, Fut, P>(&self, mut op: F, is_transient: P) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<Elapsed> + std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let result = match tokio::time::timeout(self.timeout, op(attempt)).await {
                Ok(result) => result,
                Err(elapsed) => Err(E::from(elapsed)),
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !is_transient(&error) {
                tracing::error!("Attempt {} failed with non-transient error: {}", attempt + 1, error);
                return Err(RetryError::Fatal { attempt, error });
            }

            if attempt + 1 >= max_attempts {
                tracing::error!("Giving up after {} attempts: {}", max_attempts, error);
                return Err(RetryError::Exhausted {
                    attempts: max_attempts,
                    last: error,
                });
            }

            let delay = self.delay_for(attempt);
            tracing::warn!(
                "Attempt {}/{} failed with transient error: {}. Retrying in {:?}",
                attempt + 1,
                max_attempts,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
