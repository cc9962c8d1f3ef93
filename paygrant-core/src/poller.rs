//! Bounded polling
//!
//! [`Poller`] calls an operation at a fixed interval until the result
//! satisfies a success condition. An unsatisfying result is not an error; only
//! the overall deadline or an `Err` from the operation ends the loop early.
//!
//! The deadline covers everything from the first call on: time spent inside
//! each call and every sleep between calls. Each call only gets the budget
//! that is left, so one stalled call cannot overrun the deadline, and the
//! sleep before the next call is cut short at the deadline as well.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Why polling stopped without success
#[derive(Debug, Error)]
pub enum PollError<E> {
    /// The deadline passed before the success condition held
    #[error("polling timed out after {elapsed:?}")]
    TimedOut { elapsed: Duration },

    /// The operation failed permanently
    #[error("polling stopped: {0}")]
    Rejected(E),
}

/// Default success condition for [`Poller::poll`]
pub trait Present {
    fn is_present(&self) -> bool;
}

impl<T> Present for Option<T> {
    fn is_present(&self) -> bool {
        self.is_some()
    }
}

impl<T> Present for Vec<T> {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

impl Present for String {
    fn is_present(&self) -> bool {
        !self.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    interval: Duration,
    deadline: Duration,
}

impl Poller {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Poll until the result is present (non-empty)
    pub async fn poll<T, E, F, Fut>(&self, op: F) -> Result<T, PollError<E>>
    where
        T: Present,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.poll_until(op, T::is_present).await
    }

    /// Poll until `success` holds for the result
    pub async fn poll_until<T, E, F, Fut, P>(&self, op: F, success: P) -> Result<T, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&T) -> bool,
    {
        self.poll_paced(op, success, |_| None).await
    }

    /// Like [`Poller::poll_until`], but `pace` may replace the interval after
    /// each unsatisfying result. The deadline never moves.
    pub async fn poll_paced<T, E, F, Fut, P, N>(
        &self,
        mut op: F,
        mut success: P,
        mut pace: N,
    ) -> Result<T, PollError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&T) -> bool,
        N: FnMut(&T) -> Option<Duration>,
    {
        let start = Instant::now();
        let mut interval = self.interval;
        let mut attempt = 0u32;

        loop {
            let remaining = self.deadline.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(PollError::TimedOut {
                    elapsed: start.elapsed(),
                });
            }

            attempt += 1;
            match tokio::time::timeout(remaining, op()).await {
                Err(_) => {
                    debug!(attempt, "Poll call exceeded the remaining budget");
                    return Err(PollError::TimedOut {
                        elapsed: start.elapsed(),
                    });
                }
                Ok(Err(err)) => return Err(PollError::Rejected(err)),
                Ok(Ok(value)) if success(&value) => {
                    debug!(attempt, elapsed = ?start.elapsed(), "Poll succeeded");
                    return Ok(value);
                }
                Ok(Ok(value)) => {
                    if let Some(next) = pace(&value) {
                        interval = next;
                    }
                    debug!(attempt, ?interval, "Not ready, polling again");
                }
            }

            let remaining = self.deadline.saturating_sub(start.elapsed());
            tokio::time::sleep(interval.min(remaining)).await;
        }
    }
}
