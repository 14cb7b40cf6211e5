use anyhow::{anyhow, Result};
use std::{future::Future, time::Duration};
use tracing::{error, warn};

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Bounded retry wrapper for the pipeline's fallible stages.
///
/// Each `run` call gets a fresh attempt budget. Failures are logged as they
/// happen; exhausting the budget yields an error the caller can escalate.
#[derive(Debug, Clone, Copy)]
pub struct Retry {
    max_attempts: usize,
    delay: Duration,
}

impl Retry {
    pub fn new(max_attempts: usize) -> Self {
        Self::with_delay(max_attempts, RETRY_DELAY)
    }

    pub fn with_delay(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Invoke `op` until it succeeds or the attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(what, attempt, max = self.max_attempts, "attempt failed: {err:#}");
                    if attempt >= self.max_attempts {
                        return Err(anyhow!(
                            "{what} failed after {} attempts",
                            self.max_attempts
                        ));
                    }
                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }

    /// Like `run`, but an exhausted budget is unrecoverable for the whole
    /// pipeline: log `failure_msg` and terminate the process.
    pub async fn run_or_exit<T, F, Fut>(&self, what: &str, failure_msg: &str, op: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.run(what, op).await {
            Ok(value) => value,
            Err(_) => {
                error!("{failure_msg}");
                std::process::exit(1);
            }
        }
    }
}
