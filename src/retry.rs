// Copyright Rouven Bauer
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Exponential-backoff retry executor.
//!
//! The elapsed-time budget is measured through an injected [`Clock`]
//! instead of `Instant::now()`, and a retryable error for which
//! [`RoutingError::invalidates_writer`] is true runs `on_invalidate_writer`
//! before the next attempt, folding the writer-forgetting side effect into
//! the retry loop itself rather than leaving it to the caller.

use std::result::Result as StdResult;
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use log::warn;
use rand::Rng;
use thiserror::Error;

use crate::config::RetryConfig;
use crate::error::RoutingError;
use crate::time::{Clock, Instant};

pub trait RetryPolicy {
    type Error;

    /// Runs `work` until it succeeds, fails non-retryably, or the retry
    /// budget is exhausted. `on_invalidate_writer` is called once, before
    /// sleeping, whenever `work`'s error says the writer it used should be
    /// forgotten.
    fn execute<R>(
        &self,
        work: impl FnMut() -> Result<R, RoutingError>,
        on_invalidate_writer: impl FnMut(),
    ) -> StdResult<R, Self::Error>;
}

#[derive(Error, Debug)]
pub enum RetryableError {
    #[error("non-retryable error occurred: {0}")]
    RoutingError(#[from] RoutingError),
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
}

#[derive(Error, Debug)]
#[error("timed out while retrying, last error: {}", .errors.last().unwrap())]
pub struct TimeoutError {
    errors: Vec<RoutingError>,
}

impl TimeoutError {
    pub fn errors(&self) -> &[RoutingError] {
        &self.errors
    }
}

impl From<TimeoutError> for Vec<RoutingError> {
    fn from(value: TimeoutError) -> Self {
        value.errors
    }
}

#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    clock: Arc<dyn Clock>,
    initial_delay: Duration,
    max_retry_time: Duration,
    factor: f64,
    jitter: f64,
}

impl ExponentialBackoff {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            initial_delay: Duration::from_secs(1),
            max_retry_time: Duration::from_secs(30),
            factor: 2.0,
            jitter: 0.2,
        }
    }

    pub fn with_initial_delay(self, initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            ..self
        }
    }

    pub fn with_max_retry_time(self, max_retry_time: Duration) -> Self {
        Self {
            max_retry_time,
            ..self
        }
    }

    pub fn with_factor(self, factor: f64) -> Self {
        Self { factor, ..self }
    }

    pub fn with_jitter(self, jitter: f64) -> Self {
        Self { jitter, ..self }
    }

    /// Builds the executor from the recognized `maxRetryTimeMs`/
    /// `initialRetryDelayMs`/`retryDelayMultiplier`/`retryDelayJitterFactor`
    /// configuration set (spec §6.4).
    pub fn from_config(config: &RetryConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(clock)
            .with_initial_delay(config.initial_delay)
            .with_max_retry_time(config.max_retry_time)
            .with_factor(config.factor)
            .with_jitter(config.jitter)
    }

    fn max_retries(&self) -> usize {
        assert!(self.initial_delay > Duration::ZERO);
        assert!(self.max_retry_time > Duration::ZERO);
        let max_time = self.max_retry_time.as_secs_f64();
        let init = self.initial_delay.as_secs_f64();
        let min_jitter = self.factor * (1.0 - self.jitter).max(f64::EPSILON);
        ((1.0 + max_time / (init * min_jitter)).log(self.factor) - 1.0)
            .ceil()
            .max(0.0) as usize
    }
}

impl RetryPolicy for ExponentialBackoff {
    type Error = RetryableError;

    fn execute<R>(
        &self,
        mut work: impl FnMut() -> Result<R, RoutingError>,
        mut on_invalidate_writer: impl FnMut(),
    ) -> StdResult<R, Self::Error> {
        assert!(self.jitter >= 0.0);
        assert!(self.jitter < 1.0);
        let mut time_start: Option<Instant> = None;
        let mut errors: Option<Vec<RoutingError>> = None;
        let mut current_delay = self.initial_delay.as_secs_f64();
        let mut rng = rand::thread_rng();
        loop {
            let res = work();
            if time_start.is_none() {
                time_start = Some(self.clock.now());
            }
            let err = match res {
                Err(e) if e.is_retryable() => e,
                _ => return res.map_err(Into::into),
            };
            if err.invalidates_writer() {
                on_invalidate_writer();
            }
            if errors.is_none() {
                errors = Some(Vec::with_capacity(self.max_retries()));
            }
            errors.as_mut().unwrap().push(err);
            let time_elapsed = self.clock.now().saturating_duration_since(time_start.unwrap());
            if time_elapsed > self.max_retry_time {
                return Err(TimeoutError {
                    errors: errors.unwrap(),
                }
                .into());
            }
            let jitter_factor = 1.0 + rng.gen_range(-self.jitter..=self.jitter);
            let jittered_delay = (current_delay * jitter_factor).max(0.0);
            warn!(
                "operation failed and will be retried in {:.4}s: {}",
                jittered_delay,
                errors.as_ref().unwrap().last().unwrap()
            );
            sleep(Duration::try_from_secs_f64(jittered_delay).unwrap_or(Duration::MAX));
            current_delay *= self.factor;
        }
    }
}
