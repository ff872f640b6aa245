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

//! Monotonic time, injected rather than sampled, so routing-table and
//! pool-timeout logic can be driven deterministically in tests.

use std::fmt::Debug;
use std::ops::{Add, AddAssign, Sub};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instant(StdInstant);

impl Debug for Instant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Instant {
    /// The maximum representable instant. TTL arithmetic that would
    /// otherwise overflow clamps to this value instead of panicking.
    pub fn max_value() -> Self {
        Self(StdInstant::now() + Duration::from_secs(u64::MAX / 2))
    }

    pub fn saturating_add(self, duration: Duration) -> Self {
        match self.0.checked_add(duration) {
            Some(inner) => Self(inner),
            None => Self::max_value(),
        }
    }

    pub fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }
}

impl Add<Duration> for Instant {
    type Output = Self;

    fn add(self, other: Duration) -> Self::Output {
        self.saturating_add(other)
    }
}

impl AddAssign<Duration> for Instant {
    fn add_assign(&mut self, other: Duration) {
        *self = *self + other;
    }
}

impl Sub for Instant {
    type Output = Duration;

    fn sub(self, earlier: Self) -> Duration {
        self.saturating_duration_since(earlier)
    }
}

/// A monotonic clock capability.
///
/// Every component that needs "now" (the pool's idle timestamps, the
/// registry's staleness checks, the retry executor's elapsed-time budget)
/// takes a `&dyn Clock` rather than calling `Instant::now()` directly, so
/// tests can freeze or fast-forward time deterministically instead of
/// sampling the global clock.
pub trait Clock: Debug + Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant(StdInstant::now())
    }
}

/// Test double: an explicit, steppable clock.
#[derive(Debug)]
pub struct ManualClock {
    base: StdInstant,
    offset_millis: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: StdInstant::now(),
            offset_millis: AtomicU64::new(0),
        })
    }

    pub fn advance(&self, by: Duration) {
        self.offset_millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset_millis.load(Ordering::SeqCst);
        Instant(self.base + Duration::from_millis(offset))
    }
}
