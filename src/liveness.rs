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

//! Idle-connection revalidation gate.
//!
//! Factored out of the pool's acquire loop so the idle-threshold policy —
//! unset disables, zero forces a check on every acquisition, and `"none"`
//! auth schemes are always skipped since nothing about their credentials
//! can go stale — has one place to live and one place to be tested.

use std::time::Duration;

use crate::connection::Connection;
use crate::time::{Clock, Instant};

#[derive(Debug, Clone, Copy)]
pub(crate) struct LivenessCheck {
    threshold: Option<Duration>,
}

impl LivenessCheck {
    pub(crate) fn new(threshold: Option<Duration>) -> Self {
        Self { threshold }
    }

    /// Whether an idle entry that has sat since `idle_since` must be
    /// reset-and-flushed before being handed to a caller.
    pub(crate) fn applies_to<C: Connection>(
        &self,
        connection: &C,
        idle_since: Instant,
        clock: &dyn Clock,
    ) -> bool {
        let Some(threshold) = self.threshold else {
            return false;
        };
        if connection.auth_scheme() == "none" {
            return false;
        }
        clock.now().saturating_duration_since(idle_since) >= threshold
    }
}
