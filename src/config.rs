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

//! Fallible builders for the three configuration surfaces: infallible
//! setters return `Self`, setters whose value needs validating return
//! `Result<Self, ConfigError>` so invalid configuration is caught at
//! construction instead of at first use.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid configuration: {message}")]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Per-address resource pool sizing.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub(crate) max_connection_pool_size: usize,
    pub(crate) connection_acquisition_timeout: Duration,
    pub(crate) idle_time_before_connection_test: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connection_pool_size: 100,
            connection_acquisition_timeout: Duration::from_secs(60),
            idle_time_before_connection_test: None,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero disables the per-address cap entirely: `acquire` then always
    /// creates rather than queues (spec §4.1, §6.4).
    pub fn with_max_connection_pool_size(mut self, max_connection_pool_size: usize) -> Self {
        self.max_connection_pool_size = max_connection_pool_size;
        self
    }

    pub fn with_connection_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.connection_acquisition_timeout = timeout;
        self
    }

    pub fn with_idle_time_before_connection_test(mut self, idle_time: Duration) -> Self {
        self.idle_time_before_connection_test = Some(idle_time);
        self
    }

    pub fn without_idle_time_before_connection_test(mut self) -> Self {
        self.idle_time_before_connection_test = None;
        self
    }
}

/// Retry executor tuning.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub(crate) initial_delay: Duration,
    pub(crate) max_retry_time: Duration,
    pub(crate) factor: f64,
    pub(crate) jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_retry_time: Duration::from_secs(30),
            factor: 2.0,
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_delay(mut self, initial_delay: Duration) -> Result<Self, ConfigError> {
        if initial_delay.is_zero() {
            return Err(ConfigError::new("initial_delay must be greater than zero"));
        }
        self.initial_delay = initial_delay;
        Ok(self)
    }

    pub fn with_max_retry_time(mut self, max_retry_time: Duration) -> Result<Self, ConfigError> {
        if max_retry_time.is_zero() {
            return Err(ConfigError::new(
                "max_retry_time must be greater than zero",
            ));
        }
        self.max_retry_time = max_retry_time;
        Ok(self)
    }

    pub fn with_factor(mut self, factor: f64) -> Result<Self, ConfigError> {
        if !(factor > 1.0) {
            return Err(ConfigError::new("factor must be greater than 1.0"));
        }
        self.factor = factor;
        Ok(self)
    }

    pub fn with_jitter(mut self, jitter: f64) -> Result<Self, ConfigError> {
        if !(0.0..1.0).contains(&jitter) {
            return Err(ConfigError::new("jitter must be in [0.0, 1.0)"));
        }
        self.jitter = jitter;
        Ok(self)
    }
}

/// Routing table freshness and rediscovery tuning.
#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub(crate) routing_table_purge_delay: Duration,
    pub(crate) use_seed_router_first: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            routing_table_purge_delay: Duration::from_secs(30 * 60),
            use_seed_router_first: false,
        }
    }
}

impl RoutingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routing_table_purge_delay(
        mut self,
        purge_delay: Duration,
    ) -> Result<Self, ConfigError> {
        if purge_delay.is_zero() {
            return Err(ConfigError::new(
                "routing_table_purge_delay must be greater than zero",
            ));
        }
        self.routing_table_purge_delay = purge_delay;
        Ok(self)
    }

    /// If set, every refresh tries the resolved seed before the table's
    /// known routers, rather than only once the table itself has observed
    /// an empty writer set. The refresh discipline already forces
    /// seed-first whenever the table has no known routers at all, so this
    /// only changes behavior for a table that already has routers but has
    /// never yet lost its writers.
    pub fn with_use_seed_router_first(mut self, use_seed_router_first: bool) -> Self {
        self.use_seed_router_first = use_seed_router_first;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn pool_config_zero_size_means_unbounded() {
        assert_eq!(PoolConfig::new().with_max_connection_pool_size(0).max_connection_pool_size, 0);
    }

    #[test]
    fn pool_config_accepts_valid_size() {
        assert_eq!(
            PoolConfig::new().with_max_connection_pool_size(10).max_connection_pool_size,
            10
        );
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    #[case(-1.0)]
    fn retry_config_rejects_non_amplifying_factor(#[case] factor: f64) {
        assert!(RetryConfig::new().with_factor(factor).is_err());
    }

    #[rstest]
    #[case(-0.1)]
    #[case(1.0)]
    #[case(1.5)]
    fn retry_config_rejects_out_of_range_jitter(#[case] jitter: f64) {
        assert!(RetryConfig::new().with_jitter(jitter).is_err());
    }

    #[test]
    fn retry_config_accepts_boundary_zero_jitter() {
        assert!(RetryConfig::new().with_jitter(0.0).is_ok());
    }

    #[test]
    fn routing_config_rejects_zero_purge_delay() {
        assert!(RoutingConfig::new()
            .with_routing_table_purge_delay(Duration::ZERO)
            .is_err());
    }

    #[test]
    fn routing_config_defaults_to_not_preferring_the_seed_router() {
        assert!(!RoutingConfig::new().use_seed_router_first);
        assert!(RoutingConfig::new().with_use_seed_router_first(true).use_seed_router_first);
    }
}
