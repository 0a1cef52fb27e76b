//! Configuration for the rule checker.

use std::time::Duration;

/// Tunables of the [`RuleChecker`](crate::RuleChecker).
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// How long a peer must be reported down, on an unreachable store,
    /// before the checker replaces it instead of waiting for recovery.
    pub max_store_down_time: Duration,

    /// Capacity of the no-op short-circuit cache.
    pub cache_capacity: usize,

    /// How long a cached no-op marker stays valid.
    pub cache_ttl: Duration,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            max_store_down_time: Duration::from_secs(600),
            cache_capacity: 10,
            cache_ttl: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checker_config_defaults() {
        let config = CheckerConfig::default();
        assert_eq!(config.max_store_down_time, Duration::from_secs(600));
        assert_eq!(config.cache_capacity, 10);
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
    }
}
