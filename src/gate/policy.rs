use crate::url::host_matches;
use crate::{ConfigError, ConfigResult, FetchErrorKind};
use std::collections::BTreeSet;
use std::time::Duration;

/// Rate-limit and retry rules for one politeness gate
///
/// Immutable for the lifetime of the gate that owns it.
#[derive(Debug, Clone)]
pub struct PolitenessPolicy {
    /// Upper bound on in-flight requests across all hosts
    pub max_global_concurrent: usize,

    /// Upper bound on in-flight requests to any single host
    pub max_per_host_concurrent: usize,

    /// Minimum spacing between the end of one request to a host and the
    /// start of the next
    pub min_delay_per_host: Duration,

    /// Retries allowed after the first attempt
    pub max_retries: u32,

    /// First backoff step; doubles on each further retry
    pub base_backoff: Duration,

    /// Upper bound of the uniform random jitter added to each backoff
    pub max_jitter: Duration,

    /// Failure kinds worth another attempt
    pub retry_on: BTreeSet<FetchErrorKind>,

    /// Per-host adjustments, first match wins
    pub overrides: Vec<HostOverride>,
}

/// Per-host adjustment of the global politeness policy
#[derive(Debug, Clone, Default)]
pub struct HostOverride {
    /// Exact host or `*.example.com` wildcard
    pub pattern: String,
    pub max_concurrent: Option<usize>,
    pub min_delay: Option<Duration>,
    pub max_retries: Option<u32>,
}

/// The effective limits for one host, resolved once
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostPolicy {
    pub max_concurrent: usize,
    pub min_delay: Duration,
    pub max_retries: u32,
}

impl Default for PolitenessPolicy {
    fn default() -> Self {
        Self {
            max_global_concurrent: 4,
            max_per_host_concurrent: 1,
            min_delay_per_host: Duration::from_millis(1000),
            max_retries: 3,
            base_backoff: Duration::from_millis(500),
            max_jitter: Duration::from_millis(250),
            retry_on: default_retry_on(),
            overrides: Vec::new(),
        }
    }
}

/// Kinds retried unless configured otherwise
pub fn default_retry_on() -> BTreeSet<FetchErrorKind> {
    [
        FetchErrorKind::RateLimited,
        FetchErrorKind::ServiceUnavailable,
        FetchErrorKind::Timeout,
        FetchErrorKind::ConnectionRefused,
        FetchErrorKind::Challenged,
    ]
    .into_iter()
    .collect()
}

impl PolitenessPolicy {
    /// Checks the policy for values that would deadlock or never progress
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_global_concurrent == 0 {
            return Err(ConfigError::Validation(
                "max-global-concurrent must be at least 1".to_string(),
            ));
        }
        if self.max_per_host_concurrent == 0 {
            return Err(ConfigError::Validation(
                "max-per-host-concurrent must be at least 1".to_string(),
            ));
        }
        for host_override in &self.overrides {
            if host_override.pattern.trim().is_empty() {
                return Err(ConfigError::InvalidPattern(
                    "politeness override pattern is empty".to_string(),
                ));
            }
            if host_override.max_concurrent == Some(0) {
                return Err(ConfigError::Validation(format!(
                    "politeness override '{}' has max-concurrent of 0",
                    host_override.pattern
                )));
            }
        }
        Ok(())
    }

    /// Applies the first matching override to the global limits
    pub fn resolve(&self, host: &str) -> HostPolicy {
        let mut resolved = HostPolicy {
            max_concurrent: self.max_per_host_concurrent,
            min_delay: self.min_delay_per_host,
            max_retries: self.max_retries,
        };

        if let Some(host_override) = self
            .overrides
            .iter()
            .find(|o| host_matches(&o.pattern, host))
        {
            if let Some(max_concurrent) = host_override.max_concurrent {
                resolved.max_concurrent = max_concurrent;
            }
            if let Some(min_delay) = host_override.min_delay {
                resolved.min_delay = min_delay;
            }
            if let Some(max_retries) = host_override.max_retries {
                resolved.max_retries = max_retries;
            }
        }

        resolved
    }

    pub fn is_retryable(&self, kind: FetchErrorKind) -> bool {
        self.retry_on.contains(&kind)
    }

    /// Backoff before the retry that follows failed attempt number `attempt`
    ///
    /// `base_backoff * 2^(attempt - 1)`, without jitter, saturating.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.base_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = PolitenessPolicy {
            base_backoff: Duration::from_millis(100),
            ..Default::default()
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_saturates() {
        let policy = PolitenessPolicy {
            base_backoff: Duration::MAX,
            ..Default::default()
        };
        assert_eq!(policy.backoff_for(5), Duration::MAX);
    }

    #[test]
    fn test_resolve_uses_first_matching_override() {
        let policy = PolitenessPolicy {
            overrides: vec![
                HostOverride {
                    pattern: "*.slow.test".to_string(),
                    min_delay: Some(Duration::from_secs(5)),
                    ..Default::default()
                },
                HostOverride {
                    pattern: "www.slow.test".to_string(),
                    max_concurrent: Some(3),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let slow = policy.resolve("www.slow.test");
        assert_eq!(slow.min_delay, Duration::from_secs(5));
        assert_eq!(slow.max_concurrent, policy.max_per_host_concurrent);

        let other = policy.resolve("fast.test");
        assert_eq!(other.min_delay, policy.min_delay_per_host);
    }

    #[test]
    fn test_default_retry_set() {
        let policy = PolitenessPolicy::default();
        assert!(policy.is_retryable(FetchErrorKind::RateLimited));
        assert!(policy.is_retryable(FetchErrorKind::Challenged));
        assert!(!policy.is_retryable(FetchErrorKind::HttpStatus));
        assert!(!policy.is_retryable(FetchErrorKind::Cancelled));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let policy = PolitenessPolicy {
            max_global_concurrent: 0,
            ..Default::default()
        };
        assert!(policy.validate().is_err());

        let policy = PolitenessPolicy {
            overrides: vec![HostOverride {
                pattern: "shop.test".to_string(),
                max_concurrent: Some(0),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(policy.validate().is_err());
        assert!(PolitenessPolicy::default().validate().is_ok());
    }
}
