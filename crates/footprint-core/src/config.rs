// ── Runtime client configuration ──
//
// These types describe *how* to talk to the Footprint service: where it
// lives, how to authenticate, and how the retry and cache layers behave.
// They never touch disk; `footprint-config` builds a `ClientConfig` and
// hands it in.

use std::time::Duration;

use footprint_api::{Credentials, ScanSurfaceBatcher, TransportConfig};
use url::Url;

/// Backoff and give-up policy for the retry layer.
///
/// The wait before retry `n` (1-based) is `backoff_unit * fib(n)`, i.e.
/// 1, 1, 2, 3, 5... units. A failure that arrives once `max_elapsed` has
/// passed since the first attempt is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff_unit: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_unit: Duration::from_secs(60),
            max_elapsed: Duration::from_secs(180),
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff_unit.saturating_mul(fibonacci(retry))
    }

    /// Every wait taken before giving up, assuming attempts take no time.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut waits = Vec::new();
        let mut spent = Duration::ZERO;
        for retry in 1.. {
            let next = self.delay(retry);
            if next.is_zero() || spent >= self.max_elapsed {
                break;
            }
            spent += next;
            waits.push(next);
        }
        waits
    }
}

fn fibonacci(n: u32) -> u32 {
    let (mut a, mut b) = (0_u32, 1_u32);
    for _ in 0..n {
        (a, b) = (b, a.saturating_add(b));
    }
    a
}

/// Time-to-live per cached resource and the per-cache entry bound.
///
/// Entries expire a fixed time after they were written, not after last
/// access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub registrations_ttl: Duration,
    pub accounts_ttl: Duration,
    pub scanners_ttl: Duration,
    pub users_ttl: Duration,
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        const DAY: Duration = Duration::from_secs(24 * 60 * 60);
        const HOUR: Duration = Duration::from_secs(60 * 60);
        Self {
            registrations_ttl: DAY,
            accounts_ttl: DAY,
            scanners_ttl: HOUR,
            users_ttl: HOUR,
            max_capacity: 10_000,
        }
    }
}

/// Everything needed to build and log in a client stack.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API base URL (e.g. `https://footprint.example.com/api/`).
    pub base_url: Url,
    pub credentials: Credentials,
    pub transport: TransportConfig,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    pub batcher: ScanSurfaceBatcher,
}

impl ClientConfig {
    /// Config with default transport, retry, cache and batching settings.
    pub fn new(base_url: Url, credentials: Credentials) -> Self {
        Self {
            base_url,
            credentials,
            transport: TransportConfig::default(),
            retry: RetryPolicy::default(),
            cache: CacheConfig::default(),
            batcher: ScanSurfaceBatcher::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn fibonacci_waits() {
        let policy = RetryPolicy {
            backoff_unit: Duration::from_millis(10),
            max_elapsed: Duration::from_secs(60),
        };
        let waits: Vec<u128> = (1..=6).map(|n| policy.delay(n).as_millis()).collect();
        assert_eq!(waits, vec![10, 10, 20, 30, 50, 80]);
    }

    #[test]
    fn default_schedule_makes_four_attempts() {
        let minute = Duration::from_secs(60);
        // Attempts at 0s, 60s, 120s and 240s.
        assert_eq!(
            RetryPolicy::default().schedule(),
            vec![minute, minute, 2 * minute]
        );
    }

    #[test]
    fn zero_budget_never_waits() {
        let policy = RetryPolicy {
            backoff_unit: Duration::from_secs(1),
            max_elapsed: Duration::ZERO,
        };
        assert!(policy.schedule().is_empty());
    }

    #[test]
    fn cache_defaults() {
        let cache = CacheConfig::default();
        assert_eq!(cache.registrations_ttl, Duration::from_secs(86_400));
        assert_eq!(cache.accounts_ttl, Duration::from_secs(86_400));
        assert_eq!(cache.scanners_ttl, Duration::from_secs(3_600));
        assert_eq!(cache.users_ttl, Duration::from_secs(3_600));
    }
}
