//! Query options, retry policy and cache-wide defaults.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use aula_core::QueryKey;

/// Cache-wide defaults applied when a query does not declare its own.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a successful entry is served without refetching.
    pub default_stale_time: Duration,
    /// How long an entry with no subscribers survives before eviction.
    pub default_gc_time: Duration,
    /// Retry policy for reads that do not declare one.
    pub read_retry: RetryPolicy,
    /// Capacity of the cache event broadcast channel.
    pub event_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_stale_time: Duration::ZERO,
            default_gc_time: Duration::from_secs(5 * 60),
            read_retry: RetryPolicy::reads(),
            event_capacity: 256,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stale_time(mut self, duration: Duration) -> Self {
        self.default_stale_time = duration;
        self
    }

    pub fn with_gc_time(mut self, duration: Duration) -> Self {
        self.default_gc_time = duration;
        self
    }

    pub fn with_read_retry(mut self, policy: RetryPolicy) -> Self {
        self.read_retry = policy;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Bounded retry with exponential backoff.
///
/// Only transient failures (transport, 5xx) are retried. Mutations have no
/// policy at all: they run exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Default read policy: one retry after one second.
    pub fn reads() -> Self {
        Self {
            max_retries: 1,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: Duration::ZERO,
        }
    }

    pub fn never() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (zero-based), capped at
    /// `max_delay`, plus up to `jitter` on top.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let secs = (self.initial_delay.as_secs_f64() * factor).min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay) + clock_jitter(self.jitter)
    }
}

/// An offset in `[0, bound)` taken from the clock's sub-second nanos.
fn clock_jitter(bound: Duration) -> Duration {
    let bound_nanos = bound.as_nanos() as u64;
    if bound_nanos == 0 {
        return Duration::ZERO;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::from(elapsed.subsec_nanos()));
    Duration::from_nanos(nanos % bound_nanos)
}

/// Declaration of one read: its key, freshness windows, guard and retry.
///
/// Unset windows and retry fall back to the client's [`CacheConfig`].
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub key: QueryKey,
    pub stale_time: Option<Duration>,
    pub gc_time: Option<Duration>,
    pub enabled: bool,
    pub retry: Option<RetryPolicy>,
}

impl QueryOptions {
    pub fn new(key: QueryKey) -> Self {
        Self {
            key,
            stale_time: None,
            gc_time: None,
            enabled: true,
            retry: None,
        }
    }

    pub fn with_stale_time(mut self, duration: Duration) -> Self {
        self.stale_time = Some(duration);
        self
    }

    pub fn with_gc_time(mut self, duration: Duration) -> Self {
        self.gc_time = Some(duration);
        self
    }

    /// The read fires only while `enabled` holds.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }
}

/// Declaration of one write: the namespaces it invalidates on success.
#[derive(Debug, Clone)]
pub struct MutationOptions {
    pub name: &'static str,
    pub invalidates: Vec<QueryKey>,
}

impl MutationOptions {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            invalidates: Vec::new(),
        }
    }

    pub fn invalidates(mut self, prefix: QueryKey) -> Self {
        self.invalidates.push(prefix);
        self
    }
}
