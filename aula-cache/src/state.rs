//! Query state handed to callers.
//!
//! A `QueryState` is a snapshot of one cache entry at the moment a read
//! returned. It carries the data (if any), the last error, and the freshness
//! metadata the UI needs to decide between data, spinner and retry prompt.

use aula_core::{QueryKey, RemoteError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

/// Lifecycle of one entry: `Idle -> Pending -> Success | Error`.
///
/// A `Success` entry moves back to `Pending` while a background refetch runs;
/// its data keeps being served in the meantime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Idle,
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct QueryState<T> {
    key: QueryKey,
    status: QueryStatus,
    data: Option<T>,
    error: Option<RemoteError>,
    fetched_at: Option<DateTime<Utc>>,
    is_stale: bool,
    is_fetching: bool,
    enabled: bool,
    from_cache: bool,
}

impl<T> QueryState<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        key: QueryKey,
        status: QueryStatus,
        data: Option<T>,
        error: Option<RemoteError>,
        fetched_at: Option<DateTime<Utc>>,
        is_stale: bool,
        is_fetching: bool,
        enabled: bool,
        from_cache: bool,
    ) -> Self {
        Self {
            key,
            status,
            data,
            error,
            fetched_at,
            is_stale,
            is_fetching,
            enabled,
            from_cache,
        }
    }

    /// State of a read whose key has never been fetched.
    pub fn idle(key: QueryKey, enabled: bool) -> Self {
        Self::new(key, QueryStatus::Idle, None, None, None, false, false, enabled, false)
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    pub fn status(&self) -> QueryStatus {
        self.status
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }

    pub fn error(&self) -> Option<&RemoteError> {
        self.error.as_ref()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// True when the data shown is past its staleness window or invalidated.
    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    /// True when a request for this key is still in flight.
    pub fn is_fetching(&self) -> bool {
        self.is_fetching
    }

    /// False when the read's guard kept it from firing.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// True when this read was answered without waiting for the network.
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    /// Map the data to a new type, keeping the metadata.
    pub fn map<U, F>(self, f: F) -> QueryState<U>
    where
        F: FnOnce(T) -> U,
    {
        QueryState {
            key: self.key,
            status: self.status,
            data: self.data.map(f),
            error: self.error,
            fetched_at: self.fetched_at,
            is_stale: self.is_stale,
            is_fetching: self.is_fetching,
            enabled: self.enabled,
            from_cache: self.from_cache,
        }
    }
}

/// Introspection view of one cache entry.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub has_data: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    /// When the entry becomes eligible for background refetch.
    pub stale_after: Option<Instant>,
    /// When the entry becomes eligible for eviction, if it has no subscribers.
    pub gc_after: Option<Instant>,
    pub invalidated: bool,
    pub subscribers: usize,
    pub last_issued: u64,
    pub last_applied: u64,
    pub failure_count: u32,
}
