//! The query client: cache table, fetch coordination and invalidation.
//!
//! Reads go through [`QueryClient::fetch`], which decides per call whether
//! to answer from cache, serve stale data while revalidating, join a request
//! already in flight, or issue a new one. Every request runs on its own task
//! and carries a per-key sequence number; a response is applied only if no
//! newer response for the same key has been applied yet.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use aula_core::{QueryKey, RemoteError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::{join_all, BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::events::{CacheEvent, CacheEventKind};
use crate::options::{CacheConfig, MutationOptions, QueryOptions, RetryPolicy};
use crate::state::{EntrySnapshot, QueryState, QueryStatus};

type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, RemoteError>> + Send + Sync>;
type Completion = Shared<BoxFuture<'static, ()>>;

struct InFlight {
    seq: u64,
    done: Completion,
}

/// One cache entry. Data is stored as JSON so one table holds every type.
struct Slot {
    data: Option<Value>,
    status: QueryStatus,
    error: Option<RemoteError>,
    fetched_at: Option<DateTime<Utc>>,
    updated_at: Option<Instant>,
    stale_time: Duration,
    gc_time: Duration,
    retry: RetryPolicy,
    fetcher: Option<Fetcher>,
    in_flight: Option<InFlight>,
    last_issued: u64,
    last_applied: u64,
    invalidated: bool,
    /// Requests issued at or before this sequence predate the invalidation.
    invalidated_through: u64,
    subscribers: usize,
    inactive_since: Instant,
    failure_count: u32,
}

impl Slot {
    fn new(now: Instant, defaults: &CacheConfig) -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            error: None,
            fetched_at: None,
            updated_at: None,
            stale_time: defaults.default_stale_time,
            gc_time: defaults.default_gc_time,
            retry: defaults.read_retry.clone(),
            fetcher: None,
            in_flight: None,
            last_issued: 0,
            last_applied: 0,
            invalidated: false,
            invalidated_through: 0,
            subscribers: 0,
            inactive_since: now,
            failure_count: 0,
        }
    }

    fn configure(&mut self, options: &QueryOptions, defaults: &CacheConfig, fetcher: Fetcher) {
        self.stale_time = options.stale_time.unwrap_or(defaults.default_stale_time);
        self.gc_time = options.gc_time.unwrap_or(defaults.default_gc_time);
        self.retry = options
            .retry
            .clone()
            .unwrap_or_else(|| defaults.read_retry.clone());
        self.fetcher = Some(fetcher);
    }

    fn touch(&mut self, now: Instant) {
        if self.subscribers == 0 {
            self.inactive_since = now;
        }
    }

    fn is_fresh(&self, now: Instant) -> bool {
        self.status == QueryStatus::Success
            && !self.invalidated
            && self
                .updated_at
                .is_some_and(|updated| now < updated + self.stale_time)
    }

    /// Stale data may be shown while revalidating, but never invalidated data
    /// and never data behind an error.
    fn can_serve_stale(&self) -> bool {
        self.data.is_some() && !self.invalidated && self.status != QueryStatus::Error
    }

    /// The in-flight request, unless it was issued before an invalidation.
    fn joinable(&self) -> Option<Completion> {
        self.in_flight
            .as_ref()
            .filter(|f| !(self.invalidated && f.seq <= self.invalidated_through))
            .map(|f| f.done.clone())
    }

    fn is_collectable(&self, now: Instant) -> bool {
        self.subscribers == 0 && self.in_flight.is_none() && now >= self.inactive_since + self.gc_time
    }

    fn snapshot(&self, key: &QueryKey) -> EntrySnapshot {
        EntrySnapshot {
            key: key.clone(),
            status: self.status,
            has_data: self.data.is_some(),
            fetched_at: self.fetched_at,
            stale_after: self.updated_at.map(|updated| updated + self.stale_time),
            gc_after: (self.subscribers == 0).then(|| self.inactive_since + self.gc_time),
            invalidated: self.invalidated,
            subscribers: self.subscribers,
            last_issued: self.last_issued,
            last_applied: self.last_applied,
            failure_count: self.failure_count,
        }
    }
}

enum Action {
    Hit,
    ServeStale,
    Wait(Completion),
}

struct ClientInner {
    entries: DashMap<QueryKey, Slot>,
    config: CacheConfig,
    /// Bumped on reset; responses from an older epoch are dropped.
    epoch: AtomicU64,
    events: broadcast::Sender<CacheEvent>,
}

impl ClientInner {
    fn emit(&self, event: CacheEvent) {
        // No receivers is fine: nobody is rendering.
        let _ = self.events.send(event);
    }

    fn complete(&self, key: &QueryKey, seq: u64, epoch: u64, result: Result<Value, RemoteError>) {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(key = %key, seq, "discarding response from a previous session");
            return;
        }

        let kind = {
            let Some(mut slot) = self.entries.get_mut(key) else {
                debug!(key = %key, seq, "discarding response for evicted entry");
                return;
            };
            if slot.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
                slot.in_flight = None;
            }
            if seq <= slot.last_applied {
                debug!(
                    key = %key,
                    seq,
                    last_applied = slot.last_applied,
                    "discarding out-of-order response"
                );
                return;
            }
            slot.last_applied = seq;
            let settled = slot.in_flight.is_none();

            match result {
                Ok(value) => {
                    slot.data = Some(value);
                    slot.error = None;
                    slot.fetched_at = Some(Utc::now());
                    slot.updated_at = Some(Instant::now());
                    slot.failure_count = 0;
                    if seq > slot.invalidated_through {
                        slot.invalidated = false;
                    }
                    slot.status = if settled {
                        QueryStatus::Success
                    } else {
                        QueryStatus::Pending
                    };
                    debug!(key = %key, seq, "query updated");
                    CacheEventKind::Updated
                }
                Err(err) => {
                    warn!(key = %key, seq, error = %err, "query failed");
                    slot.error = Some(err);
                    slot.failure_count += 1;
                    slot.status = if settled {
                        QueryStatus::Error
                    } else {
                        QueryStatus::Pending
                    };
                    CacheEventKind::Failed
                }
            }
        };

        self.emit(CacheEvent::entry(key.clone(), kind));
    }
}

/// Shared query cache. Cheap to clone; all clones address the same table.
///
/// Construct one per process and pass it to whoever needs it. Call
/// [`QueryClient::reset`] when the session ends.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<ClientInner>,
}

impl QueryClient {
    pub fn new(config: CacheConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(ClientInner {
                entries: DashMap::new(),
                config,
                epoch: AtomicU64::new(0),
                events,
            }),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Subscribe to cache change events.
    pub fn events(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Read through the cache.
    ///
    /// - disabled: no request; returns whatever the cache holds (idle if empty)
    /// - fresh success: served from cache
    /// - stale success: served from cache, background refetch started
    /// - in flight: joins the running request
    /// - otherwise: issues a request and waits for it
    pub async fn fetch<T, F, Fut>(&self, options: QueryOptions, fetcher: F) -> QueryState<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        let key = options.key.clone();
        if !options.enabled {
            debug!(key = %key, "query disabled");
            return self.read(&key, false, true);
        }

        let fetcher = erase(fetcher);
        let now = Instant::now();
        let action = {
            let mut slot = self
                .inner
                .entries
                .entry(key.clone())
                .or_insert_with(|| Slot::new(now, &self.inner.config));
            slot.configure(&options, &self.inner.config, Arc::clone(&fetcher));
            slot.touch(now);

            if slot.is_fresh(now) {
                Action::Hit
            } else if slot.can_serve_stale() {
                if slot.in_flight.is_none() {
                    debug!(key = %key, "serving stale data while revalidating");
                    self.start_fetch(&key, &mut slot, fetcher);
                }
                Action::ServeStale
            } else if let Some(done) = slot.joinable() {
                Action::Wait(done)
            } else {
                Action::Wait(self.start_fetch(&key, &mut slot, fetcher))
            }
        };

        match action {
            Action::Hit => {
                debug!(key = %key, "cache hit");
                self.read(&key, true, true)
            }
            Action::ServeStale => self.read(&key, true, true),
            Action::Wait(done) => {
                done.await;
                self.read(&key, true, false)
            }
        }
    }

    /// Issue a new request regardless of freshness or requests in flight.
    ///
    /// This is the retry affordance for failed reads.
    pub async fn refetch<T, F, Fut>(&self, options: QueryOptions, fetcher: F) -> QueryState<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        let key = options.key.clone();
        if !options.enabled {
            debug!(key = %key, "query disabled");
            return self.read(&key, false, true);
        }

        let fetcher = erase(fetcher);
        let now = Instant::now();
        let done = {
            let mut slot = self
                .inner
                .entries
                .entry(key.clone())
                .or_insert_with(|| Slot::new(now, &self.inner.config));
            slot.configure(&options, &self.inner.config, Arc::clone(&fetcher));
            slot.touch(now);
            self.start_fetch(&key, &mut slot, fetcher)
        };
        done.await;
        self.read(&key, true, false)
    }

    /// Re-issue the last fetcher registered for `key` and wait for it.
    ///
    /// Returns false if the key was never fetched.
    pub async fn refresh(&self, key: &QueryKey) -> bool {
        let done = {
            let Some(mut slot) = self.inner.entries.get_mut(key) else {
                return false;
            };
            let Some(fetcher) = slot.fetcher.clone() else {
                return false;
            };
            slot.touch(Instant::now());
            self.start_fetch(key, &mut slot, fetcher)
        };
        done.await;
        true
    }

    fn start_fetch(&self, key: &QueryKey, slot: &mut Slot, fetcher: Fetcher) -> Completion {
        slot.last_issued += 1;
        let seq = slot.last_issued;
        slot.status = QueryStatus::Pending;

        let retry = slot.retry.clone();
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        debug!(key = %key, seq, "issuing request");

        let handle = tokio::spawn(async move {
            let result = run_with_retry(&fetcher, &retry, &task_key).await;
            inner.complete(&task_key, seq, epoch, result);
        });

        let inner = Arc::clone(&self.inner);
        let done_key = key.clone();
        let done: Completion = async move {
            if let Err(err) = handle.await {
                let failure = RemoteError::Network(format!("query task failed: {}", err));
                inner.complete(&done_key, seq, epoch, Err(failure));
            }
        }
        .boxed()
        .shared();

        slot.in_flight = Some(InFlight {
            seq,
            done: done.clone(),
        });
        done
    }

    fn read<T: DeserializeOwned>(&self, key: &QueryKey, enabled: bool, from_cache: bool) -> QueryState<T> {
        let now = Instant::now();
        let Some(slot) = self.inner.entries.get(key) else {
            return QueryState::idle(key.clone(), enabled);
        };

        let (data, decode_error) = match &slot.data {
            Some(value) => match serde_json::from_value::<T>(value.clone()) {
                Ok(data) => (Some(data), None),
                Err(err) => {
                    warn!(key = %key, error = %err, "cached value does not match requested type");
                    (None, Some(RemoteError::from(err)))
                }
            },
            None => (None, None),
        };
        let status = if decode_error.is_some() {
            QueryStatus::Error
        } else {
            slot.status
        };

        QueryState::new(
            key.clone(),
            status,
            data,
            decode_error.or_else(|| slot.error.clone()),
            slot.fetched_at,
            slot.data.is_some() && !slot.is_fresh(now),
            slot.in_flight.is_some(),
            enabled,
            from_cache,
        )
    }

    /// Current cached data for `key`, without fetching.
    pub fn get_query_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let slot = self.inner.entries.get(key)?;
        let value = slot.data.as_ref()?;
        match serde_json::from_value(value.clone()) {
            Ok(data) => Some(data),
            Err(err) => {
                warn!(key = %key, error = %err, "cached value does not match requested type");
                None
            }
        }
    }

    /// Like [`QueryClient::get_query_data`], but `None` once the entry is
    /// invalidated or its last request failed. Use this for `enabled` guards.
    pub fn get_valid_query_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        {
            let slot = self.inner.entries.get(key)?;
            if slot.invalidated || slot.status == QueryStatus::Error {
                return None;
            }
        }
        self.get_query_data(key)
    }

    /// Current state of `key`, without fetching.
    pub fn peek<T: DeserializeOwned>(&self, key: &QueryKey) -> QueryState<T> {
        self.read(key, true, true)
    }

    pub fn entry(&self, key: &QueryKey) -> Option<EntrySnapshot> {
        self.inner.entries.get(key).map(|slot| slot.snapshot(key))
    }

    pub fn keys(&self) -> Vec<QueryKey> {
        self.inner.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Mark every entry under `prefix` stale and refetch the subscribed ones.
    pub async fn invalidate(&self, prefix: &QueryKey) -> InvalidationReport {
        self.invalidate_many(std::slice::from_ref(prefix)).await
    }

    /// Mark every entry under any of `prefixes` stale.
    ///
    /// Entries with subscribers are refetched right away and this call waits
    /// for those refetches. Unobserved entries are refetched on their next
    /// read, which never returns the invalidated data.
    pub async fn invalidate_many(&self, prefixes: &[QueryKey]) -> InvalidationReport {
        let mut invalidated = Vec::new();
        let mut refetches = Vec::new();

        for mut entry in self.inner.entries.iter_mut() {
            if !prefixes.iter().any(|prefix| entry.key().starts_with(prefix)) {
                continue;
            }
            let key = entry.key().clone();
            let slot = entry.value_mut();
            slot.invalidated = true;
            slot.invalidated_through = slot.last_issued;
            if slot.subscribers > 0 {
                if let Some(fetcher) = slot.fetcher.clone() {
                    refetches.push(self.start_fetch(&key, slot, fetcher));
                }
            }
            invalidated.push(key);
        }

        for key in &invalidated {
            self.inner
                .emit(CacheEvent::entry(key.clone(), CacheEventKind::Invalidated));
        }
        info!(
            prefixes = prefixes.len(),
            invalidated = invalidated.len(),
            refetching = refetches.len(),
            "invalidated queries"
        );

        let refetched = refetches.len();
        join_all(refetches).await;
        InvalidationReport {
            invalidated,
            refetched,
        }
    }

    /// Run a mutation exactly once, then invalidate its declared namespaces.
    ///
    /// There is no retry: `request` is a single future, not a factory. The
    /// mutation runs on its own task so dropping the caller does not cancel
    /// it halfway, and the invalidation still happens. The cache is never
    /// touched on failure.
    pub async fn mutate<T, Fut>(&self, options: MutationOptions, request: Fut) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        let client = self.clone();
        let handle = tokio::spawn(async move {
            let result = request.await;
            match &result {
                Ok(_) => {
                    debug!(mutation = options.name, "mutation succeeded");
                    client.invalidate_many(&options.invalidates).await;
                }
                Err(err) => {
                    warn!(mutation = options.name, error = %err, "mutation failed");
                }
            }
            result
        });

        match handle.await {
            Ok(result) => result,
            Err(err) => Err(RemoteError::Network(format!("mutation task failed: {}", err))),
        }
    }

    /// Mark `key` as observed. The entry is not collected while any
    /// subscription is alive; invalidation refetches observed entries eagerly.
    pub fn subscribe(&self, key: &QueryKey) -> QuerySubscription {
        let now = Instant::now();
        let mut slot = self
            .inner
            .entries
            .entry(key.clone())
            .or_insert_with(|| Slot::new(now, &self.inner.config));
        slot.subscribers += 1;
        QuerySubscription {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
            epoch: self.inner.epoch.load(Ordering::SeqCst),
        }
    }

    /// Evict entries that have had no subscribers for longer than their GC window.
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let mut evicted = Vec::new();
        self.inner.entries.retain(|key, slot| {
            let collect = slot.is_collectable(now);
            if collect {
                evicted.push(key.clone());
            }
            !collect
        });
        for key in &evicted {
            debug!(key = %key, "evicted query");
            self.inner
                .emit(CacheEvent::entry(key.clone(), CacheEventKind::Removed));
        }
        evicted.len()
    }

    /// Drop every entry. Responses still in flight are discarded on arrival.
    pub fn reset(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let count = self.inner.entries.len();
        self.inner.entries.clear();
        info!(count, "query cache reset");
        self.inner.emit(CacheEvent::Cleared);
    }
}

/// Outcome of an invalidation pass.
#[derive(Debug, Clone, Default)]
pub struct InvalidationReport {
    pub invalidated: Vec<QueryKey>,
    pub refetched: usize,
}

/// RAII marker for an observed query.
pub struct QuerySubscription {
    inner: Arc<ClientInner>,
    key: QueryKey,
    epoch: u64,
}

impl QuerySubscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        if self.inner.epoch.load(Ordering::SeqCst) != self.epoch {
            return;
        }
        if let Some(mut slot) = self.inner.entries.get_mut(&self.key) {
            slot.subscribers = slot.subscribers.saturating_sub(1);
            if slot.subscribers == 0 {
                slot.inactive_since = Instant::now();
            }
        }
    }
}

fn erase<T, F, Fut>(fetcher: F) -> Fetcher
where
    T: Serialize + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
{
    Arc::new(move || {
        let request = fetcher();
        async move {
            let value = request.await?;
            serde_json::to_value(value).map_err(RemoteError::from)
        }
        .boxed()
    })
}

async fn run_with_retry(
    fetcher: &Fetcher,
    policy: &RetryPolicy,
    key: &QueryKey,
) -> Result<Value, RemoteError> {
    let mut attempt = 0;
    loop {
        match fetcher().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_retries && err.is_transient() => {
                let delay = policy.delay_for(attempt);
                warn!(
                    key = %key,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying query"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
