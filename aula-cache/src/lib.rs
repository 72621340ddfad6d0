//! Aula Cache - Query Cache and Mutation Coordinator
//!
//! An in-memory cache of remote reads keyed by [`aula_core::QueryKey`]:
//!
//! - per-query staleness and GC windows with stale-while-revalidate reads
//! - enabled guards that keep a read from firing
//! - prefix invalidation after successful mutations
//! - per-key sequence numbers so a slow response never overwrites a newer one
//! - bounded retry for transient read failures; mutations never retry

mod client;
mod events;
mod gc;
mod options;
mod state;

pub use client::{InvalidationReport, QueryClient, QuerySubscription};
pub use events::{CacheEvent, CacheEventKind};
pub use gc::spawn_gc_task;
pub use options::{CacheConfig, MutationOptions, QueryOptions, RetryPolicy};
pub use state::{EntrySnapshot, QueryStatus, QueryState};
