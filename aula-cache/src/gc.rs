//! Background eviction of unobserved entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::client::QueryClient;

/// Spawn a loop that runs [`QueryClient::collect_garbage`] every `interval`.
///
/// The loop runs until the returned handle is aborted.
pub fn spawn_gc_task(client: QueryClient, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = client.collect_garbage();
            if evicted > 0 {
                debug!(evicted, remaining = client.len(), "query cache garbage collected");
            }
        }
    })
}
