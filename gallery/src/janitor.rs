use crate::query::QueryStore;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{MissedTickBehavior, interval};

pub const DEFAULT_JANITOR_PERIOD: Duration = Duration::from_secs(60);

/// Periodically drop expired, unobserved entries until `shutdown` fires.
pub async fn run_janitor<V>(store: QueryStore<V>, period: Duration, mut shutdown: broadcast::Receiver<()>)
where
    V: Clone + Send + Sync + 'static,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(period_secs = period.as_secs(), "cache janitor started");

    loop {
        tokio::select! {
            result = shutdown.recv() => {
                match result {
                    Ok(()) | Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(n)) => {
                        tracing::debug!(missed = n, "janitor shutdown receiver lagged");
                    }
                }
            }

            _ = ticker.tick() => {
                let removed = store.evict_expired(store.now());
                if removed > 0 {
                    tracing::debug!(removed, remaining = store.len(), "evicted expired entries");
                }
            }
        }
    }

    tracing::info!("cache janitor stopped");
}
