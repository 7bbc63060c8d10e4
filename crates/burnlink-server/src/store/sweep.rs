use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;
use tracing::{info, warn};

use super::SecretStore;

/// Spawn a background Tokio task that calls `sweep_expired()` every `interval`.
///
/// Sweeping only reclaims memory; `get` enforces expiry on its own, so a
/// slow or failing sweep never makes a dead record readable.
pub fn spawn_sweep(store: Arc<dyn SecretStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.tick().await; // skip first immediate tick
        loop {
            ticker.tick().await;
            match store.sweep_expired() {
                Ok(0) => {}
                Ok(removed) => info!(removed, "swept expired secrets"),
                Err(e) => warn!(error = %e, "background sweep error"),
            }
        }
    })
}
