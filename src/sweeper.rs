use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::store::WindowStore;

/// Drop rate-limit windows of days before `today`
pub async fn sweep_stale_windows(windows: &dyn WindowStore, today: NaiveDate) -> usize {
    match windows.prune_windows(today).await {
        Ok(0) => 0,
        Ok(removed) => {
            tracing::info!(removed, "Pruned stale rate-limit windows");
            removed
        }
        Err(e) => {
            tracing::error!("Failed to prune rate-limit windows: {}", e);
            0
        }
    }
}

/// Spawn a background task that prunes stale rate-limit windows
pub fn spawn_window_sweeper(
    windows: Arc<dyn WindowStore>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(every).await;
            sweep_stale_windows(windows.as_ref(), Utc::now().date_naive()).await;
        }
    })
}
