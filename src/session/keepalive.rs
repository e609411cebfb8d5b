use super::session::SessionClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Ping the control plane every `interval` so the session does not idle out.
///
/// Runs until aborted; ticks with no session held are skipped.
pub fn spawn_keep_alive(client: Arc<SessionClient>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Keep-alive task started ({}s interval)", interval.as_secs());

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            if client.snapshot().await.session_id.is_none() {
                debug!("Keep-alive skipped: no session");
                continue;
            }

            if !client.keep_alive().await {
                warn!("Keep-alive tick failed; session may idle out");
            }
        }
    })
}
