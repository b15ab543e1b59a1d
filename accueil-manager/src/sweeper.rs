//! Periodic removal of idle sessions

use accueil_core::session::SessionStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Call `SessionStore::sweep` every `interval` until shutdown is signalled
pub fn spawn_sweeper(
    sessions: Arc<SessionStore>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        tracing::info!("Session sweeper started (every {:?})", interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = sessions.sweep(Utc::now());
                    tracing::debug!("Sweep pass removed {} session(s)", removed);
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Session sweeper stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use accueil_core::config::SessionPolicy;

    #[tokio::test]
    async fn test_sweeper_removes_idle_sessions_and_stops() {
        let sessions = Arc::new(SessionStore::with_limits(
            20,
            Duration::from_millis(10),
            SessionPolicy::Permissive,
        ));
        sessions.create();
        sessions.create();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = spawn_sweeper(Arc::clone(&sessions), Duration::from_millis(20), shutdown_rx);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(sessions.is_empty());

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
