//! Background Sweep and Snapshot Scheduler
//!
//! This module runs the store's housekeeping as a single Tokio task with two
//! independent timers:
//!
//! 1. **Sweep** (short period, default 1s): removes every entry whose TTL has
//!    passed. Only the expired suffix of the expiry index is touched.
//! 2. **Snapshot** (long period, default 60s): writes the whole store to the
//!    snapshot file. The disk work runs on the blocking pool.
//!
//! ```text
//!        ┌──────────── select! ─────────────┐
//!        │                                  │
//!   stop signal      sweep tick        snapshot tick
//!        │               │                  │
//!      return     sweep_expired()    spawn_blocking(snapshot)
//! ```
//!
//! A failed snapshot is logged and the loop keeps going, so one bad write
//! never stops future sweeps or snapshot attempts. The stop signal is
//! checked once per iteration; the loop does not write a final snapshot
//! on its way out (see [`Store::close`](crate::storage::Store::close)).

use crate::storage::{StorageEngine, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace};

/// A handle to the running scheduler task.
///
/// When this handle is dropped, the scheduler is told to stop. Use
/// [`Scheduler::shutdown`] to also wait for the task to finish.
#[derive(Debug)]
pub struct Scheduler {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Starts the scheduler as a background task.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn start(engine: Arc<StorageEngine>, path: PathBuf, config: &StoreConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(scheduler_loop(
            engine,
            path,
            config.sweep_interval,
            config.snapshot_interval,
            shutdown_rx,
        ));

        info!(
            sweep_interval_ms = config.sweep_interval.as_millis() as u64,
            snapshot_interval_ms = config.snapshot_interval.as_millis() as u64,
            "Background scheduler started"
        );

        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Signals the scheduler to stop without waiting for it.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Signals the scheduler to stop and waits until its task has exited.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The main scheduler loop.
async fn scheduler_loop(
    engine: Arc<StorageEngine>,
    path: PathBuf,
    sweep_interval: Duration,
    snapshot_interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut sweep_ticker = tokio::time::interval(sweep_interval);
    let mut snapshot_ticker = tokio::time::interval(snapshot_interval);
    sweep_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    snapshot_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Both intervals fire immediately on their first tick; skip it
    sweep_ticker.tick().await;
    snapshot_ticker.tick().await;

    loop {
        tokio::select! {
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    info!("Background scheduler stopped");
                    return;
                }
            }
            _ = sweep_ticker.tick() => {
                let expired = engine.sweep_expired();
                if expired > 0 {
                    debug!(
                        expired = expired,
                        keys_remaining = engine.len(),
                        "Expired keys swept"
                    );
                } else {
                    trace!("Sweep found nothing to expire");
                }
            }
            _ = snapshot_ticker.tick() => {
                let engine = Arc::clone(&engine);
                let path = path.clone();
                match tokio::task::spawn_blocking(move || engine.snapshot(&path)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(error = %e, "Scheduled snapshot failed"),
                    Err(e) => error!(error = %e, "Snapshot task ended abnormally"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn fast_config() -> StoreConfig {
        StoreConfig::default()
            .with_sweep_interval(Duration::from_millis(10))
            .with_snapshot_interval(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_scheduler_sweeps_expired_keys() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(StorageEngine::new());

        // Add some keys with short TTL
        for i in 0..10 {
            engine
                .put_with_ttl(format!("key{}", i), "value", TimeDelta::milliseconds(50))
                .unwrap();
        }

        // Add a persistent key
        engine.put("persistent", "value").unwrap();
        assert_eq!(engine.len(), 11);

        let scheduler = Scheduler::start(
            Arc::clone(&engine),
            dir.path().join("sched.snapshot"),
            &fast_config(),
        );

        // Wait for keys to expire and be swept
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Only the persistent key should remain
        assert_eq!(engine.len(), 1);
        assert!(engine.contains_key("persistent"));
        assert!(engine.expiry_index().is_empty());

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_scheduler_writes_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sched.snapshot");
        let engine = Arc::new(StorageEngine::new());
        engine.put("name", "Ariz").unwrap();

        let scheduler = Scheduler::start(Arc::clone(&engine), path.clone(), &fast_config());
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.shutdown().await;

        assert!(engine.stats().snapshots >= 1);
        let restored = StorageEngine::restore(&path).unwrap();
        assert_eq!(restored.get("name").unwrap(), "Ariz");
    }

    #[tokio::test]
    async fn test_failed_snapshot_does_not_stop_sweeps() {
        let dir = tempfile::tempdir().unwrap();
        // The parent directory does not exist, so every snapshot fails
        let path = dir.path().join("missing").join("sched.snapshot");
        let engine = Arc::new(StorageEngine::new());

        let scheduler = Scheduler::start(Arc::clone(&engine), path.clone(), &fast_config());
        tokio::time::sleep(Duration::from_millis(80)).await;

        engine
            .put_with_ttl("short", "value", TimeDelta::milliseconds(20))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(!engine.contains_key("short"));
        assert_eq!(engine.stats().snapshots, 0);
        assert!(!path.exists());

        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(StorageEngine::new());

        let scheduler = Scheduler::start(
            Arc::clone(&engine),
            dir.path().join("sched.snapshot"),
            &fast_config(),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        scheduler.shutdown().await;

        // Add keys after the scheduler is stopped
        engine
            .put_with_ttl("key", "value", TimeDelta::milliseconds(10))
            .unwrap();

        // Nothing sweeps any more, so the expired key stays
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(engine.contains_key("key"));
    }

    #[tokio::test]
    async fn test_scheduler_stops_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Arc::new(StorageEngine::new());

        {
            let _scheduler = Scheduler::start(
                Arc::clone(&engine),
                dir.path().join("sched.snapshot"),
                &fast_config(),
            );
            tokio::time::sleep(Duration::from_millis(30)).await;
            // Scheduler is dropped here
        }

        // Give the task a chance to observe the signal
        tokio::time::sleep(Duration::from_millis(20)).await;

        engine
            .put_with_ttl("key", "value", TimeDelta::milliseconds(10))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(engine.contains_key("key"));
    }
}
