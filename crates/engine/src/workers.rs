//! Background worker lifecycle: the periodic timers an open [`Engine`]
//! keeps running (WAL flush, compaction re-check, table discovery, checkpoint
//! persistence, the leader lease protocol loop) and the shutdown sequence
//! that stops them again.
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use objectstore::ObjectStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::{Engine, EngineError};

/// Handles for every timer spawned by [`Engine::spawn_background_workers`].
/// Dropping this without calling [`Engine::close`] leaves the workers
/// running; they only stop when the stop signal fires or the process exits.
pub struct BackgroundWorkers {
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl<S: ObjectStore + Clone + Send + Sync + 'static> Engine<S> {
    /// Spawns every background timer: WAL flush, compaction, table
    /// discovery, checkpoint persistence, and the leader lease protocol.
    /// Call once, after `Engine::open`, with the engine already in an `Arc`.
    #[must_use]
    pub fn spawn_background_workers(self: &Arc<Self>) -> BackgroundWorkers {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut handles = Vec::new();

        {
            let engine = self.clone();
            let interval = Duration::from_secs(engine.config.wal.flush_interval_secs.max(1));
            let mut stop = stop_rx.clone();
            handles.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(interval);
                loop {
                    tokio::select! {
                        _ = tick.tick() => {
                            if let Err(e) = engine.wal.flush().await {
                                tracing::error!(error = %e, "periodic WAL flush failed; continuing");
                            }
                        }
                        _ = stop.changed() => {
                            if *stop.borrow() {
                                return;
                            }
                        }
                    }
                }
            }));
        }

        {
            let engine = self.clone();
            let interval = Duration::from_secs(engine.config.compaction.interval_secs.max(1));
            handles.push(tokio::spawn(engine.run_compaction(interval, stop_rx.clone())));
        }

        {
            let engine = self.clone();
            let interval = Duration::from_secs(engine.config.discovery.interval_secs.max(1));
            handles.push(tokio::spawn(engine.run_discovery(interval, stop_rx.clone())));
        }

        {
            let checkpointer = self.checkpointer.clone();
            let interval = Duration::from_secs(self.config.checkpoint.interval_secs.max(1));
            let stop = stop_rx.clone();
            handles.push(tokio::spawn(async move {
                checkpointer.run_periodic(interval, stop).await;
            }));
        }

        {
            let lease = self.lease.clone();
            let hook: Arc<dyn lease::RecoveryHook> = self.clone();
            let stop = stop_rx.clone();
            handles.push(tokio::spawn(async move {
                lease.run(hook, stop).await;
            }));
        }

        BackgroundWorkers { stop_tx, handles }
    }

    /// Shuts the engine down per the close contract: a final WAL flush,
    /// stopping every background timer, closing the sequence allocator and
    /// WAL writer, persisting the checkpoint one last time, and releasing
    /// the leader lease if held. Idempotent; a second call is a no-op.
    pub async fn close(
        &self,
        workers: BackgroundWorkers,
        grace: Duration,
    ) -> Result<(), EngineError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.flush().await?;

        let _ = workers.stop_tx.send(true);
        for handle in workers.handles {
            let _ = tokio::time::timeout(grace, handle).await;
        }

        self.sequence.lock().await.close(grace).await?;
        self.checkpointer.persist_now().await?;
        self.lease.release().await?;
        self.wal.close().await?;
        Ok(())
    }
}
