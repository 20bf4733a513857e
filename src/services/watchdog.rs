//! Worker supervision
//!
//! The ingestion and counter loops must run for the process lifetime. The
//! watchdog polls their task handles; a worker that terminated - crashed or
//! returned - is respawned from its factory. No diagnosis, no attempt
//! limit, no persisted restart counts: availability over correctness, a
//! worker that dies on every invocation restarts once per watchdog period.
//!
//! Per-worker liveness booleans are exposed for the status dashboard.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{info, warn};

type SpawnFn = Box<dyn Fn() -> JoinHandle<()> + Send + Sync>;

/// Supervision record for one worker: identity, live handle, respawner.
struct WorkerHandle {
    name: &'static str,
    handle: JoinHandle<()>,
    spawn: SpawnFn,
}

pub struct Watchdog {
    poll_interval: Duration,
    workers: Mutex<Vec<WorkerHandle>>,
}

impl Watchdog {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval, workers: Mutex::new(Vec::new()) }
    }

    /// Spawn a worker from its factory and keep supervising it.
    pub fn supervise<F>(&self, name: &'static str, spawn: F)
    where
        F: Fn() -> JoinHandle<()> + Send + Sync + 'static,
    {
        let handle = spawn();
        info!(worker = name, "worker_supervised");
        self.workers.lock().push(WorkerHandle { name, handle, spawn: Box::new(spawn) });
    }

    /// Dashboard liveness check for one worker. Unknown names are dead.
    pub fn is_alive(&self, name: &str) -> bool {
        self.workers
            .lock()
            .iter()
            .find(|w| w.name == name)
            .map(|w| !w.handle.is_finished())
            .unwrap_or(false)
    }

    /// Liveness of every supervised worker.
    pub fn liveness(&self) -> Vec<(&'static str, bool)> {
        self.workers.lock().iter().map(|w| (w.name, !w.handle.is_finished())).collect()
    }

    /// Supervision loop. Restarts dead workers until shutdown is signalled.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(poll_secs = self.poll_interval.as_secs(), "watchdog_started");
        let mut tick = interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("watchdog_shutdown");
                        return;
                    }
                }
                _ = tick.tick() => {}
            }
            if *shutdown.borrow() {
                return;
            }

            let mut workers = self.workers.lock();
            for worker in workers.iter_mut() {
                if worker.handle.is_finished() {
                    warn!(worker = worker.name, "worker_restarted");
                    worker.handle = (worker.spawn)();
                }
            }
        }
    }
}
