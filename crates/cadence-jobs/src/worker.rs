//! Periodic stale-job sweep worker.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{error, info, instrument};

use cadence_core::defaults::{SWEEP_INTERVAL_SECS, SWEEP_LIMIT, SWEEP_STALE_AFTER_SECS};
use cadence_core::{RecoveryMethod, ReconcileFilter, Result};

use crate::reconcile::{BatchReport, ReconciliationEngine};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Configuration for the sweep worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Time between sweeps.
    pub interval: Duration,
    /// Only jobs processing at least this long are swept.
    pub stale_after_secs: i64,
    /// Maximum jobs per sweep.
    pub limit: i64,
    /// Whether to run sweeps at all.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(SWEEP_INTERVAL_SECS),
            stale_after_secs: SWEEP_STALE_AFTER_SECS,
            limit: SWEEP_LIMIT,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `SWEEP_WORKER_ENABLED` | `true` | Enable/disable periodic sweeps |
    /// | `SWEEP_INTERVAL_SECS` | `300` | Time between sweeps |
    /// | `SWEEP_STALE_AFTER_SECS` | `120` | Minimum job age |
    /// | `SWEEP_LIMIT` | `10` | Jobs per sweep |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let enabled = std::env::var("SWEEP_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        let interval = std::env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|s| Duration::from_secs(s.max(1)))
            .unwrap_or(defaults.interval);
        let stale_after_secs = std::env::var("SWEEP_STALE_AFTER_SECS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults.stale_after_secs);
        let limit = std::env::var("SWEEP_LIMIT")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults.limit)
            .max(1);

        Self {
            interval,
            stale_after_secs,
            limit,
            enabled,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_stale_after(mut self, secs: i64) -> Self {
        self.stale_after_secs = secs;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Filter used by each sweep: stale jobs that never got a callback.
    pub fn filter(&self) -> ReconcileFilter {
        ReconcileFilter {
            stale_after_secs: Some(self.stale_after_secs),
            without_callback: true,
            limit: Some(self.limit),
            ..Default::default()
        }
    }
}

/// Event emitted by the sweep worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A sweep finished and produced a report.
    SweepCompleted(BatchReport),
    /// A sweep could not load its jobs.
    SweepFailed { error: String },
    WorkerStarted,
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| cadence_core::Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Runs [`ReconciliationEngine::reconcile_all`] on a fixed interval.
pub struct SweepWorker {
    engine: ReconciliationEngine,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl SweepWorker {
    pub fn new(engine: ReconciliationEngine, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            engine,
            config,
            event_tx,
        }
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let worker = Arc::new(self);
        tokio::spawn(async move {
            worker.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run one sweep now.
    pub async fn sweep_once(&self) -> Result<BatchReport> {
        self.engine
            .reconcile_all(&self.config.filter(), RecoveryMethod::ScheduledSweep)
            .await
    }

    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Sweep worker is disabled, not starting");
            return;
        }

        info!(
            interval_secs = self.config.interval.as_secs(),
            stale_after_secs = self.config.stale_after_secs,
            limit = self.config.limit,
            "Sweep worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Sweep worker received shutdown signal");
                    break;
                }
                _ = sleep(self.config.interval) => {}
            }

            match self.sweep_once().await {
                Ok(report) => {
                    let _ = self.event_tx.send(WorkerEvent::SweepCompleted(report));
                }
                Err(e) => {
                    error!(error = %e, "Scheduled sweep failed");
                    let _ = self.event_tx.send(WorkerEvent::SweepFailed {
                        error: e.to_string(),
                    });
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Sweep worker stopped");
    }
}
