//! Per-kind backoff after consecutive provider transport errors.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use cadence_core::defaults::{
    RECONCILE_BACKOFF_BASE_MS, RECONCILE_BACKOFF_MAX_MS, RECONCILE_BACKOFF_THRESHOLD,
};
use cadence_core::JobKind;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Consecutive transport errors before backoff engages.
    pub threshold: u32,
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            threshold: RECONCILE_BACKOFF_THRESHOLD,
            base: Duration::from_millis(RECONCILE_BACKOFF_BASE_MS),
            max: Duration::from_millis(RECONCILE_BACKOFF_MAX_MS),
        }
    }
}

impl BackoffConfig {
    /// | Variable | Default |
    /// |----------|---------|
    /// | `RECONCILE_BACKOFF_THRESHOLD` | `3` |
    /// | `RECONCILE_BACKOFF_BASE_MS` | `1000` |
    /// | `RECONCILE_BACKOFF_MAX_MS` | `60000` |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let parse = |name: &str| std::env::var(name).ok().and_then(|v| v.parse::<u64>().ok());
        Self {
            threshold: parse("RECONCILE_BACKOFF_THRESHOLD")
                .map(|v| v.max(1) as u32)
                .unwrap_or(defaults.threshold),
            base: parse("RECONCILE_BACKOFF_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.base),
            max: parse("RECONCILE_BACKOFF_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max),
        }
    }

    /// Delay after `failures` consecutive errors, or `None` below the threshold.
    pub fn delay_for(&self, failures: u32) -> Option<Duration> {
        if failures < self.threshold {
            return None;
        }
        let exponent = (failures - self.threshold).min(16);
        Some(self.base.saturating_mul(1 << exponent).min(self.max))
    }
}

#[derive(Debug, Default)]
struct KindState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

/// Tracks transport health separately for each job kind.
#[derive(Debug, Default)]
pub struct KindBackoff {
    config: BackoffConfig,
    state: Mutex<HashMap<JobKind, KindState>>,
}

impl KindBackoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Remaining backoff for `kind`, if it is currently backing off.
    pub fn remaining(&self, kind: JobKind) -> Option<Duration> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let until = state.get(&kind)?.open_until?;
        let now = Instant::now();
        (until > now).then(|| until - now)
    }

    pub fn record_success(&self, kind: JobKind) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.remove(&kind);
    }

    /// Count a transport error; returns the backoff now in force, if any.
    pub fn record_transport_error(&self, kind: JobKind) -> Option<Duration> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let entry = state.entry(kind).or_default();
        entry.consecutive_failures += 1;
        let delay = self.config.delay_for(entry.consecutive_failures)?;
        entry.open_until = Some(Instant::now() + delay);
        warn!(
            subsystem = "jobs",
            component = "backoff",
            job_kind = %kind,
            consecutive_failures = entry.consecutive_failures,
            delay_ms = delay.as_millis() as u64,
            "Provider backoff engaged"
        );
        Some(delay)
    }
}
