//! Connection health monitor
//!
//! Periodically probes every connection in the registry. Probes run
//! concurrently with bounded parallelism and a per-probe timeout, so one
//! hung device never stalls the sweep.

use crate::config::FleetConfig;
use crate::registry::FleetRegistry;
use crate::types::HealthState;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Outcome counts of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub probed: usize,
    pub online: usize,
    pub offline: usize,
    pub error: usize,
}

pub struct HealthMonitor {
    registry: Arc<FleetRegistry>,
    interval: Duration,
    probe_timeout: Duration,
    concurrency: usize,
}

impl HealthMonitor {
    pub fn new(registry: Arc<FleetRegistry>, config: &FleetConfig) -> Self {
        Self::with_timing(
            registry,
            config.probe_interval(),
            config.probe_timeout(),
            config.probe_concurrency,
        )
    }

    pub fn with_timing(
        registry: Arc<FleetRegistry>,
        interval: Duration,
        probe_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            // tokio intervals reject a zero period
            interval: interval.max(Duration::from_millis(1)),
            probe_timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Sweep until cancelled; the first sweep starts immediately
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            probe_timeout_ms = self.probe_timeout.as_millis() as u64,
            "Health monitor started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // In-flight probes are dropped on cancel, not retried
            tokio::select! {
                _ = cancel.cancelled() => break,
                summary = self.sweep() => {
                    debug!(
                        probed = summary.probed,
                        online = summary.online,
                        offline = summary.offline,
                        error = summary.error,
                        "Health sweep complete"
                    );
                }
            }
        }

        info!("Health monitor stopped");
    }

    /// Probe every connection once
    pub async fn sweep(&self) -> SweepSummary {
        let fleet = self.registry.snapshot();
        let timeout = self.probe_timeout;

        let states: Vec<HealthState> = futures::stream::iter(fleet.values().cloned())
            .map(|conn| async move { conn.probe(timeout).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut summary = SweepSummary {
            probed: states.len(),
            ..Default::default()
        };
        for state in states {
            match state {
                HealthState::Online => summary.online += 1,
                HealthState::Offline => summary.offline += 1,
                HealthState::Error => summary.error += 1,
                HealthState::Unknown => {}
            }
        }
        summary
    }
}
