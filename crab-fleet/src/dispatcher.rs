//! Job dispatcher
//!
//! Turns submissions into one print job per target printer and delivers each
//! job on its own task. Every job ends in exactly one terminal state; delivery
//! failures are recorded on the job, never returned to the submitter.

use crate::error::{FleetError, FleetResult};
use crate::registry::FleetRegistry;
use crate::renderer::EncodingFallbackRenderer;
use crate::storage::PrintJobStore;
use crate::types::{HealthState, JobKind, PrintDocument, PrintJob, PrinterType, SubmittedJob, TargetSelector};
use crab_printer::TextEncoding;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use parking_lot::RwLock;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct JobDispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<FleetRegistry>,
    job_store: Arc<dyn PrintJobStore>,
    renderer: EncodingFallbackRenderer,
    /// Jobs not yet durably recorded in their final state
    jobs: DashMap<String, PrintJob>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    /// Read-held by submitters from the check through the spawn; `shutdown`
    /// flips it under the write lock before closing the tracker
    closing: RwLock<bool>,
    probe_timeout: Duration,
}

impl JobDispatcher {
    pub fn new(
        registry: Arc<FleetRegistry>,
        job_store: Arc<dyn PrintJobStore>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                job_store,
                renderer: EncodingFallbackRenderer::new(),
                jobs: DashMap::new(),
                tracker: TaskTracker::new(),
                cancel: CancellationToken::new(),
                closing: RwLock::new(false),
                probe_timeout,
            }),
        }
    }

    /// Create one pending job per selected printer and start delivering
    ///
    /// Returns as soon as the jobs are recorded. Fails only for an empty
    /// printer list or while shutting down.
    pub fn submit(
        &self,
        selector: &TargetSelector,
        document: PrintDocument,
        kind: JobKind,
    ) -> FleetResult<Vec<SubmittedJob>> {
        let targets = self.targets(selector)?;
        if targets.is_empty() {
            warn!(?selector, "Selector matched no printers");
        }

        Ok(self
            .dispatch(targets, document, kind)?
            .into_iter()
            .map(|(job, _)| SubmittedJob {
                job_id: job.id,
                printer_id: job.printer_id,
            })
            .collect())
    }

    /// Print to each listed printer and wait for every outcome
    pub async fn print_to(
        &self,
        printer_ids: &[String],
        document: PrintDocument,
        kind: JobKind,
    ) -> FleetResult<BTreeMap<String, PrintJob>> {
        let targets = self.targets(&TargetSelector::Printers(printer_ids.to_vec()))?;
        self.fan_out(targets, document, kind).await
    }

    /// Print to every printer of a type and wait for every outcome
    pub async fn print_to_type(
        &self,
        printer_type: PrinterType,
        document: PrintDocument,
        kind: JobKind,
    ) -> FleetResult<BTreeMap<String, PrintJob>> {
        let targets = self.targets(&TargetSelector::Type(printer_type))?;
        self.fan_out(targets, document, kind).await
    }

    /// Print to the whole fleet and wait for every outcome
    pub async fn print_to_all(
        &self,
        document: PrintDocument,
        kind: JobKind,
    ) -> FleetResult<BTreeMap<String, PrintJob>> {
        let targets = self.targets(&TargetSelector::All)?;
        self.fan_out(targets, document, kind).await
    }

    /// Current record of a job, in memory first, then the store
    pub fn status(&self, job_id: &str) -> FleetResult<PrintJob> {
        if let Some(job) = self.inner.jobs.get(job_id) {
            return Ok(job.clone());
        }
        self.inner
            .job_store
            .load_job(job_id)?
            .ok_or_else(|| FleetError::JobNotFound(job_id.to_string()))
    }

    /// Jobs still waiting for a terminal state
    pub fn pending_count(&self) -> usize {
        self.inner.jobs.iter().filter(|j| !j.is_terminal()).count()
    }

    pub fn is_closing(&self) -> bool {
        *self.inner.closing.read()
    }

    /// Stop accepting jobs and drain in-flight ones
    ///
    /// Jobs still pending after `grace` are failed with `ShutdownInProgress`
    /// and their tasks cancelled. Returns how many jobs were force-failed.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let inner = &self.inner;
        {
            let mut closing = inner.closing.write();
            if *closing {
                debug!("Dispatcher already shutting down");
            }
            *closing = true;
        }
        inner.tracker.close();

        info!(
            in_flight = inner.tracker.len(),
            grace_ms = grace.as_millis() as u64,
            "Draining print jobs"
        );

        if tokio::time::timeout(grace, inner.tracker.wait()).await.is_ok() {
            info!("All print jobs drained");
            return 0;
        }

        let pending: Vec<String> = inner
            .jobs
            .iter()
            .filter(|j| !j.is_terminal())
            .map(|j| j.key().clone())
            .collect();
        warn!(count = pending.len(), "Grace period elapsed, failing remaining jobs");

        let err = FleetError::ShutdownInProgress;
        let mut failed = 0;
        for job_id in pending {
            let snapshot = {
                let Some(mut job) = inner.jobs.get_mut(&job_id) else {
                    continue;
                };
                if !job.fail(err.code(), err.to_string()) {
                    continue;
                }
                job.clone()
            };
            failed += 1;
            inner.persist(&snapshot);
        }

        inner.cancel.cancel();
        inner.tracker.wait().await;
        failed
    }

    fn targets(&self, selector: &TargetSelector) -> FleetResult<Vec<String>> {
        if self.is_closing() {
            return Err(FleetError::ShutdownInProgress);
        }

        let registry = &self.inner.registry;
        let ids = match selector {
            TargetSelector::Printer(id) => vec![id.clone()],
            TargetSelector::Printers(ids) => {
                if ids.is_empty() {
                    return Err(FleetError::EmptySelector);
                }
                let mut seen = HashSet::new();
                ids.iter().filter(|id| seen.insert(*id)).cloned().collect()
            }
            TargetSelector::Type(printer_type) => registry
                .by_type(*printer_type)
                .iter()
                .map(|c| c.id().to_string())
                .collect(),
            TargetSelector::All => registry.ids(),
        };
        Ok(ids)
    }

    fn dispatch(
        &self,
        targets: Vec<String>,
        document: PrintDocument,
        kind: JobKind,
    ) -> FleetResult<Vec<(PrintJob, JoinHandle<PrintJob>)>> {
        let closing = self.inner.closing.read();
        if *closing {
            return Err(FleetError::ShutdownInProgress);
        }

        let mut started = Vec::with_capacity(targets.len());
        for printer_id in targets {
            let job = PrintJob::new(&printer_id, kind, document.clone());
            self.inner.persist(&job);
            self.inner.jobs.insert(job.id.clone(), job.clone());
            debug!(job_id = %job.id, printer_id = %printer_id, "Print job created");

            let inner = self.inner.clone();
            let pending = job.clone();
            let handle = self.inner.tracker.spawn(async move { inner.run_job(pending).await });
            started.push((job, handle));
        }
        drop(closing);
        Ok(started)
    }

    async fn fan_out(
        &self,
        targets: Vec<String>,
        document: PrintDocument,
        kind: JobKind,
    ) -> FleetResult<BTreeMap<String, PrintJob>> {
        let started = self.dispatch(targets, document, kind)?;
        let (jobs, handles): (Vec<_>, Vec<_>) = started.into_iter().unzip();

        let results = futures::future::join_all(handles).await;

        let mut outcomes = BTreeMap::new();
        for (mut job, result) in jobs.into_iter().zip(results) {
            let finished = match result {
                Ok(finished) => finished,
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Print task failed");
                    let err = FleetError::Internal(e.to_string());
                    if job.fail(err.code(), err.to_string()) && self.inner.persist(&job) {
                        self.inner.jobs.remove(&job.id);
                    }
                    job
                }
            };
            outcomes.insert(finished.printer_id.clone(), finished);
        }
        Ok(outcomes)
    }
}

impl Inner {
    async fn run_job(self: Arc<Self>, job: PrintJob) -> PrintJob {
        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => Err(FleetError::ShutdownInProgress),
            result = self.deliver(&job.printer_id, &job.content) => result,
        };
        self.finish(job, outcome)
    }

    async fn deliver(&self, printer_id: &str, document: &PrintDocument) -> FleetResult<TextEncoding> {
        let conn = self
            .registry
            .get(printer_id)
            .ok_or_else(|| FleetError::PrinterNotFound(printer_id.to_string()))?;

        if conn.state() != HealthState::Online {
            let state = conn.probe(self.probe_timeout).await;
            if state != HealthState::Online {
                return Err(FleetError::PrinterUnreachable {
                    printer_id: printer_id.to_string(),
                    state,
                });
            }
        }

        match self
            .renderer
            .render_and_deliver(document, &conn.capabilities(), conn.as_ref())
            .await
        {
            Ok(delivered) => {
                conn.mark_online();
                Ok(delivered.encoding)
            }
            Err(e) => {
                conn.mark_error(&e.to_string());
                Err(e)
            }
        }
    }

    /// Apply the outcome unless the job is already terminal, then persist
    fn finish(&self, pending: PrintJob, outcome: FleetResult<TextEncoding>) -> PrintJob {
        let job_id = pending.id.clone();

        let job = {
            let Some(mut entry) = self.jobs.get_mut(&job_id) else {
                return pending;
            };
            let changed = match &outcome {
                Ok(encoding) => entry.succeed(*encoding),
                Err(e) => entry.fail(e.code(), e.to_string()),
            };
            if changed {
                match &outcome {
                    Ok(encoding) => {
                        info!(job_id = %job_id, printer_id = %entry.printer_id, tier = %encoding, "Print job succeeded")
                    }
                    Err(e) => {
                        warn!(job_id = %job_id, printer_id = %entry.printer_id, error = %e, "Print job failed")
                    }
                }
            }
            entry.clone()
        };

        if self.persist(&job) {
            self.jobs.remove(&job_id);
        }
        job
    }

    fn persist(&self, job: &PrintJob) -> bool {
        match self.job_store.save_job(job) {
            Ok(()) => true,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Failed to persist print job");
                false
            }
        }
    }
}
