//! Print manager
//!
//! Explicitly constructed entry point tying the registry, health monitor and
//! job dispatcher together, with a start/stop lifecycle.

use crate::config::FleetConfig;
use crate::connection::HealthSnapshot;
use crate::dispatcher::JobDispatcher;
use crate::error::{FleetError, FleetResult};
use crate::monitor::HealthMonitor;
use crate::registry::{FleetRegistry, RefreshReport};
use crate::storage::{PrintJobStore, PrintStore, PrinterStatusStore};
use crate::transport::PrinterFactory;
use crate::types::{
    DocumentLine, HealthState, JobKind, PrintDocument, PrintJob, PrinterDescriptor, PrinterType,
    SubmittedJob, TargetSelector,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

struct MonitorHandle {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct PrintManager {
    config: FleetConfig,
    registry: Arc<FleetRegistry>,
    dispatcher: JobDispatcher,
    monitor: Mutex<Option<MonitorHandle>>,
    shutdown_token: CancellationToken,
}

impl PrintManager {
    pub fn new(
        config: FleetConfig,
        factory: Arc<dyn PrinterFactory>,
        status_store: Arc<dyn PrinterStatusStore>,
        job_store: Arc<dyn PrintJobStore>,
    ) -> Self {
        let registry = Arc::new(FleetRegistry::new(factory, status_store, config.send_timeout()));
        let dispatcher = JobDispatcher::new(registry.clone(), job_store, config.probe_timeout());
        Self {
            config,
            registry,
            dispatcher,
            monitor: Mutex::new(None),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Manager backed by one redb store for both status and jobs
    pub fn with_store(
        config: FleetConfig,
        factory: Arc<dyn PrinterFactory>,
        store: Arc<PrintStore>,
    ) -> Self {
        Self::new(config, factory, store.clone(), store)
    }

    pub fn config(&self) -> &FleetConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<FleetRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &JobDispatcher {
        &self.dispatcher
    }

    /// Token cancelled once the manager has shut down
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    // ========== Lifecycle ==========

    /// Start the health monitor (no-op when already running)
    pub fn start(&self) {
        let mut monitor = self.monitor.lock();
        if monitor.as_ref().is_some_and(|m| !m.handle.is_finished()) {
            return;
        }

        let cancel = self.shutdown_token.child_token();
        let task = HealthMonitor::new(self.registry.clone(), &self.config).run(cancel.clone());
        *monitor = Some(MonitorHandle {
            cancel,
            handle: tokio::spawn(task),
        });
        info!(printers = self.registry.len(), "Print manager started");
    }

    /// Stop the health monitor; queued and in-flight jobs are unaffected
    pub async fn stop_monitor(&self) {
        let Some(MonitorHandle { cancel, handle }) = self.monitor.lock().take() else {
            return;
        };
        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "Health monitor task ended abnormally");
        }
    }

    pub fn is_monitor_running(&self) -> bool {
        self.monitor
            .lock()
            .as_ref()
            .is_some_and(|m| !m.handle.is_finished())
    }

    /// Reject new jobs, stop the monitor, drain jobs within the grace period
    ///
    /// Returns how many jobs were force-failed.
    pub async fn shutdown(&self) -> usize {
        info!("Print manager shutting down");
        self.stop_monitor().await;
        let failed = self.dispatcher.shutdown(self.config.shutdown_grace()).await;
        self.shutdown_token.cancel();
        info!(force_failed = failed, "Print manager stopped");
        failed
    }

    // ========== Fleet ==========

    pub fn register(&self, descriptor: PrinterDescriptor) -> FleetResult<()> {
        self.registry.register(descriptor).map(|_| ())
    }

    pub fn remove(&self, printer_id: &str) -> bool {
        self.registry.remove(printer_id).is_some()
    }

    pub fn refresh_from_store(&self, descriptors: &[PrinterDescriptor]) -> RefreshReport {
        self.registry.refresh_from_store(descriptors)
    }

    pub fn health(&self, printer_id: &str) -> FleetResult<HealthState> {
        self.registry
            .get(printer_id)
            .map(|c| c.state())
            .ok_or_else(|| FleetError::PrinterNotFound(printer_id.to_string()))
    }

    pub fn health_details(&self, printer_id: &str) -> FleetResult<HealthSnapshot> {
        self.registry
            .get(printer_id)
            .map(|c| c.health())
            .ok_or_else(|| FleetError::PrinterNotFound(printer_id.to_string()))
    }

    /// Descriptors of every printer currently online
    pub fn list_connected(&self) -> Vec<PrinterDescriptor> {
        self.registry
            .all_connected()
            .iter()
            .map(|c| c.descriptor())
            .collect()
    }

    // ========== Jobs ==========

    pub fn submit(
        &self,
        selector: &TargetSelector,
        document: PrintDocument,
        kind: JobKind,
    ) -> FleetResult<Vec<SubmittedJob>> {
        self.dispatcher.submit(selector, document, kind)
    }

    pub async fn print_to(
        &self,
        printer_ids: &[String],
        document: PrintDocument,
        kind: JobKind,
    ) -> FleetResult<BTreeMap<String, PrintJob>> {
        self.dispatcher.print_to(printer_ids, document, kind).await
    }

    pub async fn print_to_type(
        &self,
        printer_type: PrinterType,
        document: PrintDocument,
        kind: JobKind,
    ) -> FleetResult<BTreeMap<String, PrintJob>> {
        self.dispatcher.print_to_type(printer_type, document, kind).await
    }

    pub async fn print_to_all(
        &self,
        document: PrintDocument,
        kind: JobKind,
    ) -> FleetResult<BTreeMap<String, PrintJob>> {
        self.dispatcher.print_to_all(document, kind).await
    }

    pub fn status(&self, job_id: &str) -> FleetResult<PrintJob> {
        self.dispatcher.status(job_id)
    }

    /// Print a page describing the printer itself
    pub fn print_test_page(&self, printer_id: &str) -> FleetResult<SubmittedJob> {
        let conn = self
            .registry
            .get(printer_id)
            .ok_or_else(|| FleetError::PrinterNotFound(printer_id.to_string()))?;
        let d = conn.descriptor();

        let document = PrintDocument::Lines(vec![
            DocumentLine::title("TEST PAGE"),
            DocumentLine::Separator { double: true },
            DocumentLine::pair("Printer", &d.name),
            DocumentLine::pair("ID", &d.id),
            DocumentLine::pair("Type", d.printer_type.as_str()),
            DocumentLine::pair("Target", conn.target().to_string()),
            DocumentLine::pair("Width", d.width.to_string()),
            DocumentLine::Separator { double: false },
            DocumentLine::text("0123456789".repeat(d.width.div_ceil(10)).chars().take(d.width).collect::<String>()),
            DocumentLine::text("Ñandú café € £ ¥ ₹"),
            DocumentLine::Separator { double: false },
            DocumentLine::pair(
                "Printed",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
        ]);

        self.single(&TargetSelector::Printer(printer_id.to_string()), document, JobKind::TestPage)
    }

    /// Submit a previous job's content again to the same printer
    pub fn reprint(&self, job_id: &str) -> FleetResult<SubmittedJob> {
        let job = self.dispatcher.status(job_id)?;
        info!(job_id = %job_id, printer_id = %job.printer_id, "Reprinting job");
        self.single(&TargetSelector::Printer(job.printer_id), job.content, job.kind)
    }

    fn single(
        &self,
        selector: &TargetSelector,
        document: PrintDocument,
        kind: JobKind,
    ) -> FleetResult<SubmittedJob> {
        self.dispatcher
            .submit(selector, document, kind)?
            .into_iter()
            .next()
            .ok_or_else(|| FleetError::Internal("submission produced no job".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockFactory, MockPrinter, RecordingStatusStore};
    use crate::types::JobStatus;
    use std::time::Duration;

    fn manager(factory: Arc<MockFactory>) -> PrintManager {
        let config = FleetConfig {
            probe_interval_ms: 20,
            probe_timeout_ms: 50,
            shutdown_grace_ms: 200,
            ..FleetConfig::default()
        };
        let store = Arc::new(PrintStore::open_in_memory().unwrap());
        PrintManager::new(
            config,
            factory,
            Arc::new(RecordingStatusStore::default()),
            store,
        )
    }

    async fn wait(manager: &PrintManager, job_id: &str) -> PrintJob {
        for _ in 0..200 {
            let job = manager.status(job_id).unwrap();
            if job.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never finished");
    }

    #[tokio::test]
    async fn test_monitor_lifecycle() {
        let factory = Arc::new(MockFactory::default());
        factory.network("10.0.0.5", 9100, MockPrinter::online());
        let manager = manager(factory);
        manager
            .register(PrinterDescriptor::network("k1", PrinterType::Kitchen, "10.0.0.5", 9100))
            .unwrap();
        assert_eq!(manager.health("k1").unwrap(), HealthState::Unknown);

        manager.start();
        manager.start();
        assert!(manager.is_monitor_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.health("k1").unwrap(), HealthState::Online);
        assert_eq!(manager.list_connected().len(), 1);

        manager.stop_monitor().await;
        assert!(!manager.is_monitor_running());

        // Jobs still flow without the monitor
        let outcomes = manager
            .print_to(&["k1".into()], PrintDocument::Text("hola".into()), JobKind::Other)
            .await
            .unwrap();
        assert_eq!(outcomes["k1"].status, JobStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_removed_printer_is_gone() {
        let factory = Arc::new(MockFactory::default());
        let printer = factory.network("10.0.0.5", 9100, MockPrinter::online());
        let manager = manager(factory);
        manager
            .register(PrinterDescriptor::network("k1", PrinterType::Kitchen, "10.0.0.5", 9100))
            .unwrap();
        manager.start();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(manager.remove("k1"));
        tokio::time::sleep(Duration::from_millis(30)).await;
        let probes = printer.probe_count();

        assert!(matches!(manager.health("k1"), Err(FleetError::PrinterNotFound(_))));
        let submitted = manager
            .submit(
                &TargetSelector::Printer("k1".into()),
                PrintDocument::Text("x".into()),
                JobKind::Other,
            )
            .unwrap();
        let job = wait(&manager, &submitted[0].job_id).await;
        assert_eq!(job.error_code.as_deref(), Some("PRINTER_NOT_FOUND"));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(printer.probe_count(), probes);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_test_page_and_reprint() {
        let factory = Arc::new(MockFactory::default());
        let printer = factory.network("10.0.0.5", 9100, MockPrinter::online());
        let manager = manager(factory);
        manager
            .register(PrinterDescriptor::network("r1", PrinterType::Receipt, "10.0.0.5", 9100))
            .unwrap();

        let page = manager.print_test_page("r1").unwrap();
        let job = wait(&manager, &page.job_id).await;
        assert_eq!(job.kind, JobKind::TestPage);
        assert_eq!(job.status, JobStatus::Succeeded);
        assert!(String::from_utf8_lossy(&printer.printed()[0]).contains("tcp://10.0.0.5:9100"));

        let again = manager.reprint(&page.job_id).unwrap();
        assert_ne!(again.job_id, page.job_id);
        let job = wait(&manager, &again.job_id).await;
        assert_eq!(job.kind, JobKind::TestPage);
        assert_eq!(printer.printed().len(), 2);

        assert!(matches!(
            manager.print_test_page("nope"),
            Err(FleetError::PrinterNotFound(_))
        ));
        assert!(matches!(manager.reprint("nope"), Err(FleetError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let factory = Arc::new(MockFactory::default());
        let manager = manager(factory);
        manager.start();

        assert_eq!(manager.shutdown().await, 0);
        assert!(!manager.is_monitor_running());
        assert!(manager.shutdown_token().is_cancelled());
        assert!(matches!(
            manager.submit(&TargetSelector::All, PrintDocument::Text("x".into()), JobKind::Other),
            Err(FleetError::ShutdownInProgress)
        ));
    }
}
