//! Scripted printers and stores for unit tests

use crate::storage::{PrintStorageError, PrintStorageResult, PrinterStatusRecord, PrinterStatusStore};
use crate::transport::PrinterFactory;
use async_trait::async_trait;
use crab_printer::{PrintError, PrintResult, PrintTarget, Printer, TextEncoding};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeBehavior {
    Ok,
    /// Connection refused (clean failure)
    Refused,
    /// Unexpected fault
    Fault,
    /// Never answers
    Hang,
}

/// In-memory printer whose probe and print results are scripted
#[derive(Debug)]
pub struct MockPrinter {
    probe: Mutex<ProbeBehavior>,
    /// Encodings the device prints correctly; `None` accepts everything
    accepts: Mutex<Option<Vec<TextEncoding>>>,
    print_delay: Option<Duration>,
    sent: Mutex<Vec<Vec<u8>>>,
    probes: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockPrinter {
    pub fn online() -> Self {
        Self {
            probe: Mutex::new(ProbeBehavior::Ok),
            accepts: Mutex::new(None),
            print_delay: None,
            sent: Mutex::new(Vec::new()),
            probes: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn refusing() -> Self {
        let p = Self::online();
        p.set_probe(ProbeBehavior::Refused);
        p
    }

    pub fn with_print_delay(mut self, delay: Duration) -> Self {
        self.print_delay = Some(delay);
        self
    }

    pub fn accepting(self, encodings: &[TextEncoding]) -> Self {
        *self.accepts.lock() = Some(encodings.to_vec());
        self
    }

    pub fn set_probe(&self, behavior: ProbeBehavior) {
        *self.probe.lock() = behavior;
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Payloads that were accepted
    pub fn printed(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    /// Most prints ever running at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn encoding_of(data: &[u8]) -> Option<TextEncoding> {
        let body = data.strip_prefix(&[0x1B, 0x40])?;
        TextEncoding::FALLBACK_ORDER
            .into_iter()
            .find(|e| body.starts_with(e.code_page_command()))
    }

    async fn accept(&self, data: &[u8]) -> PrintResult<()> {
        if let Some(delay) = self.print_delay {
            tokio::time::sleep(delay).await;
        }

        let accepted = match &*self.accepts.lock() {
            None => true,
            Some(list) => Self::encoding_of(data).is_some_and(|e| list.contains(&e)),
        };
        if !accepted {
            return Err(PrintError::Rejected("unsupported code page".into()));
        }

        self.sent.lock().push(data.to_vec());
        Ok(())
    }
}

#[async_trait]
impl Printer for MockPrinter {
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let result = self.accept(data).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn probe(&self) -> PrintResult<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.probe.lock();
        match behavior {
            ProbeBehavior::Ok => Ok(()),
            ProbeBehavior::Refused => Err(PrintError::Connection("connection refused".into())),
            ProbeBehavior::Fault => Err(PrintError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "printer reported paper jam",
            ))),
            ProbeBehavior::Hang => std::future::pending().await,
        }
    }
}

type OpenHook = Box<dyn Fn(&PrintTarget) + Send + Sync>;

/// Hands out scripted printers by target; unknown targets get an online mock
#[derive(Default)]
pub struct MockFactory {
    printers: Mutex<HashMap<PrintTarget, Arc<MockPrinter>>>,
    opened: AtomicUsize,
    on_open: Mutex<Option<OpenHook>>,
}

impl MockFactory {
    pub fn insert(&self, target: PrintTarget, printer: Arc<MockPrinter>) {
        self.printers.lock().insert(target, printer);
    }

    pub fn network(&self, host: &str, port: u16, printer: MockPrinter) -> Arc<MockPrinter> {
        let printer = Arc::new(printer);
        self.insert(
            PrintTarget::Network {
                host: host.to_string(),
                port,
            },
            printer.clone(),
        );
        printer
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Run `hook` whenever a transport is opened
    pub fn on_open(&self, hook: impl Fn(&PrintTarget) + Send + Sync + 'static) {
        *self.on_open.lock() = Some(Box::new(hook));
    }
}

impl PrinterFactory for MockFactory {
    fn open(&self, target: &PrintTarget) -> Arc<dyn Printer> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &*self.on_open.lock() {
            hook(target);
        }
        self.printers
            .lock()
            .entry(target.clone())
            .or_insert_with(|| Arc::new(MockPrinter::online()))
            .clone()
    }
}

/// Status store that records every write
#[derive(Default)]
pub struct RecordingStatusStore {
    records: Mutex<Vec<PrinterStatusRecord>>,
    fail: bool,
    /// Held inside the first write before it is recorded
    first_write_delay: Option<Duration>,
    started: AtomicUsize,
}

impl RecordingStatusStore {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_first_write_delay(mut self, delay: Duration) -> Self {
        self.first_write_delay = Some(delay);
        self
    }

    pub fn records(&self) -> Vec<PrinterStatusRecord> {
        self.records.lock().clone()
    }

    /// Writes that have entered the store, finished or not
    pub fn writes_started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

impl PrinterStatusStore for RecordingStatusStore {
    fn save_status(&self, record: &PrinterStatusRecord) -> PrintStorageResult<()> {
        let n = self.started.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PrintStorageError::Unavailable("disk full".into()));
        }
        if n == 0
            && let Some(delay) = self.first_write_delay
        {
            std::thread::sleep(delay);
        }
        self.records.lock().push(record.clone());
        Ok(())
    }
}
