//! Printer connection and health state machine

use crate::renderer::{DeliverySink, RenderCapabilities};
use crate::storage::{PrinterStatusRecord, PrinterStatusStore};
use crate::types::{HealthState, PrinterDescriptor, PrinterType};
use async_trait::async_trait;
use crab_printer::{PrintError, PrintResult, PrintTarget, Printer};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Point-in-time view of a connection's health
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSnapshot {
    pub state: HealthState,
    /// Millisecond timestamps
    pub last_checked: Option<i64>,
    pub last_online: Option<i64>,
    pub last_error: Option<String>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            state: HealthState::Unknown,
            last_checked: None,
            last_online: None,
            last_error: None,
        }
    }
}

/// Live link to one physical printer
///
/// Health is only ever changed through [`probe`](Self::probe),
/// [`mark_online`](Self::mark_online) and [`mark_error`](Self::mark_error),
/// none of which lead back to `Unknown`.
pub struct PrinterConnection {
    id: String,
    descriptor: RwLock<PrinterDescriptor>,
    target: PrintTarget,
    transport: Arc<dyn Printer>,
    health: RwLock<HealthSnapshot>,
    /// Held from a state change through its status write, so writes land in
    /// the order the changes were made
    persist_lock: Mutex<()>,
    /// One send in flight per device
    send_lock: tokio::sync::Mutex<()>,
    status_store: Arc<dyn PrinterStatusStore>,
    retired: AtomicBool,
    send_timeout: Duration,
}

impl std::fmt::Debug for PrinterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterConnection")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("state", &self.state())
            .field("retired", &self.is_retired())
            .finish()
    }
}

impl PrinterConnection {
    pub fn new(
        descriptor: PrinterDescriptor,
        target: PrintTarget,
        transport: Arc<dyn Printer>,
        status_store: Arc<dyn PrinterStatusStore>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            id: descriptor.id.clone(),
            descriptor: RwLock::new(descriptor),
            target,
            transport,
            health: RwLock::new(HealthSnapshot::default()),
            persist_lock: Mutex::new(()),
            send_lock: tokio::sync::Mutex::new(()),
            status_store,
            retired: AtomicBool::new(false),
            send_timeout,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &PrintTarget {
        &self.target
    }

    pub fn descriptor(&self) -> PrinterDescriptor {
        self.descriptor.read().clone()
    }

    pub fn printer_type(&self) -> PrinterType {
        self.descriptor.read().printer_type
    }

    pub fn capabilities(&self) -> RenderCapabilities {
        RenderCapabilities::from(&*self.descriptor.read())
    }

    pub fn state(&self) -> HealthState {
        self.health.read().state
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.read().clone()
    }

    /// Swap non-connection fields (name, width, flags, type); health is kept
    pub fn update_descriptor(&self, descriptor: PrinterDescriptor) {
        *self.descriptor.write() = descriptor;
    }

    /// Detach from the fleet: no more probes, no more status writes
    pub fn retire(&self) {
        if !self.retired.swap(true, Ordering::SeqCst) {
            debug!(printer_id = %self.id, "Connection retired");
        }
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Check reachability and update health
    ///
    /// A timeout counts as a clean failure. Retired connections are not probed.
    pub async fn probe(&self, timeout: Duration) -> HealthState {
        if self.is_retired() {
            return self.state();
        }

        match tokio::time::timeout(timeout, self.transport.probe()).await {
            Ok(Ok(())) => self.transition(HealthState::Online, None),
            Ok(Err(e)) if e.is_unreachable() => {
                self.transition(HealthState::Offline, Some(e.to_string()))
            }
            Ok(Err(e)) => self.transition(HealthState::Error, Some(e.to_string())),
            Err(_) => self.transition(
                HealthState::Offline,
                Some(format!("probe timed out after {}ms", timeout.as_millis())),
            ),
        }
    }

    /// Send raw bytes, serialized with other sends to this device
    pub async fn send(&self, data: &[u8]) -> PrintResult<()> {
        let _guard = self.send_lock.lock().await;

        tokio::time::timeout(self.send_timeout, self.transport.print(data))
            .await
            .map_err(|_| {
                PrintError::Timeout(format!(
                    "send to {} timed out after {}ms",
                    self.target,
                    self.send_timeout.as_millis()
                ))
            })?
    }

    /// Record a successful delivery
    pub fn mark_online(&self) -> HealthState {
        self.transition(HealthState::Online, None)
    }

    /// Record a delivery fault
    pub fn mark_error(&self, error: &str) -> HealthState {
        self.transition(HealthState::Error, Some(error.to_string()))
    }

    fn transition(&self, state: HealthState, error: Option<String>) -> HealthState {
        let _persist = self.persist_lock.lock();
        let now = chrono::Utc::now().timestamp_millis();

        let previous = {
            let mut health = self.health.write();
            let previous = health.state;
            health.state = state;
            health.last_checked = Some(now);
            if state == HealthState::Online {
                health.last_online = Some(now);
            }
            if error.is_some() {
                health.last_error = error.clone();
            }
            previous
        };

        if previous == state {
            return state;
        }

        match state {
            HealthState::Online => {
                info!(printer_id = %self.id, from = %previous, "Printer online")
            }
            _ => warn!(
                printer_id = %self.id,
                from = %previous,
                to = %state,
                error = error.as_deref().unwrap_or(""),
                "Printer health changed"
            ),
        }

        if !self.is_retired() {
            let record = PrinterStatusRecord {
                printer_id: self.id.clone(),
                status: state,
                updated_at: now,
                error,
            };
            if let Err(e) = self.status_store.save_status(&record) {
                warn!(printer_id = %self.id, error = %e, "Failed to persist printer status");
            }
        }

        state
    }
}

#[async_trait]
impl DeliverySink for PrinterConnection {
    async fn deliver(&self, data: &[u8]) -> PrintResult<()> {
        self.send(data).await
    }
}
