//! Fleet registry
//!
//! Owns exactly one [`PrinterConnection`] per printer id. The map is an
//! immutable `Arc<HashMap>` swapped under a write lock, so readers take a
//! cheap snapshot and never observe a half-applied refresh.

use crate::connection::PrinterConnection;
use crate::error::{FleetError, FleetResult};
use crate::storage::PrinterStatusStore;
use crate::transport::{self, PrinterFactory};
use crate::types::{HealthState, PrinterDescriptor, PrinterType};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

type ConnectionMap = HashMap<String, Arc<PrinterConnection>>;

/// What a refresh changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub added: Vec<String>,
    /// Connection parameters changed; a new connection replaced the old one
    pub replaced: Vec<String>,
    /// Only non-connection fields changed; health kept
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: usize,
    /// (printer id, reason) for descriptors that failed transport resolution
    pub rejected: Vec<(String, String)>,
}

impl RefreshReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.replaced.is_empty()
            && self.updated.is_empty()
            && self.removed.is_empty()
    }
}

pub struct FleetRegistry {
    connections: RwLock<Arc<ConnectionMap>>,
    factory: Arc<dyn PrinterFactory>,
    status_store: Arc<dyn PrinterStatusStore>,
    send_timeout: Duration,
}

impl FleetRegistry {
    pub fn new(
        factory: Arc<dyn PrinterFactory>,
        status_store: Arc<dyn PrinterStatusStore>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            connections: RwLock::new(Arc::new(HashMap::new())),
            factory,
            status_store,
            send_timeout,
        }
    }

    fn connect(&self, descriptor: &PrinterDescriptor) -> FleetResult<Arc<PrinterConnection>> {
        let target = transport::resolve(descriptor)?;
        let printer = self.factory.open(&target);
        Ok(Arc::new(PrinterConnection::new(
            descriptor.clone(),
            target,
            printer,
            self.status_store.clone(),
            self.send_timeout,
        )))
    }

    /// Add or update a single printer
    ///
    /// A descriptor resolving to the same target keeps its connection and
    /// health; a different target replaces the connection.
    pub fn register(&self, descriptor: PrinterDescriptor) -> FleetResult<Arc<PrinterConnection>> {
        if !descriptor.is_active {
            return Err(FleetError::PrinterInactive(descriptor.id));
        }
        let target = transport::resolve(&descriptor)?;

        let mut guard = self.connections.write();
        if let Some(existing) = guard.get(&descriptor.id)
            && existing.target() == &target
        {
            existing.update_descriptor(descriptor);
            return Ok(existing.clone());
        }

        let conn = self.connect(&descriptor)?;
        let mut next = (**guard).clone();
        if let Some(old) = next.insert(descriptor.id.clone(), conn.clone()) {
            old.retire();
            info!(printer_id = %descriptor.id, target = %conn.target(), "Printer connection replaced");
        } else {
            info!(printer_id = %descriptor.id, target = %conn.target(), "Printer registered");
        }
        *guard = Arc::new(next);
        Ok(conn)
    }

    /// Drop a printer from the fleet; its connection stops probing
    pub fn remove(&self, printer_id: &str) -> Option<Arc<PrinterConnection>> {
        let mut guard = self.connections.write();
        if !guard.contains_key(printer_id) {
            return None;
        }
        let mut next = (**guard).clone();
        let removed = next.remove(printer_id);
        *guard = Arc::new(next);
        drop(guard);

        if let Some(conn) = &removed {
            conn.retire();
            info!(printer_id = %printer_id, "Printer removed");
        }
        removed
    }

    /// Reconcile the fleet with the full current descriptor list
    pub fn refresh_from_store(&self, descriptors: &[PrinterDescriptor]) -> RefreshReport {
        let mut report = RefreshReport::default();

        let mut guard = self.connections.write();
        let current = guard.clone();
        let mut next: ConnectionMap = HashMap::with_capacity(descriptors.len());
        // Applied once the new map is in place
        let mut updates = Vec::new();

        for descriptor in descriptors.iter().filter(|d| d.is_active) {
            if next.contains_key(&descriptor.id) {
                warn!(printer_id = %descriptor.id, "Duplicate printer id in descriptor list, keeping first");
                continue;
            }

            let target = match transport::resolve(descriptor) {
                Ok(target) => target,
                Err(e) => {
                    warn!(printer_id = %descriptor.id, error = %e, "Printer descriptor rejected");
                    report.rejected.push((descriptor.id.clone(), e.to_string()));
                    continue;
                }
            };

            match current.get(&descriptor.id) {
                Some(existing) if existing.target() == &target => {
                    if existing.descriptor() != *descriptor {
                        updates.push((existing.clone(), descriptor.clone()));
                        report.updated.push(descriptor.id.clone());
                    } else {
                        report.unchanged += 1;
                    }
                    next.insert(descriptor.id.clone(), existing.clone());
                }
                existing => {
                    let printer = self.factory.open(&target);
                    let conn = Arc::new(PrinterConnection::new(
                        descriptor.clone(),
                        target,
                        printer,
                        self.status_store.clone(),
                        self.send_timeout,
                    ));
                    if existing.is_some() {
                        report.replaced.push(descriptor.id.clone());
                    } else {
                        report.added.push(descriptor.id.clone());
                    }
                    next.insert(descriptor.id.clone(), conn);
                }
            }
        }

        for (id, conn) in current.iter() {
            let kept = next.get(id).is_some_and(|c| Arc::ptr_eq(c, conn));
            if !kept {
                conn.retire();
                if !next.contains_key(id) {
                    report.removed.push(id.clone());
                }
            }
        }

        *guard = Arc::new(next);
        for (conn, descriptor) in updates {
            conn.update_descriptor(descriptor);
        }
        drop(guard);

        report.added.sort();
        report.replaced.sort();
        report.updated.sort();
        report.removed.sort();

        if report.is_noop() && report.rejected.is_empty() {
            tracing::debug!(unchanged = report.unchanged, "Fleet refresh: no changes");
        } else {
            info!(
                added = report.added.len(),
                replaced = report.replaced.len(),
                updated = report.updated.len(),
                removed = report.removed.len(),
                rejected = report.rejected.len(),
                "Fleet refreshed"
            );
        }
        report
    }

    pub fn get(&self, printer_id: &str) -> Option<Arc<PrinterConnection>> {
        self.connections.read().get(printer_id).cloned()
    }

    /// Connections of one printer type, ordered by id
    pub fn by_type(&self, printer_type: PrinterType) -> Vec<Arc<PrinterConnection>> {
        let mut list: Vec<_> = self
            .snapshot()
            .values()
            .filter(|c| c.printer_type() == printer_type)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.id().cmp(b.id()));
        list
    }

    /// Every connection currently `Online`, ordered by id
    pub fn all_connected(&self) -> Vec<Arc<PrinterConnection>> {
        let mut list: Vec<_> = self
            .snapshot()
            .values()
            .filter(|c| c.state() == HealthState::Online)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.id().cmp(b.id()));
        list
    }

    /// Consistent view of the whole fleet
    pub fn snapshot(&self) -> Arc<ConnectionMap> {
        self.connections.read().clone()
    }

    /// Printer ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.snapshot().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockFactory, MockPrinter, RecordingStatusStore};

    fn registry() -> (FleetRegistry, Arc<MockFactory>) {
        let factory = Arc::new(MockFactory::default());
        let registry = FleetRegistry::new(
            factory.clone(),
            Arc::new(RecordingStatusStore::default()),
            Duration::from_secs(1),
        );
        (registry, factory)
    }

    fn fleet() -> Vec<PrinterDescriptor> {
        vec![
            PrinterDescriptor::network("kitchen-1", PrinterType::Kitchen, "10.0.0.5", 9100),
            PrinterDescriptor::network("kitchen-2", PrinterType::Kitchen, "10.0.0.6", 9100),
            PrinterDescriptor::usb("receipt-1", PrinterType::Receipt, "/dev/usb/lp0"),
        ]
    }

    #[test]
    fn test_register_and_lookup() {
        let (registry, _) = registry();
        registry
            .register(PrinterDescriptor::network("bar", PrinterType::Bar, "10.0.0.7", 9100))
            .unwrap();

        assert!(registry.get("bar").is_some());
        assert!(registry.get("nope").is_none());
        assert_eq!(registry.by_type(PrinterType::Bar).len(), 1);
        assert!(registry.by_type(PrinterType::Kitchen).is_empty());
    }

    #[test]
    fn test_register_rejects_inactive_and_invalid() {
        let (registry, _) = registry();

        let mut d = PrinterDescriptor::network("p1", PrinterType::Bar, "10.0.0.7", 9100);
        d.is_active = false;
        assert!(matches!(
            registry.register(d),
            Err(FleetError::PrinterInactive(_))
        ));

        let d = PrinterDescriptor::usb("p2", PrinterType::Label, "");
        assert!(matches!(
            registry.register(d),
            Err(FleetError::InvalidTransportConfig { .. })
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_register_same_target_keeps_connection() {
        let (registry, _) = registry();
        let d = PrinterDescriptor::network("p1", PrinterType::Bar, "10.0.0.7", 9100);
        let first = registry.register(d.clone()).unwrap();

        let renamed = PrinterDescriptor {
            name: "Barra".into(),
            ..d.clone()
        };
        let second = registry.register(renamed).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.descriptor().name, "Barra");

        let moved = PrinterDescriptor::network("p1", PrinterType::Bar, "10.0.0.8", 9100);
        let third = registry.register(moved).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert!(first.is_retired());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_refresh_is_idempotent() {
        let (registry, factory) = registry();

        let report = registry.refresh_from_store(&fleet());
        assert_eq!(report.added, vec!["kitchen-1", "kitchen-2", "receipt-1"]);
        let before = registry.snapshot();

        let report = registry.refresh_from_store(&fleet());
        assert!(report.is_noop());
        assert_eq!(report.unchanged, 3);

        let after = registry.snapshot();
        for (id, conn) in before.iter() {
            assert!(Arc::ptr_eq(conn, &after[id]), "{id} was replaced");
        }
        assert_eq!(factory.opened(), 3);
    }

    #[tokio::test]
    async fn test_refresh_diff() {
        let (registry, factory) = registry();
        factory.network("10.0.0.5", 9100, MockPrinter::online());
        registry.refresh_from_store(&fleet());

        let kitchen = registry.get("kitchen-1").unwrap();
        kitchen.probe(Duration::from_millis(100)).await;
        let receipt = registry.get("receipt-1").unwrap();

        let mut next = fleet();
        next[0].width = 32; // kitchen-1: non-connection change
        next[1].host = Some("10.0.0.16".into()); // kitchen-2: moved
        next.remove(2); // receipt-1: gone
        next.push(PrinterDescriptor::bluetooth("label-1", PrinterType::Label, "AA:BB:CC:DD:EE:FF"));
        next.push(PrinterDescriptor::network("broken", PrinterType::Bar, "", 9100));

        let report = registry.refresh_from_store(&next);
        assert_eq!(report.added, vec!["label-1"]);
        assert_eq!(report.replaced, vec!["kitchen-2"]);
        assert_eq!(report.updated, vec!["kitchen-1"]);
        assert_eq!(report.removed, vec!["receipt-1"]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0, "broken");

        let kitchen_after = registry.get("kitchen-1").unwrap();
        assert!(Arc::ptr_eq(&kitchen, &kitchen_after));
        assert_eq!(kitchen_after.state(), HealthState::Online);
        assert_eq!(kitchen_after.capabilities().width, 32);

        assert!(registry.get("receipt-1").is_none());
        assert!(receipt.is_retired());
        assert_eq!(registry.ids(), vec!["kitchen-1", "kitchen-2", "label-1"]);
    }

    #[test]
    fn test_refresh_updates_land_with_the_new_map() {
        let (registry, factory) = registry();
        registry.refresh_from_store(&fleet());
        let kitchen = registry.get("kitchen-1").unwrap();
        let width_before = kitchen.capabilities().width;

        // Widths seen while the refresh is still building its map
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let (watched, log) = (kitchen.clone(), seen.clone());
        factory.on_open(move |_| log.lock().push(watched.capabilities().width));

        let mut next = fleet();
        next[0].width = 32;
        next.remove(2);
        next.push(PrinterDescriptor::network("bar-1", PrinterType::Bar, "10.0.0.9", 9100));
        let report = registry.refresh_from_store(&next);

        assert_eq!(report.updated, vec!["kitchen-1"]);
        assert_eq!(report.removed, vec!["receipt-1"]);
        assert_eq!(*seen.lock(), vec![width_before]);
        assert_eq!(kitchen.capabilities().width, 32);
        assert!(registry.get("receipt-1").is_none());
    }

    #[test]
    fn test_refresh_treats_inactive_as_absent() {
        let (registry, _) = registry();
        registry.refresh_from_store(&fleet());

        let mut next = fleet();
        next[2].is_active = false;
        let report = registry.refresh_from_store(&next);

        assert_eq!(report.removed, vec!["receipt-1"]);
        assert!(registry.get("receipt-1").is_none());
    }

    #[test]
    fn test_remove() {
        let (registry, _) = registry();
        registry.refresh_from_store(&fleet());

        let conn = registry.remove("kitchen-2").unwrap();
        assert!(conn.is_retired());
        assert!(registry.remove("kitchen-2").is_none());
        assert_eq!(registry.by_type(PrinterType::Kitchen).len(), 1);
    }

    #[tokio::test]
    async fn test_all_connected_only_online() {
        let (registry, factory) = registry();
        factory.network("10.0.0.5", 9100, MockPrinter::online());
        factory.network("10.0.0.6", 9100, MockPrinter::refusing());
        registry.refresh_from_store(&fleet());

        for conn in registry.snapshot().values() {
            conn.probe(Duration::from_millis(100)).await;
        }

        let connected: Vec<_> = registry
            .all_connected()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        assert_eq!(connected, vec!["kitchen-1", "receipt-1"]);
    }
}
