//! Transport resolution
//!
//! Turns a descriptor's transport kind and address fields into a canonical
//! [`PrintTarget`], and opens printer adapters for targets.

use crate::config::FleetConfig;
use crate::error::{FleetError, FleetResult};
use crate::types::{PrinterDescriptor, TransportKind};
use crab_printer::{
    BluetoothPrinter, DEFAULT_NETWORK_PORT, DevicePrinter, NetworkPrinter, PrintTarget, Printer,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default RFCOMM channel for serial port profile printers
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// Default bound RFCOMM node
pub const DEFAULT_RFCOMM_DEVICE: &str = "/dev/rfcomm0";

/// Resolve a descriptor to its connection target
///
/// Pure: no I/O, no retries.
pub fn resolve(descriptor: &PrinterDescriptor) -> FleetResult<PrintTarget> {
    let invalid = |reason: &str| FleetError::InvalidTransportConfig {
        printer_id: descriptor.id.clone(),
        reason: reason.to_string(),
    };

    match descriptor.transport {
        TransportKind::Network => {
            let host = non_empty(&descriptor.host).ok_or_else(|| invalid("network printer without host"))?;

            // "host:port" in the host field is accepted when no port is given
            let (host, port) = match (host.rsplit_once(':'), descriptor.port) {
                (Some((h, p)), None) if !h.is_empty() && !h.contains(':') => {
                    let port = p
                        .parse::<u16>()
                        .map_err(|_| invalid(&format!("invalid port in host '{}'", host)))?;
                    (h.to_string(), port)
                }
                _ => (host.to_string(), descriptor.port.unwrap_or(DEFAULT_NETWORK_PORT)),
            };

            if port == 0 {
                return Err(invalid("network port must be non-zero"));
            }
            Ok(PrintTarget::Network { host, port })
        }
        TransportKind::Usb => {
            let path = non_empty(&descriptor.device_path)
                .ok_or_else(|| invalid("usb printer without device path"))?;
            Ok(PrintTarget::Usb {
                path: PathBuf::from(path),
            })
        }
        TransportKind::Bluetooth => {
            let mac = non_empty(&descriptor.mac)
                .ok_or_else(|| invalid("bluetooth printer without MAC address"))?;
            let mac = normalize_mac(mac)
                .ok_or_else(|| invalid(&format!("malformed MAC address '{}'", mac)))?;
            let channel = descriptor.channel.unwrap_or(DEFAULT_RFCOMM_CHANNEL);
            if !(1..=30).contains(&channel) {
                return Err(invalid(&format!("RFCOMM channel {} out of range", channel)));
            }
            let path = non_empty(&descriptor.device_path).unwrap_or(DEFAULT_RFCOMM_DEVICE);
            Ok(PrintTarget::Bluetooth {
                mac,
                channel,
                path: PathBuf::from(path),
            })
        }
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Upper-case `XX:XX:XX:XX:XX:XX`; accepts '-' separators
fn normalize_mac(mac: &str) -> Option<String> {
    let octets: Vec<&str> = mac.split([':', '-']).collect();
    if octets.len() != 6
        || !octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()))
    {
        return None;
    }
    Some(octets.join(":").to_ascii_uppercase())
}

/// Opens printer adapters for resolved targets
pub trait PrinterFactory: Send + Sync {
    fn open(&self, target: &PrintTarget) -> Arc<dyn Printer>;
}

/// Factory for real devices
#[derive(Debug, Clone)]
pub struct DeviceFactory {
    connect_timeout: Duration,
    probe_timeout: Duration,
}

impl DeviceFactory {
    pub fn new(config: &FleetConfig) -> Self {
        Self {
            connect_timeout: config.send_timeout(),
            probe_timeout: config.probe_timeout(),
        }
    }
}

impl Default for DeviceFactory {
    fn default() -> Self {
        Self::new(&FleetConfig::default())
    }
}

impl PrinterFactory for DeviceFactory {
    fn open(&self, target: &PrintTarget) -> Arc<dyn Printer> {
        match target {
            PrintTarget::Network { host, port } => Arc::new(
                NetworkPrinter::new(host, *port)
                    .with_timeout(self.connect_timeout)
                    .with_probe_timeout(self.probe_timeout),
            ),
            PrintTarget::Usb { path } => Arc::new(DevicePrinter::new(path)),
            PrintTarget::Bluetooth { mac, channel, path } => {
                Arc::new(BluetoothPrinter::new(mac, *channel, path))
            }
        }
    }
}
