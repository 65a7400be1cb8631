//! Printer adapters for sending ESC/POS data
//!
//! Supports:
//! - Network printers (TCP port 9100)
//! - USB printers exposed as a device node (e.g. `/dev/usb/lp0`)
//! - Bluetooth printers bound to an RFCOMM serial node (e.g. `/dev/rfcomm0`)

use crate::error::{PrintError, PrintResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument, warn};

/// Default raw TCP port
pub const DEFAULT_NETWORK_PORT: u16 = 9100;

/// Trait for printer adapters
#[async_trait]
pub trait Printer: Send + Sync + fmt::Debug {
    /// Send raw ESC/POS data to the printer
    async fn print(&self, data: &[u8]) -> PrintResult<()>;

    /// Lightweight reachability check, distinct from an actual print
    ///
    /// `Err` values for which [`PrintError::is_unreachable`] holds mean the
    /// device is cleanly not there; any other error is a fault.
    async fn probe(&self) -> PrintResult<()>;

    /// Check if the printer is online/reachable
    async fn is_online(&self) -> bool {
        self.probe().await.is_ok()
    }
}

/// Canonical connection target of a physical printer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrintTarget {
    Network { host: String, port: u16 },
    Usb { path: PathBuf },
    Bluetooth { mac: String, channel: u8, path: PathBuf },
}

impl fmt::Display for PrintTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrintTarget::Network { host, port } => write!(f, "tcp://{}:{}", host, port),
            PrintTarget::Usb { path } => write!(f, "usb:{}", path.display()),
            PrintTarget::Bluetooth { mac, channel, .. } => write!(f, "bt://{}#{}", mac, channel),
        }
    }
}

/// Network printer (TCP port 9100)
///
/// Most thermal printers support raw TCP printing on port 9100.
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    addr: String,
    timeout: Duration,
    probe_timeout: Duration,
}

impl NetworkPrinter {
    /// Create a new network printer
    ///
    /// The host may be an IP address or a resolvable name.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{}:{}", host, port),
            timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_millis(500),
        }
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set probe timeout
    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Get the printer address
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn connect(&self, timeout: Duration) -> PrintResult<TcpStream> {
        tokio::time::timeout(timeout, TcpStream::connect(self.addr.as_str()))
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", self.addr)))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", self.addr, e)))
    }
}

#[async_trait]
impl Printer for NetworkPrinter {
    #[instrument(skip(self, data), fields(addr = %self.addr, data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        info!("Connecting to printer");

        let mut stream = self.connect(self.timeout).await?;

        info!("Connected, sending {} bytes", data.len());

        stream.write_all(data).await.map_err(|e| {
            PrintError::Io(std::io::Error::new(
                e.kind(),
                format!("Write failed: {}", e),
            ))
        })?;

        stream.flush().await?;
        stream.shutdown().await?;

        info!("Print job sent successfully");
        Ok(())
    }

    #[instrument(skip(self), fields(addr = %self.addr))]
    async fn probe(&self) -> PrintResult<()> {
        match self.connect(self.probe_timeout).await {
            Ok(_) => {
                debug!("Printer online");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Printer offline");
                Err(e)
            }
        }
    }
}

/// Printer exposed as a writable character device (USB line printer class)
#[derive(Debug, Clone)]
pub struct DevicePrinter {
    path: PathBuf,
}

impl DevicePrinter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the device path
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> PrintResult<tokio::fs::File> {
        tokio::fs::OpenOptions::new()
            .write(true)
            .open(&self.path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    PrintError::Offline(format!("{}: device not present", self.path.display()))
                }
                _ => PrintError::Io(e),
            })
    }
}

#[async_trait]
impl Printer for DevicePrinter {
    #[instrument(skip(self, data), fields(path = %self.path.display(), data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let mut device = self.open().await?;

        device.write_all(data).await.map_err(|e| {
            PrintError::Io(std::io::Error::new(
                e.kind(),
                format!("Write failed: {}", e),
            ))
        })?;
        device.flush().await?;

        info!("Print job sent successfully");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn probe(&self) -> PrintResult<()> {
        // Opening for write is what a print needs; a missing node means unplugged
        self.open().await.map(|_| ())
    }
}

/// Bluetooth SPP printer bound to an RFCOMM serial node
///
/// The radio link is established by the OS (`rfcomm bind <dev> <mac> <channel>`);
/// this adapter writes to the bound node.
#[derive(Debug, Clone)]
pub struct BluetoothPrinter {
    mac: String,
    channel: u8,
    device: DevicePrinter,
}

impl BluetoothPrinter {
    pub fn new(mac: &str, channel: u8, path: impl AsRef<Path>) -> Self {
        Self {
            mac: mac.to_string(),
            channel,
            device: DevicePrinter::new(path),
        }
    }

    /// Get the radio address
    pub fn mac(&self) -> &str {
        &self.mac
    }

    /// Get the RFCOMM channel
    pub fn channel(&self) -> u8 {
        self.channel
    }
}

#[async_trait]
impl Printer for BluetoothPrinter {
    #[instrument(skip(self, data), fields(mac = %self.mac, data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        self.device.print(data).await
    }

    #[instrument(skip(self), fields(mac = %self.mac))]
    async fn probe(&self) -> PrintResult<()> {
        self.device.probe().await
    }
}
