//! # crab-fleet
//!
//! Printer fleet connection and print-job manager.
//!
//! Keeps one live connection per configured printer, tracks each printer's
//! health in the background, and delivers print jobs with encoding fallback.
//! Low-level ESC/POS and device I/O live in `crab-printer`.
//!
//! # 模块结构
//!
//! ```text
//! crab-fleet/src/
//! ├── transport.rs    # 描述符 → 连接目标
//! ├── connection.rs   # 单台打印机连接 + 健康状态机
//! ├── monitor.rs      # 周期性健康检查
//! ├── renderer.rs     # 编码降级渲染 (UTF-8 → Windows-1252 → ASCII)
//! ├── dispatcher.rs   # 打印任务分发
//! ├── registry.rs     # 打印机注册表
//! ├── manager.rs      # 对外入口
//! ├── storage.rs      # redb 持久化
//! └── descriptors.rs  # 打印机配置文件
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use crab_fleet::{DeviceFactory, FleetConfig, PrintManager, PrintStore};
//!
//! let config = FleetConfig::from_env();
//! let store = Arc::new(PrintStore::open(config.database_path())?);
//! let factory = Arc::new(DeviceFactory::new(&config));
//! let manager = PrintManager::with_store(config, factory, store);
//!
//! manager.refresh_from_store(&descriptors);
//! manager.start();
//!
//! let jobs = manager.submit(
//!     &TargetSelector::Type(PrinterType::Kitchen),
//!     PrintDocument::Text("Mesa 12\n2x Paella".into()),
//!     JobKind::KitchenTicket,
//! )?;
//! ```

pub mod config;
pub mod connection;
pub mod descriptors;
pub mod dispatcher;
pub mod error;
pub mod logger;
pub mod manager;
pub mod monitor;
pub mod registry;
pub mod renderer;
pub mod storage;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::FleetConfig;
pub use connection::{HealthSnapshot, PrinterConnection};
pub use dispatcher::JobDispatcher;
pub use error::{FleetError, FleetResult};
pub use manager::PrintManager;
pub use monitor::{HealthMonitor, SweepSummary};
pub use registry::{FleetRegistry, RefreshReport};
pub use renderer::{Delivered, DeliverySink, EncodingFallbackRenderer, RenderCapabilities};
pub use storage::{
    PrintJobStore, PrintStorageError, PrintStorageResult, PrintStore, PrinterStatusRecord,
    PrinterStatusStore,
};
pub use transport::{DeviceFactory, PrinterFactory, resolve};
pub use types::{
    Align, DocumentLine, HealthState, JobKind, JobStatus, PrintDocument, PrintJob,
    PrinterDescriptor, PrinterType, SubmittedJob, TargetSelector, TransportKind,
};
