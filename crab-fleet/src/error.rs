//! Fleet error types

use crate::storage::PrintStorageError;
use crate::types::HealthState;
use crab_printer::PrintError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    /// Descriptor is missing or has malformed address fields
    #[error("Invalid transport config for printer {printer_id}: {reason}")]
    InvalidTransportConfig { printer_id: String, reason: String },

    #[error("Printer unreachable: {printer_id} is {state}")]
    PrinterUnreachable {
        printer_id: String,
        state: HealthState,
    },

    /// Every encoding tier failed; carries the last tier's error
    #[error("Render and delivery failed on every encoding: {last_error}")]
    RenderAndDeliveryFailed {
        #[source]
        last_error: PrintError,
    },

    #[error("Shutdown in progress")]
    ShutdownInProgress,

    #[error("Printer not found: {0}")]
    PrinterNotFound(String),

    #[error("Printer inactive: {0}")]
    PrinterInactive(String),

    #[error("Print job not found: {0}")]
    JobNotFound(String),

    #[error("No printers selected")]
    EmptySelector,

    #[error("Printer config error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] PrintStorageError),
}

impl FleetError {
    /// Stable code written to job records
    pub fn code(&self) -> &'static str {
        match self {
            FleetError::InvalidTransportConfig { .. } => "INVALID_TRANSPORT_CONFIG",
            FleetError::PrinterUnreachable { .. } => "PRINTER_UNREACHABLE",
            FleetError::RenderAndDeliveryFailed { .. } => "RENDER_AND_DELIVERY_FAILED",
            FleetError::ShutdownInProgress => "SHUTDOWN_IN_PROGRESS",
            FleetError::PrinterNotFound(_) => "PRINTER_NOT_FOUND",
            FleetError::PrinterInactive(_) => "PRINTER_INACTIVE",
            FleetError::JobNotFound(_) => "JOB_NOT_FOUND",
            FleetError::EmptySelector => "EMPTY_SELECTOR",
            FleetError::Config(_) => "CONFIG",
            FleetError::Internal(_) => "INTERNAL",
            FleetError::Storage(_) => "STORAGE",
        }
    }
}

pub type FleetResult<T> = Result<T, FleetError>;
