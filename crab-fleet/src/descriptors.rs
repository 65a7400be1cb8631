//! Printer descriptor file
//!
//! The external configuration store hands printers over as a JSON array of
//! [`PrinterDescriptor`]s. The file is read whole on every refresh.

use crate::error::{FleetError, FleetResult};
use crate::types::PrinterDescriptor;
use std::path::Path;

/// Read all descriptors from a JSON file
///
/// A missing file is an empty fleet, not an error.
pub async fn load_from_file(path: impl AsRef<Path>) -> FleetResult<Vec<PrinterDescriptor>> {
    let path = path.as_ref();

    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Printer file not found, fleet is empty");
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(FleetError::Config(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )));
        }
    };

    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(&raw)
        .map_err(|e| FleetError::Config(format!("invalid printer file {}: {}", path.display(), e)))
}
