//! Printer fleet and print job types

use crab_printer::TextEncoding;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical printer role, used for fan-out targeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterType {
    Receipt,
    Kitchen,
    Bar,
    Label,
    Report,
}

impl PrinterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrinterType::Receipt => "receipt",
            PrinterType::Kitchen => "kitchen",
            PrinterType::Bar => "bar",
            PrinterType::Label => "label",
            PrinterType::Report => "report",
        }
    }
}

impl fmt::Display for PrinterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical connection method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Network,
    Usb,
    Bluetooth,
}

/// Printer configuration as owned by the external configuration store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterDescriptor {
    pub id: String,
    pub name: String,
    pub printer_type: PrinterType,
    pub transport: TransportKind,
    /// Network: host name or IP
    #[serde(default)]
    pub host: Option<String>,
    /// Network: TCP port (default 9100)
    #[serde(default)]
    pub port: Option<u16>,
    /// USB device node, or the bound RFCOMM node for Bluetooth
    #[serde(default)]
    pub device_path: Option<String>,
    /// Bluetooth: radio address
    #[serde(default)]
    pub mac: Option<String>,
    /// Bluetooth: RFCOMM channel (default 1)
    #[serde(default)]
    pub channel: Option<u8>,
    /// Characters per line
    #[serde(default = "default_width")]
    pub width: usize,
    #[serde(default)]
    pub auto_cut: bool,
    #[serde(default)]
    pub open_drawer: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_width() -> usize {
    48
}

fn default_true() -> bool {
    true
}

impl PrinterDescriptor {
    /// Network printer descriptor with default capabilities
    pub fn network(id: &str, printer_type: PrinterType, host: &str, port: u16) -> Self {
        Self {
            host: Some(host.to_string()),
            port: Some(port),
            ..Self::bare(id, printer_type, TransportKind::Network)
        }
    }

    /// USB printer descriptor with default capabilities
    pub fn usb(id: &str, printer_type: PrinterType, device_path: &str) -> Self {
        Self {
            device_path: Some(device_path.to_string()),
            ..Self::bare(id, printer_type, TransportKind::Usb)
        }
    }

    /// Bluetooth printer descriptor with default capabilities
    pub fn bluetooth(id: &str, printer_type: PrinterType, mac: &str) -> Self {
        Self {
            mac: Some(mac.to_string()),
            ..Self::bare(id, printer_type, TransportKind::Bluetooth)
        }
    }

    fn bare(id: &str, printer_type: PrinterType, transport: TransportKind) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            printer_type,
            transport,
            host: None,
            port: None,
            device_path: None,
            mac: None,
            channel: None,
            width: default_width(),
            auto_cut: false,
            open_drawer: false,
            is_active: true,
        }
    }
}

/// Connection health state
///
/// `Unknown` only exists before the first probe; no transition leads back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    Unknown,
    Online,
    Offline,
    Error,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Unknown => "UNKNOWN",
            HealthState::Online => "ONLINE",
            HealthState::Offline => "OFFLINE",
            HealthState::Error => "ERROR",
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a print job is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    OrderReceipt,
    KitchenTicket,
    Label,
    Report,
    TestPage,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

/// One line of a structured document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentLine {
    Text {
        text: String,
        #[serde(default)]
        align: Align,
        #[serde(default)]
        bold: bool,
        /// Double width and height
        #[serde(default)]
        large: bool,
    },
    /// Left text and right text on one line (e.g. item and price)
    Pair { left: String, right: String },
    Separator {
        #[serde(default)]
        double: bool,
    },
    Feed { lines: u8 },
}

impl DocumentLine {
    pub fn text(text: impl Into<String>) -> Self {
        DocumentLine::Text {
            text: text.into(),
            align: Align::Left,
            bold: false,
            large: false,
        }
    }

    pub fn title(text: impl Into<String>) -> Self {
        DocumentLine::Text {
            text: text.into(),
            align: Align::Center,
            bold: true,
            large: true,
        }
    }

    pub fn pair(left: impl Into<String>, right: impl Into<String>) -> Self {
        DocumentLine::Pair {
            left: left.into(),
            right: right.into(),
        }
    }
}

/// Fully formatted content handed over by the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum PrintDocument {
    Text(String),
    Lines(Vec<DocumentLine>),
}

/// Which printers a submission goes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "target", rename_all = "snake_case")]
pub enum TargetSelector {
    Printer(String),
    Printers(Vec<String>),
    Type(PrinterType),
    All,
}

/// Print job record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: String,
    pub printer_id: String,
    pub kind: JobKind,
    pub content: PrintDocument,
    pub status: JobStatus,
    /// Millisecond timestamp
    pub created_at: i64,
    pub completed_at: Option<i64>,
    pub error: Option<String>,
    /// Machine-readable failure code (e.g. `PRINTER_UNREACHABLE`)
    #[serde(default)]
    pub error_code: Option<String>,
    /// Encoding tier that reached the printer
    #[serde(default)]
    pub encoding: Option<TextEncoding>,
}

impl PrintJob {
    pub fn new(printer_id: &str, kind: JobKind, content: PrintDocument) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            printer_id: printer_id.to_string(),
            kind,
            content,
            status: JobStatus::Pending,
            created_at: chrono::Utc::now().timestamp_millis(),
            completed_at: None,
            error: None,
            error_code: None,
            encoding: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Mark succeeded. Returns false if the job already reached a terminal state.
    pub fn succeed(&mut self, encoding: TextEncoding) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = JobStatus::Succeeded;
        self.encoding = Some(encoding);
        self.completed_at = Some(chrono::Utc::now().timestamp_millis());
        true
    }

    /// Mark failed. Returns false if the job already reached a terminal state.
    pub fn fail(&mut self, code: &str, message: String) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.status = JobStatus::Failed;
        self.error_code = Some(code.to_string());
        self.error = Some(message);
        self.completed_at = Some(chrono::Utc::now().timestamp_millis());
        true
    }
}

/// Returned by a submission, one per resolved target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedJob {
    pub job_id: String,
    pub printer_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_terminal_once() {
        let mut job = PrintJob::new("p1", JobKind::OrderReceipt, PrintDocument::Text("x".into()));
        assert_eq!(job.status, JobStatus::Pending);

        assert!(job.succeed(TextEncoding::Utf8));
        assert!(!job.fail("PRINTER_UNREACHABLE", "late".into()));
        assert!(!job.succeed(TextEncoding::Ascii));

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.encoding, Some(TextEncoding::Utf8));
        assert!(job.error.is_none());
    }

    #[test]
    fn test_descriptor_json_defaults() {
        let json = r#"{
            "id": "kitchen-1",
            "name": "Cocina",
            "printer_type": "kitchen",
            "transport": "network",
            "host": "10.0.0.5"
        }"#;
        let d: PrinterDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.width, 48);
        assert!(d.is_active);
        assert!(!d.auto_cut);
        assert_eq!(d.port, None);
    }

    #[test]
    fn test_health_state_wire_names() {
        assert_eq!(serde_json::to_string(&HealthState::Offline).unwrap(), "\"OFFLINE\"");
        assert_eq!(HealthState::Error.to_string(), "ERROR");
    }

    #[test]
    fn test_document_json_shape() {
        let doc = PrintDocument::Lines(vec![DocumentLine::pair("Paella", "18.00")]);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["type"], "lines");
        assert_eq!(json["body"][0]["type"], "pair");

        let back: PrintDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }
}
