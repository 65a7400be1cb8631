//! # crab-printer
//!
//! ESC/POS thermal printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ESC/POS command building
//! - Text encoding tiers (UTF-8, Windows-1252, ASCII)
//! - Network printing (TCP port 9100)
//! - USB device-node and Bluetooth RFCOMM printing
//!
//! Fleet management (WHICH printer, health, jobs, retries) lives in `crab-fleet`.
//!
//! ## Example
//!
//! ```ignore
//! use crab_printer::{EscPosBuilder, NetworkPrinter, Printer, TextEncoding};
//!
//! // Build ESC/POS content
//! let mut builder = EscPosBuilder::new(48, TextEncoding::Windows1252);
//! builder.center();
//! builder.double_size();
//! builder.line("COCINA");
//! builder.reset_size();
//! builder.sep_double();
//! builder.left();
//! builder.line("Mesa: 100");
//! builder.cut_feed(4);
//!
//! // Send to network printer
//! let printer = NetworkPrinter::new("192.168.1.100", 9100);
//! printer.print(&builder.build()).await?;
//! ```

mod encoding;
mod error;
mod escpos;
mod printer;

// Re-exports
pub use encoding::{TextEncoding, encode_text, prepare, substitute_currency, text_width};
pub use error::{PrintError, PrintResult};
pub use escpos::EscPosBuilder;
pub use printer::{
    BluetoothPrinter, DEFAULT_NETWORK_PORT, DevicePrinter, NetworkPrinter, PrintTarget, Printer,
};
