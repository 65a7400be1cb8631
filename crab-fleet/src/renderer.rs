//! Encoding fallback renderer
//!
//! Renders a document into ESC/POS bytes and delivers it, one encoding tier
//! at a time. Some devices accept UTF-8 natively, older thermal printers
//! corrupt multi-byte sequences, and ASCII always gets something on paper,
//! so tiers run from highest fidelity to guaranteed delivery. A tier is only
//! abandoned when its own send fails.

use crate::error::{FleetError, FleetResult};
use crate::types::{Align, DocumentLine, PrintDocument, PrinterDescriptor};
use async_trait::async_trait;
use crab_printer::{EscPosBuilder, PrintError, PrintResult, TextEncoding};
use tracing::{debug, info, warn};

/// Lines fed before cutting so the last line clears the cutter
const CUT_FEED_LINES: u8 = 4;

/// What the target device can do, taken from its descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderCapabilities {
    pub width: usize,
    pub auto_cut: bool,
    pub open_drawer: bool,
}

impl Default for RenderCapabilities {
    fn default() -> Self {
        Self {
            width: 48,
            auto_cut: false,
            open_drawer: false,
        }
    }
}

impl From<&PrinterDescriptor> for RenderCapabilities {
    fn from(d: &PrinterDescriptor) -> Self {
        Self {
            width: d.width,
            auto_cut: d.auto_cut,
            open_drawer: d.open_drawer,
        }
    }
}

/// Something that accepts rendered bytes
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, data: &[u8]) -> PrintResult<()>;
}

/// Result of a successful delivery
#[derive(Debug, Clone)]
pub struct Delivered {
    pub encoding: TextEncoding,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct EncodingFallbackRenderer {
    tiers: Vec<TextEncoding>,
}

impl Default for EncodingFallbackRenderer {
    fn default() -> Self {
        Self {
            tiers: TextEncoding::FALLBACK_ORDER.to_vec(),
        }
    }
}

impl EncodingFallbackRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tiers(&self) -> &[TextEncoding] {
        &self.tiers
    }

    /// Render a document with one encoding
    pub fn render(
        &self,
        document: &PrintDocument,
        caps: &RenderCapabilities,
        encoding: TextEncoding,
    ) -> Vec<u8> {
        let mut b = EscPosBuilder::new(caps.width, encoding);

        match document {
            PrintDocument::Text(text) => {
                for line in text.lines() {
                    b.line(line);
                }
            }
            PrintDocument::Lines(lines) => {
                for line in lines {
                    render_line(&mut b, line);
                }
            }
        }

        if caps.auto_cut {
            b.cut_feed(CUT_FEED_LINES);
        } else {
            b.feed(CUT_FEED_LINES);
        }
        if caps.open_drawer {
            b.open_drawer();
        }

        b.build()
    }

    /// Try each tier in order until one is accepted by the sink
    pub async fn render_and_deliver(
        &self,
        document: &PrintDocument,
        caps: &RenderCapabilities,
        sink: &dyn DeliverySink,
    ) -> FleetResult<Delivered> {
        let mut last_error: Option<PrintError> = None;

        for &encoding in &self.tiers {
            let bytes = self.render(document, caps, encoding);
            debug!(tier = %encoding, bytes = bytes.len(), "Delivering tier");

            match sink.deliver(&bytes).await {
                Ok(()) => {
                    if last_error.is_some() {
                        info!(tier = %encoding, "Delivered after encoding fallback");
                    }
                    return Ok(Delivered { encoding, bytes });
                }
                Err(e) => {
                    warn!(tier = %encoding, error = %e, "Tier failed, trying next");
                    last_error = Some(e);
                }
            }
        }

        Err(FleetError::RenderAndDeliveryFailed {
            last_error: last_error
                .unwrap_or_else(|| PrintError::InvalidConfig("no encoding tiers".to_string())),
        })
    }
}

fn render_line(b: &mut EscPosBuilder, line: &DocumentLine) {
    match line {
        DocumentLine::Text {
            text,
            align,
            bold,
            large,
        } => {
            match align {
                Align::Left => b.left(),
                Align::Center => b.center(),
                Align::Right => b.right(),
            };
            if *bold {
                b.bold();
            }
            if *large {
                b.double_size();
            }
            b.line(text);
            if *large {
                b.reset_size();
            }
            if *bold {
                b.bold_off();
            }
            if *align != Align::Left {
                b.left();
            }
        }
        DocumentLine::Pair { left, right } => {
            b.line_lr(left, right);
        }
        DocumentLine::Separator { double } => {
            if *double {
                b.sep_double();
            } else {
                b.sep_single();
            }
        }
        DocumentLine::Feed { lines } => {
            b.feed(*lines);
        }
    }
}
