//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data.

use crate::encoding::{TextEncoding, encode_text, prepare, text_width};

/// ESC/POS command builder
///
/// Builds ESC/POS byte sequences for thermal printers. Text is encoded
/// with the builder's [`TextEncoding`] as it is written; command bytes are
/// emitted as-is.
pub struct EscPosBuilder {
    buf: Vec<u8>,
    width: usize,
    encoding: TextEncoding,
}

impl EscPosBuilder {
    /// Create a new builder with the specified paper width in characters
    ///
    /// Common widths:
    /// - 58mm paper: 32 characters
    /// - 80mm paper: 48 characters
    pub fn new(width: usize, encoding: TextEncoding) -> Self {
        let mut buf = Vec::with_capacity(4096);
        // Initialize printer (ESC @), then select the character table
        buf.extend_from_slice(&[0x1B, 0x40]);
        buf.extend_from_slice(encoding.code_page_command());
        Self {
            buf,
            width,
            encoding,
        }
    }

    /// Get the configured paper width
    pub fn width(&self) -> usize {
        self.width
    }

    /// Get the text encoding
    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    // === Text Output ===

    /// Write text in the builder's encoding
    pub fn text(&mut self, s: &str) -> &mut Self {
        let encoded = encode_text(s, self.encoding);
        self.buf.extend_from_slice(&encoded);
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(b'\n');
        self
    }

    /// Write empty line
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    /// Write multiple empty lines
    pub fn feed(&mut self, lines: u8) -> &mut Self {
        // ESC d n - Print and feed n lines
        self.buf.extend_from_slice(&[0x1B, 0x64, lines]);
        self
    }

    // === Alignment ===

    /// Align text to center
    pub fn center(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x01]);
        self
    }

    /// Align text to left (default)
    pub fn left(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x00]);
        self
    }

    /// Align text to right
    pub fn right(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x02]);
        self
    }

    // === Text Style ===

    /// Enable bold text
    pub fn bold(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x01]);
        self
    }

    /// Disable bold text
    pub fn bold_off(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x00]);
        self
    }

    /// Double width and height
    pub fn double_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x11]);
        self
    }

    /// Reset to normal size
    pub fn reset_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x00]);
        self
    }

    // === Separators ===

    /// Print a line of '=' characters
    pub fn sep_double(&mut self) -> &mut Self {
        self.line(&"=".repeat(self.width))
    }

    /// Print a line of '-' characters
    pub fn sep_single(&mut self) -> &mut Self {
        self.line(&"-".repeat(self.width))
    }

    // === Layout Helpers ===

    /// Print left and right text on the same line
    ///
    /// Left text is left-aligned, right text is right-aligned,
    /// with spaces filling the gap. Widths are taken after the encoding's
    /// substitutions, so `₹` counts as the three columns of `INR` in
    /// Windows-1252 and as nothing in ASCII.
    pub fn line_lr(&mut self, left: &str, right: &str) -> &mut Self {
        let left = prepare(left, self.encoding);
        let right = prepare(right, self.encoding);
        let (left, right) = (left.as_ref(), right.as_ref());
        let lw = text_width(left);
        let rw = text_width(right);

        if lw + rw >= self.width {
            // Too long, just print with space
            self.text(left);
            self.text(" ");
            self.line(right);
        } else {
            let spaces = self.width - lw - rw;
            self.text(left);
            self.text(&" ".repeat(spaces));
            self.line(right);
        }
        self
    }

    // === Paper Control ===

    /// Full cut with feed: feeds n lines then cuts.
    /// Uses GS V 66 n, which lets the printer manage cutter-to-head distance.
    pub fn cut_feed(&mut self, lines: u8) -> &mut Self {
        // GS V 66 n - Full cut after feeding n lines
        self.buf.extend_from_slice(&[0x1D, 0x56, 0x42, lines]);
        self
    }

    // === Cash Drawer ===

    /// Open cash drawer (pin 2)
    pub fn open_drawer(&mut self) -> &mut Self {
        // ESC p m t1 t2 - Generate pulse on pin m
        self.buf.extend_from_slice(&[0x1B, 0x70, 0x00, 25, 250]);
        self
    }

    // === Build ===

    /// Build the final byte buffer
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new(48, TextEncoding::Utf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_basic() {
        let mut b = EscPosBuilder::new(32, TextEncoding::Utf8);
        b.center()
            .double_size()
            .line("Mesa 12")
            .reset_size()
            .left()
            .line("Café con leche");

        let data = b.build();
        assert!(data.starts_with(&[0x1B, 0x40, 0x1C, 0x28, 0x43]));
        let s = String::from_utf8_lossy(&data);
        assert!(s.contains("Café con leche"));
    }

    #[test]
    fn test_line_lr() {
        let mut b = EscPosBuilder::new(20, TextEncoding::Ascii);
        b.line_lr("Total", "12.50");

        let data = b.build();
        let s = String::from_utf8_lossy(&data);
        assert!(s.contains("Total          12.50\n"));
    }

    #[test]
    fn test_line_lr_fills_width_in_every_encoding() {
        for encoding in TextEncoding::FALLBACK_ORDER {
            let mut b = EscPosBuilder::new(14, encoding);
            b.line_lr("Chai", "₹80.00");

            let data = b.build();
            let body = &data[2 + encoding.code_page_command().len()..];
            let (text, newline) = body.split_at(body.len() - 1);
            assert_eq!(newline, b"\n");

            let columns = match encoding {
                TextEncoding::Utf8 => String::from_utf8(text.to_vec()).unwrap().chars().count(),
                _ => text.len(),
            };
            assert_eq!(columns, 14, "{encoding}: {:?}", String::from_utf8_lossy(text));
        }
    }

    #[test]
    fn test_separators() {
        let mut b = EscPosBuilder::new(10, TextEncoding::Ascii);
        b.sep_double();

        let data = b.build();
        let s = String::from_utf8_lossy(&data);
        assert!(s.contains("=========="));
    }

    #[test]
    fn test_drawer_pulse_is_not_reencoded() {
        let mut b = EscPosBuilder::new(32, TextEncoding::Windows1252);
        b.open_drawer();

        let data = b.build();
        assert!(data.ends_with(&[0x1B, 0x70, 0x00, 25, 250]));
    }

    #[test]
    fn test_ascii_builder_has_no_high_text_bytes() {
        let mut b = EscPosBuilder::new(32, TextEncoding::Ascii);
        b.line("Crème brûlée €4");

        let data = b.build();
        assert!(data.iter().all(|b| b.is_ascii()));
    }
}
