//! Text encodings for thermal printers
//!
//! Thermal printers differ wildly in what text they can render. This module
//! provides the three encodings the fleet falls back through:
//! - UTF-8 for printers that render it natively
//! - Windows-1252 for older Western printers, with currency glyphs the code
//!   page lacks replaced by their ISO 4217 code
//! - plain ASCII with everything else stripped, which every printer accepts

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Text encoding used when rendering a document for a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    Utf8,
    Windows1252,
    Ascii,
}

impl TextEncoding {
    /// Fallback order: highest fidelity first, guaranteed output last
    pub const FALLBACK_ORDER: [TextEncoding; 3] = [
        TextEncoding::Utf8,
        TextEncoding::Windows1252,
        TextEncoding::Ascii,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Windows1252 => "windows-1252",
            TextEncoding::Ascii => "ascii",
        }
    }

    /// ESC/POS command selecting the matching character table
    pub fn code_page_command(&self) -> &'static [u8] {
        match self {
            // FS ( C pL pH m n - Select character encoding system (UTF-8)
            TextEncoding::Utf8 => &[0x1C, 0x28, 0x43, 0x02, 0x00, 0x30, 0x02],
            // ESC t 16 - WPC1252
            TextEncoding::Windows1252 => &[0x1B, 0x74, 16],
            // ESC t 0 - PC437 (ASCII range only)
            TextEncoding::Ascii => &[0x1B, 0x74, 0],
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Currency glyphs Windows-1252 cannot represent, with their ISO 4217 code.
///
/// € £ ¥ ¢ exist in the code page and are left alone.
const CURRENCY_CODES: &[(char, &str)] = &[
    ('₹', "INR"),
    ('₽', "RUB"),
    ('₺', "TRY"),
    ('₩', "KRW"),
    ('₱', "PHP"),
    ('₪', "ILS"),
    ('₫', "VND"),
    ('₴', "UAH"),
    ('₦', "NGN"),
    ('₡', "CRC"),
    ('₸', "KZT"),
    ('₿', "BTC"),
    ('฿', "THB"),
    ('₲', "PYG"),
    ('₵', "GHS"),
    ('₼', "AZN"),
    ('₾', "GEL"),
];

fn currency_code(c: char) -> Option<&'static str> {
    CURRENCY_CODES
        .iter()
        .find(|(glyph, _)| *glyph == c)
        .map(|(_, code)| *code)
}

/// Replace currency glyphs missing from Windows-1252 with 3-letter codes
pub fn substitute_currency(s: &str) -> Cow<'_, str> {
    if !s.chars().any(|c| currency_code(c).is_some()) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match currency_code(c) {
            Some(code) => out.push_str(code),
            None => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Rewrite text into what a tier will actually print
///
/// Every char of the result maps to one printed column, so layout code
/// measures this rather than the caller's original text.
pub fn prepare(s: &str, encoding: TextEncoding) -> Cow<'_, str> {
    match encoding {
        TextEncoding::Utf8 => Cow::Borrowed(s),
        TextEncoding::Windows1252 => {
            let s = substitute_currency(s);
            if s.chars().all(in_windows_1252) {
                s
            } else {
                // encoding_rs would emit an HTML entity; printers want '?'
                Cow::Owned(
                    s.chars()
                        .map(|c| if in_windows_1252(c) { c } else { '?' })
                        .collect(),
                )
            }
        }
        TextEncoding::Ascii if s.is_ascii() => Cow::Borrowed(s),
        TextEncoding::Ascii => Cow::Owned(s.chars().filter(char::is_ascii).collect()),
    }
}

fn in_windows_1252(c: char) -> bool {
    if c.is_ascii() {
        return true;
    }
    let mut buf = [0u8; 4];
    let (_, _, had_errors) = encoding_rs::WINDOWS_1252.encode(c.encode_utf8(&mut buf));
    !had_errors
}

/// Encode text for the given encoding
///
/// Never fails: characters an encoding cannot carry are substituted
/// (Windows-1252) or dropped (ASCII).
pub fn encode_text(s: &str, encoding: TextEncoding) -> Vec<u8> {
    let prepared = prepare(s, encoding);
    match encoding {
        TextEncoding::Windows1252 => encoding_rs::WINDOWS_1252.encode(&prepared).0.into_owned(),
        TextEncoding::Utf8 | TextEncoding::Ascii => prepared.as_bytes().to_vec(),
    }
}

/// Printed width of a string in characters (one column per char)
pub fn text_width(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_passthrough() {
        assert_eq!(encode_text("Café €5", TextEncoding::Utf8), "Café €5".as_bytes());
    }

    #[test]
    fn test_windows_1252_native_glyphs() {
        // é = 0xE9, € = 0x80 in Windows-1252
        assert_eq!(
            encode_text("Café €5", TextEncoding::Windows1252),
            vec![b'C', b'a', b'f', 0xE9, b' ', 0x80, b'5']
        );
    }

    #[test]
    fn test_windows_1252_currency_substitution() {
        assert_eq!(encode_text("₹120", TextEncoding::Windows1252), b"INR120".to_vec());
        assert_eq!(substitute_currency("Total: 5₺"), "Total: 5TRY");
        assert!(matches!(substitute_currency("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_windows_1252_unmappable_becomes_question_mark() {
        assert_eq!(encode_text("宫保", TextEncoding::Windows1252), b"??".to_vec());
    }

    #[test]
    fn test_ascii_strips() {
        assert_eq!(encode_text("Café €5 宫保", TextEncoding::Ascii), b"Caf 5 ".to_vec());
    }

    #[test]
    fn test_text_width_counts_chars() {
        assert_eq!(text_width("Café"), 4);
    }

    #[test]
    fn test_prepare_matches_printed_columns() {
        assert_eq!(prepare("₹80 宫", TextEncoding::Utf8), "₹80 宫");
        assert_eq!(prepare("₹80 宫", TextEncoding::Windows1252), "INR80 ?");
        assert_eq!(prepare("₹80 宫", TextEncoding::Ascii), "80 ");
        assert!(matches!(prepare("Café", TextEncoding::Windows1252), Cow::Borrowed(_)));

        for text in ["Café €5", "₹120 宫保", "plain"] {
            let enc = TextEncoding::Windows1252;
            assert_eq!(encode_text(text, enc).len(), text_width(&prepare(text, enc)));
        }
    }
}
