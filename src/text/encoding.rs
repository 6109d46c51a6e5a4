//! Decoding of PDF string operands and masked re-encoding.
//!
//! Every decoded character remembers the code bytes it came from, so that
//! re-encoding after masking copies untouched characters verbatim and only
//! replaces masked ones with a space in the same code-unit width.

use std::ops::Range;

use crate::pdf::object::{PdfString, StringFormat};

/// Byte layout of a string's character codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One byte per character, read as Latin-1.
    SingleByte,
    /// Two bytes per character, big-endian. `bom` marks a leading `FE FF`.
    Utf16Be { bom: bool },
    /// Two bytes per character after a leading `FF FE`.
    Utf16Le,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedString {
    pub layout: Layout,
    pub chars: Vec<char>,
    /// Source bytes of each entry in `chars`.
    pub codes: Vec<Range<usize>>,
}

impl DecodedString {
    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }
}

/// Picks the code layout of `s`. Byte order marks win; hex strings of two or
/// more characters whose every even-indexed byte is zero are taken to be
/// BOM-less UTF-16BE, the usual shape of Identity-H CID text.
pub fn detect_layout(s: &PdfString) -> Layout {
    let b = &s.bytes;
    if b.starts_with(&[0xfe, 0xff]) {
        return Layout::Utf16Be { bom: true };
    }
    if b.starts_with(&[0xff, 0xfe]) {
        return Layout::Utf16Le;
    }
    if s.format == StringFormat::Hex
        && b.len() >= 4
        && b.len() % 2 == 0
        && b.iter().step_by(2).all(|&hi| hi == 0)
    {
        return Layout::Utf16Be { bom: false };
    }
    Layout::SingleByte
}

pub fn decode(s: &PdfString) -> DecodedString {
    let layout = detect_layout(s);
    let bytes = &s.bytes;
    let mut chars = Vec::new();
    let mut codes = Vec::new();
    match layout {
        Layout::SingleByte => {
            for (i, &b) in bytes.iter().enumerate() {
                chars.push(char::from(b));
                codes.push(i..i + 1);
            }
        }
        Layout::Utf16Be { .. } | Layout::Utf16Le => {
            let start = if matches!(layout, Layout::Utf16Be { bom: false }) { 0 } else { 2 };
            let unit_at = |i: usize| -> Option<u16> {
                let pair = bytes.get(i..i + 2)?;
                Some(match layout {
                    Layout::Utf16Le => u16::from_le_bytes([pair[0], pair[1]]),
                    _ => u16::from_be_bytes([pair[0], pair[1]]),
                })
            };
            let mut i = start;
            while let Some(unit) = unit_at(i) {
                let (ch, len) = match unit {
                    0xd800..=0xdbff => match unit_at(i + 2) {
                        Some(low @ 0xdc00..=0xdfff) => {
                            let cp = 0x10000
                                + ((u32::from(unit) - 0xd800) << 10)
                                + (u32::from(low) - 0xdc00);
                            (char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER), 4)
                        }
                        _ => (char::REPLACEMENT_CHARACTER, 2),
                    },
                    _ => (
                        char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER),
                        2,
                    ),
                };
                chars.push(ch);
                codes.push(i..i + len);
                i += len;
            }
        }
    }
    DecodedString {
        layout,
        chars,
        codes,
    }
}

/// Re-encodes `s` with every character whose `mask` entry is set replaced by
/// a space of the same code width. Bytes outside any character code (a byte
/// order mark, a dangling odd byte) are kept.
pub fn mask_string(s: &PdfString, decoded: &DecodedString, mask: &[bool]) -> PdfString {
    let mut out = Vec::with_capacity(s.bytes.len());
    let mut cursor = 0;
    for (idx, code) in decoded.codes.iter().enumerate() {
        out.extend_from_slice(&s.bytes[cursor..code.start]);
        if mask.get(idx).copied().unwrap_or(false) {
            out.extend_from_slice(space_code(decoded.layout));
        } else {
            out.extend_from_slice(&s.bytes[code.clone()]);
        }
        cursor = code.end;
    }
    out.extend_from_slice(&s.bytes[cursor..]);
    PdfString {
        bytes: out,
        format: s.format,
    }
}

fn space_code(layout: Layout) -> &'static [u8] {
    match layout {
        Layout::SingleByte => b" ",
        Layout::Utf16Be { .. } => &[0x00, 0x20],
        Layout::Utf16Le => &[0x20, 0x00],
    }
}
