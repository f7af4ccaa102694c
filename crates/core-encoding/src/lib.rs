//! Text encoding detection and re-encoding for plain-text documents.
//!
//! Detection runs in a fixed order and never fails:
//! 1. Byte-order mark (UTF-8, UTF-16LE, UTF-16BE). The BOM is stripped from the
//!    decoded text and remembered so a later save writes it back.
//! 2. Null-byte distribution typical of BOM-less UTF-16 ASCII text.
//! 3. Well-formed UTF-8 (ASCII and empty input included).
//! 4. No null bytes at all: legacy single-byte code page (Windows-1252).
//! 5. Anything else is treated as binary-ish and decoded lossily with the
//!    caller's fallback encoding (UTF-8 unless configured otherwise).
//!
//! The chosen [`TextEncoding`] is stored by the session and handed back to
//! [`encode`] on every save so the file keeps its original byte convention.

use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1252};
use std::fmt;
use tracing::{debug, warn};

const BOM_UTF8: &[u8] = &[0xEF, 0xBB, 0xBF];
const BOM_UTF16LE: &[u8] = &[0xFF, 0xFE];
const BOM_UTF16BE: &[u8] = &[0xFE, 0xFF];

/// Number of leading bytes inspected by the UTF-16 null heuristic.
pub const SAMPLE_LEN: usize = 4096;

/// Share of code units on one parity that must be zero before BOM-less
/// UTF-16 is assumed.
const UTF16_NULL_RATIO: f32 = 0.7;
/// Upper bound for zero bytes on the other parity.
const UTF16_OTHER_PARITY_MAX: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodingKind {
    Utf8,
    Utf16Le,
    Utf16Be,
    Windows1252,
}

/// Encoding chosen for a document plus whether its bytes carried a BOM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextEncoding {
    pub kind: EncodingKind,
    pub bom: bool,
}

impl Default for TextEncoding {
    fn default() -> Self {
        Self::UTF8
    }
}

impl TextEncoding {
    pub const UTF8: Self = Self::new(EncodingKind::Utf8, false);

    pub const fn new(kind: EncodingKind, bom: bool) -> Self {
        Self { kind, bom }
    }

    /// Stable lowercase label used in logs, config and CLI output.
    pub fn label(&self) -> &'static str {
        match self.kind {
            EncodingKind::Utf8 => "utf-8",
            EncodingKind::Utf16Le => "utf-16le",
            EncodingKind::Utf16Be => "utf-16be",
            EncodingKind::Windows1252 => "windows-1252",
        }
    }

    /// Resolve a WHATWG encoding label (`"utf8"`, `"latin1"`, `"utf-16"` ...)
    /// to one of the supported encodings. Labels outside the supported set
    /// return `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        let enc = Encoding::for_label(label.trim().as_bytes())?;
        let kind = if enc == UTF_8 {
            EncodingKind::Utf8
        } else if enc == UTF_16LE {
            EncodingKind::Utf16Le
        } else if enc == UTF_16BE {
            EncodingKind::Utf16Be
        } else if enc == WINDOWS_1252 {
            EncodingKind::Windows1252
        } else {
            return None;
        };
        Some(Self::new(kind, false))
    }

    pub fn bom_bytes(&self) -> &'static [u8] {
        match self.kind {
            EncodingKind::Utf8 => BOM_UTF8,
            EncodingKind::Utf16Le => BOM_UTF16LE,
            EncodingKind::Utf16Be => BOM_UTF16BE,
            EncodingKind::Windows1252 => &[],
        }
    }

    fn encoding(&self) -> &'static Encoding {
        match self.kind {
            EncodingKind::Utf8 => UTF_8,
            EncodingKind::Utf16Le => UTF_16LE,
            EncodingKind::Utf16Be => UTF_16BE,
            EncodingKind::Windows1252 => WINDOWS_1252,
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bom {
            write!(f, "{} (bom)", self.label())
        } else {
            f.write_str(self.label())
        }
    }
}

/// Result of [`detect`]: decoded text and the encoding it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detected {
    pub text: String,
    pub encoding: TextEncoding,
    /// True when malformed sequences were replaced with U+FFFD.
    pub had_errors: bool,
}

/// Detect and decode with UTF-8 as the fallback encoding.
pub fn detect(bytes: &[u8]) -> Detected {
    detect_with_fallback(bytes, TextEncoding::UTF8)
}

/// Detect and decode, using `fallback` when no signature or heuristic matches.
pub fn detect_with_fallback(bytes: &[u8], fallback: TextEncoding) -> Detected {
    let (encoding, body) = sniff(bytes, fallback);
    let (text, had_errors) = encoding.encoding().decode_without_bom_handling(body);
    if had_errors {
        warn!(target: "encoding", encoding = encoding.label(), len = bytes.len(), "decode_replaced_malformed");
    }
    debug!(target: "encoding", encoding = encoding.label(), bom = encoding.bom, len = bytes.len(), "detected");
    Detected {
        text: text.into_owned(),
        encoding,
        had_errors,
    }
}

fn sniff(bytes: &[u8], fallback: TextEncoding) -> (TextEncoding, &[u8]) {
    if let Some(body) = bytes.strip_prefix(BOM_UTF8) {
        return (TextEncoding::new(EncodingKind::Utf8, true), body);
    }
    if let Some(body) = bytes.strip_prefix(BOM_UTF16LE) {
        return (TextEncoding::new(EncodingKind::Utf16Le, true), body);
    }
    if let Some(body) = bytes.strip_prefix(BOM_UTF16BE) {
        return (TextEncoding::new(EncodingKind::Utf16Be, true), body);
    }
    if let Some(kind) = utf16_by_nulls(bytes) {
        return (TextEncoding::new(kind, false), bytes);
    }
    if std::str::from_utf8(bytes).is_ok() {
        return (TextEncoding::UTF8, bytes);
    }
    if !bytes.contains(&0) {
        return (TextEncoding::new(EncodingKind::Windows1252, false), bytes);
    }
    (TextEncoding::new(fallback.kind, false), bytes)
}

/// BOM-less UTF-16 check: ASCII text in UTF-16 has a zero byte in every
/// high-order position. LE puts those at odd offsets, BE at even ones.
fn utf16_by_nulls(bytes: &[u8]) -> Option<EncodingKind> {
    let sample = &bytes[..bytes.len().min(SAMPLE_LEN)];
    if sample.len() < 2 || bytes.len() % 2 != 0 {
        return None;
    }
    let units = (sample.len() / 2) as f32;
    let even_zero = sample.iter().step_by(2).filter(|b| **b == 0).count() as f32 / units;
    let odd_zero = sample
        .iter()
        .skip(1)
        .step_by(2)
        .filter(|b| **b == 0)
        .count() as f32
        / units;
    if odd_zero >= UTF16_NULL_RATIO && even_zero <= UTF16_OTHER_PARITY_MAX {
        Some(EncodingKind::Utf16Le)
    } else if even_zero >= UTF16_NULL_RATIO && odd_zero <= UTF16_OTHER_PARITY_MAX {
        Some(EncodingKind::Utf16Be)
    } else {
        None
    }
}

/// Encode `text` for writing with a previously detected encoding.
///
/// Characters the legacy code page cannot represent are written as numeric
/// character references (encoding_rs behavior) and logged.
pub fn encode(text: &str, encoding: &TextEncoding) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 3);
    if encoding.bom {
        out.extend_from_slice(encoding.bom_bytes());
    }
    match encoding.kind {
        EncodingKind::Utf8 => out.extend_from_slice(text.as_bytes()),
        // encoding_rs only decodes UTF-16; its encoder emits UTF-8 for these.
        EncodingKind::Utf16Le => {
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_le_bytes());
            }
        }
        EncodingKind::Utf16Be => {
            for unit in text.encode_utf16() {
                out.extend_from_slice(&unit.to_be_bytes());
            }
        }
        EncodingKind::Windows1252 => {
            let (bytes, _, unmappable) = WINDOWS_1252.encode(text);
            if unmappable {
                warn!(target: "encoding", encoding = encoding.label(), "encode_unmappable_chars");
            }
            out.extend_from_slice(&bytes);
        }
    }
    out
}
