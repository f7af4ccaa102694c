//! Structured (rich-text) document container.
//!
//! Rich documents are RTF streams loaded and saved as a unit. The container
//! keeps the original bytes untouched so an unedited document saves back
//! byte-for-byte; only an edited document is regenerated from its plain text.
//! The RTF reader here extracts plain text for change tracking and is not a
//! general formatting model: groups such as font and color tables are skipped,
//! character formatting is dropped.

use encoding_rs::WINDOWS_1252;

const RTF_MAGIC: &[u8] = b"{\\rtf";
const RTF_HEADER: &str = "{\\rtf1\\ansi\\ansicpg1252\\deff0{\\fonttbl{\\f0\\fmodern Consolas;}}\n\\f0 ";

/// Destination groups whose content is never document text.
const SKIPPED_DESTINATIONS: &[&[u8]] = &[
    b"fonttbl",
    b"colortbl",
    b"stylesheet",
    b"info",
    b"pict",
    b"header",
    b"footer",
    b"generator",
];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RichDocument {
    source: Vec<u8>,
}

impl RichDocument {
    pub fn from_bytes(source: Vec<u8>) -> Self {
        Self { source }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.source
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.source
    }

    pub fn is_rtf(&self) -> bool {
        self.source.starts_with(RTF_MAGIC)
    }

    /// Build a minimal RTF document holding `text`.
    pub fn from_plain_text(text: &str) -> Self {
        let mut out = String::with_capacity(RTF_HEADER.len() + text.len() + 2);
        out.push_str(RTF_HEADER);
        for ch in text.chars() {
            match ch {
                '\\' => out.push_str("\\\\"),
                '{' => out.push_str("\\{"),
                '}' => out.push_str("\\}"),
                '\n' => out.push_str("\\par\n"),
                '\r' => {}
                '\t' => out.push_str("\\tab "),
                c if c.is_ascii() => out.push(c),
                c => {
                    let mut units = [0u16; 2];
                    for unit in c.encode_utf16(&mut units) {
                        // RTF \u takes a signed 16-bit value; '?' is the skipped fallback.
                        out.push_str(&format!("\\u{}?", *unit as i16));
                    }
                }
            }
        }
        out.push('}');
        Self {
            source: out.into_bytes(),
        }
    }

    /// Plain text carried by the document. Non-RTF content is read as UTF-8.
    pub fn plain_text(&self) -> String {
        if !self.is_rtf() {
            return String::from_utf8_lossy(&self.source).into_owned();
        }
        RtfReader::new(&self.source).read()
    }
}

struct RtfReader<'a> {
    src: &'a [u8],
    pos: usize,
    out: String,
    skip: bool,
    groups: Vec<bool>,
    /// Fallback characters still to drop after a `\u` escape.
    uc_pending: usize,
    high_surrogate: Option<u16>,
}

impl<'a> RtfReader<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self {
            src,
            pos: 0,
            out: String::with_capacity(src.len() / 2),
            skip: false,
            groups: Vec::new(),
            uc_pending: 0,
            high_surrogate: None,
        }
    }

    fn read(mut self) -> String {
        while let Some(&b) = self.src.get(self.pos) {
            self.pos += 1;
            match b {
                b'{' => self.groups.push(self.skip),
                b'}' => self.skip = self.groups.pop().unwrap_or(false),
                b'\\' => self.control(),
                b'\r' | b'\n' => {}
                _ => self.emit_byte(b),
            }
        }
        self.out
    }

    fn control(&mut self) {
        let Some(&c) = self.src.get(self.pos) else {
            return;
        };
        if !c.is_ascii_alphabetic() {
            self.pos += 1;
            match c {
                b'\\' | b'{' | b'}' => self.emit_char(c as char),
                b'\'' => {
                    let hex = self.src.get(self.pos..self.pos + 2).unwrap_or_default();
                    self.pos += hex.len();
                    if let Some(byte) = std::str::from_utf8(hex)
                        .ok()
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                    {
                        self.emit_byte(byte);
                    }
                }
                b'*' => self.skip = true,
                b'~' => self.emit_char('\u{a0}'),
                b'\r' | b'\n' => self.emit_char('\n'),
                _ => {}
            }
            return;
        }
        let start = self.pos;
        while self.src.get(self.pos).is_some_and(u8::is_ascii_alphabetic) {
            self.pos += 1;
        }
        let word = &self.src[start..self.pos];
        let param = self.parameter();
        if self.src.get(self.pos) == Some(&b' ') {
            self.pos += 1;
        }
        match word {
            b"par" | b"line" => self.emit_char('\n'),
            b"tab" => self.emit_char('\t'),
            b"u" => {
                if let Some(n) = param {
                    self.emit_unit(n as i16 as u16);
                    self.uc_pending = 1;
                }
            }
            w if SKIPPED_DESTINATIONS.contains(&w) => self.skip = true,
            _ => {}
        }
    }

    fn parameter(&mut self) -> Option<i32> {
        let start = self.pos;
        if self.src.get(self.pos) == Some(&b'-') {
            self.pos += 1;
        }
        while self.src.get(self.pos).is_some_and(u8::is_ascii_digit) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.src[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
    }

    fn emit_byte(&mut self, byte: u8) {
        if self.skip {
            return;
        }
        if self.uc_pending > 0 {
            self.uc_pending -= 1;
            return;
        }
        let single = [byte];
        let (decoded, _) = WINDOWS_1252.decode_without_bom_handling(&single);
        self.out.push_str(&decoded);
    }

    fn emit_char(&mut self, ch: char) {
        if !self.skip {
            self.uc_pending = 0;
            self.out.push(ch);
        }
    }

    fn emit_unit(&mut self, unit: u16) {
        if self.skip {
            return;
        }
        if let Some(high) = self.high_surrogate.take() {
            let pair = [high, unit];
            self.out.extend(char::decode_utf16(pair).map(|r| r.unwrap_or('\u{fffd}')));
            return;
        }
        if (0xD800..0xDC00).contains(&unit) {
            self.high_surrogate = Some(unit);
            return;
        }
        self.out
            .push(char::from_u32(u32::from(unit)).unwrap_or('\u{fffd}'));
    }
}
