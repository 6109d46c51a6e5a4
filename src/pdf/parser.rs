//! Recursive-descent reader for PDF primitive objects.
//!
//! The reader works on a single object body (the bytes between `obj` and
//! `endobj`) or on a content stream. It never looks at the cross-reference
//! table; indirect objects are located by [`crate::pdf::object_map`].

use std::ops::Range;

use memchr::memmem;
use tracing::trace;

use crate::error::{RedactorError, RedactorResult};
use crate::pdf::lexer::{is_whitespace, Cursor};
use crate::pdf::object::{Dictionary, Object, ObjectId, PdfString, StringFormat};

const MAX_PARSE_DEPTH: usize = 64;
const MAX_COLLECTION_LEN: usize = 100_000;

pub struct Parser<'a> {
    cur: Cursor<'a>,
    allow_refs: bool,
}

/// An object body split into its leading object and optional stream data.
#[derive(Debug, Clone)]
pub struct ParsedBody {
    pub object: Object,
    /// Byte range of the raw (still encoded) stream data inside the body.
    pub stream: Option<Range<usize>>,
}

impl ParsedBody {
    pub fn dict(&self) -> Option<&Dictionary> {
        self.object.as_dict()
    }
}

impl<'a> Parser<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cur: Cursor::new(bytes),
            allow_refs: true,
        }
    }

    /// Reader for content streams, where `N G R` is never a reference.
    pub fn for_content(bytes: &'a [u8], pos: usize) -> Self {
        Self {
            cur: Cursor::at(bytes, pos),
            allow_refs: false,
        }
    }

    pub fn cursor(&mut self) -> &mut Cursor<'a> {
        &mut self.cur
    }

    pub fn position(&self) -> usize {
        self.cur.pos()
    }

    pub fn parse_object(&mut self) -> RedactorResult<Object> {
        self.parse_with_depth(0)
    }

    fn parse_with_depth(&mut self, depth: usize) -> RedactorResult<Object> {
        if depth >= MAX_PARSE_DEPTH {
            return Err(RedactorError::parse(self.cur.pos(), "nesting too deep"));
        }
        self.cur.skip_ws();
        let start = self.cur.pos();
        let b = self
            .cur
            .peek()
            .ok_or_else(|| RedactorError::parse(start, "unexpected end of input"))?;
        match b {
            b'/' => self.parse_name().map(Object::Name),
            b'<' if self.cur.peek_at(1) == Some(b'<') => {
                self.parse_dict(depth + 1).map(Object::Dictionary)
            }
            b'<' => self.parse_hex_string().map(Object::String),
            b'(' => self.parse_literal_string().map(Object::String),
            b'[' => self.parse_array(depth + 1).map(Object::Array),
            b'+' | b'-' | b'.' | b'0'..=b'9' => self.parse_number_or_ref(),
            _ => {
                if self.cur.eat_keyword(b"true") {
                    Ok(Object::Boolean(true))
                } else if self.cur.eat_keyword(b"false") {
                    Ok(Object::Boolean(false))
                } else if self.cur.eat_keyword(b"null") {
                    Ok(Object::Null)
                } else {
                    Err(RedactorError::parse(
                        start,
                        format!("unexpected byte 0x{:02x}", b),
                    ))
                }
            }
        }
    }

    fn parse_name(&mut self) -> RedactorResult<Vec<u8>> {
        self.cur.bump();
        let raw = self.cur.read_regular();
        let mut out = Vec::with_capacity(raw.len());
        let mut i = 0;
        while i < raw.len() {
            if raw[i] == b'#' && i + 2 < raw.len() {
                if let Some(v) = hex_pair(raw[i + 1], raw[i + 2]) {
                    out.push(v);
                    i += 3;
                    continue;
                }
            }
            out.push(raw[i]);
            i += 1;
        }
        Ok(out)
    }

    fn parse_dict(&mut self, depth: usize) -> RedactorResult<Dictionary> {
        let start = self.cur.pos();
        self.cur.set_pos(start + 2);
        let mut dict = Dictionary::new();
        loop {
            self.cur.skip_ws();
            if self.cur.starts_with(b">>") {
                self.cur.set_pos(self.cur.pos() + 2);
                return Ok(dict);
            }
            match self.cur.peek() {
                None => return Err(RedactorError::parse(start, "unterminated dictionary")),
                Some(b'/') => {}
                Some(_) => {
                    return Err(RedactorError::parse(
                        self.cur.pos(),
                        "dictionary key is not a name",
                    ))
                }
            }
            if dict.len() >= MAX_COLLECTION_LEN {
                return Err(RedactorError::parse(start, "dictionary too large"));
            }
            let key = self.parse_name()?;
            let value = self.parse_with_depth(depth + 1)?;
            dict.set(&key, value);
        }
    }

    fn parse_array(&mut self, depth: usize) -> RedactorResult<Vec<Object>> {
        let start = self.cur.pos();
        self.cur.bump();
        let mut items = Vec::new();
        loop {
            self.cur.skip_ws();
            match self.cur.peek() {
                None => return Err(RedactorError::parse(start, "unterminated array")),
                Some(b']') => {
                    self.cur.bump();
                    return Ok(items);
                }
                Some(_) => {}
            }
            if items.len() >= MAX_COLLECTION_LEN {
                return Err(RedactorError::parse(start, "array too large"));
            }
            items.push(self.parse_with_depth(depth + 1)?);
        }
    }

    fn parse_literal_string(&mut self) -> RedactorResult<PdfString> {
        let start = self.cur.pos();
        self.cur.bump();
        let mut out = Vec::new();
        let mut nesting = 1usize;
        loop {
            let b = self
                .cur
                .bump()
                .ok_or_else(|| RedactorError::parse(start, "unterminated literal string"))?;
            match b {
                b'(' => {
                    nesting += 1;
                    out.push(b);
                }
                b')' => {
                    nesting -= 1;
                    if nesting == 0 {
                        break;
                    }
                    out.push(b);
                }
                b'\\' => self.read_escape(&mut out),
                _ => out.push(b),
            }
        }
        Ok(PdfString {
            bytes: out,
            format: StringFormat::Literal,
        })
    }

    fn read_escape(&mut self, out: &mut Vec<u8>) {
        let Some(b) = self.cur.bump() else {
            return;
        };
        match b {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'(' | b')' | b'\\' => out.push(b),
            // Line continuation: the backslash and the EOL vanish.
            b'\r' => {
                if self.cur.peek() == Some(b'\n') {
                    self.cur.bump();
                }
            }
            b'\n' => {}
            b'0'..=b'7' => {
                let mut value = u32::from(b - b'0');
                for _ in 0..2 {
                    match self.cur.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.cur.bump();
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xff) as u8);
            }
            other => out.push(other),
        }
    }

    fn parse_hex_string(&mut self) -> RedactorResult<PdfString> {
        let start = self.cur.pos();
        self.cur.bump();
        let mut digits = Vec::new();
        loop {
            let b = self
                .cur
                .bump()
                .ok_or_else(|| RedactorError::parse(start, "unterminated hex string"))?;
            match b {
                b'>' => break,
                _ if is_whitespace(b) => {}
                _ if b.is_ascii_hexdigit() => digits.push(b),
                _ => return Err(RedactorError::parse(self.cur.pos() - 1, "invalid hex digit")),
            }
        }
        if digits.len() % 2 == 1 {
            digits.push(b'0');
        }
        let bytes = digits
            .chunks(2)
            .filter_map(|pair| hex_pair(pair[0], pair[1]))
            .collect();
        Ok(PdfString {
            bytes,
            format: StringFormat::Hex,
        })
    }

    fn parse_number_or_ref(&mut self) -> RedactorResult<Object> {
        let start = self.cur.pos();
        let token = self.cur.read_regular();
        let first = parse_number(token).ok_or_else(|| {
            RedactorError::parse(start, format!("invalid number '{}'", String::from_utf8_lossy(token)))
        })?;
        if !self.allow_refs {
            return Ok(first);
        }
        let Object::Integer(number) = first else {
            return Ok(first);
        };
        if number < 0 || token.starts_with(b"+") || token.starts_with(b"-") {
            return Ok(first);
        }
        let after_first = self.cur.pos();
        self.cur.skip_ws();
        let gen_token = self.cur.read_regular();
        if let Some(Object::Integer(generation)) = parse_number(gen_token) {
            self.cur.skip_ws();
            if self.cur.eat_keyword(b"R") {
                if let (Ok(number), Ok(generation)) =
                    (u32::try_from(number), u16::try_from(generation))
                {
                    return Ok(Object::Reference(ObjectId::new(number, generation)));
                }
            }
        }
        self.cur.set_pos(after_first);
        Ok(first)
    }
}

/// Parses an integer or real token.
pub fn parse_number(token: &[u8]) -> Option<Object> {
    let text = std::str::from_utf8(token).ok()?;
    if text.is_empty() {
        return None;
    }
    if !text.contains('.') {
        if let Ok(i) = text.parse::<i64>() {
            return Some(Object::Integer(i));
        }
    }
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Object::Real)
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let h = (hi as char).to_digit(16)?;
    let l = (lo as char).to_digit(16)?;
    Some((h * 16 + l) as u8)
}

/// Splits an indirect object body into its object and stream data range.
///
/// `resolved_length` is used when `/Length` is an indirect reference that
/// the caller already resolved.
pub fn parse_body(body: &[u8], resolved_length: Option<usize>) -> RedactorResult<ParsedBody> {
    let mut parser = Parser::new(body);
    let object = parser.parse_object()?;
    let cur = parser.cursor();
    cur.skip_ws();
    if !(object.as_dict().is_some() && cur.eat_keyword(b"stream")) {
        return Ok(ParsedBody {
            object,
            stream: None,
        });
    }
    cur.skip_eol();
    let data_start = cur.pos();

    let declared = object
        .as_dict()
        .and_then(|d| d.get(b"Length"))
        .and_then(Object::as_i64)
        .and_then(|len| usize::try_from(len).ok())
        .or(resolved_length);

    if let Some(len) = declared {
        if let Some(end) = data_start.checked_add(len).filter(|&end| end <= body.len()) {
            let mut check = Cursor::at(body, end);
            check.skip_ws();
            if check.starts_with(b"endstream") {
                return Ok(ParsedBody {
                    object,
                    stream: Some(data_start..end),
                });
            }
        }
        trace!(declared = len, "stream /Length does not land on endstream");
    }

    let rel = memmem::rfind(&body[data_start..], b"endstream")
        .ok_or_else(|| RedactorError::parse(data_start, "stream without endstream"))?;
    let mut end = data_start + rel;
    if end > data_start && body[end - 1] == b'\n' {
        end -= 1;
    }
    if end > data_start && body[end - 1] == b'\r' {
        end -= 1;
    }
    Ok(ParsedBody {
        object,
        stream: Some(data_start..end),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(bytes: &[u8]) -> Object {
        Parser::new(bytes).parse_object().unwrap()
    }

    #[test]
    fn test_parse_page_dictionary() {
        let obj = parse(b"<< /Type /Page /MediaBox [0 0 612 792] /Contents 4 0 R >>");
        let dict = obj.as_dict().unwrap();
        assert!(dict.has_name(b"Type", b"Page"));
        assert_eq!(
            dict.get(b"Contents").and_then(Object::as_reference),
            Some(ObjectId::new(4, 0))
        );
        let media = dict.get(b"MediaBox").and_then(Object::as_array).unwrap();
        assert_eq!(media.len(), 4);
        assert_eq!(media[2].as_f64(), Some(612.0));
    }

    #[test]
    fn test_content_reader_never_builds_references() {
        let mut parser = Parser::for_content(b"1 0 R", 0);
        assert_eq!(parser.parse_object().unwrap(), Object::Integer(1));
    }

    #[test]
    fn test_literal_escapes() {
        let obj = parse(b"(a\\(b\\) \\101\\\nc (d))");
        assert_eq!(obj.as_string().unwrap().bytes, b"a(b) Ac (d)");
    }

    #[test]
    fn test_hex_string_with_odd_digits() {
        let obj = parse(b"<48 65 6C 6C 6>");
        let s = obj.as_string().unwrap();
        assert_eq!(s.format, StringFormat::Hex);
        assert_eq!(s.bytes, vec![0x48, 0x65, 0x6c, 0x6c, 0x60]);
    }

    #[test]
    fn test_name_hex_escape() {
        assert_eq!(parse(b"/A#20B"), Object::Name(b"A B".to_vec()));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse(b"-.5"), Object::Real(-0.5));
        assert_eq!(parse(b"+7"), Object::Integer(7));
        assert_eq!(parse(b"3."), Object::Real(3.0));
    }

    #[test]
    fn test_parse_body_uses_length() {
        let body = b" << /Length 5 >>\nstream\nabcde\nendstream\n";
        let parsed = parse_body(body, None).unwrap();
        let range = parsed.stream.unwrap();
        assert_eq!(&body[range], b"abcde");
    }

    #[test]
    fn test_parse_body_recovers_from_bad_length() {
        let body = b"<< /Length 99 >>\r\nstream\r\nxyz\r\nendstream";
        let parsed = parse_body(body, None).unwrap();
        assert_eq!(&body[parsed.stream.unwrap()], b"xyz");
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let mut bytes = vec![b'['; 80];
        bytes.extend(vec![b']'; 80]);
        assert!(Parser::new(&bytes).parse_object().is_err());
    }
}
