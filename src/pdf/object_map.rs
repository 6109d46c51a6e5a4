//! Object map builder.
//!
//! Scans raw document bytes for `N G obj ... endobj` spans instead of
//! walking the cross-reference chain, expands object streams, and folds in
//! entries only reachable through cross-reference streams. The result maps
//! every object id to the raw bytes between `obj` and `endobj`; when an id
//! occurs more than once the later occurrence wins, which matches how
//! incremental updates shadow earlier revisions.

use std::collections::{BTreeMap, HashMap};

use memchr::memmem;
use once_cell::sync::Lazy;
use regex::bytes::Regex;
use tracing::{debug, warn};

use crate::error::{RedactorError, RedactorResult};
use crate::pdf::filters::decode_stream;
use crate::pdf::lexer::{is_regular, is_whitespace, Cursor};
use crate::pdf::object::{Dictionary, Object, ObjectId};
use crate::pdf::parser::{parse_body, ParsedBody, Parser};

static ROOT_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/Root\s+(\d+)\s+(\d+)\s+R").expect("valid regex"));

static START_XREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"startxref\s+(\d+)").expect("valid regex"));

const MAX_REFERENCE_CHAIN: usize = 32;

/// Flat `(number, generation) -> raw body` map of a document.
#[derive(Debug, Clone, Default)]
pub struct ObjectMap {
    objects: BTreeMap<ObjectId, Vec<u8>>,
    trailer: Trailer,
}

/// Trailer facts collected from classic trailers and cross-reference
/// stream dictionaries, oldest first.
#[derive(Debug, Clone, Default)]
pub struct Trailer {
    dicts: Vec<Dictionary>,
    root_fallback: Option<ObjectId>,
    start_xref: Option<usize>,
}

impl Trailer {
    /// Catalog reference from the most recent trailer that declares one.
    pub fn root(&self) -> Option<ObjectId> {
        self.dicts
            .iter()
            .rev()
            .find_map(|d| d.get(b"Root").and_then(Object::as_reference))
            .or(self.root_fallback)
    }

    pub fn document_id(&self) -> Option<&Object> {
        self.dicts.iter().rev().find_map(|d| d.get(b"ID"))
    }

    pub fn is_encrypted(&self) -> bool {
        self.dicts.iter().any(|d| d.contains(b"Encrypt"))
    }

    /// Largest `/Size` declared by any trailer.
    pub fn size(&self) -> Option<i64> {
        self.dicts
            .iter()
            .filter_map(|d| d.get(b"Size").and_then(Object::as_i64))
            .max()
    }

    /// Offset named by the last `startxref` keyword.
    pub fn start_xref(&self) -> Option<usize> {
        self.start_xref
    }
}

struct RawEntry {
    id: ObjectId,
    offset: usize,
    body: std::ops::Range<usize>,
}

impl ObjectMap {
    pub fn build(bytes: &[u8]) -> Self {
        let entries = scan_objects(bytes);
        let mut objects = BTreeMap::new();
        let mut containers = Vec::new();
        let mut trailer_dicts: Vec<(usize, Dictionary)> = Vec::new();
        let mut xref_streams = Vec::new();
        let mut offsets = HashMap::new();

        for entry in &entries {
            let body = &bytes[entry.body.clone()];
            objects.insert(entry.id, body.to_vec());
            offsets.insert(entry.id, entry.offset);
            if memmem::find(body, b"ObjStm").is_some() {
                containers.push((entry.id, entry.offset));
            }
            if memmem::find(body, b"XRef").is_some() {
                if let Ok(parsed) = parse_body(body, None) {
                    if let Some(dict) = parsed.dict().filter(|d| d.has_name(b"Type", b"XRef")) {
                        trailer_dicts.push((entry.offset, dict.clone()));
                        xref_streams.push(entry.id);
                    }
                }
            }
        }

        let mut map = Self {
            objects,
            trailer: Trailer::default(),
        };

        for (container, container_offset) in containers {
            match map.expand_object_stream(container) {
                Ok(Some(members)) => {
                    debug!(object = %container, members = members.len(), "expanded object stream");
                    // A direct object written after the container is a newer revision.
                    for (id, body) in members {
                        if offsets.get(&id).map_or(true, |&direct| direct < container_offset) {
                            map.objects.insert(id, body);
                        }
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(object = %container, error = %err, "skipping object stream"),
            }
        }

        for xref in xref_streams {
            if let Err(err) = map.fold_xref_stream(bytes, xref) {
                warn!(object = %xref, error = %err, "skipping cross-reference stream");
            }
        }

        trailer_dicts.extend(classic_trailers(bytes));
        trailer_dicts.sort_by_key(|(offset, _)| *offset);
        map.trailer = Trailer {
            dicts: trailer_dicts.into_iter().map(|(_, d)| d).collect(),
            root_fallback: ROOT_REF
                .captures_iter(bytes)
                .last()
                .and_then(|c| Some(ObjectId::new(parse_digits(&c[1])?, parse_digits(&c[2])?))),
            start_xref: START_XREF
                .captures_iter(bytes)
                .last()
                .and_then(|c| parse_digits(&c[1])),
        };
        debug!(objects = map.objects.len(), "built object map");
        map
    }

    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    pub fn get(&self, id: ObjectId) -> Option<&[u8]> {
        self.objects.get(&id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Replaces (or adds) the body of `id`.
    pub fn insert(&mut self, id: ObjectId, body: Vec<u8>) {
        self.objects.insert(id, body);
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &[u8])> {
        self.objects.iter().map(|(id, body)| (*id, body.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn max_number(&self) -> u32 {
        self.objects.keys().map(|id| id.number).max().unwrap_or(0)
    }

    /// Parses the body of `id`, resolving an indirect `/Length` if needed.
    pub fn parsed(&self, id: ObjectId) -> RedactorResult<ParsedBody> {
        let body = self
            .get(id)
            .ok_or_else(|| RedactorError::structure(format!("object {id} not found")))?;
        let parsed = parse_body(body, None)?;
        if parsed.stream.is_none() {
            return Ok(parsed);
        }
        let indirect_len = parsed
            .dict()
            .and_then(|d| d.get(b"Length"))
            .and_then(Object::as_reference)
            .and_then(|len_id| self.resolve(&Object::Reference(len_id)))
            .and_then(|o| o.as_i64())
            .and_then(|v| usize::try_from(v).ok());
        match indirect_len {
            Some(len) => parse_body(body, Some(len)),
            None => Ok(parsed),
        }
    }

    /// Dictionary of `id`, whether or not it carries a stream.
    pub fn dict(&self, id: ObjectId) -> Option<Dictionary> {
        match self.parsed(id).ok()?.object {
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Follows references until a direct object is reached.
    pub fn resolve(&self, object: &Object) -> Option<Object> {
        let mut current = object.clone();
        for _ in 0..MAX_REFERENCE_CHAIN {
            match current {
                Object::Reference(id) => {
                    let body = self.get(id)?;
                    current = Parser::new(body).parse_object().ok()?;
                }
                other => return Some(other),
            }
        }
        None
    }

    /// Resolves `object` to a dictionary, following a reference if needed.
    pub fn resolve_dict(&self, object: &Object) -> Option<Dictionary> {
        match self.resolve(object)? {
            Object::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Dictionary and decoded data of a stream object.
    pub fn stream(&self, id: ObjectId) -> RedactorResult<(Dictionary, Vec<u8>)> {
        let parsed = self.parsed(id)?;
        let (Object::Dictionary(dict), Some(range)) = (parsed.object, parsed.stream) else {
            return Err(RedactorError::Stream {
                object: id,
                reason: "object is not a stream".to_string(),
            });
        };
        let body = self.get(id).unwrap_or_default();
        let data = decode_stream(id, &dict, &body[range])?;
        Ok((dict, data))
    }

    fn expand_object_stream(&self, id: ObjectId) -> RedactorResult<Option<Vec<(ObjectId, Vec<u8>)>>> {
        let parsed = self.parsed(id)?;
        if !parsed.dict().is_some_and(|d| d.has_name(b"Type", b"ObjStm")) {
            return Ok(None);
        }
        let (dict, data) = self.stream(id)?;
        let first = dict
            .get(b"First")
            .and_then(Object::as_i64)
            .and_then(|v| usize::try_from(v).ok())
            .filter(|&v| v > 0 && v <= data.len())
            .ok_or_else(|| RedactorError::structure("object stream without usable /First"))?;
        let declared = dict
            .get(b"N")
            .and_then(Object::as_i64)
            .and_then(|v| usize::try_from(v).ok());

        let mut header = Vec::new();
        let mut cur = Cursor::new(&data[..first]);
        loop {
            cur.skip_ws();
            let num = cur.read_regular();
            cur.skip_ws();
            let off = cur.read_regular();
            match (parse_digits::<u32>(num), parse_digits::<usize>(off)) {
                (Some(num), Some(off)) => header.push((num, off)),
                _ => break,
            }
        }
        if let Some(n) = declared {
            header.truncate(n);
        }

        let content = &data[first..];
        let mut members = Vec::with_capacity(header.len());
        for (i, &(num, off)) in header.iter().enumerate() {
            let end = header
                .get(i + 1)
                .map(|&(_, next)| next)
                .unwrap_or(content.len())
                .min(content.len());
            if off >= end {
                continue;
            }
            // Members are never generation-bearing.
            members.push((ObjectId::new(num, 0), content[off..end].to_vec()));
        }
        Ok(Some(members))
    }

    fn fold_xref_stream(&mut self, bytes: &[u8], id: ObjectId) -> RedactorResult<()> {
        let (dict, data) = self.stream(id)?;
        let widths: Vec<usize> = dict
            .get(b"W")
            .and_then(Object::as_array)
            .map(|w| {
                w.iter()
                    .filter_map(|v| v.as_i64().and_then(|v| usize::try_from(v).ok()))
                    .collect()
            })
            .unwrap_or_default();
        if widths.len() < 3 || widths.iter().any(|&w| w > 8) {
            return Err(RedactorError::structure("cross-reference stream with bad /W"));
        }
        let row = widths[0] + widths[1] + widths[2];
        if row == 0 {
            return Ok(());
        }
        let size = dict.get(b"Size").and_then(Object::as_i64).unwrap_or(0);
        let index: Vec<i64> = match dict.get(b"Index").and_then(Object::as_array) {
            Some(items) => items.iter().filter_map(Object::as_i64).collect(),
            None => vec![0, size],
        };

        let mut numbers = index
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .flat_map(|pair| pair[0]..pair[0].saturating_add(pair[1].max(0)));
        let mut added = 0usize;
        for chunk in data.chunks(row) {
            let Some(number) = numbers.next() else {
                break;
            };
            if chunk.len() < row {
                break;
            }
            let kind = if widths[0] == 0 { 1 } else { read_be(&chunk[..widths[0]]) };
            let f2 = read_be(&chunk[widths[0]..widths[0] + widths[1]]);
            let f3 = read_be(&chunk[widths[0] + widths[1]..]);
            let Ok(number) = u32::try_from(number) else {
                continue;
            };
            match kind {
                1 => {
                    let generation = u16::try_from(f3).unwrap_or(0);
                    let target = ObjectId::new(number, generation);
                    if self.contains(target) {
                        continue;
                    }
                    let Ok(offset) = usize::try_from(f2) else {
                        continue;
                    };
                    if let Some((found, body)) = object_at(bytes, offset) {
                        if found == target {
                            self.objects.insert(found, bytes[body].to_vec());
                            added += 1;
                        }
                    }
                }
                2 => {
                    let target = ObjectId::new(number, 0);
                    if self.contains(target) {
                        continue;
                    }
                    let Ok(container) = u32::try_from(f2) else {
                        continue;
                    };
                    let members = self
                        .expand_object_stream(ObjectId::new(container, 0))
                        .ok()
                        .flatten()
                        .unwrap_or_default();
                    if let Some((_, body)) = members.into_iter().find(|(m, _)| *m == target) {
                        self.objects.insert(target, body);
                        added += 1;
                    }
                }
                _ => {}
            }
        }
        if added > 0 {
            debug!(object = %id, added, "folded cross-reference stream entries");
        }
        Ok(())
    }
}

fn read_be(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b))
}

fn parse_digits<T: std::str::FromStr>(digits: &[u8]) -> Option<T> {
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn scan_objects(bytes: &[u8]) -> Vec<RawEntry> {
    let finder = memmem::Finder::new(b"obj");
    let mut entries = Vec::new();
    let mut pos = 0;
    while let Some(rel) = finder.find(&bytes[pos..]) {
        let kw = pos + rel;
        pos = kw + 3;
        if bytes.get(kw + 3).is_some_and(|&b| is_regular(b)) {
            continue;
        }
        let Some((id, header_start)) = header_before(bytes, kw) else {
            continue;
        };
        let Some((body_end, after)) = body_end(bytes, kw + 3) else {
            warn!(object = %id, "object without endobj");
            continue;
        };
        entries.push(RawEntry {
            id,
            offset: header_start,
            body: kw + 3..body_end,
        });
        pos = after;
    }
    entries
}

/// Reads `N G` backwards from the `obj` keyword at `kw`.
fn header_before(bytes: &[u8], kw: usize) -> Option<(ObjectId, usize)> {
    let mut i = kw;
    let skip_ws = |i: &mut usize| {
        let start = *i;
        while *i > 0 && is_whitespace(bytes[*i - 1]) {
            *i -= 1;
        }
        *i < start
    };
    let read_digits = |i: &mut usize| {
        let end = *i;
        while *i > 0 && bytes[*i - 1].is_ascii_digit() {
            *i -= 1;
        }
        (*i < end).then_some(*i..end)
    };
    if !skip_ws(&mut i) {
        return None;
    }
    let generation = read_digits(&mut i)?;
    if !skip_ws(&mut i) {
        return None;
    }
    let number = read_digits(&mut i)?;
    if i > 0 && is_regular(bytes[i - 1]) {
        return None;
    }
    let id = ObjectId::new(
        parse_digits(&bytes[number])?,
        parse_digits(&bytes[generation])?,
    );
    Some((id, i))
}

/// Finds the end of an object body starting right after `obj`. Returns the
/// body end and the position after `endobj`.
fn body_end(bytes: &[u8], body_start: usize) -> Option<(usize, usize)> {
    let endobj = memmem::find(&bytes[body_start..], b"endobj")? + body_start;
    let search_from = match stream_keyword(&bytes[body_start..endobj]) {
        Some(rel) => stream_data_end(bytes, body_start, body_start + rel)?,
        None => return Some((endobj, endobj + 6)),
    };
    let end = memmem::find(&bytes[search_from..], b"endobj")? + search_from;
    Some((end, end + 6))
}

/// Position of a `stream` keyword that is not the tail of `endstream`.
fn stream_keyword(hay: &[u8]) -> Option<usize> {
    memmem::find_iter(hay, b"stream").find(|&at| !(at >= 3 && &hay[at - 3..at] == b"end"))
}

/// Position just after `endstream` for a stream whose keyword is at `kw`.
fn stream_data_end(bytes: &[u8], body_start: usize, kw: usize) -> Option<usize> {
    let mut cur = Cursor::at(bytes, kw + 6);
    cur.skip_eol();
    let data_start = cur.pos();
    let declared = Parser::new(&bytes[body_start..kw])
        .parse_object()
        .ok()
        .and_then(|o| o.as_dict()?.get(b"Length")?.as_i64())
        .and_then(|len| usize::try_from(len).ok());
    if let Some(end) = declared.and_then(|len| data_start.checked_add(len)) {
        if end <= bytes.len() {
            let mut check = Cursor::at(bytes, end);
            check.skip_ws();
            if check.eat_keyword(b"endstream") {
                return Some(check.pos());
            }
        }
    }
    let rel = memmem::find(&bytes[data_start..], b"endstream")?;
    Some(data_start + rel + 9)
}

/// Object (id and body range) whose header starts at `offset`.
fn object_at(bytes: &[u8], offset: usize) -> Option<(ObjectId, std::ops::Range<usize>)> {
    let mut cur = Cursor::at(bytes, offset);
    cur.skip_ws();
    let number = parse_digits(cur.read_regular())?;
    cur.skip_ws();
    let generation = parse_digits(cur.read_regular())?;
    cur.skip_ws();
    if !cur.eat_keyword(b"obj") {
        return None;
    }
    let start = cur.pos();
    let (end, _) = body_end(bytes, start)?;
    Some((ObjectId::new(number, generation), start..end))
}

fn classic_trailers(bytes: &[u8]) -> Vec<(usize, Dictionary)> {
    memmem::find_iter(bytes, b"trailer")
        .filter_map(|at| {
            let mut parser = Parser::new(&bytes[at + 7..]);
            match parser.parse_object() {
                Ok(Object::Dictionary(d)) => Some((at, d)),
                _ => None,
            }
        })
        .collect()
}
