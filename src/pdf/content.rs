//! Content stream tokenizing and page content decoding.
//!
//! [`tokenize`] turns decoded content into operations whose operands keep
//! their byte spans, so rewriters can splice individual operands back into
//! the original bytes. [`page_content`] gathers every content stream drawn
//! for a page, including the streams of invoked form XObjects.

use std::collections::HashSet;
use std::ops::Range;

use memchr::memmem;
use tracing::{debug, warn};

use crate::pdf::lexer::{is_regular, is_whitespace, Cursor};
use crate::pdf::object::{Dictionary, Object, ObjectId};
use crate::pdf::object_map::ObjectMap;
use crate::pdf::parser::Parser;

/// An operand with its byte span in the content buffer. For arrays, `items`
/// holds the span of every element.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub object: Object,
    pub span: Range<usize>,
    pub items: Vec<Range<usize>>,
}

/// One content operator and the operands preceding it.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub operator: Vec<u8>,
    pub operands: Vec<Operand>,
    /// From the first operand (or the operator) to the end of the operator.
    pub span: Range<usize>,
}

impl Operation {
    pub fn is(&self, operator: &[u8]) -> bool {
        self.operator == operator
    }

    pub fn is_text_show(&self) -> bool {
        matches!(self.operator.as_slice(), b"Tj" | b"TJ" | b"'" | b"\"")
    }
}

/// Splits decoded content into operations. Malformed bytes are skipped.
/// Inline images become a single `BI` operation with no operands.
pub fn tokenize(content: &[u8]) -> Vec<Operation> {
    let mut ops = Vec::new();
    let mut operands: Vec<Operand> = Vec::new();
    let mut cur = Cursor::new(content);
    loop {
        cur.skip_ws();
        let Some(b) = cur.peek() else {
            break;
        };
        let start = cur.pos();
        match b {
            b'/' | b'<' | b'(' | b'+' | b'-' | b'.' | b'0'..=b'9' => {
                let mut parser = Parser::for_content(content, start);
                match parser.parse_object() {
                    Ok(object) => {
                        let end = parser.position();
                        operands.push(Operand {
                            object,
                            span: start..end,
                            items: Vec::new(),
                        });
                        cur.set_pos(end);
                    }
                    Err(_) => {
                        operands.clear();
                        cur.set_pos(start + 1);
                    }
                }
            }
            b'[' => match read_array(content, start) {
                Some(operand) => {
                    cur.set_pos(operand.span.end);
                    operands.push(operand);
                }
                None => {
                    operands.clear();
                    cur.set_pos(start + 1);
                }
            },
            _ if is_regular(b) => {
                let keyword = cur.read_regular();
                match keyword {
                    b"true" | b"false" | b"null" => {
                        let object = match keyword {
                            b"true" => Object::Boolean(true),
                            b"false" => Object::Boolean(false),
                            _ => Object::Null,
                        };
                        operands.push(Operand {
                            object,
                            span: start..cur.pos(),
                            items: Vec::new(),
                        });
                    }
                    b"BI" => {
                        let end = skip_inline_image(content, cur.pos());
                        cur.set_pos(end);
                        operands.clear();
                        ops.push(Operation {
                            operator: b"BI".to_vec(),
                            operands: Vec::new(),
                            span: start..end,
                        });
                    }
                    _ => {
                        let span_start = operands.first().map_or(start, |o| o.span.start);
                        ops.push(Operation {
                            operator: keyword.to_vec(),
                            operands: std::mem::take(&mut operands),
                            span: span_start..cur.pos(),
                        });
                    }
                }
            }
            _ => {
                // Stray delimiter.
                operands.clear();
                cur.set_pos(start + 1);
            }
        }
    }
    ops
}

fn read_array(content: &[u8], start: usize) -> Option<Operand> {
    let mut cur = Cursor::at(content, start + 1);
    let mut values = Vec::new();
    let mut items = Vec::new();
    loop {
        cur.skip_ws();
        match cur.peek()? {
            b']' => {
                cur.bump();
                return Some(Operand {
                    object: Object::Array(values),
                    span: start..cur.pos(),
                    items,
                });
            }
            _ => {
                let item_start = cur.pos();
                let mut parser = Parser::for_content(content, item_start);
                let value = parser.parse_object().ok()?;
                let end = parser.position();
                values.push(value);
                items.push(item_start..end);
                cur.set_pos(end);
            }
        }
    }
}

/// Returns the position after the `EI` closing an inline image whose `BI`
/// keyword ends at `pos`.
fn skip_inline_image(content: &[u8], pos: usize) -> usize {
    let Some(id_rel) = memmem::find_iter(&content[pos..], b"ID").find(|&at| {
        let abs = pos + at;
        (abs == 0 || !is_regular(content[abs - 1]))
            && content.get(abs + 2).map_or(true, |&b| is_whitespace(b))
    }) else {
        return content.len();
    };
    let data_start = pos + id_rel + 3;
    if data_start >= content.len() {
        return content.len();
    }
    memmem::find_iter(&content[data_start..], b"EI")
        .map(|at| data_start + at)
        .find(|&abs| {
            abs > 0
                && is_whitespace(content[abs - 1])
                && content.get(abs + 2).map_or(true, |&b| !is_regular(b))
        })
        .map_or(content.len(), |abs| abs + 2)
}

/// Where a content segment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Page,
    Form,
}

/// One decoded stream inside [`PageContent::data`].
#[derive(Debug, Clone)]
pub struct ContentSegment {
    pub id: ObjectId,
    pub kind: SegmentKind,
    pub range: Range<usize>,
}

/// The decoded content of a page: every `/Contents` stream in order, each
/// followed by the forms it invokes, separated by newlines.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub data: Vec<u8>,
    pub segments: Vec<ContentSegment>,
    /// Streams that could not be decoded, as `stream N G: reason`.
    pub warnings: Vec<String>,
}

/// Content stream ids named by a page's `/Contents`.
pub fn content_keys(map: &ObjectMap, page: &Dictionary) -> Vec<ObjectId> {
    match page.get(b"Contents") {
        Some(Object::Array(items)) => items.iter().filter_map(Object::as_reference).collect(),
        Some(Object::Reference(id)) => match map.parsed(*id) {
            // A reference to an array of references.
            Ok(parsed) if parsed.stream.is_none() => parsed
                .object
                .as_array()
                .map(|items| items.iter().filter_map(Object::as_reference).collect())
                .unwrap_or_default(),
            _ => vec![*id],
        },
        _ => Vec::new(),
    }
}

/// Decodes the content drawn for `page`, inlining invoked forms.
pub fn page_content(
    map: &ObjectMap,
    page: &Dictionary,
    resources: Option<&Dictionary>,
) -> PageContent {
    let mut content = PageContent::default();
    let mut visited = HashSet::new();
    for id in content_keys(map, page) {
        let data = match map.stream(id) {
            Ok((_, data)) => data,
            Err(err) => {
                warn!(object = %id, error = %err, "skipping content stream");
                content.warnings.push(format!("stream {id}: {err}"));
                continue;
            }
        };
        push_segment(&mut content, id, SegmentKind::Page, &data);
        if let Some(resources) = resources {
            for form in invoked_xobjects(map, &data, resources) {
                append_form(map, form, resources, &mut content, &mut visited);
            }
        }
    }
    content
}

fn push_segment(content: &mut PageContent, id: ObjectId, kind: SegmentKind, data: &[u8]) {
    let start = content.data.len();
    content.data.extend_from_slice(data);
    content.segments.push(ContentSegment {
        id,
        kind,
        range: start..content.data.len(),
    });
    content.data.push(b'\n');
}

fn append_form(
    map: &ObjectMap,
    id: ObjectId,
    parent_resources: &Dictionary,
    content: &mut PageContent,
    visited: &mut HashSet<ObjectId>,
) {
    if !visited.insert(id) {
        return;
    }
    let (dict, data) = match map.stream(id) {
        Ok(stream) => stream,
        Err(err) => {
            warn!(object = %id, error = %err, "skipping form XObject");
            content.warnings.push(format!("stream {id}: {err}"));
            return;
        }
    };
    if !dict.has_name(b"Subtype", b"Form") {
        return;
    }
    debug!(object = %id, "inlining form XObject");
    push_segment(content, id, SegmentKind::Form, &data);
    let resources = form_resources(map, &dict).unwrap_or_else(|| parent_resources.clone());
    for child in invoked_xobjects(map, &data, &resources) {
        append_form(map, child, &resources, content, visited);
    }
}

/// A form's own `/Resources`, if declared.
pub fn form_resources(map: &ObjectMap, form: &Dictionary) -> Option<Dictionary> {
    form.get(b"Resources").and_then(|r| map.resolve_dict(r))
}

/// XObjects invoked by `Do` in `data`, deduplicated, in first-use order.
pub fn invoked_xobjects(map: &ObjectMap, data: &[u8], resources: &Dictionary) -> Vec<ObjectId> {
    let Some(xobjects) = resources
        .get(b"XObject")
        .and_then(|x| map.resolve_dict(x))
    else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    tokenize(data)
        .iter()
        .filter(|op| op.is(b"Do"))
        .filter_map(|op| op.operands.last()?.object.as_name().map(<[u8]>::to_vec))
        .filter_map(|name| xobjects.get(&name).and_then(Object::as_reference))
        .filter(|id| seen.insert(*id))
        .collect()
}
