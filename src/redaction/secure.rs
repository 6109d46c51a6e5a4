//! Secure redaction strategy that rewrites content-stream text.
//!
//! This strategy:
//! 1. Decodes each page's content streams and invoked forms
//! 2. Binds every text-show operator to its extracted run
//! 3. Blanks characters covered by rectangles or matching plain terms
//! 4. Splices the changed string operands back and re-encodes the stream
//!
//! **Security**: masked characters are replaced in the object bodies
//! themselves, so they cannot be extracted from the output.

use std::collections::BTreeMap;
use std::ops::Range;

use tracing::{debug, info, warn};

use super::matcher::run_scale;
use super::strategy::{RedactionPlan, RedactionRect, RedactionResult, RedactionStrategy};
use crate::config::EngineConfig;
use crate::error::{RedactorError, RedactorResult};
use crate::pdf::content::{page_content, tokenize, Operation};
use crate::pdf::filters::{stream_body, stream_encoding};
use crate::pdf::{Object, ObjectId, ObjectMap, PageTree, PdfString};
use crate::text::encoding::{decode, mask_string, DecodedString};
use crate::text::extract::extract_runs;
use crate::text::width::char_width;
use crate::text::TextRun;

/// Secure redaction strategy that physically removes text.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureRedactionStrategy;

impl SecureRedactionStrategy {
    pub fn new() -> Self {
        Self
    }

    fn rewrite_page(
        &self,
        working: &mut ObjectMap,
        page_id: ObjectId,
        rects: &[RedactionRect],
        plan: &RedactionPlan<'_>,
        result: &mut RedactionResult,
    ) -> RedactorResult<bool> {
        let page = working
            .dict(page_id)
            .ok_or_else(|| RedactorError::structure(format!("page object {page_id} not found")))?;
        let resources = PageTree::new(working, plan.config.parent_depth).resources(&page);
        let content = page_content(working, &page, resources.as_ref());
        result.warnings.extend(content.warnings.iter().cloned());
        let runs = extract_runs(&content.data);

        let mut binder = RunBinder::new(&runs, plan.config.resync_window);
        let mut page_changed = false;
        for segment in &content.segments {
            let data = &content.data[segment.range.clone()];
            let mut edits = Vec::new();
            for op in tokenize(data).iter().filter(|op| op.is_text_show()) {
                let absolute = op.span.start + segment.range.start..op.span.end + segment.range.start;
                let masked = mask_operation(op, absolute, &mut binder, rects, plan);
                if !masked.is_empty() {
                    result.instances_redacted += 1;
                }
                edits.extend(masked);
            }
            if edits.is_empty() {
                continue;
            }
            let rewritten = splice(data, edits);
            if rewritten == data {
                continue;
            }
            match store_stream(working, segment.id, &rewritten) {
                Ok(()) => {
                    debug!(object = %segment.id, kind = ?segment.kind, "rewrote content stream");
                    result.changed_objects.push(segment.id);
                    page_changed = true;
                }
                Err(err) => {
                    warn!(object = %segment.id, error = %err, "could not re-encode stream");
                    result.warnings.push(format!("stream {}: {err}", segment.id));
                }
            }
        }
        Ok(page_changed)
    }
}

impl RedactionStrategy for SecureRedactionStrategy {
    fn name(&self) -> &str {
        "secure"
    }

    fn is_secure(&self) -> bool {
        true
    }

    fn apply(
        &self,
        working: &mut ObjectMap,
        plan: &RedactionPlan<'_>,
    ) -> RedactorResult<RedactionResult> {
        let page_ids = PageTree::new(working, plan.config.parent_depth).pages()?;
        let mut by_page: BTreeMap<usize, Vec<RedactionRect>> = BTreeMap::new();
        for rect in plan.rects {
            if rect.page_num == 0 || rect.page_num > page_ids.len() {
                return Err(RedactorError::PageOutOfRange {
                    page: rect.page_num,
                    total: page_ids.len(),
                });
            }
            by_page.entry(rect.page_num).or_default().push(*rect);
        }
        let pages: Vec<usize> = if plan.terms.is_empty() {
            by_page.keys().copied().collect()
        } else {
            (1..=page_ids.len()).collect()
        };

        let mut result = RedactionResult::none();
        for page_num in pages {
            result.pages_processed += 1;
            let rects = by_page.get(&page_num).map(Vec::as_slice).unwrap_or_default();
            match self.rewrite_page(working, page_ids[page_num - 1], rects, plan, &mut result) {
                Ok(true) => result.pages_modified += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(page = page_num, error = %err, "secure rewrite skipped page");
                    result.warnings.push(format!("page {page_num}: {err}"));
                }
            }
        }
        result.changed_objects.sort();
        result.changed_objects.dedup();
        info!(
            changed = result.changed_objects.len(),
            pages = result.pages_modified,
            "secure rewrite finished"
        );
        Ok(result)
    }
}

/// Walks extracted runs in content order, binding operators to them.
struct RunBinder<'r> {
    runs: &'r [TextRun],
    next: usize,
    window: usize,
}

impl<'r> RunBinder<'r> {
    fn new(runs: &'r [TextRun], window: usize) -> Self {
        Self {
            runs,
            next: 0,
            window,
        }
    }

    /// The run produced by the operator at `span`, else the first run
    /// within the look-ahead window showing the same text.
    fn bind(&mut self, span: &Range<usize>, text: &str) -> Option<&'r TextRun> {
        let rest = self.runs.get(self.next..)?;
        let found = rest.iter().position(|r| r.op_span == *span).or_else(|| {
            rest.iter()
                .take(self.window + 1)
                .position(|r| r.position.text == text)
        })?;
        self.next += found + 1;
        self.runs.get(self.next - 1)
    }
}

/// One string operand of a text-show operator.
struct ShownString<'o> {
    span: Range<usize>,
    string: &'o PdfString,
    decoded: DecodedString,
}

fn shown_strings(op: &Operation) -> Vec<ShownString<'_>> {
    let Some(operand) = op.operands.last() else {
        return Vec::new();
    };
    let pairs: Vec<(Range<usize>, &PdfString)> = match &operand.object {
        Object::String(s) if !op.is(b"TJ") => vec![(operand.span.clone(), s)],
        Object::Array(items) if op.is(b"TJ") => items
            .iter()
            .zip(&operand.items)
            .filter_map(|(item, span)| Some((span.clone(), item.as_string()?)))
            .collect(),
        _ => Vec::new(),
    };
    pairs
        .into_iter()
        .map(|(span, string)| ShownString {
            span,
            string,
            decoded: decode(string),
        })
        .collect()
}

/// Replacement bytes for every string operand of `op` that masking changed.
fn mask_operation(
    op: &Operation,
    absolute: Range<usize>,
    binder: &mut RunBinder<'_>,
    rects: &[RedactionRect],
    plan: &RedactionPlan<'_>,
) -> Vec<(Range<usize>, Vec<u8>)> {
    let strings = shown_strings(op);
    let chars: Vec<char> = strings.iter().flat_map(|s| s.decoded.chars.iter().copied()).collect();
    let lead = chars.iter().take_while(|c| c.is_whitespace()).count();
    let trail = chars[lead..].iter().rev().take_while(|c| c.is_whitespace()).count();
    let trimmed = &chars[lead..chars.len() - trail];
    if trimmed.is_empty() {
        return Vec::new();
    }
    let text: String = trimmed.iter().collect();

    let mut mask = vec![false; chars.len()];
    if let Some(run) = binder.bind(&absolute, &text) {
        if !rects.is_empty() {
            let run_mask = rect_mask(run, trimmed, rects, plan.config);
            for (k, hit) in run_mask.into_iter().enumerate() {
                mask[lead + k] |= hit;
            }
        }
    }
    for term in plan.terms {
        term_mask(&chars, term, &mut mask);
    }

    let mut edits = Vec::new();
    let mut offset = 0;
    for shown in &strings {
        let len = shown.decoded.chars.len();
        let local = &mask[offset..offset + len];
        offset += len;
        if !local.iter().any(|&m| m) {
            continue;
        }
        let masked = mask_string(shown.string, &shown.decoded, local);
        if masked.bytes != shown.string.bytes {
            edits.push((shown.span.clone(), Object::String(masked).to_bytes()));
        }
    }
    edits
}

/// Characters of `run` covered by any rectangle. The whole run is masked
/// once a rectangle covers enough of its width.
///
/// A rectangle must overlap more than half of the run's height to touch
/// it. The vertical tolerance only widens that test for the whole-run
/// case; single characters need a strict overlap.
fn rect_mask(run: &TextRun, chars: &[char], rects: &[RedactionRect], config: &EngineConfig) -> Vec<bool> {
    let pos = &run.position;
    let mut mask = vec![false; chars.len()];
    if pos.width <= 0.0 || pos.height <= 0.0 {
        return mask;
    }
    let tolerance = config.vertical_tolerance * pos.height;
    let scale = run_scale(pos, chars);
    for rect in rects {
        let overlap = rect.right().min(pos.x + pos.width) - rect.x.max(pos.x);
        if overlap <= 0.0 {
            continue;
        }
        if overlap / pos.width >= config.whole_run_coverage
            && vertical_overlap(rect, pos.y, pos.height, tolerance) > pos.height / 2.0
        {
            mask.iter_mut().for_each(|m| *m = true);
            break;
        }
        if vertical_overlap(rect, pos.y, pos.height, 0.0) <= pos.height / 2.0 {
            continue;
        }
        let mut x = pos.x;
        for (k, &c) in chars.iter().enumerate() {
            let w = char_width(c) * pos.height * scale;
            let center = x + w / 2.0;
            if center >= rect.x && center <= rect.right() {
                mask[k] = true;
            }
            x += w;
        }
    }
    mask
}

/// Height shared by `rect` and the band `y..y + height` grown by `pad`.
fn vertical_overlap(rect: &RedactionRect, y: f64, height: f64, pad: f64) -> f64 {
    rect.top().min(y + height + pad) - rect.y.max(y - pad)
}

/// Marks every non-overlapping case-insensitive occurrence of `term`.
fn term_mask(chars: &[char], term: &str, mask: &mut [bool]) {
    let fold = |c: char| c.to_lowercase().next().unwrap_or(c);
    let needle: Vec<char> = term.trim().chars().map(fold).collect();
    if needle.is_empty() || needle.len() > chars.len() {
        return;
    }
    let hay: Vec<char> = chars.iter().copied().map(fold).collect();
    let mut i = 0;
    while i + needle.len() <= hay.len() {
        if hay[i..i + needle.len()] == needle[..] {
            mask[i..i + needle.len()].iter_mut().for_each(|m| *m = true);
            i += needle.len();
        } else {
            i += 1;
        }
    }
}

fn splice(data: &[u8], mut edits: Vec<(Range<usize>, Vec<u8>)>) -> Vec<u8> {
    edits.sort_by_key(|(range, _)| range.start);
    let mut out = Vec::with_capacity(data.len());
    let mut cursor = 0;
    for (range, bytes) in edits {
        if range.start < cursor {
            continue;
        }
        out.extend_from_slice(&data[cursor..range.start]);
        out.extend_from_slice(&bytes);
        cursor = range.end;
    }
    out.extend_from_slice(&data[cursor..]);
    out
}

/// Replaces the body of stream `id` with `decoded`, keeping its encoding.
fn store_stream(working: &mut ObjectMap, id: ObjectId, decoded: &[u8]) -> RedactorResult<()> {
    let dict = working
        .dict(id)
        .ok_or_else(|| RedactorError::structure(format!("object {id} not found")))?;
    let encoding = stream_encoding(id, &dict)?;
    let body = stream_body(id, &dict, decoded, encoding)?;
    working.insert(id, body);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::filters::deflate;

    const PAGE: ObjectId = ObjectId {
        number: 3,
        generation: 0,
    };
    const CONTENT: ObjectId = ObjectId {
        number: 4,
        generation: 0,
    };

    fn map_with(content: &[u8], compressed: bool) -> ObjectMap {
        let mut map = ObjectMap::default();
        map.insert(ObjectId::new(1, 0), b" << /Type /Catalog /Pages 2 0 R >> ".to_vec());
        map.insert(ObjectId::new(2, 0), b" << /Type /Pages /Kids [3 0 R] /Count 1 >> ".to_vec());
        map.insert(
            PAGE,
            b" << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >> ".to_vec(),
        );
        let body = if compressed {
            let data = deflate(content).unwrap();
            let mut body = format!("\n<< /Length {} /Filter /FlateDecode >>\nstream\n", data.len())
                .into_bytes();
            body.extend_from_slice(&data);
            body.extend_from_slice(b"\nendstream\n");
            body
        } else {
            let mut body = format!("\n<< /Length {} >>\nstream\n", content.len()).into_bytes();
            body.extend_from_slice(content);
            body.extend_from_slice(b"\nendstream\n");
            body
        };
        map.insert(CONTENT, body);
        map
    }

    fn with_root(map: ObjectMap) -> ObjectMap {
        let mut bytes = b"%PDF-1.4\n".to_vec();
        for (id, body) in map.iter() {
            bytes.extend_from_slice(format!("{} {} obj", id.number, id.generation).as_bytes());
            bytes.extend_from_slice(body);
            bytes.extend_from_slice(b"endobj\n");
        }
        bytes.extend_from_slice(b"trailer\n<< /Size 5 /Root 1 0 R >>\n%%EOF\n");
        ObjectMap::build(&bytes)
    }

    fn run(content: &[u8], rects: &[RedactionRect], terms: &[&str], compressed: bool) -> (ObjectMap, RedactionResult) {
        let mut map = with_root(map_with(content, compressed));
        let terms: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
        let config = EngineConfig::default();
        let plan = RedactionPlan {
            rects,
            terms: &terms,
            config: &config,
        };
        let result = SecureRedactionStrategy::new().apply(&mut map, &plan).unwrap();
        (map, result)
    }

    fn content_of(map: &ObjectMap) -> Vec<u8> {
        map.stream(CONTENT).unwrap().1
    }

    #[test]
    fn test_term_blanks_literal_string() {
        let (map, result) = run(
            b"BT /F1 12 Tf 100 700 Td (Hello Secret World) Tj ET",
            &[],
            &["Secret"],
            false,
        );
        assert_eq!(result.changed_objects, vec![CONTENT]);
        assert_eq!(
            content_of(&map),
            b"BT /F1 12 Tf 100 700 Td (Hello        World) Tj ET".to_vec()
        );
    }

    #[test]
    fn test_rect_blanks_covered_characters() {
        let rect = RedactionRect::new(1, 130.48, 697.0, 34.92, 12.0);
        let (map, _) = run(b"BT /F1 12 Tf 100 700 Td (Hello Secret World) Tj ET", &[rect], &[], true);
        assert_eq!(
            content_of(&map),
            b"BT /F1 12 Tf 100 700 Td (Hello        World) Tj ET".to_vec()
        );
        let dict = map.dict(CONTENT).unwrap();
        assert!(dict.has_name(b"Filter", b"FlateDecode"));
    }

    #[test]
    fn test_rect_covering_run_blanks_it_whole() {
        let rect = RedactionRect::new(1, 99.0, 690.0, 28.0, 20.0);
        let (map, _) = run(b"BT /F1 12 Tf 100 700 Td (Hello) Tj (Kept) Tj ET", &[rect], &[], false);
        let content = content_of(&map);
        assert!(content.windows(7).any(|w| w == b"(     )"));
        // "Kept" starts at x 126.28, just inside the rectangle's right edge.
        assert!(content.windows(6).any(|w| w == b"(Kept)"));
    }

    #[test]
    fn test_rect_on_one_line_leaves_next_line() {
        // The second line sits 14pt lower, inside the vertical tolerance band.
        let rect = RedactionRect::new(1, 100.0, 697.0, 36.0, 12.0);
        let (map, _) = run(
            b"BT /F1 12 Tf 100 700 Td (Secret code) Tj 0 -14 Td (Public info) Tj ET",
            &[rect],
            &[],
            false,
        );
        let content = content_of(&map);
        assert!(content.windows(13).any(|w| w == b"(Public info)"));
        assert!(!content.windows(6).any(|w| w == b"Secret"));
    }

    #[test]
    fn test_wide_rect_does_not_swallow_next_line() {
        let rect = RedactionRect::new(1, 90.0, 697.0, 200.0, 12.0);
        let (map, _) = run(
            b"BT /F1 12 Tf 100 700 Td (Secret) Tj 0 -14 Td (Public) Tj ET",
            &[rect],
            &[],
            false,
        );
        let content = content_of(&map);
        assert!(content.windows(8).any(|w| w == b"(      )"));
        assert!(content.windows(8).any(|w| w == b"(Public)"));
    }

    #[test]
    fn test_tj_array_keeps_spacing_numbers() {
        let (map, _) = run(
            b"BT /F1 12 Tf 100 700 Td [(Hel) -20 (lo Sec) 15 (ret World)] TJ ET",
            &[],
            &["secret"],
            false,
        );
        assert_eq!(
            content_of(&map),
            b"BT /F1 12 Tf 100 700 Td [(Hel) -20 (lo    ) 15 (    World)] TJ ET".to_vec()
        );
    }

    #[test]
    fn test_hex_cid_masked_in_code_units() {
        let (map, _) = run(b"BT /F1 12 Tf 0 0 Td <0053006B0079> Tj ET", &[], &["k"], false);
        assert_eq!(content_of(&map), b"BT /F1 12 Tf 0 0 Td <005300200079> Tj ET".to_vec());
    }

    #[test]
    fn test_second_pass_changes_nothing() {
        let content = b"BT /F1 12 Tf 100 700 Td (Hello Secret World) Tj ET";
        let (map, _) = run(content, &[], &["Secret"], false);
        let mut map = map;
        let terms = vec!["Secret".to_string()];
        let config = EngineConfig::default();
        let plan = RedactionPlan {
            rects: &[],
            terms: &terms,
            config: &config,
        };
        let again = SecureRedactionStrategy::new().apply(&mut map, &plan).unwrap();
        assert!(!again.has_redactions());
    }

    #[test]
    fn test_out_of_range_rect_is_structural() {
        let mut map = with_root(map_with(b"BT (a) Tj ET", false));
        let config = EngineConfig::default();
        let rects = [RedactionRect::new(2, 0.0, 0.0, 1.0, 1.0)];
        let plan = RedactionPlan {
            rects: &rects,
            terms: &[],
            config: &config,
        };
        let err = SecureRedactionStrategy::new().apply(&mut map, &plan).unwrap_err();
        assert!(matches!(err, RedactorError::PageOutOfRange { page: 2, total: 1 }));
    }

    #[test]
    fn test_splice_applies_edits_in_order() {
        let edits = vec![(6..9, b"XYZ".to_vec()), (0..1, b"a".to_vec())];
        assert_eq!(splice(b"A bcd efg", edits), b"a bcd XYZ".to_vec());
    }
}
