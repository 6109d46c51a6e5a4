//! Incremental update writer.
//!
//! Objects that are new or whose body differs from the original map are
//! appended after a verbatim copy of the original bytes, followed by a
//! cross-reference section covering only those objects and a trailer that
//! chains to the previous cross-reference offset.

use std::fmt::Write as _;

use tracing::debug;

use crate::error::{RedactorError, RedactorResult};
use crate::pdf::lexer::is_whitespace;
use crate::pdf::object::ObjectId;
use crate::pdf::object_map::ObjectMap;

/// Ids of objects in `working` that are absent from or differ from `original`.
pub fn changed_objects(original: &ObjectMap, working: &ObjectMap) -> Vec<ObjectId> {
    working
        .iter()
        .filter(|(id, body)| original.get(*id) != Some(*body))
        .map(|(id, _)| id)
        .collect()
}

/// Appends an incremental update for every changed object. Returns the
/// original bytes unchanged when nothing differs.
pub fn rebuild(
    original_bytes: &[u8],
    original: &ObjectMap,
    working: &ObjectMap,
) -> RedactorResult<Vec<u8>> {
    let changed = changed_objects(original, working);
    if changed.is_empty() {
        return Ok(original_bytes.to_vec());
    }
    let trailer = original.trailer();
    let root = trailer
        .root()
        .ok_or_else(|| RedactorError::structure("missing /Root"))?;

    let mut out = Vec::with_capacity(original_bytes.len() + changed.len() * 256);
    out.extend_from_slice(original_bytes);
    if !matches!(out.last(), Some(b'\n' | b'\r')) {
        out.push(b'\n');
    }

    let mut offsets = Vec::with_capacity(changed.len());
    for id in &changed {
        let body = working.get(*id).unwrap_or_default();
        offsets.push((*id, out.len()));
        out.extend_from_slice(format!("{} {} obj", id.number, id.generation).as_bytes());
        if !body.first().is_some_and(|&b| is_whitespace(b)) {
            out.push(b'\n');
        }
        out.extend_from_slice(body);
        if !body.last().is_some_and(|&b| is_whitespace(b)) {
            out.push(b'\n');
        }
        out.extend_from_slice(b"endobj\n");
    }

    let xref_offset = out.len();
    out.extend_from_slice(xref_section(&offsets).as_bytes());

    let size = i64::from(working.max_number()) + 1;
    let size = trailer.size().map_or(size, |declared| declared.max(size));
    let mut dict = format!("<< /Size {size} /Root {} {} R", root.number, root.generation);
    if let Some(prev) = trailer.start_xref() {
        let _ = write!(dict, " /Prev {prev}");
    }
    let mut dict = dict.into_bytes();
    if let Some(id) = trailer.document_id() {
        dict.extend_from_slice(b" /ID ");
        id.write_to(&mut dict);
    }
    dict.extend_from_slice(b" >>");

    out.extend_from_slice(b"trailer\n");
    out.extend_from_slice(&dict);
    out.extend_from_slice(format!("\nstartxref\n{xref_offset}\n%%EOF\n").as_bytes());
    debug!(objects = changed.len(), xref_offset, "wrote incremental update");
    Ok(out)
}

/// Builds an `xref` section with one subsection per run of consecutive
/// object numbers. `offsets` must be sorted by id.
fn xref_section(offsets: &[(ObjectId, usize)]) -> String {
    let mut out = String::from("xref\n");
    let mut i = 0;
    while i < offsets.len() {
        let mut j = i + 1;
        while j < offsets.len() && offsets[j - 1].0.number.checked_add(1) == Some(offsets[j].0.number) {
            j += 1;
        }
        let _ = writeln!(out, "{} {}", offsets[i].0.number, j - i);
        for (id, offset) in &offsets[i..j] {
            let _ = write!(out, "{:010} {:05} n \n", offset, id.generation);
        }
        i = j;
    }
    out
}
