//! Search-term matching over extracted text runs.
//!
//! Matching is case-insensitive. A term found inside one run yields a
//! rectangle sliced out of the run box by estimated character widths; a
//! term spanning several runs of the same visual line yields one rectangle
//! around the contributing parts of those runs. Runs that look like URLs
//! are always covered whole.

use std::collections::BTreeMap;

use crate::config::EngineConfig;
use crate::redaction::strategy::RedactionRect;
use crate::text::width::estimate_chars;
use crate::text::{TextPosition, TextRun};

/// Runs further apart than this fraction of their height are joined with a
/// space when building a line.
const JOIN_GAP_FACTOR: f64 = 0.2;
const FALLBACK_LINE_HEIGHT: f64 = 10.0;
const URL_MIN_CHARS: usize = 30;
const SLUG_MIN_CHARS: usize = 40;

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// Whether `text` looks like a URL or a long query-string/slug fragment.
pub fn is_url_token(text: &str) -> bool {
    if text.contains("://") {
        return true;
    }
    let len = text.chars().count();
    if len <= URL_MIN_CHARS || text.contains(' ') {
        return false;
    }
    let specials = text.chars().filter(|c| "&=+%?".contains(*c)).count();
    let hyphens = text.chars().filter(|&c| c == '-').count();
    specials >= 2 || (len > SLUG_MIN_CHARS && hyphens >= 4)
}

/// Every case-insensitive occurrence of `query` in one run, overlapping
/// occurrences included.
pub fn find_in_run(page: usize, pos: &TextPosition, query: &str) -> Vec<RedactionRect> {
    let needle: Vec<char> = query.chars().map(fold).collect();
    let hay: Vec<char> = pos.text.chars().map(fold).collect();
    if needle.is_empty() || needle.len() > hay.len() {
        return Vec::new();
    }
    let starts: Vec<usize> = (0..=hay.len() - needle.len())
        .filter(|&i| hay[i..i + needle.len()] == needle[..])
        .collect();
    if starts.is_empty() {
        return Vec::new();
    }
    if is_url_token(&pos.text) {
        return vec![whole_run(page, pos)];
    }
    let chars: Vec<char> = pos.text.chars().collect();
    let scale = run_scale(pos, &chars);
    starts
        .into_iter()
        .map(|i| {
            let offset = estimate_chars(chars[..i].iter().copied(), pos.height) * scale;
            let width =
                estimate_chars(chars[i..i + needle.len()].iter().copied(), pos.height) * scale;
            RedactionRect::new(page, pos.x + offset, pos.y, width, pos.height)
        })
        .collect()
}

/// Non-overlapping occurrences of `query` spanning two or more runs of one
/// visual line.
pub fn find_across_runs(
    page: usize,
    runs: &[TextRun],
    query: &str,
    config: &EngineConfig,
) -> Vec<RedactionRect> {
    let needle = normalize(query);
    if needle.is_empty() {
        return Vec::new();
    }
    let mut rects = Vec::new();
    for line in group_lines(runs, config.line_factor) {
        if line.len() < 2 {
            continue;
        }
        let joined = join_line(&line);
        let mut i = 0;
        while i + needle.len() <= joined.chars.len() {
            if joined.chars[i..i + needle.len()] != needle[..] {
                i += 1;
                continue;
            }
            if let Some(rect) = span_rect(page, &line, &joined.owners[i..i + needle.len()]) {
                rects.push(rect);
            }
            i += needle.len();
        }
    }
    rects
}

/// Single-run and cross-run matches of `query` on one page.
pub fn find_on_page(
    page: usize,
    runs: &[TextRun],
    query: &str,
    config: &EngineConfig,
) -> Vec<RedactionRect> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }
    let mut rects: Vec<RedactionRect> = runs
        .iter()
        .flat_map(|run| find_in_run(page, &run.position, query))
        .collect();
    rects.extend(find_across_runs(page, runs, query, config));
    rects
}

fn whole_run(page: usize, pos: &TextPosition) -> RedactionRect {
    RedactionRect::new(page, pos.x, pos.y, pos.width, pos.height)
}

/// Factor mapping estimated widths at the run height onto the run width.
pub(crate) fn run_scale(pos: &TextPosition, chars: &[char]) -> f64 {
    let estimated = estimate_chars(chars.iter().copied(), pos.height);
    if estimated > 0.0 {
        pos.width / estimated
    } else {
        1.0
    }
}

fn normalize(text: &str) -> Vec<char> {
    let mut out = Vec::new();
    for c in text.trim().chars() {
        if c.is_whitespace() {
            if out.last() != Some(&' ') {
                out.push(' ');
            }
        } else {
            out.push(fold(c));
        }
    }
    out
}

/// Groups runs top to bottom into lines, each sorted left to right.
fn group_lines(runs: &[TextRun], line_factor: f64) -> Vec<Vec<&TextRun>> {
    let mut sorted: Vec<&TextRun> = runs.iter().collect();
    sorted.sort_by(|a, b| {
        b.position
            .y
            .total_cmp(&a.position.y)
            .then(a.position.x.total_cmp(&b.position.x))
    });
    let mut lines: Vec<Vec<&TextRun>> = Vec::new();
    for run in sorted {
        let height = if run.position.height > 0.0 {
            run.position.height
        } else {
            FALLBACK_LINE_HEIGHT
        };
        match lines.last_mut() {
            Some(line) if (run.position.y - line[0].position.y).abs() < line_factor * height => {
                line.push(run)
            }
            _ => lines.push(vec![run]),
        }
    }
    for line in &mut lines {
        line.sort_by(|a, b| a.position.x.total_cmp(&b.position.x));
    }
    lines
}

struct JoinedLine {
    chars: Vec<char>,
    /// `(run index in line, char index in run text)`; `None` for inserted
    /// separators.
    owners: Vec<Option<(usize, usize)>>,
}

fn join_line(line: &[&TextRun]) -> JoinedLine {
    let mut joined = JoinedLine {
        chars: Vec::new(),
        owners: Vec::new(),
    };
    for (k, run) in line.iter().enumerate() {
        if k > 0 {
            let prev = line[k - 1];
            let gap = run.position.x - (prev.position.x + prev.position.width);
            let separated = prev.trailing_ws
                || run.leading_ws
                || gap > JOIN_GAP_FACTOR * run.position.height;
            if separated && joined.chars.last() != Some(&' ') {
                joined.chars.push(' ');
                joined.owners.push(None);
            }
        }
        for (ci, c) in run.position.text.chars().enumerate() {
            if c.is_whitespace() {
                if joined.chars.last() == Some(&' ') {
                    continue;
                }
                joined.chars.push(' ');
            } else {
                joined.chars.push(fold(c));
            }
            joined.owners.push(Some((k, ci)));
        }
    }
    joined
}

fn span_rect(
    page: usize,
    line: &[&TextRun],
    owners: &[Option<(usize, usize)>],
) -> Option<RedactionRect> {
    let mut spans: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
    for &(k, ci) in owners.iter().flatten() {
        spans
            .entry(k)
            .and_modify(|(lo, hi)| {
                *lo = (*lo).min(ci);
                *hi = (*hi).max(ci);
            })
            .or_insert((ci, ci));
    }
    if spans.len() < 2 {
        return None;
    }
    let (mut x0, mut x1) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut y0, mut y1) = (f64::INFINITY, f64::NEG_INFINITY);
    for (k, (lo, hi)) in spans {
        let pos = &line[k].position;
        let (left, right) = if is_url_token(&pos.text) {
            (pos.x, pos.x + pos.width)
        } else {
            let chars: Vec<char> = pos.text.chars().collect();
            let scale = run_scale(pos, &chars);
            (
                pos.x + estimate_chars(chars[..lo].iter().copied(), pos.height) * scale,
                pos.x + estimate_chars(chars[..=hi].iter().copied(), pos.height) * scale,
            )
        };
        x0 = x0.min(left);
        x1 = x1.max(right);
        y0 = y0.min(pos.y);
        y1 = y1.max(pos.y + pos.height);
    }
    Some(RedactionRect::new(page, x0, y0, x1 - x0, y1 - y0))
}
