//! Text position extraction from decoded content.
//!
//! Only operators inside `BT ... ET` are considered. The text and line
//! matrices are tracked in full; `Td`-style moves translate the line matrix,
//! never the position advanced by previously shown text. Each text-show
//! operator yields one run whose box is built from estimated glyph widths.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::pdf::content::{tokenize, Operation};
use crate::pdf::object::Object;
use crate::text::encoding::decode;
use crate::text::width::estimate_width;

const DEFAULT_FONT_SIZE: f64 = 10.0;
const MIN_RUN_HEIGHT: f64 = 8.0;
const BASELINE_SHIFT: f64 = 0.25;

/// Text drawn by one operator, with an approximate box in page space. `y`
/// sits a quarter of the box height below the text origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPosition {
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// A [`TextPosition`] bound to the operator that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub position: TextPosition,
    /// Span of the whole operator (operands included) in the content.
    pub op_span: Range<usize>,
    /// The shown text had whitespace before trimming at the start.
    pub leading_ws: bool,
    /// The shown text had whitespace before trimming at the end.
    pub trailing_ws: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f64; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translated(self, tx: f64, ty: f64) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        Matrix([a, b, c, d, tx * a + ty * c + e, tx * b + ty * d + f])
    }

    fn vertical_scale(self) -> f64 {
        let [_, _, c, d, _, _] = self.0;
        (c * c + d * d).sqrt()
    }
}

struct TextState {
    in_text: bool,
    tm: Matrix,
    tlm: Matrix,
    font_size: f64,
    leading: f64,
}

impl TextState {
    fn new() -> Self {
        Self {
            in_text: false,
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font_size: DEFAULT_FONT_SIZE,
            leading: 0.0,
        }
    }

    fn move_line(&mut self, tx: f64, ty: f64) {
        self.tlm = self.tlm.translated(tx, ty);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }
}

/// Text runs of decoded content, in content order.
pub fn extract_runs(content: &[u8]) -> Vec<TextRun> {
    let mut state = TextState::new();
    let mut runs = Vec::new();
    for op in tokenize(content) {
        match op.operator.as_slice() {
            b"BT" => {
                state.in_text = true;
                state.tm = Matrix::IDENTITY;
                state.tlm = Matrix::IDENTITY;
            }
            b"ET" => state.in_text = false,
            _ if !state.in_text => {}
            b"Tf" => {
                if let Some(size) = number(&op, 1, 2).filter(|s| *s > 0.0) {
                    state.font_size = size;
                }
            }
            b"TL" => {
                if let Some(leading) = number(&op, 0, 1) {
                    state.leading = leading;
                }
            }
            b"Tm" => {
                let values: Option<Vec<f64>> = (0..6).map(|i| number(&op, i, 6)).collect();
                if let Some(v) = values {
                    state.tm = Matrix([v[0], v[1], v[2], v[3], v[4], v[5]]);
                    state.tlm = state.tm;
                }
            }
            b"Td" | b"TD" => {
                if let (Some(tx), Some(ty)) = (number(&op, 0, 2), number(&op, 1, 2)) {
                    if op.is(b"TD") {
                        state.leading = -ty;
                    }
                    state.move_line(tx, ty);
                }
            }
            b"T*" => state.next_line(),
            b"Tj" | b"TJ" | b"'" | b"\"" => {
                if op.is(b"'") || op.is(b"\"") {
                    state.next_line();
                }
                if let Some(run) = show_text(&mut state, &op) {
                    runs.push(run);
                }
            }
            _ => {}
        }
    }
    runs
}

/// Positions of decoded content, without operator binding.
pub fn extract_positions(content: &[u8]) -> Vec<TextPosition> {
    extract_runs(content).into_iter().map(|run| run.position).collect()
}

/// Decoded text shown by a text-show operator, untrimmed.
pub fn shown_text(op: &Operation) -> Option<String> {
    let operand = op.operands.last()?;
    match &operand.object {
        Object::String(s) if !op.is(b"TJ") => Some(decode(s).text()),
        Object::Array(items) if op.is(b"TJ") => Some(
            items
                .iter()
                .filter_map(Object::as_string)
                .map(|s| decode(s).text())
                .collect(),
        ),
        _ => None,
    }
}

fn show_text(state: &mut TextState, op: &Operation) -> Option<TextRun> {
    let raw = shown_text(op)?;
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    let size = state.font_size * state.tm.vertical_scale();
    let height = size.max(MIN_RUN_HEIGHT);
    let width = estimate_width(text, size).max(size);
    let [_, _, _, _, x, y] = state.tm.0;
    trace!(text, x, y, width, "text run");
    state.tm.0[4] += width;
    Some(TextRun {
        position: TextPosition {
            text: text.to_string(),
            x,
            y: y - BASELINE_SHIFT * height,
            width,
            height,
        },
        op_span: op.span.clone(),
        leading_ws: raw.starts_with(char::is_whitespace),
        trailing_ws: raw.ends_with(char::is_whitespace),
    })
}

/// `idx`-th operand as a number when the operator has exactly `arity`
/// operands.
fn number(op: &Operation, idx: usize, arity: usize) -> Option<f64> {
    if op.operands.len() != arity {
        return None;
    }
    op.operands.get(idx)?.object.as_f64()
}
