//! Text decoding, width estimation and position extraction.

pub mod encoding;
pub mod extract;
pub mod width;

pub use extract::{extract_positions, extract_runs, TextPosition, TextRun};
pub use width::estimate_width;
