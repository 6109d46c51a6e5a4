//! OCR adapter boundary.
//!
//! Recognition runs in external processes behind [`OcrProvider`]. Words are
//! returned in PDF user space so that OCR hits become ordinary
//! [`RedactionRect`]s.

pub mod tesseract;

pub use tesseract::TesseractProvider;

use serde::{Deserialize, Serialize};

use crate::error::RedactorResult;
use crate::pdf::PageDetail;
use crate::redaction::strategy::RedactionRect;

/// A recognized word in PDF user space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub page_num: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub text: String,
}

/// External text recognition over rendered pages.
pub trait OcrProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Recognizes the words of each page in `pages`.
    fn extract_words(
        &self,
        pdf: &[u8],
        pages: &[PageDetail],
        language: &str,
    ) -> RedactorResult<Vec<OcrWord>>;
}

/// One rectangle per word containing any of `terms`, case-insensitively.
pub fn match_words(words: &[OcrWord], terms: &[String]) -> Vec<RedactionRect> {
    let terms: Vec<String> = terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    words
        .iter()
        .filter(|w| {
            let text = w.text.to_lowercase();
            terms.iter().any(|t| text.contains(t.as_str()))
        })
        .map(|w| RedactionRect::new(w.page_num, w.x, w.y, w.width, w.height))
        .collect()
}
