//! Redaction policy types and the strategy trait.
//!
//! A [`RedactionStrategy`] mutates a working [`ObjectMap`] for a set of
//! rectangles and plain-text terms. The façade decides which strategies
//! run from the caller's [`RedactionMode`], then rebuilds the document
//! once from the working map.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::config::EngineConfig;
use crate::error::{RedactorError, RedactorResult};
use crate::pdf::{ObjectId, ObjectMap};

/// Policy switch governing the guarantees of a redaction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedactionMode {
    /// Opaque overlay only; text stays in the content streams.
    #[default]
    VisualAllowed,
    /// Content-stream text must be altered, or the call fails.
    SecureRequired,
}

impl RedactionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VisualAllowed => "visual_allowed",
            Self::SecureRequired => "secure_required",
        }
    }
}

impl fmt::Display for RedactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RedactionMode {
    type Err = RedactorError;

    /// Case-insensitive; blank input selects the default mode.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "visual_allowed" => Ok(Self::VisualAllowed),
            "secure_required" => Ok(Self::SecureRequired),
            _ => Err(RedactorError::InvalidMode {
                value: s.to_string(),
            }),
        }
    }
}

impl<'de> Deserialize<'de> for RedactionMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// What a redaction call actually guaranteed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityOutcome {
    Secure,
    #[default]
    VisualOnly,
    Failed,
}

/// An area of a page in PDF user space (origin bottom-left).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RedactionRect {
    /// 1-based page number.
    pub page_num: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RedactionRect {
    pub fn new(page_num: usize, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            page_num,
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y + self.height
    }
}

/// A search term, written either as a bare string or as `{"text": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextQuery {
    Plain(String),
    Detailed { text: String },
}

impl TextQuery {
    pub fn text(&self) -> &str {
        match self {
            Self::Plain(text) | Self::Detailed { text } => text,
        }
    }
}

impl From<&str> for TextQuery {
    fn from(text: &str) -> Self {
        Self::Plain(text.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrProviderKind {
    #[default]
    Tesseract,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub enabled: bool,
    pub provider: OcrProviderKind,
    pub language: String,
    /// Only run recognition on pages classified `image_only`.
    pub image_only_pages: bool,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: OcrProviderKind::Tesseract,
            language: "eng".to_string(),
            image_only_pages: false,
        }
    }
}

/// Caller input of [`crate::Redactor::apply_redactions_advanced`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionOptions {
    /// Rectangles redacted as given.
    pub blocks: Vec<RedactionRect>,
    pub text_search: Vec<TextQuery>,
    pub mode: RedactionMode,
    /// Handed to the decryptor for encrypted input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub ocr: OcrSettings,
}

impl RedactionOptions {
    /// Trimmed, non-empty search terms in input order.
    pub fn terms(&self) -> Vec<String> {
        self.text_search
            .iter()
            .map(|q| q.text().trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    ImageOnly,
    Mixed,
    #[default]
    Unknown,
}

impl ContentType {
    pub fn classify(has_text: bool, has_image: bool) -> Self {
        match (has_text, has_image) {
            (true, true) => Self::Mixed,
            (true, false) => Self::Text,
            (false, true) => Self::ImageOnly,
            (false, false) => Self::Unknown,
        }
    }
}

/// What a page draws, as seen by the content tokenizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCapability {
    pub page_num: usize,
    #[serde(rename = "type")]
    pub content_type: ContentType,
    pub has_text: bool,
    pub has_image: bool,
    pub ocr_enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub note: String,
}

/// Audit record of one redaction call. Returned on success and on failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RedactionReport {
    pub mode: RedactionMode,
    pub security_outcome: SecurityOutcome,
    pub applied_secure: bool,
    pub applied_visual: bool,
    pub generated_rects: usize,
    pub applied_rectangles: usize,
    pub matched_text_count: usize,
    /// Object bodies byte-altered by the secure rewrite.
    pub changed_objects: usize,
    pub capabilities: Vec<PageCapability>,
    pub unsupported_pages: Vec<usize>,
    pub warnings: Vec<String>,
}

impl RedactionReport {
    pub fn new(mode: RedactionMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

/// Everything a strategy needs besides the working map.
#[derive(Debug, Clone, Copy)]
pub struct RedactionPlan<'a> {
    pub rects: &'a [RedactionRect],
    /// Plain-text terms masked wherever they occur, independent of rects.
    pub terms: &'a [String],
    pub config: &'a EngineConfig,
}

/// Result of applying one strategy to the working map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedactionResult {
    /// Rectangles or runs redacted.
    pub instances_redacted: usize,
    pub pages_processed: usize,
    pub pages_modified: usize,
    /// Objects whose body was replaced or added.
    pub changed_objects: Vec<ObjectId>,
    /// Local failures that were skipped.
    pub warnings: Vec<String>,
}

impl RedactionResult {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn has_redactions(&self) -> bool {
        !self.changed_objects.is_empty()
    }
}

/// Trait for redaction strategies.
pub trait RedactionStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the strategy removes content rather than covering it.
    fn is_secure(&self) -> bool;

    /// Applies the plan to `working`. Errors are structural; per-page and
    /// per-object problems end up in [`RedactionResult::warnings`].
    fn apply(
        &self,
        working: &mut ObjectMap,
        plan: &RedactionPlan<'_>,
    ) -> RedactorResult<RedactionResult>;
}
