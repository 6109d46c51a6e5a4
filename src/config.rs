//! Engine tunables and external tool configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RedactorError, RedactorResult};

/// Fraction of a run's width a rectangle must cover for the whole run to be
/// blanked rather than only the overlapped characters.
pub const WHOLE_RUN_COVERAGE: f64 = 0.90;

/// Tunables of the matching and rewriting passes.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub whole_run_coverage: f64,
    /// Vertical slack, as a fraction of run height, when testing whether a
    /// rectangle touches a run.
    pub vertical_tolerance: f64,
    /// How many `/Parent` links are followed for inherited attributes.
    pub parent_depth: usize,
    /// How far ahead the rewriter looks when re-binding an operator to an
    /// extracted run.
    pub resync_window: usize,
    /// Runs whose y is within this fraction of their height share a line.
    pub line_factor: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            whole_run_coverage: WHOLE_RUN_COVERAGE,
            vertical_tolerance: 0.2,
            parent_depth: 16,
            resync_window: 6,
            line_factor: 0.75,
        }
    }
}

impl EngineConfig {
    pub fn with_whole_run_coverage(mut self, coverage: f64) -> RedactorResult<Self> {
        if !(coverage > 0.0 && coverage <= 1.0) {
            return Err(RedactorError::InvalidInput {
                parameter: "whole_run_coverage".to_string(),
                reason: format!("must be in (0, 1], got {coverage}"),
            });
        }
        self.whole_run_coverage = coverage;
        Ok(self)
    }

    pub fn with_vertical_tolerance(mut self, tolerance: f64) -> Self {
        self.vertical_tolerance = tolerance.max(0.0);
        self
    }

    pub fn with_parent_depth(mut self, depth: usize) -> Self {
        self.parent_depth = depth;
        self
    }

    pub fn with_resync_window(mut self, window: usize) -> Self {
        self.resync_window = window;
        self
    }

    pub fn with_line_factor(mut self, factor: f64) -> Self {
        self.line_factor = factor.max(0.0);
        self
    }
}

/// External OCR tooling.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrConfig {
    /// PDF rasterizer, invoked like poppler's `pdftoppm`.
    pub pdftoppm: PathBuf,
    /// Recognition engine, invoked like `tesseract`.
    pub tesseract: PathBuf,
    pub dpi: u32,
    /// Wall-clock limit for each external call.
    pub timeout: Duration,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            pdftoppm: PathBuf::from("pdftoppm"),
            tesseract: PathBuf::from("tesseract"),
            dpi: 150,
            timeout: Duration::from_secs(60),
        }
    }
}

impl OcrConfig {
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi.clamp(36, 1200);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_tools(mut self, pdftoppm: impl Into<PathBuf>, tesseract: impl Into<PathBuf>) -> Self {
        self.pdftoppm = pdftoppm.into();
        self.tesseract = tesseract.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.whole_run_coverage, 0.90);
        assert_eq!(config.vertical_tolerance, 0.2);
        assert_eq!(config.parent_depth, 16);
        assert_eq!(config.resync_window, 6);
        assert_eq!(config.line_factor, 0.75);
    }

    #[test]
    fn test_coverage_validation() {
        assert!(EngineConfig::default().with_whole_run_coverage(0.0).is_err());
        assert!(EngineConfig::default().with_whole_run_coverage(1.5).is_err());
        let config = EngineConfig::default().with_whole_run_coverage(0.5).unwrap();
        assert_eq!(config.whole_run_coverage, 0.5);
    }

    #[test]
    fn test_ocr_builders() {
        let config = OcrConfig::default()
            .with_dpi(10)
            .with_tools("/opt/bin/pdftoppm", "/opt/bin/tesseract");
        assert_eq!(config.dpi, 36);
        assert_eq!(config.tesseract, PathBuf::from("/opt/bin/tesseract"));
        assert_eq!(OcrConfig::default().timeout, Duration::from_secs(60));
        let config = OcrConfig::default().with_timeout(Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
