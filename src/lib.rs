//! PDF redaction engine with structural text removal.
//!
//! This library parses an existing PDF into a flat object map, locates the
//! text drawn on each page, and removes matches either cosmetically (an
//! opaque overlay) or structurally (rewriting the content-stream strings).
//! Output is always the original bytes plus one incremental update.
//!
//! # Features
//!
//! - **Secure Redaction**: Masks matched characters inside the content streams themselves
//! - **Encoding Preservation**: Literal, hex, UTF-16 and BOM-less CID strings keep their form
//! - **Cross-Run Search**: Terms split across several text operators on one line are found
//! - **Form XObjects**: Text drawn inside invoked forms is searched and rewritten
//! - **Incremental Output**: Unchanged documents come back byte-for-byte identical
//! - **OCR Hook**: Image-only pages can be searched through external Tesseract tooling
//!
//! # Architecture
//!
//! - [`pdf`]: Tolerant object graph access, content tokenizing and the incremental writer
//! - [`text`]: String decoding, width estimation and text position extraction
//! - [`redaction`]: Matching, the secure and visual strategies, and the [`Redactor`] façade
//! - [`ocr`]: External OCR adapter
//! - [`config`]: Engine tunables and OCR tool configuration
//! - [`error`]: Comprehensive error handling
//!
//! # Quick Start
//!
//! ```no_run
//! use redactor::{RedactionMode, RedactionOptions, Redactor, TextQuery};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut redactor = Redactor::open(Path::new("input.pdf"))?;
//! let options = RedactionOptions {
//!     text_search: vec![TextQuery::from("Secret")],
//!     mode: RedactionMode::SecureRequired,
//!     ..RedactionOptions::default()
//! };
//!
//! let (output, report) = redactor.apply_redactions_advanced(&options);
//! std::fs::write("output.pdf", output?)?;
//! println!("{:?}", report.security_outcome);
//! # Ok(())
//! # }
//! ```
//!
//! # Examples
//!
//! ## Preview matches without changing the document
//!
//! ```no_run
//! use redactor::Redactor;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let redactor = Redactor::open(Path::new("statement.pdf"))?;
//! for rect in redactor.find_text_occurrences_multi(&["Account", "IBAN"])? {
//!     println!("page {} at {:.1},{:.1}", rect.page_num, rect.x, rect.y);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Text positions
//!
//! ```
//! use redactor::text::extract_positions;
//!
//! let positions = extract_positions(b"BT /F1 12 Tf 100 700 Td (Hello) Tj ET");
//! assert_eq!(positions[0].text, "Hello");
//! assert_eq!(positions[0].x, 100.0);
//! ```

// Public API
pub mod config;
pub mod error;
pub mod ocr;
pub mod pdf;
pub mod redaction;
pub mod text;

// Re-exports for convenient access
pub use config::{EngineConfig, OcrConfig, WHOLE_RUN_COVERAGE};
pub use error::{RedactorError, RedactorResult};
pub use ocr::{OcrProvider, OcrWord, TesseractProvider};
pub use pdf::{PageDetail, PageInfo};
pub use redaction::{
    ContentType, Decryptor, OcrSettings, PageCapability, RedactionMode, RedactionOptions,
    RedactionRect, RedactionReport, RedactionResult, RedactionStrategy, Redactor,
    SecureRedactionStrategy, SecurityOutcome, TextQuery, VisualRedactionStrategy,
};
pub use text::TextPosition;
