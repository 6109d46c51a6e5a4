//! Error types for the PDF redaction library.
//!
//! Errors are split by policy: structural problems and contract violations
//! propagate to the caller, while per-page and per-object problems are
//! downgraded to warnings by the code that encounters them.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::pdf::ObjectId;

/// Result type alias for redaction operations.
pub type RedactorResult<T> = Result<T, RedactorError>;

/// Error type for all redaction operations.
#[derive(Debug, Error)]
pub enum RedactorError {
    /// Error occurred while reading or writing files
    #[error("IO error for path '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The input buffer was empty
    #[error("empty pdf bytes")]
    EmptyDocument,

    /// Document root, page tree or another required structure is missing
    #[error("PDF structure error: {message}")]
    Structure { message: String },

    /// A 1-based page number outside the document
    #[error("page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// Unrecognized redaction mode string
    #[error("invalid mode '{value}': expected visual_allowed or secure_required")]
    InvalidMode { value: String },

    /// Invalid configuration or parameters
    #[error("Invalid input for '{parameter}': {reason}")]
    InvalidInput { parameter: String, reason: String },

    /// Tokenizer or object reader failure
    #[error("parse error at offset {offset}: {reason}")]
    Parse { offset: usize, reason: String },

    /// A stream could not be decoded or re-encoded
    #[error("stream {object}: {reason}")]
    Stream { object: ObjectId, reason: String },

    /// Secure removal was required but no object body changed
    #[error("secure_required requested but no secure text content could be removed")]
    SecureRemovalUnsatisfied,

    /// Encrypted input and no decrypt path available
    #[error("encrypted PDFs require a configured decryptor")]
    EncryptionUnsupported,

    /// The decryptor rejected the document or password
    #[error("decryption failed: {reason}")]
    Decryption { reason: String },

    /// External OCR tooling failed
    #[error("OCR failure: {reason}")]
    Ocr { reason: String },
}

impl RedactorError {
    pub(crate) fn structure(message: impl Into<String>) -> Self {
        Self::Structure {
            message: message.into(),
        }
    }

    pub(crate) fn parse(offset: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn ocr(reason: impl Into<String>) -> Self {
        Self::Ocr {
            reason: reason.into(),
        }
    }
}

impl From<io::Error> for RedactorError {
    fn from(err: io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}
