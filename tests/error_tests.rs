//! Comprehensive error handling tests.
//!
//! These tests verify error variants, conversions and the points at which
//! the library propagates errors instead of downgrading them to warnings.

mod common;

use common::*;
use redactor::error::{RedactorError, RedactorResult};
use redactor::pdf::ObjectId;
use redactor::{EngineConfig, RedactionMode, RedactionOptions, Redactor, TextQuery};
use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;

/// Tests error display formatting to ensure user-facing error messages are
/// clear and actionable.
#[test]
fn test_io_error_display() {
    let err = RedactorError::Io {
        path: PathBuf::from("/test/path.pdf"),
        source: io::Error::new(io::ErrorKind::NotFound, "file not found"),
    };

    let display = err.to_string();
    assert!(display.contains("/test/path.pdf"));
    assert!(display.contains("IO error"));
    assert!(display.contains("file not found"));
}

#[test]
fn test_io_error_source_chain() {
    let err = RedactorError::Io {
        path: PathBuf::from("/x.pdf"),
        source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
    };
    let source = err.source().expect("io source");
    assert_eq!(source.to_string(), "denied");
}

#[test]
fn test_from_io_error() {
    fn read() -> RedactorResult<()> {
        Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read"))?;
        Ok(())
    }
    assert!(matches!(read(), Err(RedactorError::Io { .. })));
}

#[test]
fn test_invalid_mode_display() {
    let err = "visual".parse::<RedactionMode>().unwrap_err();
    assert!(matches!(&err, RedactorError::InvalidMode { value } if value == "visual"));
    assert!(err.to_string().contains("secure_required"));
}

#[test]
fn test_mode_parsing_is_lenient_about_case_and_blank() {
    assert_eq!(" Secure_Required ".parse::<RedactionMode>().unwrap(), RedactionMode::SecureRequired);
    assert_eq!("".parse::<RedactionMode>().unwrap(), RedactionMode::VisualAllowed);
}

#[test]
fn test_invalid_mode_rejected_when_deserializing() {
    let result: Result<redactor::RedactionOptions, _> =
        serde_json::from_str(r#"{"mode": "paranoid"}"#);
    assert!(result.is_err());
}

#[test]
fn test_fixed_messages() {
    assert_eq!(RedactorError::EmptyDocument.to_string(), "empty pdf bytes");
    assert!(RedactorError::SecureRemovalUnsatisfied
        .to_string()
        .contains("secure_required"));
    assert!(RedactorError::EncryptionUnsupported
        .to_string()
        .contains("decryptor"));
}

#[test]
fn test_stream_error_names_object() {
    let err = RedactorError::Stream {
        object: ObjectId::new(9, 0),
        reason: "unsupported filter /LZWDecode".to_string(),
    };
    assert_eq!(err.to_string(), "stream 9 0: unsupported filter /LZWDecode");
}

#[test]
fn test_invalid_coverage_rejected() {
    for coverage in [0.0, -0.5, 1.5, f64::NAN] {
        let err = EngineConfig::default()
            .with_whole_run_coverage(coverage)
            .unwrap_err();
        assert!(matches!(err, RedactorError::InvalidInput { ref parameter, .. } if parameter == "whole_run_coverage"));
    }
    assert!(EngineConfig::default().with_whole_run_coverage(1.0).is_ok());
}

#[test]
fn test_empty_document_rejected() {
    assert!(matches!(Redactor::new(Vec::new()), Err(RedactorError::EmptyDocument)));
}

#[test]
fn test_missing_root_is_structure_error() {
    let redactor = Redactor::new(b"%PDF-1.4\n1 0 obj\n42\nendobj\n".to_vec()).unwrap();
    assert!(matches!(redactor.page_info(), Err(RedactorError::Structure { .. })));
}

#[test]
fn test_page_out_of_range() {
    let redactor = Redactor::new(hello_pdf()).unwrap();
    for page in [0, 2, 100] {
        assert!(matches!(
            redactor.extract_text_positions(page),
            Err(RedactorError::PageOutOfRange { total: 1, .. })
        ));
    }
}

#[test]
fn test_unsupported_filter_becomes_warning() {
    // A page whose stream cannot be decoded is skipped, never fatal.
    let pdf = replace_bytes(&hello_pdf(), b"<< /Length", b"<< /Filter /LZWDecode /Length");
    assert_ne!(pdf, hello_pdf());
    let mut redactor = Redactor::new(pdf).unwrap();
    assert!(redactor.find_text_occurrences("Secret").unwrap().is_empty());

    let (output, report) = redactor.apply_redactions_advanced(&RedactionOptions {
        mode: RedactionMode::SecureRequired,
        text_search: vec![TextQuery::from("Secret")],
        ..RedactionOptions::default()
    });
    assert!(matches!(output, Err(RedactorError::SecureRemovalUnsatisfied)));
    assert!(report
        .warnings
        .iter()
        .any(|w| w.starts_with("stream 5 0:") && w.contains("LZWDecode")));
}
