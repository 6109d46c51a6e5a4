//! Property tests over input grids.
//!
//! Verifies that the tolerant readers never panic on hostile input and
//! that the redaction contract holds across documents, terms and modes.

mod common;

use common::*;
use redactor::pdf::{tokenize, ObjectMap};
use redactor::text::extract_positions;
use redactor::{
    RedactionMode, RedactionOptions, RedactionRect, Redactor, RedactorError, SecurityOutcome,
    TextQuery,
};

fn hostile_inputs() -> Vec<Vec<u8>> {
    let mut inputs: Vec<Vec<u8>> = [
        &b""[..],
        b"%PDF-1.7",
        b"1 0 obj",
        b"1 0 obj << /Type /Catalog",
        b"1 0 obj << /Length 999999 >> stream\nabc",
        b"endobj endobj endobj",
        b"trailer << /Root 1 0 R >> startxref 99999999",
        b"<< << << << [ [ [ (",
        b"(unbalanced \\",
        b"<ABCDEFG",
        b"BT /F1 Tf Tj ET",
        b"BT 1 2 3 4 5 Tm [(a) (b) 1e999] TJ ET",
        b"BI /W 1 /H 1 ID \xff\xfe EI Q",
        b"\x00\x01\x02\xff\xfe",
        "ünïcödé ☃ BT (☃) Tj ET".as_bytes(),
    ]
    .iter()
    .map(|b| b.to_vec())
    .collect();
    inputs.push("[".repeat(5000).into_bytes());
    inputs.push("(".repeat(5000).into_bytes());
    inputs.push("1 0 obj ".repeat(1000).into_bytes());
    inputs
}

mod reader_properties {
    use super::*;

    #[test]
    fn test_readers_never_panic() {
        for input in hostile_inputs() {
            let _ = tokenize(&input);
            let _ = extract_positions(&input);
            let map = ObjectMap::build(&input);
            let _ = map.trailer().root();
            if let Ok(redactor) = Redactor::new(input.clone()) {
                let _ = redactor.page_info();
                let _ = redactor.find_text_occurrences("a");
                let _ = redactor.analyze_page_capabilities();
            }
        }
    }

    #[test]
    fn test_truncated_fixtures_never_panic() {
        let pdf = TestPdfBuilder::new()
            .page(HELLO_CONTENT)
            .object_streams()
            .build();
        for len in (1..pdf.len()).step_by(7) {
            let redactor = Redactor::new(pdf[..len].to_vec()).unwrap();
            let _ = redactor.find_text_occurrences("Secret");
        }
    }
}

mod redaction_properties {
    use super::*;

    fn fixtures() -> Vec<Vec<u8>> {
        vec![
            hello_pdf(),
            TestPdfBuilder::new().page(HELLO_CONTENT).compressed().build(),
            TestPdfBuilder::new().page(HELLO_CONTENT).object_streams().build(),
            TestPdfBuilder::new()
                .page_with_form("q /Fm1 Do Q", "Fm1", HELLO_CONTENT)
                .compressed()
                .build(),
        ]
    }

    const TERMS: &[&str] = &["Secret", "hello", "WORLD", "o", "absent", "Secret World"];

    fn run(pdf: &[u8], mode: RedactionMode, term: &str) -> (Result<Vec<u8>, RedactorError>, redactor::RedactionReport) {
        let mut redactor = Redactor::new(pdf.to_vec()).unwrap();
        redactor.apply_redactions_advanced(&RedactionOptions {
            mode,
            text_search: vec![TextQuery::from(term)],
            ..RedactionOptions::default()
        })
    }

    #[test]
    fn test_secure_required_never_degrades_to_visual() {
        for pdf in fixtures() {
            for term in TERMS {
                let (output, report) = run(&pdf, RedactionMode::SecureRequired, term);
                match output {
                    Ok(_) => assert_eq!(report.security_outcome, SecurityOutcome::Secure, "term {term}"),
                    Err(_) => assert_eq!(report.security_outcome, SecurityOutcome::Failed, "term {term}"),
                }
                assert_ne!(report.security_outcome, SecurityOutcome::VisualOnly);
            }
        }
    }

    #[test]
    fn test_secure_output_no_longer_matches() {
        for pdf in fixtures() {
            for term in TERMS.iter().filter(|t| **t != "absent") {
                let (output, _) = run(&pdf, RedactionMode::SecureRequired, term);
                let output = output.unwrap_or_else(|e| panic!("term {term}: {e}"));
                assert!(output.starts_with(&pdf));
                let after = Redactor::new(output).unwrap();
                assert!(
                    after.find_text_occurrences(term).unwrap().is_empty(),
                    "term {term} still found after secure redaction"
                );
            }
        }
    }

    #[test]
    fn test_visual_output_preserves_original_bytes() {
        for pdf in fixtures() {
            for term in TERMS {
                let (output, report) = run(&pdf, RedactionMode::VisualAllowed, term);
                let output = output.unwrap();
                assert_ne!(report.security_outcome, SecurityOutcome::Secure);
                assert!(output.starts_with(&pdf));
                if report.generated_rects == 0 {
                    assert_eq!(output, pdf, "term {term}");
                }
            }
        }
    }

    #[test]
    fn test_search_does_not_mutate() {
        for pdf in fixtures() {
            let redactor = Redactor::new(pdf.clone()).unwrap();
            for term in TERMS {
                let _ = redactor.find_text_occurrences(term).unwrap();
            }
            assert_eq!(redactor.bytes(), &pdf[..]);
        }
    }

    #[test]
    fn test_block_pages_outside_document_are_rejected() {
        for pages in 1..=4 {
            let mut builder = TestPdfBuilder::new();
            for _ in 0..pages {
                builder = builder.page(HELLO_CONTENT);
            }
            let pdf = builder.build();
            for page in 0..=pages + 1 {
                let mut redactor = Redactor::new(pdf.clone()).unwrap();
                let (output, _) = redactor.apply_redactions_advanced(&RedactionOptions {
                    blocks: vec![RedactionRect::new(page, 0.0, 0.0, 5.0, 5.0)],
                    ..RedactionOptions::default()
                });
                if page == 0 || page > pages {
                    assert!(matches!(
                        output,
                        Err(RedactorError::PageOutOfRange { total, .. }) if total == pages
                    ));
                } else {
                    assert!(output.is_ok(), "page {page} of {pages}");
                }
            }
        }
    }
}
