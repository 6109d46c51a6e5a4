//! Tesseract OCR provider (CLI wrapper).
//!
//! Each page is rendered with `pdftoppm` into a scratch directory and
//! recognized with `tesseract ... tsv`. Word boxes are scaled from pixels
//! to the page's declared size and flipped to a bottom-left origin.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::Builder;
use tracing::{debug, info};

use super::{OcrProvider, OcrWord};
use crate::config::OcrConfig;
use crate::error::{RedactorError, RedactorResult};
use crate::pdf::PageDetail;

const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// TSV `level` of word rows.
const WORD_LEVEL: &str = "5";

#[derive(Debug, Clone, Default)]
pub struct TesseractProvider {
    config: OcrConfig,
}

impl TesseractProvider {
    pub fn new(config: OcrConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    fn recognize_page(
        &self,
        dir: &Path,
        input: &Path,
        page: &PageDetail,
        language: &str,
    ) -> RedactorResult<Vec<OcrWord>> {
        let number = page.page_number.to_string();
        let image_base = dir.join(format!("page-{number}"));
        let mut render = Command::new(&self.config.pdftoppm);
        render
            .args(["-f", &number, "-l", &number, "-r"])
            .arg(self.config.dpi.to_string())
            .args(["-singlefile", "-png"])
            .arg(input)
            .arg(&image_base);
        run_bounded(render, "pdftoppm", self.config.timeout)?;

        let image_path = image_base.with_extension("png");
        let (img_width, img_height) = image::image_dimensions(&image_path)
            .map_err(|e| RedactorError::ocr(format!("page {number}: unreadable render: {e}")))?;

        let tsv_base = dir.join(format!("words-{number}"));
        let mut recognize = Command::new(&self.config.tesseract);
        recognize
            .arg(&image_path)
            .arg(&tsv_base)
            .args(["-l", language, "tsv"]);
        run_bounded(recognize, "tesseract", self.config.timeout)?;

        let tsv = fs::read_to_string(tsv_base.with_extension("tsv"))?;
        let words = parse_tsv(&tsv, page, img_width, img_height);
        debug!(page = page.page_number, words = words.len(), "page recognized");
        Ok(words)
    }
}

impl OcrProvider for TesseractProvider {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn extract_words(
        &self,
        pdf: &[u8],
        pages: &[PageDetail],
        language: &str,
    ) -> RedactorResult<Vec<OcrWord>> {
        let language = match language.trim() {
            "" => "eng",
            lang => lang,
        };
        let dir = Builder::new().prefix("redactor-ocr-").tempdir()?;
        let input = dir.path().join("input.pdf");
        fs::write(&input, pdf)?;

        let mut words = Vec::new();
        for page in pages {
            words.extend(self.recognize_page(dir.path(), &input, page, language)?);
        }
        info!(pages = pages.len(), words = words.len(), "OCR finished");
        Ok(words)
    }
}

/// Runs `cmd` to completion, killing it once `timeout` elapses.
fn run_bounded(mut cmd: Command, tool: &str, timeout: Duration) -> RedactorResult<()> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| RedactorError::ocr(format!("{tool} could not be started: {e}")))?;
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            if status.success() {
                return Ok(());
            }
            return Err(RedactorError::ocr(format!("{tool} exited with {status}")));
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RedactorError::ocr(format!(
                "{tool} timed out after {}s",
                timeout.as_secs_f64()
            )));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Word rows of Tesseract TSV, mapped onto `page`.
///
/// Columns: level, page_num, block_num, par_num, line_num, word_num, left,
/// top, width, height, conf, text.
pub(crate) fn parse_tsv(tsv: &str, page: &PageDetail, img_width: u32, img_height: u32) -> Vec<OcrWord> {
    if img_width == 0 || img_height == 0 {
        return Vec::new();
    }
    let sx = page.width / f64::from(img_width);
    let sy = page.height / f64::from(img_height);
    tsv.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 || cols[0] != WORD_LEVEL {
                return None;
            }
            let text = cols[11].trim();
            if text.is_empty() {
                return None;
            }
            let left: f64 = cols[6].parse().ok()?;
            let top: f64 = cols[7].parse().ok()?;
            let width: f64 = cols[8].parse().ok()?;
            let height: f64 = cols[9].parse().ok()?;
            Some(OcrWord {
                page_num: page.page_number,
                x: left * sx,
                y: page.height - (top + height) * sy,
                width: width * sx,
                height: height * sy,
                text: text.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> PageDetail {
        PageDetail {
            page_number: 2,
            width: 612.0,
            height: 792.0,
        }
    }

    #[test]
    fn test_parse_tsv_maps_to_pdf_space() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t1224\t1584\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t200\t100\t120\t40\t96.5\tSecret\n\
                   5\t1\t1\t1\t1\t2\t400\t100\t80\t40\t91.0\t \n";
        let words = parse_tsv(tsv, &page(), 1224, 1584);
        assert_eq!(words.len(), 1);
        let w = &words[0];
        assert_eq!(w.page_num, 2);
        assert_eq!(w.text, "Secret");
        assert!((w.x - 100.0).abs() < 1e-9);
        assert!((w.width - 60.0).abs() < 1e-9);
        assert!((w.height - 20.0).abs() < 1e-9);
        assert!((w.y - (792.0 - 70.0)).abs() < 1e-9);
    }

    #[test]
    fn test_parse_tsv_skips_malformed_rows() {
        let tsv = "header\n5\t1\t1\t1\t1\t1\tleft\t0\t1\t1\t90\tWord\n5\t1\t1\n";
        assert!(parse_tsv(tsv, &page(), 100, 100).is_empty());
        assert!(parse_tsv("header\n", &page(), 0, 100).is_empty());
    }

    #[test]
    fn test_missing_tool_is_ocr_error() {
        let config = OcrConfig::default().with_tools(
            "/nonexistent/redactor-pdftoppm",
            "/nonexistent/redactor-tesseract",
        );
        let provider = TesseractProvider::new(config);
        let err = provider
            .extract_words(b"%PDF-1.4\n", &[page()], "eng")
            .unwrap_err();
        assert!(matches!(err, RedactorError::Ocr { .. }));
        assert!(err.to_string().contains("pdftoppm"));
    }
}
