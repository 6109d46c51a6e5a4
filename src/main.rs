//! PDF Redaction CLI Application.
//!
//! This binary provides a command-line interface for the redactor library:
//! redaction in visual or secure mode, text position extraction, preview
//! search and page capability analysis.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use redactor::{
    OcrConfig, OcrSettings, RedactionMode, RedactionOptions, RedactionRect, Redactor,
    SecurityOutcome, TextQuery,
};

/// PDF Redaction Tool
///
/// Redact sensitive text from PDF documents, either by painting over it or
/// by removing it from the content streams.
/// By default, performs redaction. Use the subcommands to inspect a document.
#[derive(Parser)]
#[command(name = "redactor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Input PDF file path
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output PDF file path
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Text to redact (repeatable, comma-separated values allowed)
    #[arg(short, long, value_name = "PATTERN")]
    pattern: Vec<String>,

    /// Rectangle to redact as page,x,y,width,height (repeatable)
    #[arg(long, value_name = "PAGE,X,Y,W,H")]
    block: Vec<String>,

    /// Redaction mode: visual_allowed or secure_required
    #[arg(long, default_value = "visual_allowed")]
    mode: String,

    /// Password handed to the decryptor for encrypted input
    #[arg(long)]
    password: Option<String>,

    /// Search rendered pages with OCR as well
    #[arg(long)]
    ocr: bool,

    /// OCR language
    #[arg(long, default_value = "eng")]
    ocr_language: String,

    /// Only OCR pages without text
    #[arg(long, requires = "ocr")]
    ocr_image_only: bool,

    /// Time limit in seconds for each OCR tool invocation
    #[arg(long, value_name = "SECS", default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..), global = true)]
    ocr_timeout: u64,

    /// PDF rasterizer used for OCR
    #[arg(long, env = "REDACTOR_PDFTOPPM", default_value = "pdftoppm", global = true)]
    pdftoppm: PathBuf,

    /// Text recognition engine used for OCR
    #[arg(long, env = "REDACTOR_TESSERACT", default_value = "tesseract", global = true)]
    tesseract: PathBuf,

    /// Write the JSON redaction report to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print text positions as JSON (for debugging and verification)
    Extract {
        /// Input PDF file path
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Only this 1-based page
        #[arg(long)]
        page: Option<usize>,
    },
    /// Print the rectangles a redaction would cover, without writing anything
    Search {
        /// Input PDF file path
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Text to search for (repeatable, comma-separated values allowed)
        #[arg(short, long, value_name = "PATTERN", required = true)]
        pattern: Vec<String>,
    },
    /// Print page info and page capabilities as JSON
    Analyze {
        /// Input PDF file path
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },
}

#[derive(Serialize)]
struct PagePositions {
    page_num: usize,
    positions: Vec<redactor::TextPosition>,
}

#[derive(Serialize)]
struct Analysis {
    page_info: redactor::PageInfo,
    capabilities: Vec<redactor::PageCapability>,
}

/// Command handler holding the configuration shared by all commands.
struct RedactionHandler {
    ocr_config: OcrConfig,
    verbose: bool,
}

impl RedactionHandler {
    fn new(ocr_config: OcrConfig, verbose: bool) -> Self {
        Self {
            ocr_config,
            verbose,
        }
    }

    fn open(&self, input: &Path) -> Result<Redactor> {
        if !input.exists() {
            anyhow::bail!("Input file does not exist: {}", input.display());
        }
        let redactor = Redactor::open(input)
            .with_context(|| format!("Failed to read {}", input.display()))?
            .with_ocr_config(self.ocr_config.clone());
        Ok(redactor)
    }

    /// Executes a redaction, writing the report even when it fails.
    fn redact(
        &self,
        input: &Path,
        output: &Path,
        options: &RedactionOptions,
        report_path: Option<&Path>,
    ) -> Result<()> {
        if options.blocks.is_empty() && options.terms().is_empty() {
            anyhow::bail!("No redaction targets specified. Use --pattern or --block.");
        }
        let mut redactor = self.open(input)?;

        if self.verbose {
            println!("Input:  {}", input.display());
            println!("Output: {}", output.display());
            println!("Mode:   {}", options.mode);
        }

        let (result, report) = redactor.apply_redactions_advanced(options);
        if let Some(path) = report_path {
            let json = serde_json::to_string_pretty(&report)?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
        }
        let bytes = result.with_context(|| "Redaction failed")?;
        std::fs::write(output, &bytes)
            .with_context(|| format!("Failed to write {}", output.display()))?;

        if self.verbose {
            println!("\nRedaction Summary:");
            println!("  Rectangles generated: {}", report.generated_rects);
            println!("  Rectangles applied:   {}", report.applied_rectangles);
            println!("  Objects rewritten:    {}", report.changed_objects);
            for warning in &report.warnings {
                println!("  Warning: {warning}");
            }
        }

        match report.security_outcome {
            SecurityOutcome::Secure => println!(
                "✓ Securely redacted {} area(s) → {}",
                report.applied_rectangles,
                output.display()
            ),
            _ if report.applied_rectangles > 0 => println!(
                "✓ Visually redacted {} area(s) → {}",
                report.applied_rectangles,
                output.display()
            ),
            _ => println!("⚠ No instances found to redact"),
        }
        Ok(())
    }

    fn extract(&self, input: &Path, page: Option<usize>) -> Result<()> {
        let redactor = self.open(input)?;
        let pages = match page {
            Some(page) => vec![page],
            None => (1..=redactor.page_info()?.total_pages).collect(),
        };
        let mut out = Vec::with_capacity(pages.len());
        for page_num in pages {
            let positions = redactor
                .extract_text_positions(page_num)
                .with_context(|| format!("Text extraction failed on page {page_num}"))?;
            out.push(PagePositions {
                page_num,
                positions,
            });
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        Ok(())
    }

    fn search(&self, input: &Path, patterns: &[String]) -> Result<()> {
        let redactor = self.open(input)?;
        let rects = redactor
            .find_text_occurrences_multi(patterns)
            .with_context(|| "Search failed")?;
        debug!(rects = rects.len(), "search finished");
        println!("{}", serde_json::to_string_pretty(&rects)?);
        Ok(())
    }

    fn analyze(&self, input: &Path) -> Result<()> {
        let redactor = self.open(input)?;
        let analysis = Analysis {
            page_info: redactor.page_info().with_context(|| "Page tree walk failed")?,
            capabilities: redactor.analyze_page_capabilities()?,
        };
        println!("{}", serde_json::to_string_pretty(&analysis)?);
        Ok(())
    }
}

/// Splits comma-separated pattern values and drops blanks.
fn split_patterns(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .flat_map(|p| p.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `page,x,y,width,height`.
fn parse_block(value: &str) -> Result<RedactionRect> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [page, x, y, w, h] = parts.as_slice() else {
        anyhow::bail!("Invalid block '{value}': expected page,x,y,width,height");
    };
    let number = |s: &str| -> Result<f64> {
        s.parse()
            .with_context(|| format!("Invalid number '{s}' in block '{value}'"))
    };
    let page: usize = page
        .parse()
        .with_context(|| format!("Invalid page '{page}' in block '{value}'"))?;
    Ok(RedactionRect::new(page, number(x)?, number(y)?, number(w)?, number(h)?))
}

fn build_options(cli: &Cli) -> Result<RedactionOptions> {
    let mode: RedactionMode = cli.mode.parse()?;
    let blocks = cli
        .block
        .iter()
        .map(|b| parse_block(b))
        .collect::<Result<Vec<_>>>()?;
    Ok(RedactionOptions {
        blocks,
        text_search: split_patterns(&cli.pattern)
            .into_iter()
            .map(TextQuery::Plain)
            .collect(),
        mode,
        password: cli.password.clone(),
        ocr: OcrSettings {
            enabled: cli.ocr,
            language: cli.ocr_language.clone(),
            image_only_pages: cli.ocr_image_only,
            ..OcrSettings::default()
        },
    })
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let ocr_config = OcrConfig::default()
        .with_tools(&cli.pdftoppm, &cli.tesseract)
        .with_timeout(Duration::from_secs(cli.ocr_timeout));
    let handler = RedactionHandler::new(ocr_config, cli.verbose);

    match &cli.command {
        Some(Commands::Extract { input, page }) => handler.extract(input, *page)?,
        Some(Commands::Search { input, pattern }) => {
            handler.search(input, &split_patterns(pattern))?
        }
        Some(Commands::Analyze { input }) => handler.analyze(input)?,
        None => {
            // Default: redaction mode
            let input = cli
                .input
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("--input is required"))?;
            let output = cli
                .output
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("--output is required"))?;

            let options = build_options(&cli)?;
            handler.redact(input, output, &options, cli.report.as_deref())?;
        }
    }

    Ok(())
}
