//! Redaction strategies and the [`Redactor`] façade.
//!
//! The façade owns the document bytes and lazily built caches of the object
//! map and page info. [`Redactor::apply_redactions_advanced`] drives one
//! redaction call: capability analysis, direct text search (plus OCR when
//! enabled), mode dispatch to the secure and visual strategies over one
//! working object map, and a single incremental rebuild.

pub mod matcher;
pub mod secure;
pub mod strategy;
pub mod visual;

pub use secure::SecureRedactionStrategy;
pub use strategy::{
    ContentType, OcrProviderKind, OcrSettings, PageCapability, RedactionMode, RedactionOptions,
    RedactionPlan, RedactionRect, RedactionReport, RedactionResult, RedactionStrategy,
    SecurityOutcome, TextQuery,
};
pub use visual::VisualRedactionStrategy;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use once_cell::unsync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, OcrConfig};
use crate::error::{RedactorError, RedactorResult};
use crate::ocr::{match_words, OcrProvider, TesseractProvider};
use crate::pdf::content::{form_resources, page_content, tokenize, SegmentKind};
use crate::pdf::rebuild::rebuild;
use crate::pdf::page_tree::page_at;
use crate::pdf::{Dictionary, ObjectId, ObjectMap, PageInfo, PageTree};
use crate::text::{extract_runs, TextPosition, TextRun};

const IMAGE_ONLY_NOTE: &str = "text search requires OCR for image-only content";

/// Decrypts encrypted input ahead of redaction.
pub trait Decryptor: Send + Sync {
    /// Returns the document with its objects decrypted and `/Encrypt`
    /// removed from the trailer.
    fn decrypt(&self, pdf: &[u8], password: Option<&str>) -> RedactorResult<Vec<u8>>;
}

/// Redaction entry point for one document.
///
/// Not shared across threads: use one instance per document and per
/// worker.
pub struct Redactor {
    bytes: Vec<u8>,
    config: EngineConfig,
    ocr_config: OcrConfig,
    decryptor: Option<Box<dyn Decryptor>>,
    ocr_provider: Option<Box<dyn OcrProvider>>,
    map: OnceCell<ObjectMap>,
    info: OnceCell<PageInfo>,
    page_ids: OnceCell<Vec<ObjectId>>,
}

impl Redactor {
    pub fn new(bytes: impl Into<Vec<u8>>) -> RedactorResult<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(RedactorError::EmptyDocument);
        }
        Ok(Self {
            bytes,
            config: EngineConfig::default(),
            ocr_config: OcrConfig::default(),
            decryptor: None,
            ocr_provider: None,
            map: OnceCell::new(),
            info: OnceCell::new(),
            page_ids: OnceCell::new(),
        })
    }

    /// Reads the document at `path`.
    pub fn open(path: &Path) -> RedactorResult<Self> {
        let bytes = fs::read(path).map_err(|source| RedactorError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(bytes)
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self.info = OnceCell::new();
        self.page_ids = OnceCell::new();
        self
    }

    pub fn with_ocr_config(mut self, config: OcrConfig) -> Self {
        self.ocr_config = config;
        self
    }

    pub fn with_decryptor(mut self, decryptor: Box<dyn Decryptor>) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    /// Replaces the default Tesseract provider.
    pub fn with_ocr_provider(mut self, provider: Box<dyn OcrProvider>) -> Self {
        self.ocr_provider = Some(provider);
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn object_map(&self) -> &ObjectMap {
        self.map.get_or_init(|| ObjectMap::build(&self.bytes))
    }

    pub fn is_encrypted(&self) -> bool {
        self.object_map().trailer().is_encrypted()
    }

    fn page_tree(&self) -> RedactorResult<PageTree<'_>> {
        if self.is_encrypted() {
            return Err(RedactorError::EncryptionUnsupported);
        }
        Ok(PageTree::new(self.object_map(), self.config.parent_depth))
    }

    /// Leaf pages in document order, walked once per document.
    fn page_ids(&self) -> RedactorResult<&[ObjectId]> {
        let tree = self.page_tree()?;
        self.page_ids
            .get_or_try_init(|| tree.pages())
            .map(Vec::as_slice)
    }

    /// Page count and media-box sizes.
    pub fn page_info(&self) -> RedactorResult<PageInfo> {
        let tree = self.page_tree()?;
        self.info.get_or_try_init(|| tree.page_info()).cloned()
    }

    /// Text runs of one 1-based page, forms inlined.
    pub fn page_runs(&self, page: usize) -> RedactorResult<Vec<TextRun>> {
        let tree = self.page_tree()?;
        let id = page_at(self.page_ids()?, page)?;
        let dict = self
            .object_map()
            .dict(id)
            .ok_or_else(|| RedactorError::structure(format!("page object {id} not found")))?;
        let resources = tree.resources(&dict);
        let content = page_content(self.object_map(), &dict, resources.as_ref());
        Ok(extract_runs(&content.data))
    }

    pub fn extract_text_positions(&self, page: usize) -> RedactorResult<Vec<TextPosition>> {
        Ok(self
            .page_runs(page)?
            .into_iter()
            .map(|run| run.position)
            .collect())
    }

    /// Rectangles of every occurrence of `term`, without mutating anything.
    /// Pages whose content cannot be read are skipped.
    pub fn find_text_occurrences(&self, term: &str) -> RedactorResult<Vec<RedactionRect>> {
        self.find_text_occurrences_multi(&[term])
    }

    /// Like [`Self::find_text_occurrences`] for several terms. Terms are
    /// trimmed; blank and case-insensitively repeated terms are ignored.
    pub fn find_text_occurrences_multi<S: AsRef<str>>(
        &self,
        terms: &[S],
    ) -> RedactorResult<Vec<RedactionRect>> {
        let mut seen = HashSet::new();
        let terms: Vec<&str> = terms
            .iter()
            .map(|t| t.as_ref().trim())
            .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let info = self.page_info()?;
        let mut rects = Vec::new();
        for page in 1..=info.total_pages {
            let runs = match self.page_runs(page) {
                Ok(runs) => runs,
                Err(err) => {
                    warn!(page, error = %err, "skipping page during search");
                    continue;
                }
            };
            for term in &terms {
                rects.extend(matcher::find_on_page(page, &runs, term, &self.config));
            }
        }
        debug!(terms = terms.len(), rects = rects.len(), "text search finished");
        Ok(rects)
    }

    /// Classifies every page by what its content draws.
    pub fn analyze_page_capabilities(&self) -> RedactorResult<Vec<PageCapability>> {
        let info = self.page_info()?;
        let tree = self.page_tree()?;
        Ok((1..=info.total_pages)
            .map(|page| self.page_capability(&tree, page))
            .collect())
    }

    fn page_capability(&self, tree: &PageTree<'_>, page: usize) -> PageCapability {
        let mut capability = PageCapability {
            page_num: page,
            content_type: ContentType::Unknown,
            has_text: false,
            has_image: false,
            ocr_enabled: false,
            note: String::new(),
        };
        let map = self.object_map();
        let dict = match self.page_ids().and_then(|ids| page_at(ids, page)).and_then(|id| {
            map.dict(id)
                .ok_or_else(|| RedactorError::structure(format!("page object {id} not found")))
        }) {
            Ok(dict) => dict,
            Err(err) => {
                capability.note = err.to_string();
                return capability;
            }
        };
        let page_resources = tree.resources(&dict).unwrap_or_default();
        let content = page_content(map, &dict, Some(&page_resources));
        for segment in &content.segments {
            let resources = match segment.kind {
                SegmentKind::Page => page_resources.clone(),
                SegmentKind::Form => map
                    .dict(segment.id)
                    .and_then(|form| form_resources(map, &form))
                    .unwrap_or_else(|| page_resources.clone()),
            };
            for op in tokenize(&content.data[segment.range.clone()]) {
                if op.is_text_show() {
                    capability.has_text = true;
                } else if op.is(b"BI") {
                    capability.has_image = true;
                } else if op.is(b"Do") && self.invokes_image(&op, &resources) {
                    capability.has_image = true;
                }
            }
        }
        capability.content_type = ContentType::classify(capability.has_text, capability.has_image);
        if capability.content_type == ContentType::ImageOnly {
            capability.note = IMAGE_ONLY_NOTE.to_string();
        }
        capability
    }

    fn invokes_image(&self, op: &crate::pdf::Operation, resources: &Dictionary) -> bool {
        let map = self.object_map();
        let Some(name) = op.operands.last().and_then(|o| o.object.as_name()) else {
            return false;
        };
        resources
            .get(b"XObject")
            .and_then(|x| map.resolve_dict(x))
            .and_then(|xobjects| xobjects.get(name).and_then(|r| map.resolve_dict(r)))
            .is_some_and(|xobject| xobject.has_name(b"Subtype", b"Image"))
    }

    /// Replaces the document with its decrypted form and resets caches.
    pub fn decrypt(&mut self, password: Option<&str>) -> RedactorResult<()> {
        let decryptor = self
            .decryptor
            .as_ref()
            .ok_or(RedactorError::EncryptionUnsupported)?;
        let decrypted = decryptor.decrypt(&self.bytes, password)?;
        if ObjectMap::build(&decrypted).trailer().is_encrypted() {
            return Err(RedactorError::Decryption {
                reason: "decryptor output still declares /Encrypt".to_string(),
            });
        }
        self.bytes = decrypted;
        self.map = OnceCell::new();
        self.info = OnceCell::new();
        self.page_ids = OnceCell::new();
        info!("document decrypted");
        Ok(())
    }

    /// Paints `rects` with the visual overlay only. Returns the input
    /// unchanged when `rects` is empty.
    pub fn apply_redactions(&self, rects: &[RedactionRect]) -> RedactorResult<Vec<u8>> {
        let original = self.object_map();
        if self.is_encrypted() {
            return Err(RedactorError::EncryptionUnsupported);
        }
        let mut working = original.clone();
        let plan = RedactionPlan {
            rects,
            terms: &[],
            config: &self.config,
        };
        VisualRedactionStrategy::new().apply(&mut working, &plan)?;
        rebuild(&self.bytes, original, &working)
    }

    /// Runs a full redaction call. The report is returned whether or not
    /// the call succeeded.
    ///
    /// In [`RedactionMode::SecureRequired`] the result is either an output
    /// whose report says [`SecurityOutcome::Secure`] or an error; secure mode
    /// never degrades to an overlay-only output.
    pub fn apply_redactions_advanced(
        &mut self,
        options: &RedactionOptions,
    ) -> (RedactorResult<Vec<u8>>, RedactionReport) {
        let mut report = RedactionReport::new(options.mode);
        let result = self.run_redaction(options, &mut report);
        if let Err(err) = &result {
            report.security_outcome = SecurityOutcome::Failed;
            warn!(mode = %options.mode, error = %err, "redaction failed");
        }
        (result, report)
    }

    fn run_redaction(
        &mut self,
        options: &RedactionOptions,
        report: &mut RedactionReport,
    ) -> RedactorResult<Vec<u8>> {
        info!(mode = %options.mode, "starting redaction");
        if self.is_encrypted() {
            self.decrypt(options.password.as_deref())?;
            push_warning(
                report,
                "input PDF was decrypted and the output is emitted decrypted".to_string(),
            );
        }

        let info = self.page_info()?;
        for block in &options.blocks {
            if block.page_num == 0 || block.page_num > info.total_pages {
                return Err(RedactorError::PageOutOfRange {
                    page: block.page_num,
                    total: info.total_pages,
                });
            }
        }

        match self.analyze_page_capabilities() {
            Ok(mut capabilities) => {
                for capability in &mut capabilities {
                    capability.ocr_enabled = options.ocr.enabled;
                    if capability.content_type == ContentType::ImageOnly && !options.ocr.enabled {
                        report.unsupported_pages.push(capability.page_num);
                        push_warning(
                            report,
                            format!("page {}: {IMAGE_ONLY_NOTE}", capability.page_num),
                        );
                    }
                }
                report.capabilities = capabilities;
            }
            Err(err) => push_warning(report, format!("capability analysis failed: {err}")),
        }

        let terms = options.terms();
        let mut rects = options.blocks.clone();
        for term in &terms {
            let found = self.find_text_occurrences(term)?;
            report.matched_text_count += found.len();
            rects.extend(found);
        }
        if options.ocr.enabled && !terms.is_empty() {
            match self.ocr_search(options, &info, &terms, &report.capabilities) {
                Ok(found) => {
                    report.matched_text_count += found.len();
                    rects.extend(found);
                }
                Err(err) => push_warning(report, format!("OCR fallback error: {err}")),
            }
        }
        report.generated_rects = rects.len();

        let original = self.object_map();
        let mut working = original.clone();
        let plan = RedactionPlan {
            rects: &rects,
            terms: &terms,
            config: &self.config,
        };
        match options.mode {
            RedactionMode::VisualAllowed => {
                push_warning(
                    report,
                    "visual_allowed mode skipped secure text rewrite to preserve original glyph encoding"
                        .to_string(),
                );
            }
            RedactionMode::SecureRequired => {
                let secure = SecureRedactionStrategy::new().apply(&mut working, &plan)?;
                for warning in &secure.warnings {
                    push_warning(report, warning.clone());
                }
                if !secure.has_redactions() {
                    return Err(RedactorError::SecureRemovalUnsatisfied);
                }
                report.changed_objects = secure.changed_objects.len();
                report.applied_secure = true;
            }
        }

        let visual = VisualRedactionStrategy::new().apply(&mut working, &plan)?;
        report.applied_visual = visual.pages_modified > 0;
        report.applied_rectangles = visual.instances_redacted;
        let output = rebuild(&self.bytes, original, &working)?;
        if report.applied_secure {
            report.security_outcome = SecurityOutcome::Secure;
        }
        info!(
            mode = %options.mode,
            rects = report.applied_rectangles,
            changed = report.changed_objects,
            "redaction finished"
        );
        Ok(output)
    }

    fn ocr_search(
        &self,
        options: &RedactionOptions,
        info: &PageInfo,
        terms: &[String],
        capabilities: &[PageCapability],
    ) -> RedactorResult<Vec<RedactionRect>> {
        let pages: Vec<_> = info
            .pages
            .iter()
            .filter(|page| {
                !options.ocr.image_only_pages
                    || capabilities.iter().any(|c| {
                        c.page_num == page.page_number && c.content_type == ContentType::ImageOnly
                    })
            })
            .cloned()
            .collect();
        if pages.is_empty() {
            return Ok(Vec::new());
        }
        let default_provider;
        let provider: &dyn OcrProvider = match &self.ocr_provider {
            Some(provider) => provider.as_ref(),
            None => {
                default_provider = TesseractProvider::new(self.ocr_config.clone());
                &default_provider
            }
        };
        debug!(provider = provider.name(), pages = pages.len(), "running OCR");
        let words = provider.extract_words(&self.bytes, &pages, &options.ocr.language)?;
        Ok(match_words(&words, terms))
    }
}

fn push_warning(report: &mut RedactionReport, message: String) {
    warn!("{message}");
    report.warnings.push(message);
}
