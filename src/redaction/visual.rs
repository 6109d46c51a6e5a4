//! Visual overlay strategy.
//!
//! Paints opaque black rectangles in a new content stream appended to each
//! page. Existing streams are never touched, so text under the overlay can
//! still be extracted.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use tracing::{debug, info};

use super::strategy::{RedactionPlan, RedactionRect, RedactionResult, RedactionStrategy};
use crate::error::{RedactorError, RedactorResult};
use crate::pdf::content::content_keys;
use crate::pdf::filters::{plain_body, stream_body, StreamEncoding};
use crate::pdf::{Dictionary, Object, ObjectId, ObjectMap, PageTree};

#[derive(Debug, Clone, Copy, Default)]
pub struct VisualRedactionStrategy;

impl VisualRedactionStrategy {
    pub fn new() -> Self {
        Self
    }
}

/// `q 0 0 0 rg` followed by one filled rectangle per entry and `Q`.
pub fn overlay_content(rects: &[RedactionRect]) -> Vec<u8> {
    let mut out = String::from("q 0 0 0 rg ");
    for r in rects {
        let _ = write!(out, "{:.2} {:.2} {:.2} {:.2} re f ", r.x, r.y, r.width, r.height);
    }
    out.push_str("Q ");
    out.into_bytes()
}

impl RedactionStrategy for VisualRedactionStrategy {
    fn name(&self) -> &str {
        "visual"
    }

    fn is_secure(&self) -> bool {
        false
    }

    fn apply(
        &self,
        working: &mut ObjectMap,
        plan: &RedactionPlan<'_>,
    ) -> RedactorResult<RedactionResult> {
        let mut result = RedactionResult::none();
        if plan.rects.is_empty() {
            return Ok(result);
        }
        let page_ids = PageTree::new(working, plan.config.parent_depth).pages()?;
        let mut by_page: BTreeMap<usize, Vec<RedactionRect>> = BTreeMap::new();
        for rect in plan.rects {
            if rect.page_num == 0 || rect.page_num > page_ids.len() {
                return Err(RedactorError::PageOutOfRange {
                    page: rect.page_num,
                    total: page_ids.len(),
                });
            }
            by_page.entry(rect.page_num).or_default().push(*rect);
        }

        let mut next_number = working.max_number().checked_add(1);
        for (page_num, rects) in by_page {
            let page_id = page_ids[page_num - 1];
            let mut page = working.dict(page_id).ok_or_else(|| {
                RedactorError::structure(format!("page object {page_id} not found"))
            })?;
            let number = next_number
                .ok_or_else(|| RedactorError::structure("no object number left for overlay"))?;
            let overlay_id = ObjectId::new(number, 0);
            next_number = number.checked_add(1);
            let body = stream_body(
                overlay_id,
                &Dictionary::new(),
                &overlay_content(&rects),
                StreamEncoding::Raw,
            )?;
            working.insert(overlay_id, body);

            let mut contents: Vec<Object> = content_keys(working, &page)
                .into_iter()
                .map(Object::Reference)
                .collect();
            contents.push(Object::Reference(overlay_id));
            page.set(b"Contents", Object::Array(contents));
            working.insert(page_id, plain_body(&Object::Dictionary(page)));

            debug!(page = page_num, object = %overlay_id, rects = rects.len(), "appended overlay");
            result.pages_processed += 1;
            result.pages_modified += 1;
            result.instances_redacted += rects.len();
            result.changed_objects.extend([page_id, overlay_id]);
        }
        info!(rects = result.instances_redacted, "visual overlay applied");
        Ok(result)
    }
}
