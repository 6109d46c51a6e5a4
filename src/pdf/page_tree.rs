//! Page tree walking and inherited page attributes.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RedactorError, RedactorResult};
use crate::pdf::object::{Dictionary, Object, ObjectId};
use crate::pdf::object_map::ObjectMap;

/// A4 in points, used when no `/MediaBox` can be found.
pub const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 595.28, 841.89];

const MAX_TREE_DEPTH: usize = 64;

/// Dimensions of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDetail {
    pub page_number: usize,
    pub width: f64,
    pub height: f64,
}

/// Page count and per-page dimensions of a document snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    pub total_pages: usize,
    pub pages: Vec<PageDetail>,
}

impl PageInfo {
    /// Dimensions of a 1-based page.
    pub fn page(&self, page: usize) -> Option<&PageDetail> {
        page.checked_sub(1).and_then(|idx| self.pages.get(idx))
    }
}

/// Read-only view of the page tree over an object map.
pub struct PageTree<'m> {
    map: &'m ObjectMap,
    parent_depth: usize,
}

impl<'m> PageTree<'m> {
    pub fn new(map: &'m ObjectMap, parent_depth: usize) -> Self {
        Self { map, parent_depth }
    }

    /// The catalog's `/Pages` reference.
    pub fn pages_root(&self) -> RedactorResult<ObjectId> {
        let root = self
            .map
            .trailer()
            .root()
            .ok_or_else(|| RedactorError::structure("missing /Root"))?;
        let catalog = self
            .map
            .dict(root)
            .ok_or_else(|| RedactorError::structure(format!("catalog {root} not found")))?;
        catalog
            .get(b"Pages")
            .and_then(Object::as_reference)
            .ok_or_else(|| RedactorError::structure("missing /Pages in catalog"))
    }

    /// All leaf pages in document order.
    pub fn pages(&self) -> RedactorResult<Vec<ObjectId>> {
        let root = self.pages_root()?;
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        self.walk(root, &mut out, &mut visited, 0);
        Ok(out)
    }

    /// Object id of the 1-based page `page`. Walks the whole tree, so
    /// callers looking up many pages should index [`Self::pages`] instead.
    pub fn find_page(&self, page: usize) -> RedactorResult<ObjectId> {
        page_at(&self.pages()?, page)
    }

    fn walk(
        &self,
        id: ObjectId,
        out: &mut Vec<ObjectId>,
        visited: &mut HashSet<ObjectId>,
        depth: usize,
    ) {
        if depth > MAX_TREE_DEPTH {
            return;
        }
        if !visited.insert(id) {
            debug!(object = %id, "page tree cycle");
            return;
        }
        let Some(node) = self.map.dict(id) else {
            debug!(object = %id, "page tree node not found");
            return;
        };
        if node.has_name(b"Type", b"Pages") || node.contains(b"Kids") {
            let kids = match node.get(b"Kids") {
                Some(Object::Array(items)) => items.iter().filter_map(Object::as_reference).collect(),
                Some(Object::Reference(kid)) => vec![*kid],
                _ => Vec::new(),
            };
            for kid in kids {
                self.walk(kid, out, visited, depth + 1);
            }
        } else if node.has_name(b"Type", b"Page") {
            out.push(id);
        }
    }

    pub fn page_info(&self) -> RedactorResult<PageInfo> {
        let pages = self.pages()?;
        let details = pages
            .iter()
            .enumerate()
            .map(|(idx, &id)| {
                let media_box = self
                    .map
                    .dict(id)
                    .map(|page| self.media_box(&page))
                    .unwrap_or(DEFAULT_MEDIA_BOX);
                PageDetail {
                    page_number: idx + 1,
                    width: media_box[2] - media_box[0],
                    height: media_box[3] - media_box[1],
                }
            })
            .collect();
        Ok(PageInfo {
            total_pages: pages.len(),
            pages: details,
        })
    }

    /// The page's own `/Resources`, or the nearest ancestor's.
    pub fn resources(&self, page: &Dictionary) -> Option<Dictionary> {
        self.inherited(page, b"Resources")
            .and_then(|obj| self.map.resolve_dict(&obj))
    }

    /// The page's `/MediaBox` (inline, referenced or inherited).
    pub fn media_box(&self, page: &Dictionary) -> [f64; 4] {
        self.inherited(page, b"MediaBox")
            .and_then(|obj| self.map.resolve(&obj))
            .and_then(|obj| rect_from(&obj))
            .unwrap_or(DEFAULT_MEDIA_BOX)
    }

    fn inherited(&self, page: &Dictionary, key: &[u8]) -> Option<Object> {
        if let Some(value) = page.get(key) {
            return Some(value.clone());
        }
        let mut current = page.clone();
        for _ in 0..self.parent_depth {
            let parent = current.get(b"Parent").and_then(Object::as_reference)?;
            current = self.map.dict(parent)?;
            if let Some(value) = current.get(key) {
                return Some(value.clone());
            }
        }
        None
    }
}

fn rect_from(obj: &Object) -> Option<[f64; 4]> {
    let items = obj.as_array()?;
    if items.len() != 4 {
        return None;
    }
    let mut rect = [0.0; 4];
    for (slot, item) in rect.iter_mut().zip(items) {
        *slot = item.as_f64()?;
    }
    Some(rect)
}

/// Entry `page` (1-based) of an already walked page list.
pub fn page_at(pages: &[ObjectId], page: usize) -> RedactorResult<ObjectId> {
    page.checked_sub(1)
        .and_then(|idx| pages.get(idx))
        .copied()
        .ok_or(RedactorError::PageOutOfRange {
            page,
            total: pages.len(),
        })
}
