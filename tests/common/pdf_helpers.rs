//! PDF manipulation and inspection helpers.

#![allow(dead_code)]

use anyhow::Result;

use redactor::pdf::content::page_content;
use redactor::pdf::{ObjectMap, PageTree};
use redactor::Redactor;

/// Text of every run drawn on `page`, joined with single spaces.
pub fn page_text(pdf: &[u8], page: usize) -> String {
    let redactor = Redactor::new(pdf.to_vec()).expect("non-empty PDF");
    redactor
        .extract_text_positions(page)
        .expect("readable page")
        .into_iter()
        .map(|p| p.text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Decoded content of `page` (forms inlined) as this crate reads it back
/// from `pdf`.
pub fn reparse_content(pdf: &[u8], page: usize) -> Vec<u8> {
    let map = ObjectMap::build(pdf);
    let tree = PageTree::new(&map, 16);
    let id = tree.find_page(page).expect("page exists");
    let dict = map.dict(id).expect("page dictionary");
    let resources = tree.resources(&dict);
    page_content(&map, &dict, resources.as_ref()).data
}

/// Decoded page content as lopdf reads it, following the newest
/// cross-reference section.
pub fn lopdf_page_content(pdf: &[u8], page: u32) -> Result<Vec<u8>> {
    let doc = lopdf::Document::load_mem(pdf)?;
    let pages = doc.get_pages();
    let id = pages
        .get(&page)
        .ok_or_else(|| anyhow::anyhow!("page {page} not found by lopdf"))?;
    Ok(doc.get_page_content(*id)?)
}

/// Validates that lopdf can load the document.
pub fn is_valid_pdf(pdf: &[u8]) -> bool {
    lopdf::Document::load_mem(pdf).is_ok()
}
