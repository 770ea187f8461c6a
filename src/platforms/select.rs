//! Layered HTML extraction helpers.
//!
//! All functions here are synchronous and take the page source as `&str`:
//! parsed documents are not `Send`, so nothing in this module may be held
//! across an await point. Callers fetch the HTML first, then extract.

use scraper::{ElementRef, Html, Selector};

/// Text of the first element matched by any of the given selectors, tried
/// in order. Whitespace is collapsed; empty matches are skipped.
pub fn first_text(html: &str, selectors: &[String]) -> Option<String> {
    let doc = Html::parse_document(html);
    for raw in selectors {
        let Ok(sel) = Selector::parse(raw) else { continue };
        for el in doc.select(&sel) {
            let text = element_text(el);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// First matching element's value for `attr`.
pub fn first_attr(html: &str, selectors: &[String], attr: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    for raw in selectors {
        let Ok(sel) = Selector::parse(raw) else { continue };
        for el in doc.select(&sel) {
            if let Some(value) = el.value().attr(attr) {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Outer HTML of every element matched by the first selector that matches
/// anything. Used to split a results page into per-card fragments.
pub fn fragments(html: &str, selectors: &[String]) -> Vec<String> {
    let doc = Html::parse_document(html);
    for raw in selectors {
        let Ok(sel) = Selector::parse(raw) else { continue };
        let found: Vec<String> = doc.select(&sel).map(|el| el.html()).collect();
        if !found.is_empty() {
            return found;
        }
    }
    Vec::new()
}

pub fn exists_any(html: &str, selectors: &[String]) -> bool {
    let doc = Html::parse_document(html);
    selectors.iter().any(|raw| {
        Selector::parse(raw)
            .map(|sel| doc.select(&sel).next().is_some())
            .unwrap_or(false)
    })
}

/// Last-resort description extraction: the single element carrying the most
/// own+descendant text, ignoring scaffolding tags. Site markup changes can
/// defeat every known selector; the longest text block is almost always the
/// posting body.
pub fn largest_text_block(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let candidates = Selector::parse("div, section, article, main").ok()?;
    let mut best: Option<(usize, String)> = None;
    for el in doc.select(&candidates) {
        if has_block_child(el) {
            continue;
        }
        let text = element_text(el);
        if text.len() < 200 {
            continue;
        }
        if best.as_ref().map(|(len, _)| text.len() > *len).unwrap_or(true) {
            best = Some((text.len(), text));
        }
    }
    best.map(|(_, text)| text)
}

/// True when the element contains another block container, i.e. it is a
/// wrapper rather than a leaf text region.
fn has_block_child(el: ElementRef<'_>) -> bool {
    el.children()
        .filter_map(ElementRef::wrap)
        .any(|c| matches!(c.value().name(), "div" | "section" | "article" | "main"))
}

pub fn element_text(el: ElementRef<'_>) -> String {
    collapse_ws(&el.text().collect::<Vec<_>>().join(" "))
}

pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
