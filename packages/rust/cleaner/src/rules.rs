//! Removal rules and main-content root selection.

use scraper::{ElementRef, Html, Selector};

/// Structural chrome and interactive controls, removed with their subtrees.
pub(crate) const CHROME_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "iframe", "svg", "canvas",
    "button", "form", "input", "select", "textarea",
];

/// Matched as a lowercase substring of an element's `class` or `id`.
pub(crate) const NOISE_KEYWORDS: &[&str] = &[
    "nav",
    "menu",
    "sidebar",
    "advertisement",
    "ad-",
    "cookie",
    "banner",
    "social",
    "share",
];

/// Root candidates tried before falling back to `<body>`.
const ROOT_SELECTORS: &[&str] = &["main", "#main-content", ".content", "article"];

/// Whether this element (and everything under it) is dropped.
pub(crate) fn is_removed(el: &ElementRef) -> bool {
    let value = el.value();
    if CHROME_TAGS.contains(&value.name()) {
        return true;
    }
    [value.attr("class"), value.attr("id")]
        .into_iter()
        .flatten()
        .any(|attr| {
            let lower = attr.to_lowercase();
            NOISE_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
        })
}

/// Whether the element or any ancestor is dropped.
fn in_removed_subtree(el: &ElementRef) -> bool {
    is_removed(el)
        || el
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| is_removed(&ancestor))
}

/// The subtree emitted into the cleaned document.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Root<'a> {
    /// Emit the element itself (`<main>`, `<article>`, ...).
    Element(ElementRef<'a>),
    /// Emit only the element's children (`<body>` or the document element).
    Children(ElementRef<'a>),
}

impl<'a> Root<'a> {
    pub(crate) fn element(&self) -> ElementRef<'a> {
        match self {
            Self::Element(el) | Self::Children(el) => *el,
        }
    }
}

/// Pick the first surviving main-content container.
pub(crate) fn select_root(doc: &Html) -> Root<'_> {
    for sel_str in ROOT_SELECTORS {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).find(|el| !in_removed_subtree(el)) {
                return Root::Element(el);
            }
        }
    }

    if let Ok(body_sel) = Selector::parse("body") {
        if let Some(body) = doc.select(&body_sel).find(|el| !in_removed_subtree(el)) {
            return Root::Children(body);
        }
    }

    Root::Children(doc.root_element())
}
