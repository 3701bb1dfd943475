//! Text extraction passes over the HTML fragments in study material.
//!
//! Every pass is infallible: malformed markup degrades to whatever text the
//! HTML5 parser can recover, possibly nothing.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node};

/// Elements whose text never reaches the corpus.
const SKIPPED_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

/// Elements that break words apart; inline elements join their text directly.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "figure", "footer", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// Strip markup from an HTML fragment and collapse whitespace.
pub(crate) fn strip_html(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(html);
    let mut text = String::with_capacity(html.len());
    push_text(fragment.root_element(), &mut text);
    collapse_whitespace(&text)
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                if SKIPPED_ELEMENTS.contains(&el.name()) {
                    continue;
                }
                let block = BLOCK_ELEMENTS.contains(&el.name());
                if block {
                    out.push(' ');
                }
                if let Some(child_element) = ElementRef::wrap(child) {
                    push_text(child_element, out);
                }
                if block {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Find citation markers in raw HTML, deduplicated in first-seen order.
///
/// Recognized forms: `[3]`, `data-ref="3"` and `#ref-3` / `#ref3` anchors.
pub(crate) fn extract_citation_ids(html: &str) -> Vec<u32> {
    static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"\[(\d{1,9})\]|data-ref\s*=\s*["']?(\d{1,9})|#ref-?(\d{1,9})"#)
            .expect("valid regex")
    });

    let mut ids: Vec<u32> = Vec::new();
    for caps in CITATION_RE.captures_iter(html) {
        let Some(digits) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) else {
            continue;
        };
        if let Ok(id) = digits.as_str().parse::<u32>() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}

/// Normalize a plain-text title into an id slug (`Control Rods` -> `control-rods`).
pub(crate) fn slugify_title(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        return "untitled".to_string();
    }
    slug
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
