//! Snapshot sanitization and title derivation.
//!
//! A fetched document goes through a fixed set of structural rewrites so
//! it renders self-contained from local storage:
//!
//! - `<base href>` elements are removed, so relative resolution cannot be
//!   redirected after rewriting.
//! - Content-Security-Policy meta directives are removed (snapshotting
//!   tools often embed a policy that would block the snapshot's own
//!   resource loads).
//! - Relative `href`/`src` values are resolved against the source URL.
//!   Values that already carry a scheme (including `data:`) or are
//!   protocol-relative stay untouched; rewriting is attribute-local.
//!
//! Each transformation works on the parsed tree, not on the raw text, so
//! attribute order, quoting style and multi-line tags don't matter.

use std::sync::LazyLock;

use reqwest::Url;
use scraper::{Html, Node, Selector};

macro_rules! selector {
    ($name:ident, $css:expr) => {
        static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

selector!(BASE_SELECTOR, "base[href]");
selector!(HTTP_EQUIV_META_SELECTOR, "meta[http-equiv]");
selector!(TITLE_SELECTOR, "title");
selector!(OG_TITLE_SELECTOR, r#"meta[property="og:title"]"#);
selector!(H1_SELECTOR, "h1");

/// A sanitized snapshot plus the title derived from it.
#[derive(Debug, Clone)]
pub struct SanitizedDocument {
    pub html: String,
    pub title: String,
}

/// Apply the snapshot transformations to one fetched document.
pub fn sanitize(raw: &str, source_url: &Url) -> SanitizedDocument {
    let mut document = Html::parse_document(raw);

    strip_base_elements(&mut document);
    strip_csp_directives(&mut document);
    rewrite_relative_urls(&mut document, source_url);

    let title = derive_title(&document, source_url);

    SanitizedDocument {
        html: document.html(),
        title,
    }
}

fn strip_base_elements(document: &mut Html) {
    let doomed: Vec<_> = document
        .select(&BASE_SELECTOR)
        .map(|element| element.id())
        .collect();

    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn strip_csp_directives(document: &mut Html) {
    let doomed: Vec<_> = document
        .select(&HTTP_EQUIV_META_SELECTOR)
        .filter(|element| {
            element
                .value()
                .attr("http-equiv")
                .is_some_and(|value| value.eq_ignore_ascii_case("content-security-policy"))
        })
        .map(|element| element.id())
        .collect();

    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn rewrite_relative_urls(document: &mut Html, source_url: &Url) {
    // Two passes: resolve against the source URL over the immutable tree,
    // then patch the collected attributes in place.
    let mut rewrites = Vec::new();
    for node in document.tree.nodes() {
        if let Node::Element(element) = node.value() {
            for (name, value) in element.attrs() {
                if !matches!(name, "href" | "src") || !is_relative(value) {
                    continue;
                }
                // An unresolvable value is left exactly as found.
                if let Ok(resolved) = source_url.join(value) {
                    rewrites.push((node.id(), name.to_string(), resolved.to_string()));
                }
            }
        }
    }

    for (id, attr, resolved) in rewrites {
        if let Some(mut node) = document.tree.get_mut(id) {
            if let Node::Element(element) = node.value() {
                for (qual, value) in element.attrs.iter_mut() {
                    if &*qual.local == attr.as_str() {
                        *value = resolved.as_str().into();
                    }
                }
            }
        }
    }
}

/// Relative means: no scheme and not protocol-relative. `data:` URIs
/// carry a scheme and therefore never get rewritten.
fn is_relative(value: &str) -> bool {
    !value.starts_with("//") && !has_scheme(value)
}

fn has_scheme(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    for c in chars {
        match c {
            ':' => return true,
            c if c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.') => {}
            _ => return false,
        }
    }
    false
}

/// Derive a display title, first non-empty source wins:
/// `<title>` text, then the `og:title` meta property, then the first
/// `<h1>` with its markup stripped. Falls back to the source URL.
pub fn derive_title(document: &Html, source_url: &Url) -> String {
    if let Some(element) = document.select(&TITLE_SELECTOR).next() {
        let text = collapse_whitespace(&element.text().collect::<String>());
        if !text.is_empty() {
            return text;
        }
    }

    if let Some(element) = document.select(&OG_TITLE_SELECTOR).next() {
        if let Some(content) = element.value().attr("content") {
            let text = collapse_whitespace(content);
            if !text.is_empty() {
                return text;
            }
        }
    }

    if let Some(element) = document.select(&H1_SELECTOR).next() {
        let text = collapse_whitespace(&element.text().collect::<String>());
        if !text.is_empty() {
            return text;
        }
    }

    source_url.to_string()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
