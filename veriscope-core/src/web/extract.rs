//! Boilerplate-stripping text extraction.
//!
//! Prefers a recognizable main-content container; otherwise falls back to
//! the body with navigation chrome, scripts, and ads removed. The output
//! is whitespace-collapsed plain text.

use scraper::{Html, Selector};

/// Extracted page content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub text: String,
}

/// Containers that usually hold the article body.
const MAIN_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role='main']",
    "#content",
    "#main",
    ".content",
    ".post-content",
    ".entry-content",
];

/// Elements removed from the body fallback before text collection.
const BOILERPLATE_SELECTORS: &[&str] = &[
    "nav",
    "header",
    "footer",
    "aside",
    "script",
    "style",
    "noscript",
    "iframe",
    "form",
    ".nav",
    ".navbar",
    ".sidebar",
    ".menu",
    ".advertisement",
    ".ads",
    "#nav",
    "#header",
    "#footer",
    "#sidebar",
];

/// Extract the main text and title from raw HTML.
pub fn extract_page(html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let content_html = main_content_html(&document);
    let text = collapse_text(&content_html);

    ExtractedPage { title, text }
}

fn extract_title(document: &Html) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

fn main_content_html(document: &Html) -> String {
    for selector_str in MAIN_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(main) = document.select(&selector).next() {
                return remove_boilerplate(&main.html());
            }
        }
    }

    if let Ok(selector) = Selector::parse("body") {
        if let Some(body) = document.select(&selector).next() {
            return remove_boilerplate(&body.html());
        }
    }

    remove_boilerplate(&document.html())
}

/// Remove unwanted elements by replacing their serialized HTML.
fn remove_boilerplate(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut result = html.to_string();
    for selector_str in BOILERPLATE_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            for element in document.select(&selector) {
                result = result.replace(&element.html(), "");
            }
        }
    }
    result
}

/// Collect text nodes and collapse runs of whitespace to single spaces.
fn collapse_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let raw: String = fragment
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}
