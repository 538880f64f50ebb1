//! Page metadata extraction.
//!
//! Parses the page into a DOM and reads Open Graph and fallback tags through
//! CSS selectors. The first matching element wins; comments and script
//! bodies are never treated as markup.

use kuchiki::traits::TendrilSink;
use kuchiki::NodeRef;

/// Metadata read from a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    /// Image reference as written in the page (may be relative).
    pub image_ref: Option<String>,
}

const OG_TITLE: &str = r#"meta[property="og:title"], meta[name="og:title"]"#;
const OG_DESCRIPTION: &str = r#"meta[property="og:description"], meta[name="og:description"]"#;
const DESCRIPTION: &str = r#"meta[name="description"]"#;

/// Image candidates in priority order, with the attribute holding the reference.
const IMAGE_SOURCES: &[(&str, &str)] = &[
    (r#"meta[property="og:image"], meta[name="og:image"]"#, "content"),
    (r#"meta[property="twitter:image"], meta[name="twitter:image"]"#, "content"),
    (r#"link[rel="apple-touch-icon"]"#, "href"),
    (r#"link[rel~="icon"]"#, "href"),
];

/// Trimmed `attr` of the first element matching `selector`.
fn first_attr(document: &NodeRef, selector: &str, attr: &str) -> Option<String> {
    let element = document.select_first(selector).ok()?;
    let attrs = element.attributes.borrow();
    let value = attrs.get(attr)?.trim().to_string();
    Some(value)
}

fn title_text(document: &NodeRef) -> Option<String> {
    let title = document.select_first("title").ok()?;
    Some(title.as_node().text_contents().trim().to_string())
}

/// Parse title, description and preview image reference from `html`.
///
/// Title falls back from `og:title` to `<title>`, description from
/// `og:description` to `<meta name="description">`. The image is the first
/// non-empty of `og:image`, `twitter:image`, `apple-touch-icon`, `icon`.
pub fn parse(html: &str) -> PageMetadata {
    let document = kuchiki::parse_html().one(html);

    let title = first_attr(&document, OG_TITLE, "content")
        .filter(|t| !t.is_empty())
        .or_else(|| title_text(&document))
        .unwrap_or_default();

    let description = first_attr(&document, OG_DESCRIPTION, "content")
        .filter(|d| !d.is_empty())
        .or_else(|| first_attr(&document, DESCRIPTION, "content"))
        .unwrap_or_default();

    let image_ref = IMAGE_SOURCES
        .iter()
        .filter_map(|(selector, attr)| first_attr(&document, selector, attr))
        .find(|candidate| !candidate.is_empty());

    PageMetadata {
        title,
        description,
        image_ref,
    }
}
