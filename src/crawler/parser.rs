//! HTML parser for extracting links and metadata
//!
//! This module handles parsing HTML content to extract:
//! - Links to follow (from <a> tags and canonical links)
//! - Page title
//! - Other metadata as needed

use scraper::{Html, Selector};
use url::Url;

/// Tags stripped before text extraction (§4.7 step 4).
const STRIPPED_TEXT_TAGS: &[&str] = &["script", "style", "nav", "header", "footer", "aside", "iframe"];
/// Tags whose descendant `<a>` elements are NOT main content (§4.7's
/// `isMainContent` link classification).
const NON_MAIN_CONTENT_TAGS: &[&str] = &["nav", "header", "footer", "aside"];
const MAX_TEXT_CHARS: usize = 100_000;

/// An outbound link with the fields §4.7 step 7's LinkDiscoveryEvent needs.
#[derive(Debug, Clone)]
pub struct ExtractedLink {
    pub url: String,
    pub anchor: Option<String>,
    pub is_main_content: bool,
}

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// All links found on the page (absolute URLs)
    pub links: Vec<String>,

    /// Same links with anchor text and main-content classification (§4.7).
    pub link_details: Vec<ExtractedLink>,

    /// `meta[name=description]`, fallback `meta[property=og:description]`.
    pub meta_description: Option<String>,

    /// Visible text with script/style/nav/header/footer/aside/iframe
    /// removed, whitespace collapsed, truncated to 100,000 chars.
    pub text: String,

    /// From `<html lang>` or a content-language meta tag; defaults to "en".
    pub language: String,
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags in body, nav, header, footer
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<link rel="stylesheet" ...>`
/// - `<script src="...">`
/// - `<img src="...">`
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
///
/// **Note:** `rel="nofollow"` links ARE followed per spec
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `base_url` - The base URL for resolving relative links
///
/// # Returns
///
/// * `Ok(ParsedPage)` - Successfully parsed page
/// * `Err(String)` - Failed to parse HTML
///
/// # Example
///
/// ```no_run
/// use sumi_ripple::crawler::parse_html;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &base_url).unwrap();
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// ```
pub fn parse_html(html: &str, base_url: &Url) -> Result<ParsedPage, String> {
    let document = Html::parse_document(html);

    let title = extract_title(&document);
    let link_details = extract_link_details(&document, base_url)?;
    let links = link_details.iter().map(|l| l.url.clone()).collect();
    let meta_description = extract_meta_description(&document);
    let text = extract_text(&document);
    let language = detect_language(&document);

    Ok(ParsedPage {
        title,
        links,
        link_details,
        meta_description,
        text,
        language,
    })
}

/// Extracts the page title from `<title>`, falling back to the first `<h1>`
/// (§4.7 step 4's title-extraction priority; callers fall back further to
/// "Untitled" when this returns `None`).
fn extract_title(document: &Html) -> Option<String> {
    if let Ok(title_selector) = Selector::parse("title") {
        if let Some(title) = document
            .select(&title_selector)
            .next()
            .map(|element| element.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
        {
            return Some(title);
        }
    }

    let h1_selector = Selector::parse("h1").ok()?;
    document
        .select(&h1_selector)
        .next()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extracts all valid links from the HTML document, with anchor text and
/// `isMainContent` classification (§4.7 step 4).
fn extract_link_details(document: &Html, base_url: &Url) -> Result<Vec<ExtractedLink>, String> {
    let mut links = Vec::new();

    if let Ok(a_selector) = Selector::parse("a[href]") {
        for element in document.select(&a_selector) {
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(url) = resolve_link(href, base_url) {
                    let anchor = element.text().collect::<String>().trim().to_string();
                    links.push(ExtractedLink {
                        url,
                        anchor: if anchor.is_empty() { None } else { Some(anchor) },
                        is_main_content: !has_ancestor_tag(&element, NON_MAIN_CONTENT_TAGS),
                    });
                }
            }
        }
    }

    if let Ok(canonical_selector) = Selector::parse("link[rel='canonical'][href]") {
        for element in document.select(&canonical_selector) {
            if let Some(href) = element.value().attr("href") {
                if let Some(url) = resolve_link(href, base_url) {
                    links.push(ExtractedLink {
                        url,
                        anchor: None,
                        is_main_content: false,
                    });
                }
            }
        }
    }

    Ok(links)
}

/// Walks up an element's ancestors, true if any has one of the given tag names.
fn has_ancestor_tag(element: &scraper::ElementRef, tags: &[&str]) -> bool {
    element
        .ancestors()
        .filter_map(scraper::ElementRef::wrap)
        .any(|ancestor| tags.contains(&ancestor.value().name()))
}

/// `meta[name=description]`, falling back to `meta[property=og:description]`.
fn extract_meta_description(document: &Html) -> Option<String> {
    if let Ok(selector) = Selector::parse(r#"meta[name="description"]"#) {
        if let Some(content) = document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
        {
            let content = content.trim();
            if !content.is_empty() {
                return Some(content.to_string());
            }
        }
    }

    if let Ok(selector) = Selector::parse(r#"meta[property="og:description"]"#) {
        if let Some(content) = document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
        {
            let content = content.trim();
            if !content.is_empty() {
                return Some(content.to_string());
            }
        }
    }

    None
}

/// Visible text with `script, style, nav, header, footer, aside, iframe`
/// removed, whitespace collapsed, truncated to `MAX_TEXT_CHARS` (§4.7 step 4).
fn extract_text(document: &Html) -> String {
    let mut excluded_ids = std::collections::HashSet::new();
    for tag in STRIPPED_TEXT_TAGS {
        if let Ok(selector) = Selector::parse(tag) {
            for element in document.select(&selector) {
                excluded_ids.insert(element.id());
                excluded_ids.extend(element.descendants().map(|d| d.id()));
            }
        }
    }

    let Ok(body_selector) = Selector::parse("body") else {
        return String::new();
    };
    let root = document
        .select(&body_selector)
        .next()
        .map(|el| el.id())
        .unwrap_or_else(|| document.root_element().id());

    let mut text = String::new();
    for node in document.tree.get(root).into_iter().flat_map(|n| n.descendants()) {
        if excluded_ids.contains(&node.id()) {
            continue;
        }
        if let Some(text_node) = node.value().as_text() {
            text.push_str(text_node);
            text.push(' ');
        }
    }

    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_TEXT_CHARS).collect()
}

/// `<html lang>`, falling back to a `content-language` meta tag; "en" if absent.
fn detect_language(document: &Html) -> String {
    if let Ok(selector) = Selector::parse("html[lang]") {
        if let Some(lang) = document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("lang"))
        {
            let lang = lang.trim();
            if !lang.is_empty() {
                return lang.to_string();
            }
        }
    }

    if let Ok(selector) = Selector::parse(r#"meta[http-equiv="content-language" i]"#) {
        if let Some(lang) = document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("content"))
        {
            let lang = lang.trim();
            if !lang.is_empty() {
                return lang.to_string();
            }
        }
    }

    "en".to_string()
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    // Skip empty hrefs
    if href.is_empty() {
        return None;
    }

    // Skip special schemes
    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    // Skip fragment-only links (same page anchors)
    if href.starts_with('#') {
        return None;
    }

    // Try to resolve the URL
    match base_url.join(href) {
        Ok(absolute_url) => {
            // Only accept HTTP and HTTPS URLs
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

/// Convenience function for extracting just the links from HTML
///
/// # Arguments
///
/// * `html` - The HTML content
/// * `base_url` - The base URL for resolving relative links
///
/// # Returns
///
/// A vector of absolute URLs found in the HTML
pub fn extract_links_simple(html: &str, base_url: &Url) -> Vec<String> {
    parse_html(html, base_url)
        .map(|parsed| parsed.links)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn test_extract_title() {
        let html = r#"<html><head><title>Test Page</title></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_extract_title_with_whitespace() {
        let html = r#"<html><head><title>  Test Page  </title></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.title, Some("Test Page".to_string()));
    }

    #[test]
    fn test_title_falls_back_to_h1() {
        let html = r#"<html><head></head><body><h1>Heading Title</h1></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.title, Some("Heading Title".to_string()));
    }

    #[test]
    fn test_no_title() {
        let html = r#"<html><head></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.title, None);
    }

    #[test]
    fn test_extract_absolute_link() {
        let html = r#"<html><body><a href="https://other.com/page">Link</a></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 1);
        assert_eq!(parsed.links[0], "https://other.com/page");
    }

    #[test]
    fn test_extract_relative_link() {
        let html = r#"<html><body><a href="/other">Link</a></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 1);
        assert_eq!(parsed.links[0], "https://example.com/other");
    }

    #[test]
    fn test_extract_relative_path_link() {
        let html = r#"<html><body><a href="other">Link</a></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 1);
        assert_eq!(parsed.links[0], "https://example.com/other");
    }

    #[test]
    fn test_skip_javascript_link() {
        let html = r#"<html><body><a href="javascript:void(0)">Link</a></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 0);
    }

    #[test]
    fn test_skip_mailto_link() {
        let html = r#"<html><body><a href="mailto:test@example.com">Email</a></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 0);
    }

    #[test]
    fn test_skip_tel_link() {
        let html = r#"<html><body><a href="tel:+1234567890">Call</a></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 0);
    }

    #[test]
    fn test_skip_data_uri() {
        let html = r#"<html><body><a href="data:text/html,<h1>Test</h1>">Data</a></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 0);
    }

    #[test]
    fn test_skip_download_link() {
        let html = r#"<html><body><a href="/file.pdf" download>Download</a></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 0);
    }

    #[test]
    fn test_skip_fragment_only() {
        let html = r##"<html><body><a href="#section">Jump</a></body></html>"##;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 0);
    }

    #[test]
    fn test_follow_nofollow_links() {
        let html = r#"<html><body><a href="/page" rel="nofollow">Link</a></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 1);
        assert_eq!(parsed.links[0], "https://example.com/page");
    }

    #[test]
    fn test_extract_canonical_link() {
        let html = r#"<html><head><link rel="canonical" href="https://example.com/canonical" /></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert!(parsed
            .links
            .contains(&"https://example.com/canonical".to_string()));
    }

    #[test]
    fn test_multiple_links() {
        let html = r#"
            <html>
            <body>
                <a href="/page1">Link 1</a>
                <a href="/page2">Link 2</a>
                <a href="https://other.com/page3">Link 3</a>
            </body>
            </html>
        "#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 3);
    }

    #[test]
    fn test_mixed_valid_and_invalid_links() {
        let html = r#"
            <html>
            <body>
                <a href="/valid">Valid</a>
                <a href="javascript:alert('no')">Invalid</a>
                <a href="mailto:test@example.com">Invalid</a>
                <a href="/another-valid">Valid</a>
            </body>
            </html>
        "#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.links.len(), 2);
    }

    #[test]
    fn test_meta_description() {
        let html = r#"<html><head><meta name="description" content="A test page."></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.meta_description, Some("A test page.".to_string()));
    }

    #[test]
    fn test_meta_description_falls_back_to_og() {
        let html = r#"<html><head><meta property="og:description" content="OG description"></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.meta_description, Some("OG description".to_string()));
    }

    #[test]
    fn test_meta_description_absent() {
        let html = r#"<html><head></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.meta_description, None);
    }

    #[test]
    fn test_text_strips_script_and_nav() {
        let html = r#"
            <html><body>
                <nav>Home About Contact</nav>
                <script>var x = 1;</script>
                <p>Real content here.</p>
            </body></html>
        "#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert!(parsed.text.contains("Real content here."));
        assert!(!parsed.text.contains("Home About Contact"));
        assert!(!parsed.text.contains("var x"));
    }

    #[test]
    fn test_text_collapses_whitespace() {
        let html = "<html><body><p>Hello   \n\n  world</p></body></html>";
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.text, "Hello world");
    }

    #[test]
    fn test_text_truncated_to_max_chars() {
        let long = "a ".repeat(100_000);
        let html = format!("<html><body><p>{long}</p></body></html>");
        let parsed = parse_html(&html, &base_url()).unwrap();
        assert!(parsed.text.chars().count() <= MAX_TEXT_CHARS);
    }

    #[test]
    fn test_language_from_html_lang() {
        let html = r#"<html lang="fr"><body></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.language, "fr");
    }

    #[test]
    fn test_language_from_content_language_meta() {
        let html = r#"<html><head><meta http-equiv="content-language" content="de"></head><body></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.language, "de");
    }

    #[test]
    fn test_language_defaults_to_en() {
        let html = "<html><body></body></html>";
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.language, "en");
    }

    #[test]
    fn test_link_in_nav_is_not_main_content() {
        let html = r#"<html><body><nav><a href="/about">About</a></nav><p><a href="/article">Article</a></p></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        let nav_link = parsed.link_details.iter().find(|l| l.url.ends_with("/about")).unwrap();
        let body_link = parsed.link_details.iter().find(|l| l.url.ends_with("/article")).unwrap();
        assert!(!nav_link.is_main_content);
        assert!(body_link.is_main_content);
    }

    #[test]
    fn test_link_anchor_text_captured() {
        let html = r#"<html><body><a href="/page">Click here</a></body></html>"#;
        let parsed = parse_html(html, &base_url()).unwrap();
        assert_eq!(parsed.link_details[0].anchor, Some("Click here".to_string()));
    }
}
