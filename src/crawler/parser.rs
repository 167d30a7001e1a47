//! Payload parser: content type classification, text decoding, and HTML
//! link extraction
//!
//! # Link Extraction Rules
//!
//! **Sources** (in document order):
//! - `<a href>` and `<area href>`, with their anchor text
//! - `<link href>`
//! - `<img|frame|iframe|embed src>`
//! - `<meta http-equiv="refresh" content="N; url=...">` and `http-equiv="location"`
//!
//! **Exclude:**
//! - Empty hrefs
//! - Anything whose lowercased href (protocol stripped) contains `javascript:`,
//!   `mailto:` or `@`
//! - Hrefs that do not canonicalize against the effective base
//!
//! Duplicates are kept: the same target with different anchor text is
//! distinct information for the caller.

use crate::config::ParserConfig;
use crate::crawler::decode::{decode_bytes, sniff_meta_charset};
use crate::crawler::outcome::{LinkEdge, ParseOutcome};
use crate::url::canonicalize;
use crate::ParseError;
use ego_tree::iter::Edge;
use scraper::node::Element;
use scraper::{Html, Node};

/// Elements whose text never reaches the body text
const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that separate words in the body text
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "li", "main", "nav", "ol", "p", "pre", "section", "table", "td", "th", "tr", "ul",
];

/// A link target as found in the markup, before filtering
#[derive(Debug, Clone, PartialEq, Eq)]
struct RawLink {
    href: String,
    anchor_text: String,
}

/// Everything collected during one pass over a document
#[derive(Debug, Default)]
struct HtmlAccumulator {
    body_text: String,
    title: Option<String>,
    dc_title: Option<String>,
    base_href: Option<String>,
    links: Vec<RawLink>,
}

impl HtmlAccumulator {
    /// Walks the parsed tree once, in document order
    fn collect(document: &Html) -> Self {
        let mut acc = Self::default();
        let mut hidden_depth = 0usize;
        let mut body_depth = 0usize;
        let mut in_title = false;
        let mut title_text = String::new();
        let mut open_anchor: Option<usize> = None;

        for edge in document.tree.root().traverse() {
            match edge {
                Edge::Open(node) => match node.value() {
                    Node::Element(element) => {
                        let name = element.name();
                        if HIDDEN_ELEMENTS.contains(&name) {
                            hidden_depth += 1;
                        }
                        match name {
                            "body" => body_depth += 1,
                            "title" if acc.title.is_none() => in_title = true,
                            "a" | "area" => {
                                if let Some(href) = element.attr("href") {
                                    acc.push_link(href, String::new());
                                    if name == "a" {
                                        open_anchor = Some(acc.links.len() - 1);
                                    }
                                }
                            }
                            _ => acc.record_element(element),
                        }
                    }
                    Node::Text(text) => {
                        if in_title {
                            title_text.push_str(text);
                        }
                        if let Some(index) = open_anchor {
                            acc.links[index].anchor_text.push_str(text);
                        }
                        if body_depth > 0 && hidden_depth == 0 {
                            acc.body_text.push_str(text);
                        }
                    }
                    _ => {}
                },
                Edge::Close(node) => {
                    if let Node::Element(element) = node.value() {
                        let name = element.name();
                        if HIDDEN_ELEMENTS.contains(&name) {
                            hidden_depth = hidden_depth.saturating_sub(1);
                        }
                        if BLOCK_ELEMENTS.contains(&name) && body_depth > 0 {
                            acc.body_text.push(' ');
                        }
                        match name {
                            "body" => body_depth = body_depth.saturating_sub(1),
                            "a" => open_anchor = None,
                            "title" if in_title => {
                                in_title = false;
                                acc.title = non_empty(collapse_whitespace(&title_text));
                            }
                            _ => {}
                        }
                    }
                }
            }
        }

        for link in &mut acc.links {
            link.anchor_text = collapse_whitespace(&link.anchor_text);
        }
        acc.body_text = collapse_whitespace(&acc.body_text);
        acc
    }

    /// Handles elements that carry a link or document metadata
    fn record_element(&mut self, element: &Element) {
        match element.name() {
            "base" => {
                if self.base_href.is_none() {
                    self.base_href = element.attr("href").map(str::to_string);
                }
            }
            "link" => {
                if let Some(href) = element.attr("href") {
                    self.push_link(href, String::new());
                }
            }
            "img" | "frame" | "iframe" | "embed" => {
                if let Some(src) = element.attr("src") {
                    self.push_link(src, String::new());
                }
            }
            "meta" => self.record_meta(element),
            _ => {}
        }
    }

    fn record_meta(&mut self, element: &Element) {
        let content = element.attr("content").unwrap_or("");

        if let Some(name) = element.attr("name") {
            if name.eq_ignore_ascii_case("dc.title") && self.dc_title.is_none() {
                self.dc_title = non_empty(collapse_whitespace(content));
            }
        }

        if let Some(equiv) = element.attr("http-equiv") {
            if equiv.eq_ignore_ascii_case("refresh") {
                if let Some(target) = refresh_target(content) {
                    self.push_link(target, String::new());
                }
            } else if equiv.eq_ignore_ascii_case("location") && !content.trim().is_empty() {
                self.push_link(content, String::new());
            }
        }
    }

    fn push_link(&mut self, href: &str, anchor_text: String) {
        self.links.push(RawLink {
            href: href.to_string(),
            anchor_text,
        });
    }
}

/// Extracts the URL from a meta refresh value such as `5; url=/next`
fn refresh_target(content: &str) -> Option<&str> {
    let lower = content.to_ascii_lowercase();
    let pos = lower.find("url=")?;
    let target = content[pos + 4..]
        .trim()
        .trim_matches(|c| c == '"' || c == '\'');
    (!target.is_empty()).then_some(target)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

/// Returns true if an href looks like a script or mail link
///
/// This is a heuristic: any `@` is treated as an e-mail address.
fn is_excluded_href(href: &str) -> bool {
    let lower = href.to_lowercase();
    let without_protocol = lower
        .strip_prefix("http://")
        .or_else(|| lower.strip_prefix("https://"))
        .unwrap_or(&lower);

    without_protocol.contains("javascript:")
        || without_protocol.contains("mailto:")
        || without_protocol.contains('@')
}

/// Classifies payloads and extracts content from them
///
/// A parser holds only its configuration and can be shared freely between
/// tasks; every call to [`Parser::parse`] is independent.
#[derive(Debug, Clone)]
pub struct Parser {
    config: ParserConfig,
}

impl Parser {
    pub fn new(mut config: ParserConfig) -> Self {
        for pattern in config
            .binary_content_types
            .iter_mut()
            .chain(config.binary_content_exceptions.iter_mut())
            .chain(config.plain_text_content_types.iter_mut())
        {
            *pattern = pattern.trim().to_lowercase();
        }
        Self { config }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parses a fetched payload
    ///
    /// # Arguments
    ///
    /// * `payload` - Raw response body
    /// * `content_type` - Declared Content-Type, if any
    /// * `charset_hint` - Charset from the response headers, if any
    /// * `context_url` - URL the payload was fetched from; base for relative links
    ///
    /// # Returns
    ///
    /// * `Ok(ParseOutcome)` - Binary marker, decoded text, or parsed HTML
    /// * `Err(ParseError::BinaryExcluded)` - Binary content while binary inclusion is off
    /// * `Err(ParseError::Decode)` - The text or markup could not be decoded
    ///
    /// # Example
    ///
    /// ```
    /// use wayfarer::config::ParserConfig;
    /// use wayfarer::crawler::Parser;
    ///
    /// let parser = Parser::new(ParserConfig::default());
    /// let html = br#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
    /// let outcome = parser.parse(html, Some("text/html"), None, "https://example.com/").unwrap();
    /// let links = outcome.outgoing_links();
    /// assert_eq!(links[0].target_url, "https://example.com/page");
    /// assert_eq!(links[0].anchor_text, "Link");
    /// ```
    pub fn parse(
        &self,
        payload: &[u8],
        content_type: Option<&str>,
        charset_hint: Option<&str>,
        context_url: &str,
    ) -> Result<ParseOutcome, ParseError> {
        let mime = content_type.unwrap_or("").to_lowercase();

        if self.is_binary(&mime) {
            if !self.config.include_binary_content {
                tracing::debug!("Skipping binary content ({}) at {}", mime, context_url);
                return Err(ParseError::BinaryExcluded { content_type: mime });
            }
            return Ok(ParseOutcome::Binary);
        }

        if self.is_plain_text(&mime) {
            let decoded = decode_bytes(payload, charset_hint).map_err(|e| {
                tracing::warn!("{}, while parsing: {}", e, context_url);
                e
            })?;
            return Ok(ParseOutcome::PlainText { text: decoded.text });
        }

        self.parse_html(payload, charset_hint, context_url)
    }

    fn parse_html(
        &self,
        payload: &[u8],
        charset_hint: Option<&str>,
        context_url: &str,
    ) -> Result<ParseOutcome, ParseError> {
        // Without a header charset, the document's own declaration decides
        let charset = match charset_hint {
            Some(hint) => Some(hint.to_string()),
            None => sniff_meta_charset(payload),
        };

        let decoded = decode_bytes(payload, charset.as_deref()).map_err(|e| {
            tracing::warn!("{}, while parsing: {}", e, context_url);
            e
        })?;

        let document = Html::parse_document(&decoded.text);
        for error in &document.errors {
            tracing::trace!("Markup error in {}: {}", context_url, error);
        }

        let page = HtmlAccumulator::collect(&document);

        let base_url = page
            .base_href
            .as_deref()
            .and_then(|base| canonicalize(base, Some(context_url)))
            .unwrap_or_else(|| context_url.to_string());

        let outgoing_links = self.select_links(&page.links, &base_url);

        tracing::debug!(
            "Parsed {} ({}): {} of {} links kept",
            context_url,
            decoded.encoding,
            outgoing_links.len(),
            page.links.len()
        );

        Ok(ParseOutcome::Html {
            body_text: page.body_text,
            title: page.title.or(page.dc_title),
            html: decoded.text,
            outgoing_links,
        })
    }

    /// Filters and canonicalizes raw links, stopping at the configured maximum
    fn select_links(&self, raw_links: &[RawLink], base_url: &str) -> Vec<LinkEdge> {
        let mut links = Vec::new();

        for raw in raw_links {
            if links.len() >= self.config.max_outgoing_links {
                tracing::debug!(
                    "Reached {} outgoing links, ignoring the rest",
                    self.config.max_outgoing_links
                );
                break;
            }

            let href = raw.href.trim();
            if href.is_empty() || is_excluded_href(href) {
                continue;
            }

            if let Some(target_url) = canonicalize(href, Some(base_url)) {
                links.push(LinkEdge {
                    target_url,
                    anchor_text: raw.anchor_text.clone(),
                });
            }
        }

        links
    }

    fn is_binary(&self, mime: &str) -> bool {
        matches_any(mime, &self.config.binary_content_types)
            && !matches_any(mime, &self.config.binary_content_exceptions)
    }

    fn is_plain_text(&self, mime: &str) -> bool {
        !mime.contains("html") && matches_any(mime, &self.config.plain_text_content_types)
    }
}

fn matches_any(mime: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| mime.contains(pattern.as_str()))
}
