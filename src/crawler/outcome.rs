//! Data contracts passed between the fetcher, the parser and their caller

use reqwest::header::HeaderMap;
use std::fmt;

/// A single URL to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Absolute, already canonicalized target URL
    pub url: String,

    /// Identifier of the document the URL was found in (diagnostics only)
    pub parent_id: Option<String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            parent_id: None,
        }
    }

    pub fn with_parent(url: impl Into<String>, parent_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            parent_id: Some(parent_id.into()),
        }
    }

    /// Parent identifier for log lines, `-` when unknown
    pub fn parent_label(&self) -> &str {
        self.parent_id.as_deref().unwrap_or("-")
    }
}

/// Result of a fetch operation
///
/// Exactly one case is produced per call; none of them is an `Err`.
#[derive(Debug)]
pub enum FetchOutcome {
    /// HTTP 200 with a payload no larger than the configured maximum
    Success {
        /// The requested URL, or the transport's rewritten URI when it canonicalizes differently
        fetched_url: String,
        /// The request URI as reported by the transport
        final_url: String,
        /// Content-Type header value
        content_type: Option<String>,
        /// `charset` parameter of the Content-Type header
        charset_hint: Option<String>,
        /// Response body after transfer decoding
        payload: Vec<u8>,
        /// All response headers (e.g. for `Last-Modified`)
        response_headers: HeaderMap,
    },

    /// 3xx response; the redirect is never followed
    Redirect {
        status_code: u16,
        /// Canonical `Location` target, if present and valid
        target_url: Option<String>,
    },

    /// HTTP 404
    NotFound,

    /// Declared or observed body size exceeded the configured maximum
    TooLarge { size: u64 },

    /// Connection, DNS, timeout, TLS or body transfer failure
    TransportError {
        kind: TransportErrorKind,
        message: String,
    },

    /// Any other non-200 status
    HttpError { status_code: u16 },

    /// Failure that fits none of the above
    UnknownError { message: String },
}

impl FetchOutcome {
    /// Returns the HTTP status code associated with this outcome, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Success { .. } => Some(200),
            Self::NotFound => Some(404),
            Self::Redirect { status_code, .. } | Self::HttpError { status_code } => {
                Some(*status_code)
            }
            Self::TooLarge { .. } | Self::TransportError { .. } | Self::UnknownError { .. } => {
                None
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Short label used in log lines and the CLI summary
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Redirect { .. } => "redirect",
            Self::NotFound => "not-found",
            Self::TooLarge { .. } => "too-large",
            Self::TransportError { .. } => "transport-error",
            Self::HttpError { .. } => "http-error",
            Self::UnknownError { .. } => "unknown-error",
        }
    }
}

/// Classification of transport-level failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// Connection refused, reset during connect, DNS or TLS failure
    Connect,
    /// Connect or overall exchange timeout
    Timeout,
    /// Failure while sending the request
    Request,
    /// Failure while reading or decoding the response body
    Body,
    /// The fetcher has been shut down
    Closed,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Request => "request",
            Self::Body => "body",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A discovered outgoing link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEdge {
    /// Canonical absolute target URL
    pub target_url: String,
    /// Anchor text as it appeared in the document (empty for non-anchor sources)
    pub anchor_text: String,
}

/// Result of parsing a payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// Binary content; nothing is extracted
    Binary,

    /// Decoded plain text
    PlainText { text: String },

    /// Parsed HTML document
    Html {
        /// Visible body text, whitespace-trimmed
        body_text: String,
        title: Option<String>,
        /// The decoded markup
        html: String,
        /// Outgoing links in document order, duplicates kept
        outgoing_links: Vec<LinkEdge>,
    },
}

impl ParseOutcome {
    /// Outgoing links of an HTML document; empty for other outcomes
    pub fn outgoing_links(&self) -> &[LinkEdge] {
        match self {
            Self::Html { outgoing_links, .. } => outgoing_links,
            _ => &[],
        }
    }
}
