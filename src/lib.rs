//! Wayfarer: a polite fetch-and-parse core
//!
//! This crate fetches one web resource at a time under a shared politeness
//! delay, classifies the HTTP outcome, and turns HTML payloads into body text
//! plus a canonical list of outgoing links. Crawl ordering, persistence and
//! robots.txt policy belong to the caller.

pub mod config;
pub mod crawler;
pub mod url;

use thiserror::Error;

/// Main error type for Wayfarer operations
#[derive(Debug, Error)]
pub enum WayfarerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Errors produced by [`crawler::Parser::parse`]
///
/// A parse error means the caller should drop the page; it never carries a
/// partially parsed document.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Binary content ({content_type}) is excluded from crawling")]
    BinaryExcluded { content_type: String },

    #[error("Failed to decode content as {charset}: {message}")]
    Decode { charset: String, message: String },
}

/// Result type alias for Wayfarer operations
pub type Result<T> = std::result::Result<T, WayfarerError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{FetchOutcome, FetchRequest, Fetcher, LinkEdge, ParseOutcome, Parser};
pub use url::canonicalize;
