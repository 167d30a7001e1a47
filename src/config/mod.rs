//! Configuration module for Wayfarer
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use wayfarer::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("wayfarer.toml")).unwrap();
//! println!("Max download size: {}", config.fetcher.max_download_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, FetcherConfig, ParserConfig, ProxyConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{load_config, parse_config};

pub(crate) use validation::validate_fetcher_config;
