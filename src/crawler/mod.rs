//! Fetch-and-parse core
//!
//! This module contains the two processing stages a crawler runs per URL:
//! - HTTP fetching under a shared politeness delay and bounded download size
//! - Content classification, charset decoding and link extraction
//!
//! Frontier management, robots handling and persistence belong to callers.

mod decode;
mod fetcher;
mod outcome;
mod parser;
mod politeness;
mod pool;

pub use decode::{charset_from_content_type, decode_bytes, sniff_meta_charset, Decoded};
pub use fetcher::{build_http_client, Fetcher};
pub use outcome::{FetchOutcome, FetchRequest, LinkEdge, ParseOutcome, TransportErrorKind};
pub use parser::Parser;
pub use politeness::PoliteClock;
pub use pool::{ConnectionPool, ConnectionSlot, IdleReaper};
