//! URL handling module for Wayfarer
//!
//! Canonicalization of link targets and redirect locations, plus the
//! per-destination key the connection pool groups by.

mod domain;
mod normalize;

pub use domain::host_key;
pub use normalize::{canonical_url, canonicalize};
