//! Content digests for the persistent cache tier
//!
//! The persistent tier is addressed only by `sha256(json(config) + source)`,
//! never by file name, so entries survive restarts and are shared between
//! configuration instances with identical content.

use crate::config::SiteConfig;
use crate::error::TrellisResult;
use sha2::{Digest, Sha256};

/// Prefix for persistent-tier keys
pub const KEY_PREFIX: &str = "compiler-cache-";

/// Hex SHA256 over the serialized configuration followed by the source text
pub fn content_digest(config: &SiteConfig, source: &str) -> TrellisResult<String> {
    let serialized = serde_json::to_string(config)?;

    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    hasher.update(source.as_bytes());

    Ok(hex::encode(hasher.finalize()))
}

/// Persistent-tier key for a digest
pub fn store_key(digest: &str) -> String {
    format!("{}{}", KEY_PREFIX, digest)
}
