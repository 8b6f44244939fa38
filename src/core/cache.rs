// src/core/cache.rs

//! Content hashing for context fingerprints.

use anyhow::{Context, Result};
use log::debug;
use std::{fs, path::Path};

const HASH_TRUNCATE_LENGTH: usize = 16; // 16 bytes = 32 hex characters

/// Hashes the content of an input file of a context (a lock file or an interpreter).
///
/// # Errors
/// Returns an I/O error if the file cannot be read.
pub fn content_hash(path: &Path) -> Result<String> {
    let content = fs::read(path)
        .with_context(|| format!("Failed to read content of file '{}'", path.display()))?;
    let hash = truncated_hex(blake3::hash(&content));
    debug!("Content hash of '{}' ({} bytes): {}", path.display(), content.len(), hash);
    Ok(hash)
}

/// Content hash of an optional input file; a missing file hashes to `"missing"`
/// so that creating it later invalidates the fingerprint.
pub fn content_hash_or_missing(path: &Path) -> Result<String> {
    if !path.exists() {
        return Ok("missing".to_string());
    }
    content_hash(path)
}

/// Hashes an ordered list of labelled parts into a single fingerprint.
/// Each part is length-prefixed so that `["ab", "c"]` and `["a", "bc"]` differ.
pub fn fingerprint<'a>(parts: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut hasher = blake3::Hasher::new();
    for (label, value) in parts {
        for field in [label, value] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
    }
    truncated_hex(hasher.finalize())
}

fn truncated_hex(hash: blake3::Hash) -> String {
    hex::encode(hash.as_bytes().get(..HASH_TRUNCATE_LENGTH).unwrap_or_default())
}
