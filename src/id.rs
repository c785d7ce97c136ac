//! Deterministic, content-addressed chunk identifiers.
//!
//! An id is `"<source_id>:<version>:<hash10>"` where `hash10` is the first
//! ten hex digits of the SHA-256 of the chunk text. The prefix keeps
//! identical text from different (source, version) pairs apart; within one
//! pair, identical text means an identical id, which the assembler treats as
//! a duplicate.

use sha2::{Digest, Sha256};

/// Number of hex digits kept from the content hash.
pub const HASH_LEN: usize = 10;

pub fn make_id(source_id: &str, version: &str, text: &str) -> String {
    format!("{}:{}:{}", source_id, version, content_hash(text))
}

/// Truncated SHA-256 hex digest of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(HASH_LEN);
    hex
}
