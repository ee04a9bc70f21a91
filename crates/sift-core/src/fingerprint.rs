//! Query fingerprinting and content hashing
//!
//! A fingerprint is a stable SHA-256 over the semantically relevant parts of
//! a query (trimmed text, context, filters) in a canonical order; queries
//! with the same fingerprint are interchangeable for caching. Content text
//! hashes are a cheap 32-bit polynomial rendered in base-36, stored under
//! `content_hash:<id>` to make re-indexing idempotent.

use crate::QueryFilter;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Compute the cache fingerprint for a query
///
/// Context entries and filters are sorted before hashing, so insertion order
/// never changes the fingerprint.
pub fn query_fingerprint(
    text: &str,
    context: Option<&HashMap<String, String>>,
    filters: Option<&[QueryFilter]>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    hasher.update([0u8]);

    if let Some(context) = context {
        let mut entries: Vec<_> = context.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        for (key, value) in entries {
            hasher.update(key.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }
    }
    hasher.update([1u8]);

    if let Some(filters) = filters {
        let mut entries: Vec<String> = filters
            .iter()
            .map(|f| format!("{}:{}:{}", f.field, f.operator.as_str(), f.value))
            .collect();
        entries.sort();
        for entry in entries {
            hasher.update(entry.as_bytes());
            hasher.update([0u8]);
        }
    }

    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// 32-bit polynomial hash of content text, rendered base-36
///
/// Always non-negative; equal texts always hash equal, so an unchanged hash
/// short-circuits re-indexing.
pub fn content_text_hash(text: &str) -> String {
    let mut hash: u32 = 0;
    for byte in text.bytes() {
        hash = hash.wrapping_mul(31).wrapping_add(u32::from(byte));
    }
    to_base36(hash)
}

fn to_base36(mut value: u32) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut buf = Vec::new();
    while value > 0 {
        buf.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    buf.reverse();
    String::from_utf8(buf).expect("base36 digits are ascii")
}
