//! ETag generation and `If-None-Match` evaluation.

use sha2::{Digest, Sha256};

/// Strong ETag for a body: quoted hex of the first 16 bytes of its SHA-256.
pub fn compute(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    format!("\"{}\"", hex::encode(&digest[..16]))
}

/// Whether an `If-None-Match` header value matches `current`.
///
/// Weak validators compare equal to their strong form, as GET requests use the
/// weak comparison function.
pub fn matches(if_none_match: &str, current: &str) -> bool {
    let current = strip_weak(current.trim());
    if_none_match.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || (!candidate.is_empty() && strip_weak(candidate) == current)
    })
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}
