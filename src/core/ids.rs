//! Short content-derived identifiers for units, restore points, and sessions.

use chrono::Utc;
use sha2::{Digest, Sha256};

/// First 8 hex chars of the SHA-256 of `input`.
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// `prefix_<hash8>` id salted with the current timestamp so repeated
/// captures of identical state stay distinct.
pub fn timestamped(prefix: &str, seed: &str) -> String {
    let now = Utc::now().to_rfc3339();
    format!("{}_{}", prefix, short_hash(&format!("{now}{seed}")))
}
