//! Secret digest helper.
//!
//! Raw session and reset secrets are never persisted; their SHA-256 hex
//! digest is the lookup key instead. The digest must therefore be stable
//! across restarts (no salt, no per-process state).

use sha2::{Digest, Sha256};

/// Hashes an input string with SHA-256, returning a 64-character lowercase
/// hex string.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}
