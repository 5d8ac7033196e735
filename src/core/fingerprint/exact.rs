//! Exact content fingerprint.
//!
//! A BLAKE3 digest over the complete file bytes, rendered as lowercase hex.
//! Any re-encode, rotation or crop changes it.

/// Digest the full file contents
pub fn exact_fingerprint(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
