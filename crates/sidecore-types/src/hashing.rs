//! Deterministic ID derivation.
//!
//! The spec pins several IDs to `sha256(...)[:16]` — the first 16 hex
//! characters of the digest of a `|`-joined field list. Centralizing this
//! keeps every call site (book trades, pool trades, NFT offers) bit-exact
//! with each other.

use sha2::{Digest, Sha256};

/// `sha256(parts.join("|"))[:16]` as lowercase hex.
pub fn deterministic_id(parts: &[&str]) -> String {
    let joined = parts.join("|");
    let digest = Sha256::digest(joined.as_bytes());
    hex::encode(digest)[..16].to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_deterministic_and_order_sensitive() {
        let a = deterministic_id(&["pair", "maker", "taker", "10", "5"]);
        let b = deterministic_id(&["pair", "maker", "taker", "10", "5"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        let c = deterministic_id(&["pair", "taker", "maker", "10", "5"]);
        assert_ne!(a, c);
    }
}
