//! Content-hash engine (C3): a stable SHA-256 over a note's metadata and
//! body, used for optimistic-concurrency updates. Grounded on the
//! teacher's use of `sha2`/`hex` for content addressing in
//! `qipu-core::content` (hash-then-hex-encode pattern), adapted to this
//! system's canonicalization rule (spec §4.3).

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::metadata::MetadataMap;

/// Byte separating the canonicalized metadata block from the body in the
/// hash input (ASCII record separator, 0x1E).
const SEPARATOR: u8 = 0x1E;

/// Canonicalize metadata into a byte string: keys sorted lexicographically,
/// values JSON-encoded (spec §4.3). A `BTreeMap` gives us the sort for
/// free; `serde_json` gives us the encoding.
fn canonicalize_metadata(metadata: &MetadataMap) -> Vec<u8> {
    let sorted: BTreeMap<&str, serde_json::Value> = metadata
        .iter()
        .map(|(k, v)| (k.as_str(), v.to_json()))
        .collect();
    serde_json::to_vec(&sorted).unwrap_or_default()
}

/// Compute the content hash over `metadata` (reserved fields excluded by
/// the caller) and `body`, hex-encoded.
pub fn content_hash(metadata: &MetadataMap, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonicalize_metadata(metadata));
    hasher.update([SEPARATOR]);
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

/// `true` if `expected` matches the hash computed for `(metadata, body)`.
pub fn verify(expected: &str, metadata: &MetadataMap, body: &str) -> bool {
    content_hash(metadata, body) == expected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataValue;

    #[test]
    fn hash_is_deterministic() {
        let mut m = MetadataMap::new();
        m.insert("tags".to_string(), MetadataValue::List(vec!["a".into()]));
        let h1 = content_hash(&m, "body text");
        let h2 = content_hash(&m, "body text");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn hash_is_independent_of_insertion_order() {
        let mut a = MetadataMap::new();
        a.insert("alpha".to_string(), MetadataValue::String("1".into()));
        a.insert("beta".to_string(), MetadataValue::String("2".into()));

        let mut b = MetadataMap::new();
        b.insert("beta".to_string(), MetadataValue::String("2".into()));
        b.insert("alpha".to_string(), MetadataValue::String("1".into()));

        assert_eq!(content_hash(&a, "x"), content_hash(&b, "x"));
    }

    #[test]
    fn hash_changes_with_body_or_metadata() {
        let m = MetadataMap::new();
        let h1 = content_hash(&m, "one");
        let h2 = content_hash(&m, "two");
        assert_ne!(h1, h2);

        let mut m2 = MetadataMap::new();
        m2.insert("k".to_string(), MetadataValue::Bool(true));
        assert_ne!(content_hash(&m, "one"), content_hash(&m2, "one"));
    }

    #[test]
    fn verify_matches_content_hash() {
        let m = MetadataMap::new();
        let h = content_hash(&m, "body");
        assert!(verify(&h, &m, "body"));
        assert!(!verify(&h, &m, "other"));
    }
}
