//! Hashing Utilities

use sha2::{Digest, Sha256};

/// Compute SHA-256 hash of content and return as hex string
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Checksum over serialized snapshot items.
///
/// Each section is tagged so moving an item between sections changes the hash.
pub fn snapshot_checksum(entity_items: &[String], relationship_items: &[String]) -> String {
    let mut hasher = Sha256::new();
    for (tag, items) in [("entity", entity_items), ("relationship", relationship_items)] {
        for item in items {
            hasher.update(tag.as_bytes());
            hasher.update(b"\x1f");
            hasher.update(item.as_bytes());
            hasher.update(b"\n");
        }
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_hash() {
        // Known SHA-256 hash for "hello"
        let hash = content_hash("hello");
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_snapshot_checksum_sensitivity() {
        let entities = vec![r#"{"id":"comp-a"}"#.to_string()];
        let relationships = vec![r#"{"from_id":"comp-a"}"#.to_string()];

        let base = snapshot_checksum(&entities, &relationships);
        assert_eq!(base.len(), 64);
        assert_eq!(base, snapshot_checksum(&entities, &relationships));

        // Same text in the other section hashes differently
        assert_ne!(base, snapshot_checksum(&relationships, &entities));

        let tampered = vec![r#"{"id":"comp-b"}"#.to_string()];
        assert_ne!(base, snapshot_checksum(&tampered, &relationships));
    }
}
