//! Content digest for migration units.

use sha2::{Digest, Sha256};

/// Length of a hex-encoded digest returned by [`digest`].
pub const DIGEST_HEX_LEN: usize = 64;

/// Compute the lowercase hex SHA-256 digest of a unit's raw text.
///
/// The digest covers the exact bytes of the text, so any edit (including
/// whitespace) produces a different value.
pub fn digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_deterministic() {
        assert_eq!(digest("CREATE TABLE foo (id INT);"), digest("CREATE TABLE foo (id INT);"));
    }

    #[test]
    fn test_digest_is_fixed_length_hex() {
        let d = digest("anything");
        assert_eq!(d.len(), DIGEST_HEX_LEN);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_digest_known_value() {
        assert_eq!(
            digest(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_whitespace_changes_digest() {
        assert_ne!(digest("SELECT 1"), digest("SELECT 1 "));
    }
}
