//! Content digests used for published locations and scoped names.

use sha2::{Digest, Sha256};

/// Hex SHA-256 of `parts`, each followed by a NUL separator, truncated to `len` digits.
#[must_use]
pub fn short_digest(parts: &[&str], len: usize) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(len);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_truncated() {
        let a = short_digest(&["export const x = 1;"], 16);
        assert_eq!(a.len(), 16);
        assert_eq!(a, short_digest(&["export const x = 1;"], 16));
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn field_boundaries_matter() {
        assert_ne!(short_digest(&["ab", "c"], 8), short_digest(&["a", "bc"], 8));
    }
}
