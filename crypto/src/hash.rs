//! Blake2b-256 digests.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

/// Incremental Blake2b-256 hasher.
///
/// Used for domain-separated digests built from several fixed-width fields,
/// such as the signed payload of a vote.
#[derive(Clone, Default)]
pub struct Blake2bHasher {
    inner: Blake2b<U32>,
}

impl Blake2bHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a digest whose first bytes are a domain tag.
    pub fn with_domain(domain: &[u8]) -> Self {
        let mut hasher = Self::new();
        hasher.update(domain);
        hasher
    }

    pub fn update(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        self.inner.update(data.as_ref());
        self
    }

    pub fn finalize(self) -> [u8; 32] {
        let mut output = [0u8; 32];
        output.copy_from_slice(&self.inner.finalize());
        output
    }
}

/// Compute a 256-bit Blake2b hash of arbitrary data.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2bHasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Hash multiple byte slices in sequence without concatenating them.
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Blake2bHasher::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        assert_eq!(blake2b_256(b"hello orv"), blake2b_256(b"hello orv"));
    }

    #[test]
    fn different_inputs_differ() {
        assert_ne!(blake2b_256(b"hello"), blake2b_256(b"world"));
    }

    #[test]
    fn multi_matches_concatenation() {
        let single = blake2b_256(b"helloworld");
        let multi = blake2b_256_multi(&[b"hello", b"world"]);
        assert_eq!(single, multi);
    }

    #[test]
    fn domain_separates_digests() {
        let plain = blake2b_256(b"payload");
        let mut tagged = Blake2bHasher::with_domain(b"vote ");
        tagged.update(b"payload");
        assert_ne!(plain, tagged.finalize());
    }
}
