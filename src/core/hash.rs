// src/core/hash.rs

use sha2::{Digest as Sha2Digest, Sha256};

use crate::types::HashAlgorithm;

/// A 32-byte digest. Both supported algorithms produce this width; the width
/// and the algorithm identifier together form the compatibility contract
/// with external verifiers.
pub type Digest = [u8; 32];

// Domain separation tags keep leaf digests and internal-node digests from
// ever colliding with each other.
const LEAF_TAG: u8 = 0x00;
const NODE_TAG: u8 = 0x01;

/// Deterministic digest engine for one tree.
///
/// Provides leaf hashing, internal-node hashing, and the memoized
/// empty-subtree sentinel per height. The sentinels let empty branches cost
/// O(1) storage: an unallocated subtree of height `h` is represented by
/// `empty_subtree_digest(h)` instead of materialized nodes.
#[derive(Debug, Clone)]
pub struct HashEngine {
    algorithm: HashAlgorithm,
    // empty[h] is the digest of a fully empty subtree of height h;
    // empty[0] is the canonical empty-leaf digest.
    empty: Vec<Digest>,
}

impl HashEngine {
    /// Creates an engine for the given algorithm, precomputing the
    /// empty-subtree sentinels up to (and including) `height`.
    pub fn new(algorithm: HashAlgorithm, height: u8) -> Self {
        let mut empty = Vec::with_capacity(height as usize + 1);
        empty.push(digest_parts(algorithm, &[&[LEAF_TAG], &[]]));
        for h in 1..=height as usize {
            let child = empty[h - 1];
            empty.push(digest_parts(algorithm, &[&[NODE_TAG], &child, &child]));
        }
        Self { algorithm, empty }
    }

    /// The digest algorithm this engine was constructed with.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Computes the digest of a leaf value.
    pub fn leaf_digest(&self, value: &[u8]) -> Digest {
        self.hash_parts(&[&[LEAF_TAG], value])
    }

    /// Computes the digest of an internal node from its children.
    pub fn node_digest(&self, left: &Digest, right: &Digest) -> Digest {
        self.hash_parts(&[&[NODE_TAG], left, right])
    }

    /// Returns the precomputed sentinel digest of an empty subtree of the
    /// given height. Height 0 is the canonical empty-leaf digest.
    ///
    /// # Panics
    ///
    /// Panics if `height` exceeds the height the engine was built for; the
    /// tree builder never requests a sentinel above its own height.
    pub fn empty_subtree_digest(&self, height: u8) -> Digest {
        self.empty[height as usize]
    }

    /// The canonical empty-leaf digest (`empty_subtree_digest(0)`).
    pub fn empty_leaf_digest(&self) -> Digest {
        self.empty[0]
    }

    fn hash_parts(&self, parts: &[&[u8]]) -> Digest {
        digest_parts(self.algorithm, parts)
    }
}

fn digest_parts(algorithm: HashAlgorithm, parts: &[&[u8]]) -> Digest {
    match algorithm {
        HashAlgorithm::Sha256 => {
            let mut hasher = Sha256::new();
            for part in parts {
                hasher.update(part);
            }
            hasher.finalize().into()
        }
        HashAlgorithm::Blake3 => {
            let mut hasher = blake3::Hasher::new();
            for part in parts {
                hasher.update(part);
            }
            *hasher.finalize().as_bytes()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_digest_deterministic() {
        let engine = HashEngine::new(HashAlgorithm::Sha256, 8);
        assert_eq!(engine.leaf_digest(b"vault"), engine.leaf_digest(b"vault"));
        assert_ne!(engine.leaf_digest(b"vault"), engine.leaf_digest(b"vault2"));
    }

    #[test]
    fn test_node_digest_order_sensitive() {
        let engine = HashEngine::new(HashAlgorithm::Sha256, 8);
        let a = engine.leaf_digest(b"a");
        let b = engine.leaf_digest(b"b");
        assert_ne!(engine.node_digest(&a, &b), engine.node_digest(&b, &a));
    }

    #[test]
    fn test_leaf_and_node_domains_separated() {
        let engine = HashEngine::new(HashAlgorithm::Sha256, 8);
        let a = engine.leaf_digest(b"x");
        let b = engine.leaf_digest(b"y");
        // A leaf whose value happens to be the concatenation of two child
        // digests must not collide with the internal node over them.
        let mut concat = Vec::with_capacity(64);
        concat.extend_from_slice(&a);
        concat.extend_from_slice(&b);
        assert_ne!(engine.leaf_digest(&concat), engine.node_digest(&a, &b));
    }

    #[test]
    fn test_empty_sentinels_chain() {
        let engine = HashEngine::new(HashAlgorithm::Sha256, 4);
        assert_eq!(engine.empty_subtree_digest(0), engine.leaf_digest(&[]));
        for h in 1..=4u8 {
            let child = engine.empty_subtree_digest(h - 1);
            assert_eq!(
                engine.empty_subtree_digest(h),
                engine.node_digest(&child, &child)
            );
        }
    }

    #[test]
    fn test_algorithms_disagree() {
        let sha = HashEngine::new(HashAlgorithm::Sha256, 2);
        let b3 = HashEngine::new(HashAlgorithm::Blake3, 2);
        assert_ne!(sha.leaf_digest(b"v"), b3.leaf_digest(b"v"));
        assert_ne!(sha.empty_subtree_digest(2), b3.empty_subtree_digest(2));
    }
}
