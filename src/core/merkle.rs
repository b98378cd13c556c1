// src/core/merkle.rs

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::core::hash::{Digest, HashEngine};
use crate::core::record::RecordStore;
use crate::error::{CommitteeError, Result};
use crate::types::HashAlgorithm;

/// Sibling digests from the leaf level up to (but excluding) the root.
///
/// Together with the leaf value (or its absence) this authenticates a single
/// key against a root digest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleProof {
    /// The key the proof was generated for.
    pub key: u64,
    /// Sibling digests, index 0 being the leaf-level sibling.
    pub siblings: Vec<Digest>,
}

impl MerkleProof {
    /// Verifies this proof against a claimed root.
    ///
    /// `value` is the leaf value being proven; `None` proves the key is
    /// unallocated (the leaf carries the canonical empty-leaf digest).
    pub fn verify(&self, engine: &HashEngine, value: Option<&[u8]>, root: &Digest) -> bool {
        let mut digest = match value {
            Some(v) => engine.leaf_digest(v),
            None => engine.empty_leaf_digest(),
        };
        let mut index = self.key;
        for sibling in &self.siblings {
            digest = if index & 1 == 0 {
                engine.node_digest(&digest, sibling)
            } else {
                engine.node_digest(sibling, &digest)
            };
            index >>= 1;
        }
        digest == *root
    }
}

/// Sparse authenticated binary tree over fixed-width keys.
///
/// Only non-empty nodes are materialized; every unallocated subtree is
/// represented by the engine's precomputed empty-subtree sentinel for its
/// height. An update therefore touches exactly the O(height) path from the
/// changed leaf to the root and nothing else.
#[derive(Debug, Clone)]
pub struct SparseMerkleTree {
    height: u8,
    engine: HashEngine,
    leaves: BTreeMap<u64, Vec<u8>>,
    // (level, index) -> digest for materialized nodes. Level 0 holds leaf
    // digests, level `height` holds the root. Entries equal to the empty
    // sentinel for their level are pruned rather than stored.
    nodes: HashMap<(u8, u64), Digest>,
    root: Digest,
}

impl SparseMerkleTree {
    /// Creates an empty tree of the given address width.
    ///
    /// The root of a freshly created tree equals
    /// `empty_subtree_digest(height)`.
    pub fn new(algorithm: HashAlgorithm, height: u8) -> Self {
        let engine = HashEngine::new(algorithm, height);
        let root = engine.empty_subtree_digest(height);
        Self {
            height,
            engine,
            leaves: BTreeMap::new(),
            nodes: HashMap::new(),
            root,
        }
    }

    /// Builds a tree from every record in a store, in ascending key order.
    pub fn from_records(
        algorithm: HashAlgorithm,
        height: u8,
        store: &RecordStore,
    ) -> Result<Self> {
        let mut tree = Self::new(algorithm, height);
        for (key, value) in store.iter() {
            tree.set(key, value.to_vec())?;
        }
        Ok(tree)
    }

    /// The tree's address width in bits.
    pub fn height(&self) -> u8 {
        self.height
    }

    /// The digest engine backing this tree.
    pub fn engine(&self) -> &HashEngine {
        &self.engine
    }

    /// The current root commitment.
    pub fn root(&self) -> Digest {
        self.root
    }

    /// Number of live (non-empty) leaves.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether the tree holds no live leaves.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Iterates over live (key, value) pairs in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[u8])> {
        self.leaves.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Inserts or replaces a leaf, recomputing the O(height) ancestor path,
    /// and returns the new root.
    ///
    /// # Errors
    ///
    /// Returns `KeyOutOfRange` if the key does not fit in `height` bits and
    /// `InvalidInput` for a zero-length value. An empty value would hash to
    /// the empty-leaf sentinel, making the leaf live for lookups but absent
    /// from the commitment; clearing a leaf goes through [`Self::remove`].
    pub fn set(&mut self, key: u64, value: Vec<u8>) -> Result<Digest> {
        self.check_write(key, &value)?;
        let leaf_digest = self.engine.leaf_digest(&value);
        self.leaves.insert(key, value);
        Ok(self.update_path(key, leaf_digest))
    }

    /// Resets a leaf to the canonical empty-leaf value and returns the new
    /// root. Removing an already-absent key is a no-op on the root.
    ///
    /// # Errors
    ///
    /// Returns `KeyOutOfRange` if the key does not fit in `height` bits.
    pub fn remove(&mut self, key: u64) -> Result<Digest> {
        self.check_key(key)?;
        self.leaves.remove(&key);
        let empty_leaf = self.engine.empty_leaf_digest();
        Ok(self.update_path(key, empty_leaf))
    }

    /// Returns the value for a key together with its inclusion proof.
    ///
    /// # Errors
    ///
    /// Returns `KeyOutOfRange` for keys outside the address width and
    /// `NotFound` for unallocated keys (use [`Self::proof`] for
    /// non-inclusion proofs).
    pub fn get(&self, key: u64) -> Result<(&[u8], MerkleProof)> {
        self.check_key(key)?;
        let value = self
            .leaves
            .get(&key)
            .ok_or_else(|| CommitteeError::not_found(format!("key {} in tree", key)))?;
        Ok((value.as_slice(), self.proof_unchecked(key)))
    }

    /// Generates the sibling proof for any in-range key, allocated or not.
    pub fn proof(&self, key: u64) -> Result<MerkleProof> {
        self.check_key(key)?;
        Ok(self.proof_unchecked(key))
    }

    /// Verifies that every materialized internal node matches the digest of
    /// its children.
    ///
    /// # Errors
    ///
    /// Returns `CorruptTree` naming the first mismatching node.
    pub fn check_consistency(&self) -> Result<()> {
        for (&(level, index), digest) in &self.nodes {
            if level == 0 {
                let expected = match self.leaves.get(&index) {
                    Some(value) => self.engine.leaf_digest(value),
                    None => self.engine.empty_leaf_digest(),
                };
                if *digest != expected {
                    return Err(CommitteeError::corrupt_tree(format!(
                        "leaf digest mismatch at key {}",
                        index
                    )));
                }
                continue;
            }
            let left = self.node_digest_at(level - 1, index << 1);
            let right = self.node_digest_at(level - 1, (index << 1) | 1);
            let expected = self.engine.node_digest(&left, &right);
            if *digest != expected {
                return Err(CommitteeError::corrupt_tree(format!(
                    "child digest mismatch at level {} index {}",
                    level, index
                )));
            }
        }
        let expected_root = self.node_digest_at(self.height, 0);
        if self.root != expected_root {
            return Err(CommitteeError::corrupt_tree(
                "stored root does not match top node".to_string(),
            ));
        }
        Ok(())
    }

    /// Checks that a key fits in the tree's address width.
    ///
    /// # Errors
    ///
    /// Returns `KeyOutOfRange` if it does not.
    pub fn check_key(&self, key: u64) -> Result<()> {
        if self.height < 64 && (key >> self.height) != 0 {
            return Err(CommitteeError::KeyOutOfRange {
                key,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Validates a prospective [`Self::set`] without performing it. Callers
    /// that apply several writes atomically vet each one here first, so a
    /// rejected write never leaves earlier writes behind.
    pub fn check_write(&self, key: u64, value: &[u8]) -> Result<()> {
        self.check_key(key)?;
        if value.is_empty() {
            return Err(CommitteeError::invalid_input(format!(
                "empty value for key {}; clearing a leaf requires remove",
                key
            )));
        }
        Ok(())
    }

    fn proof_unchecked(&self, key: u64) -> MerkleProof {
        let mut siblings = Vec::with_capacity(self.height as usize);
        let mut index = key;
        for level in 0..self.height {
            siblings.push(self.node_digest_at(level, index ^ 1));
            index >>= 1;
        }
        MerkleProof { key, siblings }
    }

    /// Recomputes the digests on the path from `key`'s leaf to the root,
    /// starting from `digest` at the leaf level. Returns the new root.
    fn update_path(&mut self, key: u64, mut digest: Digest) -> Digest {
        let mut index = key;
        self.set_node(0, index, digest);
        for level in 0..self.height {
            let sibling = self.node_digest_at(level, index ^ 1);
            digest = if index & 1 == 0 {
                self.engine.node_digest(&digest, &sibling)
            } else {
                self.engine.node_digest(&sibling, &digest)
            };
            index >>= 1;
            self.set_node(level + 1, index, digest);
        }
        self.root = digest;
        digest
    }

    fn node_digest_at(&self, level: u8, index: u64) -> Digest {
        self.nodes
            .get(&(level, index))
            .copied()
            .unwrap_or_else(|| self.engine.empty_subtree_digest(level))
    }

    fn set_node(&mut self, level: u8, index: u64, digest: Digest) {
        if digest == self.engine.empty_subtree_digest(level) {
            self.nodes.remove(&(level, index));
        } else {
            self.nodes.insert((level, index), digest);
        }
    }
}

/// Folds a complete layer of equal-height subtree digests pairwise up to a
/// single root digest.
///
/// Used to recompute a claimed root from the subtree roots recorded in a
/// dump, without materializing the subtrees themselves.
///
/// # Errors
///
/// Returns `InvalidInput` unless the layer length is a non-zero power of two.
pub fn combine_layer(engine: &HashEngine, layer: &[Digest]) -> Result<Digest> {
    if layer.is_empty() || !layer.len().is_power_of_two() {
        return Err(CommitteeError::invalid_input(
            "layer length must be a non-zero power of two",
        ));
    }
    let mut level: Vec<Digest> = layer.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| engine.node_digest(&pair[0], &pair[1]))
            .collect();
    }
    Ok(level[0])
}
