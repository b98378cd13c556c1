// src/core/mod.rs

/// Deterministic digest engine with memoized empty-subtree sentinels.
pub mod hash;
/// Raw record ingestion and the in-memory keyed record store.
pub mod record;
/// Sparse authenticated merkle tree with O(log N) path updates.
pub mod merkle;
/// Ordered batch application and root verification.
pub mod batch;

pub use batch::{BatchOp, BatchSequencer, SequencerState};
pub use hash::{Digest, HashEngine};
pub use merkle::{combine_layer, MerkleProof, SparseMerkleTree};
pub use record::{Record, RecordStore};
