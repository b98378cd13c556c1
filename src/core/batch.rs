// src/core/batch.rs

use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest as Sha2Digest, Sha256};

use crate::core::hash::Digest;
use crate::core::merkle::SparseMerkleTree;
use crate::error::{CommitteeError, Result};

/// One record mutation within a batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BatchOp {
    /// Insert or replace the value at `key`.
    Upsert {
        /// Target key.
        key: u64,
        /// New value, hex-encoded in serialized form.
        #[serde(with = "hex_value")]
        value: Vec<u8>,
    },
    /// Reset the leaf at `key` to the canonical empty-leaf value.
    Remove {
        /// Target key.
        key: u64,
    },
}

mod hex_value {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Sequencer lifecycle, advanced by `apply_batch` and `verify_root`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// No batch has been applied yet.
    Empty,
    /// The named batch has been applied; its root is not yet verified.
    Loaded(u64),
    /// The named batch's root matched an externally claimed root.
    Verified(u64),
    /// The named batch's root diverged from an externally claimed root.
    Rejected(u64),
}

/// Ledger entry for one applied batch.
#[derive(Debug, Clone)]
struct AppliedBatch {
    ops_digest: Digest,
    root: Digest,
}

/// Applies ordered batches of record mutations to a tree and keeps the
/// canonical per-batch root ledger.
///
/// Batches must be applied strictly in increasing `batch_id` order starting
/// from 0. Re-applying an already-applied batch with identical operations is
/// a no-op that returns the cached root; re-applying with different
/// operations is a conflict. The sequencer exclusively owns the root
/// sequence; the tree is threaded explicitly through each call so a rebuild
/// from scratch over the same batch history is a pure fold.
#[derive(Debug, Clone, Default)]
pub struct BatchSequencer {
    applied: Vec<AppliedBatch>,
    state: Option<SequencerState>,
}

impl BatchSequencer {
    /// Creates a sequencer with no applied batches.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SequencerState {
        self.state.unwrap_or(SequencerState::Empty)
    }

    /// The id of the most recently applied batch, if any.
    pub fn last_applied(&self) -> Option<u64> {
        (self.applied.len() as u64).checked_sub(1)
    }

    /// The recorded root for an applied batch.
    pub fn root_at(&self, batch_id: u64) -> Option<Digest> {
        self.applied.get(batch_id as usize).map(|b| b.root)
    }

    /// Applies `ops` as batch `batch_id` against `tree`, in input order, and
    /// returns the resulting root.
    ///
    /// Duplicate keys within `ops` resolve by last-write-wins in application
    /// order.
    ///
    /// # Errors
    ///
    /// - `OutOfOrderBatch` if `batch_id` is not the next expected id.
    /// - `BatchConflict` if `batch_id` was already applied with different ops.
    /// - `KeyOutOfRange` or `InvalidInput` if any operation is unapplyable.
    ///   Every op is vetted against the tree before the first mutation, so a
    ///   rejected batch leaves both the tree and the ledger exactly as they
    ///   were.
    pub fn apply_batch(
        &mut self,
        tree: &mut SparseMerkleTree,
        batch_id: u64,
        ops: &[BatchOp],
    ) -> Result<Digest> {
        let expected = self.applied.len() as u64;
        let ops_digest = ops_digest(ops);

        if batch_id < expected {
            let prior = &self.applied[batch_id as usize];
            if prior.ops_digest == ops_digest {
                debug!("Batch {} already applied; returning cached root", batch_id);
                return Ok(prior.root);
            }
            return Err(CommitteeError::BatchConflict { batch_id });
        }
        if batch_id > expected {
            return Err(CommitteeError::OutOfOrderBatch {
                expected,
                got: batch_id,
            });
        }

        // All-or-nothing: no op may touch the tree until every op has been
        // vetted, otherwise a mid-batch failure would strand partial writes
        // that the ledger never accounts for.
        for op in ops {
            match op {
                BatchOp::Upsert { key, value } => tree.check_write(*key, value)?,
                BatchOp::Remove { key } => tree.check_key(*key)?,
            }
        }

        for op in ops {
            match op {
                BatchOp::Upsert { key, value } => {
                    tree.set(*key, value.clone())?;
                }
                BatchOp::Remove { key } => {
                    tree.remove(*key)?;
                }
            }
        }

        let root = tree.root();
        self.applied.push(AppliedBatch { ops_digest, root });
        self.state = Some(SequencerState::Loaded(batch_id));
        info!(
            "Applied batch {} ({} ops), root: {}",
            batch_id,
            ops.len(),
            hex::encode(root)
        );
        Ok(root)
    }

    /// Compares the locally computed root for `batch_id` against an
    /// externally claimed root.
    ///
    /// A mismatch signals state divergence: it is reported as
    /// `RootMismatch` and never corrected.
    ///
    /// # Errors
    ///
    /// - `NotFound` if `batch_id` has not been applied.
    /// - `RootMismatch` if the claimed root disagrees with the recorded one.
    pub fn verify_root(&mut self, batch_id: u64, expected: &Digest) -> Result<()> {
        let computed = self
            .root_at(batch_id)
            .ok_or_else(|| CommitteeError::not_found(format!("applied batch {}", batch_id)))?;

        if computed == *expected {
            self.state = Some(SequencerState::Verified(batch_id));
            info!("Batch {} root verified: {}", batch_id, hex::encode(computed));
            Ok(())
        } else {
            self.state = Some(SequencerState::Rejected(batch_id));
            Err(CommitteeError::RootMismatch {
                batch_id,
                expected: hex::encode(expected),
                computed: hex::encode(computed),
            })
        }
    }
}

/// Canonical fingerprint of an ordered op sequence, used for idempotence and
/// conflict detection. Always SHA-256; this digest never leaves the process
/// and is independent of the tree's configured algorithm.
fn ops_digest(ops: &[BatchOp]) -> Digest {
    let mut hasher = Sha256::new();
    for op in ops {
        match op {
            BatchOp::Upsert { key, value } => {
                hasher.update([0u8]);
                hasher.update(key.to_be_bytes());
                hasher.update((value.len() as u64).to_be_bytes());
                hasher.update(value);
            }
            BatchOp::Remove { key } => {
                hasher.update([1u8]);
                hasher.update(key.to_be_bytes());
            }
        }
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HashAlgorithm;
    use assert_matches::assert_matches;

    fn tree() -> SparseMerkleTree {
        SparseMerkleTree::new(HashAlgorithm::Sha256, 8)
    }

    fn upsert(key: u64, value: &str) -> BatchOp {
        BatchOp::Upsert {
            key,
            value: value.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_apply_advances_state() {
        let mut t = tree();
        let mut seq = BatchSequencer::new();
        assert_eq!(seq.state(), SequencerState::Empty);
        let root = seq.apply_batch(&mut t, 0, &[upsert(1, "A")]).unwrap();
        assert_eq!(seq.state(), SequencerState::Loaded(0));
        assert_eq!(seq.last_applied(), Some(0));
        assert_eq!(seq.root_at(0), Some(root));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut t = tree();
        let mut seq = BatchSequencer::new();
        let err = seq.apply_batch(&mut t, 3, &[upsert(1, "A")]).unwrap_err();
        assert_matches!(err, CommitteeError::OutOfOrderBatch { expected: 0, got: 3 });
    }

    #[test]
    fn test_idempotent_reapply_returns_cached_root() {
        let mut t = tree();
        let mut seq = BatchSequencer::new();
        let ops = vec![upsert(1, "A"), upsert(2, "B")];
        let root0 = seq.apply_batch(&mut t, 0, &ops).unwrap();
        seq.apply_batch(&mut t, 1, &[upsert(1, "C")]).unwrap();
        // Re-applying batch 0 with identical ops is a no-op even though the
        // tree has since moved on.
        let cached = seq.apply_batch(&mut t, 0, &ops).unwrap();
        assert_eq!(cached, root0);
        assert_eq!(seq.last_applied(), Some(1));
    }

    #[test]
    fn test_rejected_batch_leaves_tree_and_ledger_untouched() {
        let mut t = tree();
        let mut seq = BatchSequencer::new();
        let empty_root = t.root();

        // The second op's key exceeds the height-8 address width; the first
        // op must not have touched the tree by the time it is rejected.
        let bad = vec![upsert(2, "B"), upsert(1 << 40, "X")];
        let err = seq.apply_batch(&mut t, 0, &bad).unwrap_err();
        assert_matches!(err, CommitteeError::KeyOutOfRange { .. });
        assert_eq!(t.root(), empty_root);
        assert!(t.is_empty());
        assert_eq!(seq.state(), SequencerState::Empty);
        assert_eq!(seq.last_applied(), None);

        // Batch 0 can then be applied cleanly and its root matches a fresh
        // sequencer fed the identical batch.
        let root = seq.apply_batch(&mut t, 0, &[upsert(1, "A")]).unwrap();
        let mut fresh_tree = tree();
        let mut fresh_seq = BatchSequencer::new();
        let fresh_root = fresh_seq
            .apply_batch(&mut fresh_tree, 0, &[upsert(1, "A")])
            .unwrap();
        assert_eq!(root, fresh_root);
    }

    #[test]
    fn test_empty_value_op_rejected_before_mutation() {
        let mut t = tree();
        let mut seq = BatchSequencer::new();
        let err = seq
            .apply_batch(&mut t, 0, &[upsert(1, "A"), upsert(2, "")])
            .unwrap_err();
        assert_matches!(err, CommitteeError::InvalidInput(_));
        assert!(t.is_empty());
        assert_eq!(seq.last_applied(), None);
    }

    #[test]
    fn test_conflicting_reapply_rejected() {
        let mut t = tree();
        let mut seq = BatchSequencer::new();
        seq.apply_batch(&mut t, 0, &[upsert(1, "A")]).unwrap();
        let err = seq.apply_batch(&mut t, 0, &[upsert(1, "B")]).unwrap_err();
        assert_matches!(err, CommitteeError::BatchConflict { batch_id: 0 });
    }

    #[test]
    fn test_last_write_wins_within_batch() {
        let mut t1 = tree();
        let mut seq1 = BatchSequencer::new();
        seq1.apply_batch(&mut t1, 0, &[upsert(1, "A"), upsert(1, "B")])
            .unwrap();

        let mut t2 = tree();
        let mut seq2 = BatchSequencer::new();
        seq2.apply_batch(&mut t2, 0, &[upsert(1, "B")]).unwrap();

        assert_eq!(t1.root(), t2.root());
        assert_eq!(t1.get(1).unwrap().0, b"B");
    }

    #[test]
    fn test_remove_then_upsert_order_matters() {
        let mut t = tree();
        let mut seq = BatchSequencer::new();
        seq.apply_batch(
            &mut t,
            0,
            &[upsert(1, "A"), BatchOp::Remove { key: 1 }, upsert(1, "Z")],
        )
        .unwrap();
        assert_eq!(t.get(1).unwrap().0, b"Z");
    }

    #[test]
    fn test_verify_root_match_and_mismatch() {
        let mut t = tree();
        let mut seq = BatchSequencer::new();
        let root = seq.apply_batch(&mut t, 0, &[upsert(1, "A")]).unwrap();

        seq.verify_root(0, &root).unwrap();
        assert_eq!(seq.state(), SequencerState::Verified(0));

        let bogus = [0x42; 32];
        let err = seq.verify_root(0, &bogus).unwrap_err();
        assert_matches!(err, CommitteeError::RootMismatch { batch_id: 0, .. });
        assert_eq!(seq.state(), SequencerState::Rejected(0));
    }

    #[test]
    fn test_verify_unapplied_batch_not_found() {
        let mut seq = BatchSequencer::new();
        assert_matches!(
            seq.verify_root(0, &[0u8; 32]),
            Err(CommitteeError::NotFound(_))
        );
    }

    #[test]
    fn test_ops_digest_sensitive_to_order_and_kind() {
        let a = vec![upsert(1, "A"), upsert(2, "B")];
        let b = vec![upsert(2, "B"), upsert(1, "A")];
        assert_ne!(ops_digest(&a), ops_digest(&b));
        assert_ne!(
            ops_digest(&[upsert(1, "")]),
            ops_digest(&[BatchOp::Remove { key: 1 }])
        );
        assert_eq!(ops_digest(&a), ops_digest(&a.clone()));
    }

    #[test]
    fn test_batch_op_json_round_trip() {
        let ops = vec![upsert(7, "hello"), BatchOp::Remove { key: 9 }];
        let json = serde_json::to_string(&ops).unwrap();
        let back: Vec<BatchOp> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ops);
    }
}
