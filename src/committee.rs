//! Top-level committee state: one tree and one sequencer per configured
//! subsystem.
//!
//! All tree parameters come from explicit [`Config`] passed into the
//! constructor, so multiple independent committee instances can coexist in
//! one process (there is no process-wide tree state). `apply_batch` takes
//! `&mut self` and reads take `&self`: the single-logical-writer rule is
//! enforced by the borrow checker, not an internal lock.

use std::collections::BTreeMap;

use log::info;

use crate::config::Config;
use crate::core::batch::{BatchOp, BatchSequencer, SequencerState};
use crate::core::hash::Digest;
use crate::core::merkle::{MerkleProof, SparseMerkleTree};
use crate::core::record::RecordStore;
use crate::dump::DumpArtifact;
use crate::error::{CommitteeError, Result};

/// One subsystem's authenticated state: the live tree snapshot plus the
/// batch ledger that produced it.
#[derive(Debug, Clone)]
struct SubsystemState {
    tree: SparseMerkleTree,
    sequencer: BatchSequencer,
}

/// Committee member state over all configured subsystem trees.
#[derive(Debug, Clone)]
pub struct Committee {
    config: Config,
    subsystems: BTreeMap<String, SubsystemState>,
}

impl Committee {
    /// Builds a committee from a validated configuration, creating an empty
    /// tree per configured subsystem.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` fails validation.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let mut subsystems = BTreeMap::new();
        for subsystem in &config.subsystems {
            subsystems.insert(
                subsystem.name.clone(),
                SubsystemState {
                    tree: SparseMerkleTree::new(config.hash.algorithm, subsystem.tree_height),
                    sequencer: BatchSequencer::new(),
                },
            );
        }
        Ok(Self { config, subsystems })
    }

    /// The configuration this committee was constructed with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Names of all configured subsystems, in sorted order.
    pub fn subsystem_names(&self) -> impl Iterator<Item = &str> {
        self.subsystems.keys().map(String::as_str)
    }

    /// Applies a loaded record store as batch 0 of a subsystem, one upsert
    /// per record in ascending key order, and returns the resulting root.
    pub fn bootstrap(&mut self, subsystem: &str, store: &RecordStore) -> Result<Digest> {
        let ops: Vec<BatchOp> = store
            .iter()
            .map(|(key, value)| BatchOp::Upsert {
                key,
                value: value.to_vec(),
            })
            .collect();
        let root = self.apply_batch(subsystem, 0, &ops)?;
        info!("{} merkle root: {}", subsystem, hex::encode(root));
        Ok(root)
    }

    /// Applies `ops` as batch `batch_id` to the named subsystem.
    ///
    /// # Errors
    ///
    /// `UnknownSubsystem` for unconfigured names, plus every sequencer and
    /// tree error from [`BatchSequencer::apply_batch`].
    pub fn apply_batch(
        &mut self,
        subsystem: &str,
        batch_id: u64,
        ops: &[BatchOp],
    ) -> Result<Digest> {
        let state = self.state_mut(subsystem)?;
        state.sequencer.apply_batch(&mut state.tree, batch_id, ops)
    }

    /// Checks an externally claimed root for an applied batch of the named
    /// subsystem. A mismatch is reported, never corrected.
    pub fn verify_root(&mut self, subsystem: &str, batch_id: u64, expected: &Digest) -> Result<()> {
        self.state_mut(subsystem)?.sequencer.verify_root(batch_id, expected)
    }

    /// The current root commitment of the named subsystem.
    pub fn root(&self, subsystem: &str) -> Result<Digest> {
        Ok(self.state_ref(subsystem)?.tree.root())
    }

    /// The sequencer lifecycle state of the named subsystem.
    pub fn sequencer_state(&self, subsystem: &str) -> Result<SequencerState> {
        Ok(self.state_ref(subsystem)?.sequencer.state())
    }

    /// Looks up a key in the named subsystem, returning the value and its
    /// inclusion proof against the current root.
    pub fn get(&self, subsystem: &str, key: u64) -> Result<(&[u8], MerkleProof)> {
        self.state_ref(subsystem)?.tree.get(key)
    }

    /// Exports the named subsystem at `batch_id` as a re-ingestible dump
    /// artifact.
    ///
    /// Only the most recently applied batch is materialized; requesting any
    /// other batch id fails. The tree's internal consistency is checked
    /// before export so a corrupt snapshot is never serialized.
    ///
    /// # Errors
    ///
    /// `UnknownSubsystem` for unconfigured names, `NotFound` if `batch_id`
    /// is not the materialized batch, `CorruptTree` if the consistency
    /// check fails.
    pub fn dump(&self, subsystem: &str, batch_id: u64) -> Result<DumpArtifact> {
        let state = self.state_ref(subsystem)?;
        match state.sequencer.last_applied() {
            Some(last) if last == batch_id => {}
            Some(last) => {
                return Err(CommitteeError::not_found(format!(
                    "batch {} of subsystem '{}' (materialized snapshot is batch {})",
                    batch_id, subsystem, last
                )));
            }
            None => {
                return Err(CommitteeError::not_found(format!(
                    "batch {} of subsystem '{}' (no batch applied yet)",
                    batch_id, subsystem
                )));
            }
        }
        state.tree.check_consistency()?;
        Ok(DumpArtifact::from_tree(subsystem, batch_id, &state.tree))
    }

    fn state_ref(&self, subsystem: &str) -> Result<&SubsystemState> {
        self.subsystems
            .get(subsystem)
            .ok_or_else(|| CommitteeError::UnknownSubsystem(subsystem.to_string()))
    }

    fn state_mut(&mut self, subsystem: &str) -> Result<&mut SubsystemState> {
        self.subsystems
            .get_mut(subsystem)
            .ok_or_else(|| CommitteeError::UnknownSubsystem(subsystem.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DuplicatePolicy;
    use assert_matches::assert_matches;

    fn committee() -> Committee {
        Committee::new(Config::default()).unwrap()
    }

    fn upsert(key: u64, value: &str) -> BatchOp {
        BatchOp::Upsert {
            key,
            value: value.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_unknown_subsystem_rejected() {
        let mut c = committee();
        assert_matches!(
            c.apply_batch("escrow", 0, &[]),
            Err(CommitteeError::UnknownSubsystem(_))
        );
        assert_matches!(c.root("escrow"), Err(CommitteeError::UnknownSubsystem(_)));
        assert_matches!(c.dump("escrow", 0), Err(CommitteeError::UnknownSubsystem(_)));
    }

    #[test]
    fn test_subsystems_are_independent() {
        let mut c = committee();
        let vaults_empty = c.root("vaults").unwrap();
        let orders_empty = c.root("orders").unwrap();
        c.apply_batch("vaults", 0, &[upsert(1, "A")]).unwrap();
        assert_ne!(c.root("vaults").unwrap(), vaults_empty);
        assert_eq!(c.root("orders").unwrap(), orders_empty);
    }

    #[test]
    fn test_bootstrap_equals_manual_batch_zero() {
        let store = RecordStore::load(
            vec![(1, b"A".to_vec()), (2, b"B".to_vec())],
            DuplicatePolicy::Reject,
        )
        .unwrap();

        let mut via_bootstrap = committee();
        let root_a = via_bootstrap.bootstrap("vaults", &store).unwrap();

        let mut via_ops = committee();
        let root_b = via_ops
            .apply_batch("vaults", 0, &[upsert(1, "A"), upsert(2, "B")])
            .unwrap();
        assert_eq!(root_a, root_b);
    }

    #[test]
    fn test_dump_requires_materialized_batch() {
        let mut c = committee();
        assert_matches!(c.dump("vaults", 0), Err(CommitteeError::NotFound(_)));
        c.apply_batch("vaults", 0, &[upsert(1, "A")]).unwrap();
        c.apply_batch("vaults", 1, &[upsert(1, "B")]).unwrap();
        assert_matches!(c.dump("vaults", 0), Err(CommitteeError::NotFound(_)));
        let artifact = c.dump("vaults", 1).unwrap();
        assert_eq!(artifact.batch_id, 1);
        assert_eq!(artifact.root_digest().unwrap(), c.root("vaults").unwrap());
    }

    #[test]
    fn test_get_proof_verifies_against_committee_root() {
        let mut c = committee();
        c.apply_batch("vaults", 0, &[upsert(5, "hello")]).unwrap();
        let root = c.root("vaults").unwrap();
        let (value, proof) = c.get("vaults", 5).unwrap();
        assert_eq!(value, b"hello");
        let engine = crate::core::hash::HashEngine::new(
            c.config().hash.algorithm,
            c.config().subsystem("vaults").unwrap().tree_height,
        );
        assert!(proof.verify(&engine, Some(b"hello"), &root));
    }

    #[test]
    fn test_verify_root_updates_state() {
        let mut c = committee();
        let root = c.apply_batch("vaults", 0, &[upsert(1, "A")]).unwrap();
        c.verify_root("vaults", 0, &root).unwrap();
        assert_eq!(
            c.sequencer_state("vaults").unwrap(),
            SequencerState::Verified(0)
        );
    }
}
