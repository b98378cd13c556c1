//! Dump export and re-ingestion.
//!
//! A dump artifact is the complete, re-ingestible representation of one
//! subsystem tree at one batch: every live key/value pair plus the root
//! digest and the tree parameters needed to recompute it. An independent
//! party can rebuild the tree from the artifact alone and must arrive at the
//! same root.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};

use crate::core::hash::Digest;
use crate::core::merkle::SparseMerkleTree;
use crate::core::record::{Record, RecordStore};
use crate::error::{CommitteeError, Result};
use crate::types::{DuplicatePolicy, HashAlgorithm};

/// Serialized view of one subsystem tree at one batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DumpArtifact {
    /// Name of the dumped subsystem ("vaults", "orders", ...).
    pub subsystem: String,
    /// The batch this view corresponds to.
    pub batch_id: u64,
    /// Address width of the source tree.
    pub tree_height: u8,
    /// Digest algorithm the root was computed with.
    pub hash_algorithm: HashAlgorithm,
    /// Root commitment at `batch_id`, hex-encoded.
    pub root: String,
    /// When the dump was produced.
    pub created_at: DateTime<Utc>,
    /// Every live key/value pair, in ascending key order.
    pub entries: Vec<Record>,
}

impl DumpArtifact {
    /// Captures the current state of `tree` as an artifact for `batch_id`.
    pub fn from_tree(subsystem: &str, batch_id: u64, tree: &SparseMerkleTree) -> Self {
        let entries = tree
            .iter()
            .map(|(key, value)| Record {
                key,
                value: value.to_vec(),
            })
            .collect::<Vec<_>>();
        info!(
            "Dumping {} entries of subsystem '{}' at batch {}",
            entries.len(),
            subsystem,
            batch_id
        );
        Self {
            subsystem: subsystem.to_string(),
            batch_id,
            tree_height: tree.height(),
            hash_algorithm: tree.engine().algorithm(),
            root: hex::encode(tree.root()),
            created_at: Utc::now(),
            entries,
        }
    }

    /// Decodes the hex root into a digest.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the root field is not a 32-byte hex string.
    pub fn root_digest(&self) -> Result<Digest> {
        let bytes = hex::decode(&self.root)
            .map_err(|e| CommitteeError::invalid_input(format!("bad root hex: {}", e)))?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| CommitteeError::invalid_input("root must be 32 bytes"))
    }

    /// Serializes the artifact as JSON to a writer.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes an artifact from a JSON reader.
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Writes the artifact to a file, creating or truncating it.
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads an artifact from a file.
    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::read_from(BufReader::new(file))
    }

    /// Re-ingests the artifact's entries into a record store.
    ///
    /// A well-formed artifact has unique keys; duplicates are rejected
    /// regardless of configuration, since they indicate a corrupt dump.
    pub fn to_record_store(&self) -> Result<RecordStore> {
        RecordStore::load(
            self.entries.iter().map(|r| (r.key, r.value.clone())),
            DuplicatePolicy::Reject,
        )
    }

    /// Rebuilds the tree from the artifact's entries.
    pub fn rebuild_tree(&self) -> Result<SparseMerkleTree> {
        let store = self.to_record_store()?;
        SparseMerkleTree::from_records(self.hash_algorithm, self.tree_height, &store)
    }

    /// Rebuilds the tree and checks the recomputed root against the
    /// artifact's recorded root.
    ///
    /// # Errors
    ///
    /// Returns `RootMismatch` if the rebuilt root disagrees with the
    /// artifact, meaning the dump does not represent the state it claims to.
    pub fn verify(&self) -> Result<SparseMerkleTree> {
        let tree = self.rebuild_tree()?;
        let expected = self.root_digest()?;
        if tree.root() != expected {
            return Err(CommitteeError::RootMismatch {
                batch_id: self.batch_id,
                expected: self.root.clone(),
                computed: hex::encode(tree.root()),
            });
        }
        Ok(tree)
    }
}
