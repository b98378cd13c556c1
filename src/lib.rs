// src/lib.rs

pub mod committee;
pub mod config;
pub mod core;
pub mod dump;
pub mod error;
pub mod types;

pub use crate::committee::Committee;
pub use crate::config::Config;
pub use crate::core::{
    BatchOp, BatchSequencer, Digest, HashEngine, MerkleProof, RecordStore, SequencerState,
    SparseMerkleTree,
};
pub use crate::dump::DumpArtifact;
pub use crate::error::{CommitteeError, Result};
pub use crate::types::{DuplicatePolicy, HashAlgorithm, LogLevel, MalformedPolicy};
