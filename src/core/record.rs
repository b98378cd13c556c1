// src/core/record.rs

use std::collections::btree_map::{self, BTreeMap};
use std::io::BufRead;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{CommitteeError, Result};
use crate::types::{DuplicatePolicy, MalformedPolicy};

/// A single ledger record: a fixed-width key and an opaque value blob.
///
/// The value is whatever the external loader supplies (e.g. the serialized
/// vault state `stark_key,token,balance`); the core never interprets it
/// beyond hashing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Record {
    /// Fixed-width identifier (vault id, order id, ...).
    pub key: u64,
    /// Opaque value blob.
    #[serde(with = "serde_bytes_hex")]
    pub value: Vec<u8>,
}

// Dump artifacts are JSON; values are hex-encoded there so arbitrary bytes
// survive the round trip.
mod serde_bytes_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// In-memory keyed store of raw records for one subsystem.
///
/// Loaded once from external input (CSV rows or an in-memory sequence),
/// read-only thereafter until the next load. Iteration order is ascending by
/// key, which full-tree rebuilds and dump export rely on for determinism.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    records: BTreeMap<u64, Vec<u8>>,
}

impl RecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a sequence of (key, value) pairs, applying `duplicate_policy`
    /// when a key repeats within this load.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` under [`DuplicatePolicy::Reject`] if a key
    /// repeats; the row index in the error is the position of the second
    /// occurrence within the input sequence.
    pub fn load<I>(pairs: I, duplicate_policy: DuplicatePolicy) -> Result<Self>
    where
        I: IntoIterator<Item = (u64, Vec<u8>)>,
    {
        Self::load_rows(pairs.into_iter().enumerate(), duplicate_policy)
    }

    // Shared loader keyed by the caller's own row numbering, so errors from a
    // file ingest report file line indices, not positions in a filtered
    // intermediate.
    fn load_rows<I>(rows: I, duplicate_policy: DuplicatePolicy) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, (u64, Vec<u8>))>,
    {
        let mut records = BTreeMap::new();
        for (row, (key, value)) in rows {
            if records.contains_key(&key) {
                match duplicate_policy {
                    DuplicatePolicy::Reject => {
                        return Err(CommitteeError::DuplicateKey { key, row });
                    }
                    DuplicatePolicy::Overwrite => {
                        warn!("Duplicate key {} at row {}; overwriting earlier value", key, row);
                    }
                }
            }
            records.insert(key, value);
        }
        Ok(Self { records })
    }

    /// Loads records from CSV-shaped rows: the first column is the decimal
    /// key, the remainder of the row is kept verbatim as the opaque value.
    ///
    /// Blank lines are ignored. Unparsable rows are handled per
    /// `on_malformed`: rejected with row context under
    /// [`MalformedPolicy::Abort`], logged and skipped under
    /// [`MalformedPolicy::Skip`]. Row indices in errors always refer to the
    /// line's position in the input, counting blank and skipped lines.
    pub fn from_csv<R: BufRead>(
        reader: R,
        duplicate_policy: DuplicatePolicy,
        on_malformed: MalformedPolicy,
    ) -> Result<Self> {
        let mut pairs = Vec::new();
        for (row, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_row(line) {
                Ok(pair) => pairs.push((row, pair)),
                Err(reason) => match on_malformed {
                    MalformedPolicy::Abort => {
                        return Err(CommitteeError::malformed_record(row, reason));
                    }
                    MalformedPolicy::Skip => {
                        warn!("Skipping malformed record at row {}: {}", row, reason);
                    }
                },
            }
        }
        let store = Self::load_rows(pairs, duplicate_policy)?;
        info!("Read {} records", store.len());
        Ok(store)
    }

    /// Looks up the value for a key.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key has no record.
    pub fn lookup(&self, key: u64) -> Result<&[u8]> {
        self.records
            .get(&key)
            .map(Vec::as_slice)
            .ok_or_else(|| CommitteeError::not_found(format!("record for key {}", key)))
    }

    /// Iterates over all records in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[u8])> {
        self.records.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IntoIterator for RecordStore {
    type Item = (u64, Vec<u8>);
    type IntoIter = btree_map::IntoIter<u64, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Parses one CSV row into a (key, value) pair.
fn parse_row(line: &str) -> std::result::Result<(u64, Vec<u8>), String> {
    let (key_field, rest) = match line.split_once(',') {
        Some(split) => split,
        None => return Err("expected at least two comma-separated columns".to_string()),
    };
    let key = key_field
        .trim()
        .parse::<u64>()
        .map_err(|e| format!("invalid key '{}': {}", key_field.trim(), e))?;
    if rest.is_empty() {
        return Err("empty value columns".to_string());
    }
    Ok((key, rest.as_bytes().to_vec()))
}
