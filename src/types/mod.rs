//! Core type definitions for committee-trees

mod hash_algorithm;
mod log_level;
mod policy;

pub use hash_algorithm::HashAlgorithm;
pub use log_level::LogLevel;
pub use policy::{DuplicatePolicy, MalformedPolicy};
