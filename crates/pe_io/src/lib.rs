//! crates/pe_io/src/lib.rs
//! Collaborator-side I/O for the scoring engine.
//!
//! - `loader`: size-limited JSON reads, loose decoding into `pe_core` records
//! - `canonical_json`: sorted-key compact bytes + atomic file write
//! - `hasher`: SHA-256 hex digests over raw or canonical bytes
//!
//! The scoring crates never touch the filesystem; only this crate and the CLI do.

#![forbid(unsafe_code)]

use thiserror::Error;

/// Unified error for pe_io.
#[derive(Debug, Error)]
pub enum IoError {
    /// Filesystem / path errors (open, read, create_dir_all, rename).
    #[error("io/path error: {0}")]
    Path(String),

    /// JSON syntax or shape errors, with the location that failed.
    #[error("json error at {pointer}: {msg}")]
    Json { pointer: String, msg: String },

    /// Input larger than the per-file byte limit.
    #[error("{path}: larger than {limit} bytes")]
    Limit { path: String, limit: u64 },

    /// Well-formed JSON that is not a usable input.
    #[error("invalid: {0}")]
    Invalid(String),
}

impl From<std::io::Error> for IoError {
    fn from(e: std::io::Error) -> Self {
        IoError::Path(e.to_string())
    }
}

pub mod canonical_json;
pub mod hasher;
pub mod loader;

pub use canonical_json::{to_canonical_json_bytes, write_canonical_file};
pub use hasher::{sha256_canonical_value, sha256_hex};
pub use loader::{
    load_formula, load_grade_cuts, load_highest_map, load_practical_formula,
    load_practical_submission, load_scores, read_json_value_with_limits, Loaded, MAX_INPUT_BYTES,
};
