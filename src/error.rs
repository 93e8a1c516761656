//! Error kinds for the core pipeline (§7 of the design).
//!
//! Every fallible core function returns `anyhow::Result`; these variants are
//! the leaf errors that get wrapped in `anyhow::Context` as they propagate
//! to a phase boundary. There is no recovery path: any of these aborts the
//! run.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FastkError {
    /// Invalid flag, incompatible pre-existing table, unreadable temp dir.
    #[error("configuration error: {0}")]
    Config(String),

    /// File-descriptor limit unreachable, or a bucket that cannot be sorted
    /// in the memory budget even after spilling.
    #[error("resource error: {0}")]
    Resource(String),

    /// Average read length too short for the chosen k, or a malformed
    /// input block.
    #[error("input error: sequences too short (average length {avg_len:.1} < 1.5 * k={kmer})")]
    InputTooShort { avg_len: f64, kmer: usize },

    #[error("input error: {0}")]
    InputMalformed(String),

    /// Read/write/unlink failure on a bucket or output file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal invariant was violated (bug, not user error).
    #[error("invariant violation: {0}")]
    Invariant(String),
}
