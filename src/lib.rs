//! Disk-based k-mer counter and per-read profiler for high-fidelity
//! shotgun sequencing reads: minimizer-partitioned super-mers, a two-stage
//! external sort per bucket, and a merge fan-in into a k-mer table and,
//! optionally, per-read count profiles.

pub mod config;
pub mod error;
pub mod handles;
pub mod input;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod scheme;
pub mod sort;
pub mod splitter;
pub mod stage;
pub mod varbyte;

pub use config::Config;
pub use error::FastkError;
pub use scheme::Scheme;
