//! The Bucket Sorter (spec.md §4.D): per-bucket super-mer fold followed by
//! k-mer expansion, fold and (optionally) profile-entry resolution.

pub mod kmer;
pub mod supermer;

use crate::config::Config;
use crate::scheme::Scheme;
use anyhow::Result;

/// Runs both sort stages for one bucket and writes its table (and, if
/// requested, profile-entry) shard to the temp directory.
pub fn sort_bucket(scheme: &Scheme, cfg: &Config, bucket: usize, nthreads: usize) -> Result<()> {
    let data_paths = crate::handles::bucket_shard_paths(cfg, bucket, nthreads);
    let index_paths = crate::handles::bucket_index_shard_paths(cfg, bucket, nthreads);
    let raw = supermer::read_bucket_records(&data_paths, &index_paths, scheme.kmer)?;

    let weighted = supermer::stage1(
        raw.clone(),
        scheme.kmer,
        scheme.sort_memory_bytes,
        cfg.tmp_dir.path(),
    )?;
    let table = kmer::build_table(&weighted, scheme.kmer);
    kmer::write_table(&cfg.bucket_table_path(bucket), &table, scheme.kmer)?;

    if scheme.want_profile {
        let entries = kmer::build_profile_entries(&raw, scheme.kmer, &table);
        kmer::write_profile_entries(&cfg.bucket_profile_path(bucket), &entries)?;
    }

    for p in data_paths.iter().chain(index_paths.iter()) {
        let _ = std::fs::remove_file(p);
    }
    Ok(())
}
