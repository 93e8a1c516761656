//! The Merger phases (§4.E, §4.F): fan-in from every bucket's sorted
//! output into the final k-mer table and, optionally, per-read profiles.

pub mod profile;
pub mod table;

use crate::config::Config;
use crate::scheme::Scheme;
use anyhow::Result;

/// Runs the Table Merger: reads every bucket's table, merges and folds them,
/// applies the cutoff, and shards the result across `nthreads` output files.
pub fn merge_table(scheme: &Scheme, cfg: &Config, nthreads: usize) -> Result<usize> {
    let bucket_tables = table::read_all_bucket_tables(cfg, scheme.nparts, scheme.kmer)?;
    let merged = table::merge_tables(bucket_tables, scheme.table_cutoff);
    let count = merged.len();
    table::write_sharded(cfg, &merged, scheme.kmer, nthreads)?;
    Ok(count)
}

/// Runs the Profile Merger: reads every thread's run metadata and every
/// bucket's profile-entry shard, stitches per-read profiles and writes them.
pub fn merge_profile(scheme: &Scheme, cfg: &Config, nthreads_split: usize, nthreads_out: usize) -> Result<usize> {
    let runs_meta: Vec<Vec<profile::RunMeta>> = (0..nthreads_split)
        .map(|t| profile::read_runs_meta(&cfg.runs_meta_path(t)))
        .collect::<Result<_>>()?;

    let mut entries = Vec::new();
    for b in 0..scheme.nparts {
        let path = cfg.bucket_profile_path(b);
        if path.exists() {
            entries.extend(crate::sort::kmer::read_profile_entries(&path)?);
        }
    }

    let reads = profile::stitch_reads(&runs_meta, entries, scheme.kmer)?;
    let count = reads.len();
    profile::write_sharded(cfg, &reads, nthreads_out)?;
    Ok(count)
}
