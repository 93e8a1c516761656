//! §4.E Table Merger: k-way merges every bucket's sorted table into the
//! final cutoff-filtered k-mer table, sharded into `NTHREADS` output files.
//!
//! Buckets are disjoint by minimizer, so in the common case no code repeats
//! across buckets; the heap-based merge folds duplicates anyway as a safety
//! net rather than assuming strict disjointness.

use crate::sort::kmer::{read_table, KmerCount};
use anyhow::Result;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::path::Path;

struct HeapItem {
    code: u128,
    bucket: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
    }
}
impl Eq for HeapItem {}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.code.cmp(&other.code)
    }
}

/// Merges `bucket_tables` (each already sorted by code) into one globally
/// sorted, cutoff-filtered sequence of [`KmerCount`].
pub fn merge_tables(bucket_tables: Vec<Vec<KmerCount>>, cutoff: Option<u16>) -> Vec<KmerCount> {
    let mut cursors = vec![0usize; bucket_tables.len()];
    let mut heap = BinaryHeap::new();
    for (b, table) in bucket_tables.iter().enumerate() {
        if let Some(first) = table.first() {
            heap.push(Reverse(HeapItem { code: first.code, bucket: b }));
        }
    }

    let mut merged: Vec<KmerCount> = Vec::new();
    while let Some(Reverse(item)) = heap.pop() {
        let b = item.bucket;
        let rec = bucket_tables[b][cursors[b]];
        cursors[b] += 1;
        match merged.last_mut() {
            Some(last) if last.code == rec.code => {
                last.count = last.count.saturating_add(rec.count);
            }
            _ => merged.push(rec),
        }
        if let Some(next) = bucket_tables[b].get(cursors[b]) {
            heap.push(Reverse(HeapItem { code: next.code, bucket: b }));
        }
    }

    match cutoff {
        Some(c) => merged.into_iter().filter(|kc| kc.count >= c as u32).collect(),
        None => merged,
    }
}

pub fn read_all_bucket_tables(cfg: &crate::config::Config, nparts: usize, kmer: usize) -> Result<Vec<Vec<KmerCount>>> {
    (0..nparts)
        .map(|b| read_table(&cfg.bucket_table_path(b), kmer))
        .collect()
}

/// Splits `merged` (globally sorted) into `nthreads` contiguous, roughly
/// equal shards and writes each to its own output file alongside `stub`.
pub fn write_sharded(cfg: &crate::config::Config, merged: &[KmerCount], kmer: usize, nthreads: usize) -> Result<()> {
    let nthreads = nthreads.max(1);
    let shard_len = merged.len().div_ceil(nthreads).max(1);
    for (t, chunk) in merged.chunks(shard_len).enumerate() {
        crate::sort::kmer::write_table(&cfg.table_shard_path(t), chunk, kmer)?;
    }
    // Ensure empty trailing shards exist even when merged is shorter than
    // nthreads, so downstream tooling can always expect exactly nthreads
    // shard files.
    let produced = merged.len().div_ceil(shard_len.max(1)).max(1);
    for t in produced..nthreads {
        crate::sort::kmer::write_table(&cfg.table_shard_path(t), &[], kmer)?;
    }
    Ok(())
}

#[allow(dead_code)]
fn shard_exists(cfg: &crate::config::Config, t: usize) -> bool {
    Path::new(&cfg.table_shard_path(t)).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kc(code: u128, count: u32) -> KmerCount {
        KmerCount { code, count }
    }

    #[test]
    fn merge_sums_counts_for_duplicate_codes_across_buckets() {
        let tables = vec![vec![kc(1, 3), kc(5, 1)], vec![kc(1, 4), kc(2, 9)]];
        let merged = merge_tables(tables, None);
        assert_eq!(merged, vec![kc(1, 7), kc(2, 9), kc(5, 1)]);
    }

    #[test]
    fn merge_applies_cutoff() {
        let tables = vec![vec![kc(1, 1), kc(2, 10)]];
        let merged = merge_tables(tables, Some(5));
        assert_eq!(merged, vec![kc(2, 10)]);
    }
}
