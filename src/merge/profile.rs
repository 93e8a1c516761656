//! §4.F Profile Merger: stitches per-bucket, per-occurrence k-mer counts
//! back into per-read count profiles and writes the sharded `.prof` output.
//!
//! A read's k-mers can land in any of `NPARTS` buckets depending on their
//! minimizer, so a single read's profile is assembled from entries scattered
//! across every bucket's profile-entry shard, keyed by `(thread, run_index)`
//! and ordered by `kmer_start_offset` within a run.

use crate::error::FastkError;
use crate::sort::kmer::ProfileEntry;
use crate::varbyte::encode_profile;
use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxBuildHasher;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// One run's provenance as recorded by the Splitter: which original read it
/// came from, and how many bases it held (so the reconstructed profile's
/// length can be checked against `len - kmer + 1`).
#[derive(Debug, Clone, Copy)]
pub struct RunMeta {
    pub read_id: u64,
    pub run_index: u64,
    pub len: u32,
}

pub fn read_runs_meta(path: &Path) -> Result<Vec<RunMeta>> {
    let mut r = BufReader::new(
        File::open(path).with_context(|| format!("opening run metadata {}", path.display()))?,
    );
    let mut out = Vec::new();
    loop {
        let read_id = match r.read_u64::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(FastkError::Io(e).into()),
        };
        let run_index = r.read_u64::<LittleEndian>().map_err(FastkError::Io)?;
        let len = r.read_u32::<LittleEndian>().map_err(FastkError::Io)?;
        out.push(RunMeta { read_id, run_index, len });
    }
    Ok(out)
}

/// Builds one run's ordered count vector from its scattered entries,
/// checking the reconstructed length against `runs_meta`.
fn assemble_run(mut entries: Vec<ProfileEntry>, kmer: usize, run_len: u32) -> Result<Vec<u16>> {
    entries.sort_unstable_by_key(|e| e.kmer_start_offset);
    let expected = (run_len as usize).saturating_sub(kmer - 1);
    if entries.len() != expected {
        return Err(FastkError::Invariant(format!(
            "profile run has {} k-mer entries, expected {expected}",
            entries.len()
        ))
        .into());
    }
    Ok(entries.iter().map(|e| e.count.min(u16::MAX as u32) as u16).collect())
}

/// Stitches every thread's runs, in `run_index` order, into per-read
/// profiles: consecutive runs sharing a `read_id` (an N-split read's
/// fragments) are concatenated into one profile.
pub fn stitch_reads(
    runs_meta_by_thread: &[Vec<RunMeta>],
    entries: Vec<ProfileEntry>,
    kmer: usize,
) -> Result<Vec<(u64, Vec<u16>)>> {
    let mut by_run: HashMap<(u32, u64), Vec<ProfileEntry>, FxBuildHasher> = HashMap::default();
    for e in entries {
        by_run.entry((e.thread, e.run_index)).or_default().push(e);
    }

    let mut out: Vec<(u64, Vec<u16>)> = Vec::new();
    for (t, runs) in runs_meta_by_thread.iter().enumerate() {
        for meta in runs {
            let run_entries = by_run.remove(&(t as u32, meta.run_index)).unwrap_or_default();
            let counts = assemble_run(run_entries, kmer, meta.len)?;
            match out.last_mut() {
                Some((read_id, profile)) if *read_id == meta.read_id => {
                    profile.extend(counts);
                }
                _ => out.push((meta.read_id, counts)),
            }
        }
    }
    Ok(out)
}

/// Writes one `.prof.N` shard: `[i64 nreads][offsets: (nreads+1) x u64 LE]
/// [varbyte-encoded profiles, concatenated]` (spec.md §5).
pub fn write_profile_shard(path: &Path, reads: &[(u64, Vec<u16>)]) -> Result<()> {
    let mut blobs = Vec::with_capacity(reads.len());
    let mut offsets = Vec::with_capacity(reads.len() + 1);
    offsets.push(0u64);
    for (_, counts) in reads {
        let blob = encode_profile(counts);
        offsets.push(offsets.last().unwrap() + blob.len() as u64);
        blobs.push(blob);
    }

    let mut w = BufWriter::new(
        File::create(path).with_context(|| format!("creating profile shard {}", path.display()))?,
    );
    w.write_i64::<LittleEndian>(reads.len() as i64)?;
    for off in &offsets {
        w.write_u64::<LittleEndian>(*off)?;
    }
    for blob in &blobs {
        w.write_all(blob)?;
    }
    w.flush()?;
    Ok(())
}

/// Splits stitched per-read profiles into `nthreads` contiguous shards and
/// writes each, alongside recording each read's entry-count so a reader can
/// decode without rescanning (length of `counts` recoverable from the
/// surrounding k-mer table instead of stored twice).
pub fn write_sharded(cfg: &crate::config::Config, reads: &[(u64, Vec<u16>)], nthreads: usize) -> Result<()> {
    let nthreads = nthreads.max(1);
    let shard_len = reads.len().div_ceil(nthreads).max(1);
    for (t, chunk) in reads.chunks(shard_len).enumerate() {
        write_profile_shard(&cfg.profile_shard_path(t), chunk)?;
    }
    let produced = reads.len().div_ceil(shard_len).max(1);
    for t in produced..nthreads {
        write_profile_shard(&cfg.profile_shard_path(t), &[])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(thread: u32, run_index: u64, off: u32, count: u32) -> ProfileEntry {
        ProfileEntry {
            thread,
            run_index,
            kmer_start_offset: off,
            count,
        }
    }

    #[test]
    fn stitches_n_split_fragments_into_one_profile() {
        // One read of len 20 split by an N into two runs of 8 and 6 bases
        // (kmer = 4): run0 has 5 k-mers, run1 has 3.
        let runs_meta = vec![vec![
            RunMeta { read_id: 0, run_index: 0, len: 8 },
            RunMeta { read_id: 0, run_index: 1, len: 6 },
            RunMeta { read_id: 1, run_index: 2, len: 10 },
        ]];
        let mut entries = Vec::new();
        for p in 0..5 {
            entries.push(entry(0, 0, p, 10 + p));
        }
        for p in 0..3 {
            entries.push(entry(0, 1, p, 20 + p));
        }
        for p in 0..7 {
            entries.push(entry(0, 2, p, 1));
        }

        let reads = stitch_reads(&runs_meta, entries, 4).unwrap();
        assert_eq!(reads.len(), 2);
        assert_eq!(reads[0].0, 0);
        assert_eq!(reads[0].1.len(), 8); // 5 + 3 concatenated
        assert_eq!(reads[0].1, vec![10, 11, 12, 13, 14, 20, 21, 22]);
        assert_eq!(reads[1].0, 1);
        assert_eq!(reads[1].1.len(), 7);
    }

    #[test]
    fn assemble_run_rejects_length_mismatch() {
        let entries = vec![entry(0, 0, 0, 1), entry(0, 0, 1, 1)];
        let err = assemble_run(entries, 4, 10).unwrap_err();
        assert!(err.to_string().contains("expected"));
    }
}
