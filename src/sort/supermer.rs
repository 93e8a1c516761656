//! Stage 1 of the Bucket Sorter (spec.md §4.D): read a bucket's super-mer
//! records, sort lexicographically by packed bases then length, and fold
//! adjacent equal records into weighted super-mers. Spills to disk with an
//! equal-sized-run k-way merge when the bucket would exceed `SORT_MEMORY`.

use crate::error::FastkError;
use crate::model::{bases_byte_width, pack_bases, unpack_bases};
use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

/// One raw super-mer instance as written by a splitter thread, paired with
/// the provenance the profile branch needs to place it back in its read.
#[derive(Debug, Clone)]
pub struct RawSuperMer {
    pub bases: Vec<u64>,
    pub len_minus_km1: u16,
    pub thread: u32,
    pub run_index: u64,
    pub kmer_start_offset: u32,
}

/// A super-mer after duplicate folding: `mult` identical instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedSuperMer {
    pub bases: Vec<u64>,
    pub len_minus_km1: u16,
    pub mult: u32,
}

fn sort_key(bases: &[u64], len: u16) -> (&[u64], u16) {
    (bases, len)
}

/// Reads every per-thread shard of one bucket, decoding length-prefixed
/// super-mer records and their matching run-index entries.
pub fn read_bucket_records(
    data_paths: &[PathBuf],
    index_paths: &[PathBuf],
    kmer: usize,
) -> Result<Vec<RawSuperMer>> {
    let mut out = Vec::new();
    for (t, (dpath, ipath)) in data_paths.iter().zip(index_paths.iter()).enumerate() {
        let mut data = BufReader::new(
            File::open(dpath).with_context(|| format!("opening {}", dpath.display()))?,
        );
        let mut index = BufReader::new(
            File::open(ipath).with_context(|| format!("opening {}", ipath.display()))?,
        );
        loop {
            let len_minus_km1 = match data.read_u8() {
                Ok(b) => b as u16,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(FastkError::Io(e).into()),
            };
            let nbases = len_minus_km1 as usize + kmer - 1;
            let width = bases_byte_width(nbases);
            let mut packed = vec![0u8; width];
            data.read_exact(&mut packed).map_err(FastkError::Io)?;
            let bases = unpack_bases(&packed, nbases);

            let run_index = index.read_u64::<LittleEndian>().map_err(FastkError::Io)?;
            let kmer_start_offset = index.read_u32::<LittleEndian>().map_err(FastkError::Io)?;

            out.push(RawSuperMer {
                bases,
                len_minus_km1,
                thread: t as u32,
                run_index,
                kmer_start_offset,
            });
        }
    }
    Ok(out)
}

fn estimated_bytes(records: &[RawSuperMer], kmer: usize) -> u64 {
    records
        .iter()
        .map(|r| 1 + bases_byte_width(r.len_minus_km1 as usize + kmer - 1) as u64)
        .sum()
}

fn fold_sorted(records: Vec<RawSuperMer>) -> Vec<WeightedSuperMer> {
    let mut out: Vec<WeightedSuperMer> = Vec::new();
    for r in records {
        if let Some(last) = out.last_mut() {
            if last.bases == r.bases && last.len_minus_km1 == r.len_minus_km1 {
                last.mult = last.mult.saturating_add(1);
                continue;
            }
        }
        out.push(WeightedSuperMer {
            bases: r.bases,
            len_minus_km1: r.len_minus_km1,
            mult: 1,
        });
    }
    out
}

fn fold_in_memory(mut records: Vec<RawSuperMer>) -> Vec<WeightedSuperMer> {
    records.sort_by(|a, b| sort_key(&a.bases, a.len_minus_km1).cmp(&sort_key(&b.bases, b.len_minus_km1)));
    fold_sorted(records)
}

/// Stage 1 entry point: sorts and folds `records`, spilling to disk under
/// `tmp_dir` when the estimated in-memory footprint exceeds `budget_bytes`.
pub fn stage1(
    records: Vec<RawSuperMer>,
    kmer: usize,
    budget_bytes: u64,
    tmp_dir: &Path,
) -> Result<Vec<WeightedSuperMer>> {
    if records.len() < 2 || estimated_bytes(&records, kmer) <= budget_bytes {
        return Ok(fold_in_memory(records));
    }
    spill_sort(records, kmer, budget_bytes, tmp_dir)
}

fn write_run(path: &Path, run: &[WeightedSuperMer]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path).with_context(|| format!("creating run file {}", path.display()))?);
    for rec in run {
        w.write_u8(rec.len_minus_km1 as u8)?;
        w.write_u32::<LittleEndian>(rec.mult)?;
        w.write_all(&pack_bases(&rec.bases))?;
    }
    w.flush()?;
    Ok(())
}

struct RunReader {
    reader: BufReader<File>,
    kmer: usize,
}

impl RunReader {
    fn open(path: &Path, kmer: usize) -> Result<Self> {
        Ok(RunReader {
            reader: BufReader::new(
                File::open(path).with_context(|| format!("opening run file {}", path.display()))?,
            ),
            kmer,
        })
    }

    fn next(&mut self) -> Result<Option<WeightedSuperMer>> {
        let len_minus_km1 = match self.reader.read_u8() {
            Ok(b) => b as u16,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(FastkError::Io(e).into()),
        };
        let mult = self.reader.read_u32::<LittleEndian>().map_err(FastkError::Io)?;
        let nbases = len_minus_km1 as usize + self.kmer - 1;
        let width = bases_byte_width(nbases);
        let mut packed = vec![0u8; width];
        self.reader.read_exact(&mut packed).map_err(FastkError::Io)?;
        let bases = unpack_bases(&packed, nbases);
        Ok(Some(WeightedSuperMer {
            bases,
            len_minus_km1,
            mult,
        }))
    }
}

struct HeapEntry {
    key: (Vec<u64>, u16),
    run: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

/// Splits `records` into budget-sized sorted-and-folded runs on disk, then
/// k-way merges them with a min-heap, re-folding duplicates that straddle
/// run boundaries. Produces the same result as [`fold_in_memory`] on the
/// same input, just without holding it all in memory at once.
fn spill_sort(
    records: Vec<RawSuperMer>,
    kmer: usize,
    budget_bytes: u64,
    tmp_dir: &Path,
) -> Result<Vec<WeightedSuperMer>> {
    let per_record = estimated_bytes(&records, kmer) / records.len().max(1) as u64;
    let run_len = (budget_bytes / per_record.max(1)).max(1) as usize;

    let mut run_paths = Vec::new();
    for (i, chunk) in records.chunks(run_len).enumerate() {
        let mut chunk_vec: Vec<RawSuperMer> = chunk.to_vec();
        chunk_vec
            .sort_by(|a, b| sort_key(&a.bases, a.len_minus_km1).cmp(&sort_key(&b.bases, b.len_minus_km1)));
        let folded = fold_sorted(chunk_vec);
        let path = tmp_dir.join(format!("supermer_run_{i}.tmp"));
        write_run(&path, &folded)?;
        run_paths.push(path);
    }

    let mut readers: Vec<RunReader> = run_paths
        .iter()
        .map(|p| RunReader::open(p, kmer))
        .collect::<Result<_>>()?;
    let mut fronts: Vec<Option<WeightedSuperMer>> = Vec::with_capacity(readers.len());
    for r in readers.iter_mut() {
        fronts.push(r.next()?);
    }

    let mut heap = BinaryHeap::new();
    for (i, f) in fronts.iter().enumerate() {
        if let Some(rec) = f {
            heap.push(Reverse(HeapEntry {
                key: (rec.bases.clone(), rec.len_minus_km1),
                run: i,
            }));
        }
    }

    let mut out: Vec<WeightedSuperMer> = Vec::new();
    while let Some(Reverse(top)) = heap.pop() {
        let run = top.run;
        let rec = fronts[run].take().unwrap();
        match out.last_mut() {
            Some(last) if last.bases == rec.bases && last.len_minus_km1 == rec.len_minus_km1 => {
                last.mult = last.mult.saturating_add(rec.mult);
            }
            _ => out.push(rec),
        }
        let next = readers[run].next()?;
        if let Some(ref n) = next {
            heap.push(Reverse(HeapEntry {
                key: (n.bases.clone(), n.len_minus_km1),
                run,
            }));
        }
        fronts[run] = next;
    }

    for p in &run_paths {
        let _ = std::fs::remove_file(p);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(bases: Vec<u64>, len: u16, run_index: u64) -> RawSuperMer {
        RawSuperMer {
            bases,
            len_minus_km1: len,
            thread: 0,
            run_index,
            kmer_start_offset: 0,
        }
    }

    #[test]
    fn fold_collapses_exact_duplicates() {
        let records = vec![
            raw(vec![0, 1, 2, 3], 1, 0),
            raw(vec![0, 1, 2, 3], 1, 1),
            raw(vec![1, 2, 3, 0], 1, 2),
        ];
        let folded = fold_in_memory(records);
        assert_eq!(folded.len(), 2);
        let total_mult: u32 = folded.iter().map(|w| w.mult).sum();
        assert_eq!(total_mult, 3);
        // strictly increasing in (bases, length) order
        for w in folded.windows(2) {
            assert!(sort_key(&w[0].bases, w[0].len_minus_km1) < sort_key(&w[1].bases, w[1].len_minus_km1));
        }
    }

    #[test]
    fn spill_matches_in_memory_result() {
        let mut records = Vec::new();
        for i in 0..200u64 {
            let base = (i % 7) as u64 % 4;
            records.push(raw(vec![base, (base + 1) % 4, (base + 2) % 4, (base + 3) % 4], 1, i));
        }
        let kmer = 4;
        let in_memory = fold_in_memory(records.clone());

        let tmp = tempfile::tempdir().unwrap();
        let spilled = spill_sort(records, kmer, 1, tmp.path()).unwrap();

        assert_eq!(in_memory.len(), spilled.len());
        for (a, b) in in_memory.iter().zip(spilled.iter()) {
            assert_eq!(a.bases, b.bases);
            assert_eq!(a.len_minus_km1, b.len_minus_km1);
            assert_eq!(a.mult, b.mult);
        }
    }
}
