//! Stage 2 of the Bucket Sorter (spec.md §4.D): expand folded super-mers
//! into canonical k-mers, sort and fold those into a per-bucket k-mer table,
//! and (when a profile is requested) resolve each original occurrence's
//! final count for the Profile Merger.

use super::supermer::{RawSuperMer, WeightedSuperMer};
use crate::error::FastkError;
use crate::model::Kmer;
use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// One distinct canonical k-mer and its total multiplicity within a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KmerCount {
    pub code: u128,
    pub count: u32,
}

/// One original occurrence's final count, tagged with the provenance the
/// Profile Merger needs to place it back in its read.
#[derive(Debug, Clone, Copy)]
pub struct ProfileEntry {
    pub thread: u32,
    pub run_index: u64,
    pub kmer_start_offset: u32,
    pub count: u32,
}

/// Expands every weighted super-mer's k-mer windows into canonical k-mers,
/// sorts by packed code, and folds equal codes into a single [`KmerCount`].
/// All k-mers whose minimizer routes them into this bucket are accounted
/// for here, so the result is final for this bucket (no second pass needed
/// once the bucket's super-mers have all been folded).
pub fn build_table(weighted: &[WeightedSuperMer], kmer: usize) -> Vec<KmerCount> {
    let mut expanded: Vec<(u128, u32)> = Vec::new();
    for sm in weighted {
        let nwindows = sm.len_minus_km1 as usize;
        for p in 0..nwindows {
            let code = window_code(&sm.bases[p..p + kmer]);
            let canon = canonicalize(code, kmer);
            expanded.push((canon, sm.mult));
        }
    }
    expanded.sort_unstable_by_key(|&(code, _)| code);

    let mut out: Vec<KmerCount> = Vec::with_capacity(expanded.len());
    for (code, mult) in expanded {
        if let Some(last) = out.last_mut() {
            if last.code == code {
                last.count = last.count.saturating_add(mult);
                continue;
            }
        }
        out.push(KmerCount { code, count: mult });
    }
    out
}

/// Resolves every raw (unfolded) occurrence in the bucket against `table`,
/// producing one [`ProfileEntry`] per k-mer window of every original
/// super-mer instance, in no particular order (the Profile Merger sorts).
pub fn build_profile_entries(raw: &[RawSuperMer], kmer: usize, table: &[KmerCount]) -> Vec<ProfileEntry> {
    let mut out = Vec::new();
    for r in raw {
        let nwindows = r.len_minus_km1 as usize;
        for p in 0..nwindows {
            let code = window_code(&r.bases[p..p + kmer]);
            let canon = canonicalize(code, kmer);
            let count = lookup(table, canon).unwrap_or(0);
            out.push(ProfileEntry {
                thread: r.thread,
                run_index: r.run_index,
                kmer_start_offset: r.kmer_start_offset + p as u32,
                count,
            });
        }
    }
    out
}

fn window_code(bases: &[u64]) -> u128 {
    let mut code = 0u128;
    for &b in bases {
        code = (code << 2) | b as u128;
    }
    code
}

fn canonicalize(code: u128, k: usize) -> u128 {
    Kmer { code, k: k as u8 }.canonical().code
}

fn lookup(table: &[KmerCount], code: u128) -> Option<u32> {
    table
        .binary_search_by_key(&code, |kc| kc.code)
        .ok()
        .map(|i| table[i].count)
}

/// Writes a bucket's k-mer table as `[kmer bytes][count: u16 LE]` records,
/// already sorted ascending by packed code. Counts above `u16::MAX` are
/// clamped, matching the on-disk table's 2-byte count field (spec.md §5).
pub fn write_table(path: &Path, table: &[KmerCount], kmer: usize) -> Result<()> {
    let mut w = BufWriter::new(
        File::create(path).with_context(|| format!("creating bucket table {}", path.display()))?,
    );
    for kc in table {
        let k = Kmer { code: kc.code, k: kmer as u8 };
        w.write_all(&k.to_bytes())?;
        let clamped = kc.count.min(u16::MAX as u32) as u16;
        w.write_u16::<LittleEndian>(clamped)?;
    }
    w.flush()?;
    Ok(())
}

pub fn read_table(path: &Path, kmer: usize) -> Result<Vec<KmerCount>> {
    let width = Kmer::byte_width(kmer);
    let mut r = BufReader::new(
        File::open(path).with_context(|| format!("opening bucket table {}", path.display()))?,
    );
    let mut out = Vec::new();
    let mut buf = vec![0u8; width];
    loop {
        match r.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(FastkError::Io(e).into()),
        }
        let k = Kmer::from_bytes(&buf, kmer);
        let count = r.read_u16::<LittleEndian>().map_err(FastkError::Io)? as u32;
        out.push(KmerCount { code: k.code, count });
    }
    Ok(out)
}

/// Writes profile entries as `[thread: u32][run_index: u64][kmer_start: u32]
/// [count: u32]`, all little-endian, in whatever order `entries` is given.
pub fn write_profile_entries(path: &Path, entries: &[ProfileEntry]) -> Result<()> {
    let mut w = BufWriter::new(
        File::create(path)
            .with_context(|| format!("creating profile-entry shard {}", path.display()))?,
    );
    for e in entries {
        w.write_u32::<LittleEndian>(e.thread)?;
        w.write_u64::<LittleEndian>(e.run_index)?;
        w.write_u32::<LittleEndian>(e.kmer_start_offset)?;
        w.write_u32::<LittleEndian>(e.count)?;
    }
    w.flush()?;
    Ok(())
}

pub fn read_profile_entries(path: &Path) -> Result<Vec<ProfileEntry>> {
    let mut r = BufReader::new(
        File::open(path).with_context(|| format!("opening profile-entry shard {}", path.display()))?,
    );
    let mut out = Vec::new();
    loop {
        let thread = match r.read_u32::<LittleEndian>() {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(FastkError::Io(e).into()),
        };
        let run_index = r.read_u64::<LittleEndian>().map_err(FastkError::Io)?;
        let kmer_start_offset = r.read_u32::<LittleEndian>().map_err(FastkError::Io)?;
        let count = r.read_u32::<LittleEndian>().map_err(FastkError::Io)?;
        out.push(ProfileEntry {
            thread,
            run_index,
            kmer_start_offset,
            count,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weighted(bases: Vec<u64>, nwindows: u16, mult: u32) -> WeightedSuperMer {
        WeightedSuperMer {
            bases,
            len_minus_km1: nwindows,
            mult,
        }
    }

    #[test]
    fn table_folds_canonical_duplicates_from_both_strands() {
        // "AC" forward and its reverse complement "GT" must fold together.
        let kmer = 2;
        let fwd = weighted(vec![0, 1], 1, 3); // A C
        let rc = weighted(vec![2, 3], 1, 5); // G T
        let table = build_table(&[fwd, rc], kmer);
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].count, 8);
    }

    #[test]
    fn profile_entries_resolve_final_counts() {
        let kmer = 2;
        let sm = weighted(vec![0, 1, 2], 2, 4); // A C G -> kmers AC, CG
        let table = build_table(&[sm.clone()], kmer);

        let raw = RawSuperMer {
            bases: vec![0, 1, 2],
            len_minus_km1: 2,
            thread: 0,
            run_index: 7,
            kmer_start_offset: 10,
        };
        let entries = build_profile_entries(&[raw], kmer, &table);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kmer_start_offset, 10);
        assert_eq!(entries[1].kmer_start_offset, 11);
        assert!(entries.iter().all(|e| e.count == 4));
    }

    #[test]
    fn table_roundtrips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.table");
        let table = vec![
            KmerCount { code: 0b0001, count: 2 },
            KmerCount { code: 0b0111, count: 70000 }, // clamps to u16::MAX
        ];
        write_table(&path, &table, 4).unwrap();
        let back = read_table(&path, 4).unwrap();
        assert_eq!(back[0].code, table[0].code);
        assert_eq!(back[0].count, 2);
        assert_eq!(back[1].count, u16::MAX as u32);
    }
}
