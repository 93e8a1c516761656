//! §4.C Splitter — per-thread super-mer extraction and bucket/run-index
//! emission.

use crate::handles::SplitHandles;
use crate::input::{Block, PackedRead};
use crate::model::{compress_homopolymers, minimizer_positions, pack_bases, splitmix64};
use crate::scheme::Scheme;
use anyhow::Result;
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

/// One thread's running counter, incremented for every original-read
/// contiguous emission that actually reaches the bucket files (i.e. that
/// survives bc_prefix trimming and, if `-c`, homopolymer compression).
#[derive(Default)]
pub struct RunCounter(u64);

impl RunCounter {
    pub fn next(&mut self) -> u64 {
        let r = self.0;
        self.0 += 1;
        r
    }
}

/// Runs the Splitter for thread `t` over the blocks assigned to it,
/// writing super-mer records into `handles`'s row `t`. Returns the number
/// of runs (original reads or N-split fragments) actually emitted.
pub fn split_thread<'a>(
    scheme: &Scheme,
    blocks: impl Iterator<Item = &'a Block>,
    t: usize,
    handles: &mut SplitHandles,
) -> Result<u64> {
    let mut run_counter = RunCounter::default();
    for block in blocks {
        for read in &block.reads {
            split_one_run(scheme, read, t, handles, &mut run_counter)?;
        }
    }
    Ok(run_counter.0)
}

fn split_one_run(
    scheme: &Scheme,
    read: &PackedRead,
    t: usize,
    handles: &mut SplitHandles,
    run_counter: &mut RunCounter,
) -> Result<()> {
    let raw = &read.bases.bases;
    if scheme.bc_prefix >= raw.len() {
        return Ok(());
    }
    let trimmed = &raw[scheme.bc_prefix..];
    let bases: Vec<u64> = if scheme.compress {
        compress_homopolymers(trimmed)
    } else {
        trimmed.to_vec()
    };
    if bases.len() < scheme.kmer {
        return Ok(());
    }

    let run_index = run_counter.next();
    {
        let w = handles.runs_meta_writer(t);
        w.write_u64::<LittleEndian>(read.read_id)?;
        w.write_u64::<LittleEndian>(run_index)?;
        w.write_u32::<LittleEndian>(bases.len() as u32)?;
    }

    let positions = minimizer_positions(&bases, scheme.m, scheme.w());
    if positions.is_empty() {
        return Ok(());
    }

    let mut seg_start = 0usize;
    let mut seg_min_pos = positions[0];
    for i in 1..positions.len() {
        let len_in_kmers = i - seg_start;
        if positions[i] != seg_min_pos || len_in_kmers >= scheme.max_super {
            emit_segment(scheme, &bases, seg_start, i, seg_min_pos, t, run_index, handles)?;
            seg_start = i;
            seg_min_pos = positions[i];
        }
    }
    emit_segment(
        scheme,
        &bases,
        seg_start,
        positions.len(),
        seg_min_pos,
        t,
        run_index,
        handles,
    )?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn emit_segment(
    scheme: &Scheme,
    bases: &[u64],
    kmer_start: usize,
    kmer_end_excl: usize,
    min_window_pos: u32,
    t: usize,
    run_index: u64,
    handles: &mut SplitHandles,
) -> Result<()> {
    let len_minus_km1 = (kmer_end_excl - kmer_start) as u16;
    debug_assert!(len_minus_km1 as usize >= 1 && len_minus_km1 as usize <= scheme.max_super);
    let nbases = len_minus_km1 as usize + scheme.kmer - 1;
    let supermer_bases = &bases[kmer_start..kmer_start + nbases];

    let minimizer_code = {
        let mut code = 0u64;
        for &b in &bases[min_window_pos as usize..min_window_pos as usize + scheme.m] {
            code = (code << 2) | b;
        }
        code
    };
    let bucket = (splitmix64(minimizer_code, scheme.seed) as usize) % scheme.nparts;

    let packed = pack_bases(supermer_bases);
    let data_w = &mut handles.data_row(t)[bucket];
    data_w.write_u8(len_minus_km1 as u8)?;
    data_w.write_all(&packed)?;

    let index_w = &mut handles.index_row(t)[bucket];
    index_w.write_u64::<LittleEndian>(run_index)?;
    index_w.write_u32::<LittleEndian>(kmer_start as u32)?;
    Ok(())
}
