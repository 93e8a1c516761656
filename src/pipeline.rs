//! End-to-end orchestration: Input -> Scheme Selector -> Splitter -> Bucket
//! Sorter -> Mergers. `main.rs` is a thin CLI wrapper around [`run`]; tests
//! call it directly against temp-file inputs.

use crate::config::{make_tmp_dir, Config, ProfileRequest};
use crate::error::FastkError;
use crate::handles::SplitHandles;
use crate::input::Input;
use crate::merge;
use crate::scheme::{self, Scheme};
use crate::splitter::split_thread;
use anyhow::{Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use rayon::prelude::*;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

const SAMPLE_BUDGET_BASES: usize = 1 << 20;

pub struct RunRequest {
    pub kmer: usize,
    pub table_cutoff: Option<u16>,
    pub profile: ProfileRequest,
    pub compress: bool,
    pub bc_prefix: usize,
    pub out_root: PathBuf,
    pub tmp_root: Option<PathBuf>,
    pub sort_memory_bytes: u64,
    pub nthreads: usize,
    pub sources: Vec<PathBuf>,
}

pub struct RunOutcome {
    pub scheme: Scheme,
    pub nkmers: usize,
    pub nreads_profiled: usize,
}

pub fn run(req: RunRequest) -> Result<RunOutcome> {
    if req.kmer == 0 || req.kmer > crate::model::MAX_KMER {
        return Err(FastkError::Config(format!(
            "kmer size must be in 1..={}, got {}",
            crate::model::MAX_KMER,
            req.kmer
        ))
        .into());
    }
    if let ProfileRequest::AgainstExistingTable = req.profile {
        return Err(FastkError::Config(
            "profiling against a pre-existing table is not supported by this build".into(),
        )
        .into());
    }

    let tmp_dir = make_tmp_dir(req.tmp_root.as_deref(), &req.out_root)?;
    let nthreads = req.nthreads.max(1);
    let cfg = Config {
        kmer: req.kmer,
        table_cutoff: req.table_cutoff,
        profile: req.profile,
        compress: req.compress,
        bc_prefix: req.bc_prefix,
        out_root: req.out_root,
        sort_memory_bytes: req.sort_memory_bytes,
        nthreads,
        ithreads: nthreads,
        sources: req.sources,
        tmp_dir,
    };

    log::info!("opening {} input source(s)", cfg.sources.len());
    let input =
        Input::open(&cfg.sources, cfg.kmer, cfg.bc_prefix).context("reading input sources")?;

    let sample = input.first_block(SAMPLE_BUDGET_BASES);
    let scheme = scheme::select(
        &sample,
        cfg.kmer,
        cfg.sort_memory_bytes,
        cfg.bc_prefix,
        cfg.compress,
        cfg.table_cutoff,
        cfg.profile != ProfileRequest::None,
    )
    .context("selecting partition scheme")?;
    log::info!(
        "scheme: kmer={} m={} max_super={} nparts={}",
        scheme.kmer,
        scheme.m,
        scheme.max_super,
        scheme.nparts
    );

    split_all(&scheme, &cfg, &input)?;
    input.close();

    log::info!("sorting {} buckets", scheme.nparts);
    (0..scheme.nparts)
        .into_par_iter()
        .try_for_each(|b| crate::sort::sort_bucket(&scheme, &cfg, b, cfg.nthreads))
        .context("sorting buckets")?;

    let nkmers = merge::merge_table(&scheme, &cfg, cfg.nthreads).context("merging k-mer tables")?;
    write_table_stub(&cfg, &scheme)?;
    log::info!(
        "wrote {nkmers} distinct canonical k-mers to {}",
        cfg.table_stub_path().display()
    );

    let mut nreads_profiled = 0;
    if scheme.want_profile {
        nreads_profiled = merge::merge_profile(&scheme, &cfg, cfg.nthreads, cfg.nthreads)
            .context("merging profiles")?;
        write_profile_stub(&cfg)?;
        log::info!(
            "wrote {nreads_profiled} read profiles to {}",
            cfg.profile_stub_path().display()
        );
    }

    Ok(RunOutcome {
        scheme,
        nkmers,
        nreads_profiled,
    })
}

/// Runs the Splitter for every logical thread over the blocks `Input`
/// assigns it. `SplitHandles` hands out mutable per-thread rows, so this
/// runs each thread's share in turn rather than through the rayon pool the
/// embarrassingly-parallel Sorter phase uses.
fn split_all(scheme: &Scheme, cfg: &Config, input: &Input) -> Result<()> {
    let mut handles = SplitHandles::create(cfg, cfg.nthreads, scheme.nparts)
        .context("opening bucket handle table")?;
    for t in 0..cfg.nthreads {
        split_thread(scheme, input.iter_blocks(t, cfg.nthreads), t, &mut handles)
            .with_context(|| format!("splitting thread {t}"))?;
    }
    handles.finish(cfg, cfg.nthreads, scheme.nparts)
}

fn write_table_stub(cfg: &Config, scheme: &Scheme) -> Result<()> {
    let path = cfg.table_stub_path();
    let mut f =
        File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    f.write_i32::<LittleEndian>(scheme.kmer as i32)?;
    f.write_i32::<LittleEndian>(cfg.nthreads as i32)?;
    Ok(())
}

fn write_profile_stub(cfg: &Config) -> Result<()> {
    let path = cfg.profile_stub_path();
    let mut f =
        File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    f.write_i32::<LittleEndian>(cfg.nthreads as i32)?;
    Ok(())
}

/// Reads back a written `OUT.ktab` stub header, for tests.
pub fn read_table_stub(path: &Path) -> Result<(i32, i32)> {
    use byteorder::ReadBytesExt;
    let mut f = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok((f.read_i32::<LittleEndian>()?, f.read_i32::<LittleEndian>()?))
}
