//! Developer stage-selection dispatch (spec.md §9): lets tests or a future
//! `--stage` flag run a single phase instead of the full pipeline. Not
//! exposed on the public CLI surface.

use crate::config::Config;
use crate::scheme::Scheme;
use anyhow::Result;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RunAll,
    Stage1Partition,
    Stage2Sort,
    Stage3MergeTable,
    Stage4MergeProfile,
}

/// Runs `stage` against an already-partitioned run (i.e. assumes the
/// Splitter has already populated `cfg`'s bucket shards when `stage` isn't
/// `RunAll`/`Stage1Partition`).
pub fn run_stage(stage: Stage, scheme: &Scheme, cfg: &Config, nthreads: usize) -> Result<()> {
    match stage {
        Stage::RunAll => {
            run_sort_phase(scheme, cfg, nthreads)?;
            crate::merge::merge_table(scheme, cfg, nthreads)?;
            if scheme.want_profile {
                crate::merge::merge_profile(scheme, cfg, nthreads, nthreads)?;
            }
            Ok(())
        }
        Stage::Stage1Partition => Ok(()), // driven by the Splitter directly in main
        Stage::Stage2Sort => run_sort_phase(scheme, cfg, nthreads),
        Stage::Stage3MergeTable => crate::merge::merge_table(scheme, cfg, nthreads).map(|_| ()),
        Stage::Stage4MergeProfile => {
            crate::merge::merge_profile(scheme, cfg, nthreads, nthreads).map(|_| ())
        }
    }
}

fn run_sort_phase(scheme: &Scheme, cfg: &Config, nthreads: usize) -> Result<()> {
    (0..scheme.nparts)
        .into_par_iter()
        .try_for_each(|b| crate::sort::sort_bucket(scheme, cfg, b, nthreads))
}
