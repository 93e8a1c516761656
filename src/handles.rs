//! Explicit two-dimensional (thread × bucket) file handle table (§9 design
//! note: replace implicitly-partitioned thread-shared descriptors with an
//! owned handle table a coordinator builds once, handing each worker its
//! row for the phase's duration).

use crate::config::Config;
use crate::error::FastkError;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};

/// Owns every per-(thread, bucket) bucket-data and run-index file descriptor
/// used during the Splitter phase. Built once by the coordinator before the
/// phase starts; each thread borrows exactly its row.
pub struct SplitHandles {
    /// `data[thread][bucket]`
    data: Vec<Vec<BufWriter<File>>>,
    /// `index[thread][bucket]`
    index: Vec<Vec<BufWriter<File>>>,
    /// `runs_meta[thread]`: (read_id, final_len) per allocated run index.
    runs_meta: Vec<BufWriter<File>>,
}

impl SplitHandles {
    pub fn create(cfg: &Config, nthreads: usize, nparts: usize) -> Result<Self> {
        let want = ((nparts + 2) * nthreads) as u64 + 16;
        crate::config::ensure_fd_budget(want)
            .context("raising file-descriptor limit for bucket handles")?;

        let mut data = Vec::with_capacity(nthreads);
        let mut index = Vec::with_capacity(nthreads);
        let mut runs_meta = Vec::with_capacity(nthreads);
        for t in 0..nthreads {
            let mut data_row = Vec::with_capacity(nparts);
            let mut index_row = Vec::with_capacity(nparts);
            for b in 0..nparts {
                let data_path = cfg.bucket_path(b).with_extension(format!("smer.t{t}"));
                let f = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&data_path)
                    .with_context(|| format!("creating bucket file {}", data_path.display()))?;
                data_row.push(BufWriter::new(f));

                let idx_path = cfg.bucket_index_path(t, b);
                let f = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&idx_path)
                    .with_context(|| format!("creating run-index file {}", idx_path.display()))?;
                index_row.push(BufWriter::new(f));
            }
            data.push(data_row);
            index.push(index_row);

            let meta_path = cfg.runs_meta_path(t);
            let f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&meta_path)
                .with_context(|| format!("creating run metadata file {}", meta_path.display()))?;
            runs_meta.push(BufWriter::new(f));
        }
        Ok(SplitHandles {
            data,
            index,
            runs_meta,
        })
    }

    pub fn runs_meta_writer(&mut self, t: usize) -> &mut BufWriter<File> {
        &mut self.runs_meta[t]
    }

    /// Borrows thread `t`'s row of bucket-data writers, mutably, for the
    /// duration of that thread's share of the Splitter phase.
    pub fn data_row(&mut self, t: usize) -> &mut [BufWriter<File>] {
        &mut self.data[t]
    }

    pub fn index_row(&mut self, t: usize) -> &mut [BufWriter<File>] {
        &mut self.index[t]
    }

    /// Flushes and drops every handle, returning the per-(thread, bucket)
    /// file paths so the Sorter phase can reopen them read-only.
    pub fn finish(mut self, cfg: &Config, nthreads: usize, nparts: usize) -> Result<()> {
        for row in self.data.iter_mut() {
            for w in row.iter_mut() {
                w.flush().map_err(FastkError::Io)?;
            }
        }
        for row in self.index.iter_mut() {
            for w in row.iter_mut() {
                w.flush().map_err(FastkError::Io)?;
            }
        }
        for w in self.runs_meta.iter_mut() {
            w.flush().map_err(FastkError::Io)?;
        }
        drop(self);
        // Sanity: every expected file exists before handing off to the
        // Sorter phase.
        for t in 0..nthreads {
            for b in 0..nparts {
                let p = cfg.bucket_path(b).with_extension(format!("smer.t{t}"));
                if !p.exists() {
                    return Err(
                        FastkError::Invariant(format!("missing bucket shard {}", p.display()))
                            .into(),
                    );
                }
            }
        }
        Ok(())
    }
}

/// Per-bucket shard paths contributed by every splitter thread, used by the
/// Sorter to read (and later delete) thread-disjoint bucket-data files.
pub fn bucket_shard_paths(cfg: &Config, bucket: usize, nthreads: usize) -> Vec<std::path::PathBuf> {
    (0..nthreads)
        .map(|t| cfg.bucket_path(bucket).with_extension(format!("smer.t{t}")))
        .collect()
}

pub fn bucket_index_shard_paths(
    cfg: &Config,
    bucket: usize,
    nthreads: usize,
) -> Vec<std::path::PathBuf> {
    (0..nthreads)
        .map(|t| cfg.bucket_index_path(t, bucket))
        .collect()
}
