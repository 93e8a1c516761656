//! Resolved run configuration: CLI args turned into paths, thread counts and
//! a PID-scoped temp directory. Mirrors the `reference` teacher's pattern of
//! a `Cli` (clap) struct feeding a plain settings struct consumed by the
//! rest of the program, plus the "tempfile owns cleanup" idiom from that
//! teacher's `main`.

use crate::error::FastkError;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process;
use tempfile::TempDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileRequest {
    None,
    Fresh,
    /// `-p:TABLE.ktab` — reserved surface, always rejected at runtime.
    AgainstExistingTable,
}

#[derive(Debug)]
pub struct Config {
    pub kmer: usize,
    pub table_cutoff: Option<u16>,
    pub profile: ProfileRequest,
    pub compress: bool,
    pub bc_prefix: usize,
    pub out_root: PathBuf,
    pub sort_memory_bytes: u64,
    pub nthreads: usize,
    pub ithreads: usize,
    pub sources: Vec<PathBuf>,
    pub tmp_dir: TempDir,
}

impl Config {
    pub fn bucket_path(&self, bucket: usize) -> PathBuf {
        self.tmp_dir.path().join(format!("bucket_{bucket}.smer"))
    }

    pub fn bucket_index_path(&self, thread: usize, bucket: usize) -> PathBuf {
        self.tmp_dir
            .path()
            .join(format!("bucket_{bucket}.t{thread}.ridx"))
    }

    pub fn runs_meta_path(&self, thread: usize) -> PathBuf {
        self.tmp_dir.path().join(format!("runs.t{thread}.meta"))
    }

    pub fn bucket_table_path(&self, bucket: usize) -> PathBuf {
        self.tmp_dir.path().join(format!("bucket_{bucket}.table"))
    }

    pub fn bucket_profile_path(&self, bucket: usize) -> PathBuf {
        self.tmp_dir.path().join(format!("bucket_{bucket}.prof"))
    }

    pub fn table_stub_path(&self) -> PathBuf {
        self.out_root.with_extension("ktab")
    }

    pub fn profile_stub_path(&self) -> PathBuf {
        self.out_root.with_extension("prof")
    }

    pub fn table_shard_path(&self, thread: usize) -> PathBuf {
        let root = &self.out_root;
        let dir = root.parent().unwrap_or_else(|| Path::new("."));
        let name = root.file_name().unwrap_or_default().to_string_lossy();
        dir.join(format!(".{name}.ktab.{thread}"))
    }

    pub fn profile_shard_path(&self, thread: usize) -> PathBuf {
        let root = &self.out_root;
        let dir = root.parent().unwrap_or_else(|| Path::new("."));
        let name = root.file_name().unwrap_or_default().to_string_lossy();
        dir.join(format!(".{name}.prof.{thread}"))
    }
}

/// Raises the process file-descriptor soft limit to at least `want`,
/// returning an error if the hard limit will not accommodate it. Grounded
/// in spec.md §5/§9's explicit `(NPARTS + 2)*NTHREADS + reserve` budget.
pub fn ensure_fd_budget(want: u64) -> Result<(), FastkError> {
    let (soft, hard) = rlimit::getrlimit(rlimit::Resource::NOFILE)
        .map_err(|e| FastkError::Resource(format!("cannot read file-descriptor limit: {e}")))?;
    if soft >= want {
        return Ok(());
    }
    if want > hard {
        return Err(FastkError::Resource(format!(
            "need {want} file descriptors but hard limit is {hard}"
        )));
    }
    rlimit::setrlimit(rlimit::Resource::NOFILE, want, hard)
        .map_err(|e| FastkError::Resource(format!("cannot raise file-descriptor limit: {e}")))?;
    Ok(())
}

/// Builds the PID + output-root-hash-scoped temp directory bucket files
/// live under, so concurrent runs never collide (spec.md §6).
pub fn make_tmp_dir(tmp_root: Option<&Path>, out_root: &Path) -> Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    let hash = fxhash_like(out_root.to_string_lossy().as_bytes());
    let prefix = format!("fastk.{}.{:x}.", process::id(), hash);
    builder.prefix(&prefix);
    let dir = match tmp_root {
        Some(root) => builder
            .tempdir_in(root)
            .with_context(|| format!("creating temp dir under {}", root.display()))?,
        None => builder.tempdir().context("creating temp dir")?,
    };
    Ok(dir)
}

fn fxhash_like(bytes: &[u8]) -> u64 {
    use std::hash::Hasher;
    let mut h = rustc_hash::FxHasher::default();
    h.write(bytes);
    h.finish()
}
