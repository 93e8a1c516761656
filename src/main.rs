use anyhow::Result;
use clap::Parser;
use fastk::config::ProfileRequest;
use fastk::error::FastkError;
use fastk::pipeline::{self, RunRequest};
use mimalloc::MiMalloc;
use std::path::PathBuf;
use std::process::ExitCode;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// `fastk [-k K] [-t[CUTOFF]] [-p[:TABLE.ktab]] [-c] [-bc N] [-v] [-N OUT]
///        [-P TMPDIR] [-M GB] [-T THREADS] SOURCE...`
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// K-mer size
    #[arg(short = 'k', default_value_t = 40)]
    kmer: usize,

    /// Request a k-mer table; bare `-t` defaults the cutoff to 4.
    #[arg(short = 't', num_args = 0..=1, default_missing_value = "4")]
    table_cutoff: Option<u16>,

    /// Request per-read profiles; `-p:TABLE.ktab` is a reserved, rejected
    /// surface for profiling against a pre-existing table.
    #[arg(short = 'p', num_args = 0..=1, default_missing_value = "")]
    profile: Option<String>,

    /// Collapse homopolymer runs before k-mer extraction.
    #[arg(short = 'c')]
    compress: bool,

    /// Skip the first N bases of every read (barcode/adapter prefix).
    #[arg(long = "bc", default_value_t = 0)]
    bc_prefix: usize,

    /// Verbose logging.
    #[arg(short = 'v')]
    verbose: bool,

    /// Output root (`OUT.ktab` / `OUT.prof`).
    #[arg(short = 'N')]
    out_root: Option<PathBuf>,

    /// Temp directory root for bucket files.
    #[arg(short = 'P')]
    tmp_dir: Option<PathBuf>,

    /// Per-bucket sort memory budget, in gigabytes.
    #[arg(short = 'M', default_value_t = 4)]
    sort_memory_gb: u64,

    /// Thread count.
    #[arg(short = 'T', default_value_t = 4)]
    threads: usize,

    /// Input FASTA/FASTQ (optionally gzipped) sources.
    #[arg(required = true)]
    sources: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose { "info" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("fastk: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let profile = match args.profile.as_deref() {
        None => ProfileRequest::None,
        Some("") => ProfileRequest::Fresh,
        Some(table) => {
            let table = table.strip_prefix(':').unwrap_or(table);
            return Err(FastkError::Config(format!(
                "-p:{table} (profiling against a pre-existing table) is not supported by this build"
            ))
            .into());
        }
    };

    let out_root = args
        .out_root
        .unwrap_or_else(|| default_out_root(&args.sources));

    pipeline::run(RunRequest {
        kmer: args.kmer,
        table_cutoff: args.table_cutoff,
        profile,
        compress: args.compress,
        bc_prefix: args.bc_prefix,
        out_root,
        tmp_root: args.tmp_dir,
        sort_memory_bytes: args.sort_memory_gb.max(1) * (1 << 30),
        nthreads: args.threads,
        sources: args.sources,
    })?;
    Ok(())
}

fn default_out_root(sources: &[PathBuf]) -> PathBuf {
    sources
        .first()
        .and_then(|p| p.file_stem())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("fastk_out"))
}
