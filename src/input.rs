//! §4.A Input Partition — the external collaborator that demultiplexes
//! read files into blocks of packed 2-bit bases. Argument parsing and
//! vendor container formats are out of scope; this module implements the
//! contract concretely for FASTA/FASTQ, optionally gzip-compressed, via
//! `seq_io` (record parsing, as the teacher uses) and `niffler`
//! (transparent decompression, as the teacher uses). BAM/CRAM/native-DB
//! sources are represented by the same contract but rejected explicitly.

use crate::error::FastkError;
use crate::model::{split_on_n, PackedSeq};
use anyhow::{Context, Result};
use seq_io::fasta::{Reader as FastaReader, Record as FastaRecordTrait};
use seq_io::fastq::{Reader as FastqReader, Record as FastqRecordTrait};
use std::path::{Path, PathBuf};

/// One N-free, length-filtered run of bases, tagged with the id of the
/// original read it came from so the Splitter can detect read boundaries.
#[derive(Debug, Clone)]
pub struct PackedRead {
    pub read_id: u64,
    pub bases: PackedSeq,
}

/// A block of reads presented to the Splitter or Scheme Selector.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub reads: Vec<PackedRead>,
    pub nreads: usize,
    pub totlen: usize,
    /// Estimated bases-per-byte-of-input expansion, used only for sizing
    /// (Scheme Selector's `NPARTS` estimate).
    pub ratio: f64,
}

enum SourceKind {
    Fasta,
    Fastq,
    Unsupported(&'static str),
}

fn classify(path: &Path) -> SourceKind {
    let name = path.to_string_lossy().to_ascii_lowercase();
    let stem = name
        .trim_end_matches(".gz")
        .trim_end_matches(".bgz")
        .to_string();
    if stem.ends_with(".fa") || stem.ends_with(".fasta") || stem.ends_with(".fna") {
        SourceKind::Fasta
    } else if stem.ends_with(".fq") || stem.ends_with(".fastq") {
        SourceKind::Fastq
    } else if stem.ends_with(".bam") {
        SourceKind::Unsupported("BAM")
    } else if stem.ends_with(".cram") {
        SourceKind::Unsupported("CRAM")
    } else if stem.ends_with(".db") {
        SourceKind::Unsupported("native sequence database")
    } else {
        SourceKind::Unsupported("unrecognized")
    }
}

/// Demultiplexes one or more read files into a flat, in-memory stream of
/// N-free runs, batched for the Splitter/Scheme Selector phases.
pub struct Input {
    batches: Vec<Block>,
}

const BATCH_READS: usize = 4096;

impl Input {
    /// Opens `sources`, reading and batching every record up front. A real
    /// streaming collaborator would interleave this with the consuming
    /// phases; this reference implementation keeps the contract's shape
    /// (`open`/`first_block`/`iter_blocks`/`close`) while staying a single
    /// pass over plain files, which is enough to drive the core pipeline
    /// this crate specifies.
    pub fn open(sources: &[PathBuf], kmer: usize, bc_prefix: usize) -> Result<Input> {
        if sources.is_empty() {
            return Err(FastkError::Config("no input sources given".into()).into());
        }
        let min_len = kmer + bc_prefix;
        let mut batches = Vec::new();
        let mut current = Block::default();
        let mut next_read_id: u64 = 0;
        let mut total_in_bytes: u64 = 0;
        let mut total_in_bases: u64 = 0;

        for src in sources {
            let kind = classify(src);
            let (reader, _fmt) = niffler::send::from_path(src)
                .with_context(|| format!("opening input source {}", src.display()))?;

            let mut push_record = |seq: &[u8]| -> Result<()> {
                total_in_bytes += seq.len() as u64;
                let id = next_read_id;
                next_read_id += 1;
                for (_, run) in split_on_n(seq) {
                    if run.len() < min_len {
                        continue;
                    }
                    let packed = PackedSeq::from_ascii(run).ok_or_else(|| {
                        FastkError::InputMalformed(format!(
                            "non-ACGTN byte in read {id} of {}",
                            src.display()
                        ))
                    })?;
                    total_in_bases += packed.len() as u64;
                    current.totlen += packed.len();
                    current.nreads += 1;
                    current.reads.push(PackedRead {
                        read_id: id,
                        bases: packed,
                    });
                    if current.reads.len() >= BATCH_READS {
                        batches.push(std::mem::take(&mut current));
                    }
                }
                Ok(())
            };

            match kind {
                SourceKind::Fasta => {
                    let mut fa = FastaReader::new(reader);
                    while let Some(rec) = fa.next() {
                        let rec = rec.with_context(|| format!("reading {}", src.display()))?;
                        push_record(&rec.full_seq())?;
                    }
                }
                SourceKind::Fastq => {
                    let mut fq = FastqReader::new(reader);
                    while let Some(rec) = fq.next() {
                        let rec = rec.with_context(|| format!("reading {}", src.display()))?;
                        push_record(rec.seq())?;
                    }
                }
                SourceKind::Unsupported(what) => {
                    return Err(FastkError::Config(format!(
                        "{what} input sources are not supported by this build: {}",
                        src.display()
                    ))
                    .into());
                }
            }
        }
        if !current.reads.is_empty() {
            batches.push(current);
        }

        let ratio = if total_in_bytes > 0 {
            total_in_bases as f64 / total_in_bytes as f64
        } else {
            1.0
        };
        for b in &mut batches {
            b.ratio = ratio;
        }

        Ok(Input { batches })
    }

    /// Returns a block covering at least `budget_bases` bases (or
    /// everything, if less is available), used by the Scheme Selector.
    pub fn first_block(&self, budget_bases: usize) -> Block {
        let mut out = Block {
            ratio: self.batches.first().map(|b| b.ratio).unwrap_or(1.0),
            ..Block::default()
        };
        'outer: for batch in &self.batches {
            for read in &batch.reads {
                out.totlen += read.bases.len();
                out.nreads += 1;
                out.reads.push(read.clone());
                if out.totlen >= budget_bases {
                    break 'outer;
                }
            }
        }
        out
    }

    /// Blocks assigned to worker `thread_id` of `nthreads`, round-robin
    /// over the batch sequence (deterministic and disjoint across threads).
    pub fn iter_blocks(&self, thread_id: usize, nthreads: usize) -> impl Iterator<Item = &Block> {
        self.batches
            .iter()
            .enumerate()
            .filter(move |(i, _)| i % nthreads.max(1) == thread_id)
            .map(|(_, b)| b)
    }

    pub fn close(self) {}
}
