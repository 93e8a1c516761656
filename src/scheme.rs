//! §4.B Scheme Selector — chooses `MOD_LEN`/pad, `MAX_SUPER` and `NPARTS`
//! from a sample block, and bundles them into an immutable [`Scheme`]
//! shared read-only by every later phase (§9's "immutable `Scheme` value"
//! design note).

use crate::error::FastkError;
use crate::input::Block;
use crate::model::{slen_bits, MAX_SMER};
use anyhow::Result;

/// Bytes per k-mer table record once written: packed bases + 2-byte count.
pub fn kmer_record_bytes(kmer: usize) -> usize {
    crate::model::Kmer::byte_width(kmer) + 2
}

/// All parameters chosen once and then read-only for the rest of the run.
#[derive(Debug, Clone)]
pub struct Scheme {
    pub kmer: usize,
    pub m: usize,
    pub mod_len: usize,
    pub mod_msk: usize,
    pub max_super: usize,
    pub nparts: usize,
    pub slen_bits: u32,
    pub sort_memory_bytes: u64,
    pub bc_prefix: usize,
    pub compress: bool,
    pub table_cutoff: Option<u16>,
    pub want_profile: bool,
    /// Seed for the fixed minimizer order, identical across every phase.
    pub seed: u64,
}

impl Scheme {
    pub fn w(&self) -> usize {
        self.kmer - self.m + 1
    }

    pub fn smer_bases(&self) -> usize {
        self.max_super + self.kmer - 1
    }
}

/// Smallest power of two strictly greater than `kmer`.
fn mod_len_for(kmer: usize) -> usize {
    let mut v = 1usize;
    while v <= kmer {
        v <<= 1;
    }
    v
}

/// Selects a `Scheme` from a sample [`Block`] and the user-provided k-mer
/// size, memory budget and thread count (spec.md §4.B).
pub fn select(
    sample: &Block,
    kmer: usize,
    sort_memory_bytes: u64,
    bc_prefix: usize,
    compress: bool,
    table_cutoff: Option<u16>,
    want_profile: bool,
) -> Result<Scheme> {
    if sample.nreads == 0 {
        return Err(FastkError::InputTooShort {
            avg_len: 0.0,
            kmer,
        }
        .into());
    }
    let avg_len = sample.totlen as f64 / sample.nreads as f64;
    if avg_len < 1.5 * kmer as f64 {
        return Err(FastkError::InputTooShort { avg_len, kmer }.into());
    }

    let mod_len = mod_len_for(kmer);
    let mod_msk = mod_len - 1;

    // Minimizer length: as small as the power-of-two padding allows while
    // staying well under kmer, trading finer-grained buckets (more, smaller
    // buckets) against longer average super-mers (fewer, larger ones). A
    // fixed fraction of `mod_len` keeps behavior uniform across k sizes.
    let m = (mod_len / 2).clamp(4, kmer.saturating_sub(1).max(4));

    // MAX_SUPER: an upper bound on how long a super-mer can get before we
    // force a cut, regardless of minimizer stability, so bucket records and
    // profile lengths stay boundedly small. Bounded above by the u128
    // packing limit (MAX_SMER bases total).
    let max_super_cap = MAX_SMER.saturating_sub(kmer).saturating_sub(1).max(1);
    let max_super = max_super_cap.min(64);

    let est_distinct_bases = avg_len * sample.nreads as f64;
    let est_kmer_records = est_distinct_bases / (avg_len.max(1.0));
    let est_kmer_record_bytes =
        (est_kmer_records * kmer_record_bytes(kmer) as f64 * sample.ratio.max(1.0)) as u64;
    let nparts = ((est_kmer_record_bytes as f64 / sort_memory_bytes.max(1) as f64).ceil() as usize)
        .max(1);

    Ok(Scheme {
        kmer,
        m,
        mod_len,
        mod_msk,
        max_super,
        nparts,
        slen_bits: slen_bits(max_super),
        sort_memory_bytes,
        bc_prefix,
        compress,
        table_cutoff,
        want_profile,
        seed: 0x9E3779B97F4A7C15,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mod_len_is_smallest_power_of_two_above_kmer() {
        assert_eq!(mod_len_for(40), 64);
        assert_eq!(mod_len_for(31), 32);
        assert_eq!(mod_len_for(32), 64);
    }

    #[test]
    fn rejects_short_average_reads() {
        let sample = Block {
            nreads: 2,
            totlen: 10,
            ratio: 1.0,
            reads: vec![],
        };
        let err = select(&sample, 10, 1 << 20, 0, false, None, false).unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[test]
    fn nparts_is_at_least_one() {
        let sample = Block {
            nreads: 1000,
            totlen: 1000 * 100,
            ratio: 1.0,
            reads: vec![],
        };
        let scheme = select(&sample, 20, 1 << 30, 0, false, None, false).unwrap();
        assert!(scheme.nparts >= 1);
    }
}
