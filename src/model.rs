//! Packed 2-bit bases, canonical k-mers, minimizers and super-mers.
//!
//! K-mers are kept in a `u128` with the first base in the most significant
//! occupied bits, built by the same rolling radix accumulation used for
//! reference codes elsewhere in this crate family: `code = code * 4 + base`.
//! That convention makes numeric comparison of the packed value equivalent
//! to lexicographic comparison of the bases, which is what the sort stages
//! rely on.

use crate::error::FastkError;
use std::sync::OnceLock;

/// Largest k-mer size this implementation packs into a `u128` (2 bits/base).
/// Matches `MAX_SMER`: a k-mer can never be longer than the super-mer window
/// it was extracted from.
pub const MAX_KMER: usize = 64;

/// Largest super-mer length (in bases) this implementation packs into a
/// `u128` (2 bits/base). Bounds `MAX_SUPER` transitively via `SMER`.
pub const MAX_SMER: usize = 64;

/// A symbol in {A, C, G, T} encoded as a 2-bit value 0..=3.
#[inline(always)]
pub fn encode_base(b: u8) -> Option<u64> {
    match b {
        b'A' | b'a' => Some(0),
        b'C' | b'c' => Some(1),
        b'G' | b'g' => Some(2),
        b'T' | b't' => Some(3),
        _ => None,
    }
}

#[inline(always)]
pub fn decode_base(code: u64) -> u8 {
    match code & 0b11 {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        _ => b'T',
    }
}

/// Packed representation of a sequence: one `u64` per base, 2 bits used.
/// Kept unpacked-per-element (rather than bit-packed end to end) so that
/// sliding windows over it are plain array indexing; callers pack into the
/// tighter on-disk/in-memory representations (`Kmer`, `SuperMer`) explicitly.
#[derive(Debug, Clone, Default)]
pub struct PackedSeq {
    pub bases: Vec<u64>,
}

impl PackedSeq {
    /// Packs an ASCII sequence, returning `None` at the first ambiguous base.
    /// Callers are expected to have already split runs of `N` (see
    /// [`split_on_n`]) so a `None` here indicates malformed input, not an N.
    pub fn from_ascii(seq: &[u8]) -> Option<Self> {
        let mut bases = Vec::with_capacity(seq.len());
        for &b in seq {
            bases.push(encode_base(b)?);
        }
        Some(PackedSeq { bases })
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }
}

fn base_run_regex() -> &'static regex::bytes::Regex {
    static RE: OnceLock<regex::bytes::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::bytes::Regex::new(r"(?-u)[ACGTacgt]+").unwrap())
}

/// Splits a read on maximal runs of non-ACGT bases ("N" and friends),
/// returning the surviving base-runs as `(start_offset, bytes)`. Mirrors
/// `distinct-kmers`' `match_n` regex-split, generalized to a positive match
/// on base runs rather than a negative split on `N` runs.
pub fn split_on_n(seq: &[u8]) -> Vec<(usize, &[u8])> {
    base_run_regex()
        .find_iter(seq)
        .map(|m| (m.start(), m.as_bytes()))
        .collect()
}

/// Collapses homopolymer runs (`AAAA...` -> `A`) among packed 2-bit base
/// codes, applied before k-mer extraction when `-c` is set (spec.md §4.C).
/// Operates on codes rather than ASCII so it composes with `Block`'s
/// already-packed representation without a round trip through text.
pub fn compress_homopolymers(bases: &[u64]) -> Vec<u64> {
    let mut out = Vec::with_capacity(bases.len());
    let mut prev: Option<u64> = None;
    for &b in bases {
        if prev != Some(b) {
            out.push(b);
            prev = Some(b);
        }
    }
    out
}

/// A packed k-mer: `code` holds the k-mer in the low `2*k` bits, first base
/// most significant, `k` bases total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Kmer {
    pub code: u128,
    pub k: u8,
}

impl Kmer {
    /// Reverse-complements a k-mer using the classic byte-parallel bit trick
    /// (swap base pairs, then nibbles, bytes, 16-bit halves, 32-bit halves,
    /// 64-bit halves; complement; shift into place) generalized to the
    /// 128-bit word so it covers an arbitrary `k <= MAX_KMER`.
    pub fn reverse_complement(self) -> Kmer {
        let mut x = self.code;
        x = (x >> 2 & 0x3333_3333_3333_3333_3333_3333_3333_3333) | (x & 0x3333_3333_3333_3333_3333_3333_3333_3333) << 2;
        x = (x >> 4 & 0x0F0F_0F0F_0F0F_0F0F_0F0F_0F0F_0F0F_0F0F) | (x & 0x0F0F_0F0F_0F0F_0F0F_0F0F_0F0F_0F0F_0F0F) << 4;
        x = (x >> 8 & 0x00FF_00FF_00FF_00FF_00FF_00FF_00FF_00FF) | (x & 0x00FF_00FF_00FF_00FF_00FF_00FF_00FF_00FF) << 8;
        x = (x >> 16 & 0x0000_FFFF_0000_FFFF_0000_FFFF_0000_FFFF) | (x & 0x0000_FFFF_0000_FFFF_0000_FFFF_0000_FFFF) << 16;
        x = (x >> 32 & 0x0000_0000_FFFF_FFFF_0000_0000_FFFF_FFFF) | (x & 0x0000_0000_FFFF_FFFF_0000_0000_FFFF_FFFF) << 32;
        x = (x >> 64) | (x << 64);
        x ^= u128::MAX;
        x >>= 128 - 2 * self.k as u32;
        Kmer {
            code: x,
            k: self.k,
        }
    }

    /// The lexicographically smaller of `self` and its reverse complement.
    pub fn canonical(self) -> Kmer {
        let rc = self.reverse_complement();
        if rc.code < self.code {
            rc
        } else {
            self
        }
    }

    /// Number of bytes needed to store this k-mer packed, high-order base
    /// first, trailing bits of the last byte zeroed: `ceil(2*k / 8)`.
    pub fn byte_width(k: usize) -> usize {
        (2 * k + 7) / 8
    }

    /// Serializes into `byte_width(k)` bytes, high-order base first.
    pub fn to_bytes(self) -> Vec<u8> {
        let width = Self::byte_width(self.k as usize);
        let shifted = self.code << (width * 8 - 2 * self.k as usize);
        shifted.to_be_bytes()[16 - width..].to_vec()
    }

    pub fn from_bytes(bytes: &[u8], k: usize) -> Kmer {
        let mut buf = [0u8; 16];
        buf[16 - bytes.len()..].copy_from_slice(bytes);
        let shifted = u128::from_be_bytes(buf);
        let width = Self::byte_width(k);
        let code = shifted >> (width * 8 - 2 * k);
        Kmer {
            code,
            k: k as u8,
        }
    }
}

/// A fixed, allocation-free integer hash used to order minimizer candidates.
/// Chosen for near-uniform dispersion of packed base windows with no lookup
/// table, so the same order can be recomputed identically in every phase.
#[inline(always)]
pub fn splitmix64(mut x: u64, seed: u64) -> u64 {
    x ^= seed;
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// For every k-mer window in `bases` (there are `bases.len() - k + 1` of
/// them, `k = m + w - 1`), returns the start position of its minimizer: the
/// `m`-base substring of lowest `splitmix64` hash among the `w` candidate
/// windows inside it. Ties break on the lower start position.
///
/// Computed with a monotonic deque of `(hash, start)` pairs over the stream
/// of `m`-window hashes, giving amortized O(1) work per base rather than
/// O(w) per k-mer window.
pub fn minimizer_positions(bases: &[u64], m: usize, w: usize) -> Vec<u32> {
    minimizer_positions_seeded(bases, m, w, 0)
}

pub fn minimizer_positions_seeded(bases: &[u64], m: usize, w: usize, seed: u64) -> Vec<u32> {
    let n = bases.len();
    if n < m + w - 1 {
        return Vec::new();
    }
    let n_mwindows = n - m + 1;
    let mut hashes = Vec::with_capacity(n_mwindows);
    let mut code = 0u64;
    let mask = if m >= 32 { u64::MAX } else { (1u64 << (2 * m)) - 1 };
    for i in 0..n {
        code = ((code << 2) | bases[i]) & mask;
        if i + 1 >= m {
            hashes.push(splitmix64(code, seed));
        }
    }

    let mut out = Vec::with_capacity(n_mwindows.saturating_sub(w - 1));
    let mut deque: std::collections::VecDeque<u32> = std::collections::VecDeque::new();
    for i in 0..n_mwindows {
        while let Some(&back) = deque.back() {
            if hashes[back as usize] >= hashes[i] {
                deque.pop_back();
            } else {
                break;
            }
        }
        deque.push_back(i as u32);
        if let Some(&front) = deque.front() {
            if (front as usize) + w <= i {
                deque.pop_front();
            }
        }
        if i + 1 >= w {
            out.push(*deque.front().unwrap());
        }
    }
    out
}

/// A super-mer: packed bases (up to `MAX_SMER` of them) plus the base
/// length. Packing mirrors the teacher's `SKT = u128` superkmer word: bases
/// occupy the high bits, the length occupies `SLEN_BITS` low bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperMer {
    pub bases_code: u128,
    pub len: u16,
}

impl SuperMer {
    pub fn pack(bases: &[u64], len_minus_km1: u16) -> Result<u128, FastkError> {
        if bases.len() > MAX_SMER {
            return Err(FastkError::Invariant(format!(
                "super-mer of {} bases exceeds the {}-base implementation limit",
                bases.len(),
                MAX_SMER
            )));
        }
        let mut code: u128 = 0;
        for &b in bases {
            code = (code << 2) | b as u128;
        }
        Ok((code << 16) | len_minus_km1 as u128)
    }

    pub fn unpack(word: u128, nbases: usize) -> (Vec<u64>, u16) {
        let len = (word & 0xFFFF) as u16;
        let code = word >> 16;
        let mut bases = vec![0u64; nbases];
        for i in (0..nbases).rev() {
            bases[i] = (code >> (2 * (nbases - 1 - i))) as u64 & 0b11;
        }
        (bases, len)
    }
}

/// Bytes needed to pack `n` 2-bit bases, high-order base first:
/// `ceil(2*n / 8)`.
pub fn bases_byte_width(n: usize) -> usize {
    (2 * n + 7) / 8
}

/// Packs up to [`MAX_SMER`] bases into bytes, high-order base first,
/// trailing bits of the last byte zeroed.
pub fn pack_bases(bases: &[u64]) -> Vec<u8> {
    let width = bases_byte_width(bases.len());
    let mut code: u128 = 0;
    for &b in bases {
        code = (code << 2) | b as u128;
    }
    let shift = width * 8 - 2 * bases.len();
    let shifted = code << shift;
    shifted.to_be_bytes()[16 - width..].to_vec()
}

/// Inverse of [`pack_bases`] given the known base count.
pub fn unpack_bases(bytes: &[u8], n: usize) -> Vec<u64> {
    let width = bases_byte_width(n);
    let mut buf = [0u8; 16];
    buf[16 - bytes.len()..].copy_from_slice(bytes);
    let shifted = u128::from_be_bytes(buf);
    let shift = width * 8 - 2 * n;
    let code = shifted >> shift;
    let mut out = vec![0u64; n];
    for i in (0..n).rev() {
        out[i] = (code >> (2 * (n - 1 - i))) as u64 & 0b11;
    }
    out
}

/// Bits required to encode values in `[1, max_super]`.
pub fn slen_bits(max_super: usize) -> u32 {
    (usize::BITS - (max_super.max(1)).leading_zeros()).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_picks_lexicographic_min() {
        let acgt = PackedSeq::from_ascii(b"ACGT").unwrap();
        let mut code = 0u128;
        for &b in &acgt.bases {
            code = (code << 2) | b as u128;
        }
        let kmer = Kmer { code, k: 4 };
        // ACGT's reverse complement is ACGT (palindrome).
        assert_eq!(kmer.canonical().code, kmer.code);

        let acg = PackedSeq::from_ascii(b"ACG").unwrap();
        let mut code2 = 0u128;
        for &b in &acg.bases {
            code2 = (code2 << 2) | b as u128;
        }
        let kmer2 = Kmer { code: code2, k: 3 };
        // rc(ACG) = CGT, and ACG < CGT lexicographically.
        assert_eq!(kmer2.canonical().code, kmer2.code);
    }

    #[test]
    fn kmer_byte_roundtrip() {
        let kmer = Kmer { code: 0b0011_1001, k: 4 };
        let bytes = kmer.to_bytes();
        assert_eq!(bytes.len(), Kmer::byte_width(4));
        let back = Kmer::from_bytes(&bytes, 4);
        assert_eq!(back.code, kmer.code);
    }

    #[test]
    fn split_on_n_splits_read_into_runs() {
        let runs = split_on_n(b"ACGTNNNACGT");
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0], (0, &b"ACGT"[..]));
        assert_eq!(runs[1], (7, &b"ACGT"[..]));
    }

    #[test]
    fn homopolymer_compression_collapses_runs() {
        let packed = PackedSeq::from_ascii(b"AAACCGGGT").unwrap();
        let expected = PackedSeq::from_ascii(b"ACGT").unwrap();
        assert_eq!(compress_homopolymers(&packed.bases), expected.bases);
    }

    #[test]
    fn pack_unpack_bases_roundtrip() {
        let seq = PackedSeq::from_ascii(b"ACGTACGTACG").unwrap();
        let packed = pack_bases(&seq.bases);
        assert_eq!(packed.len(), bases_byte_width(seq.bases.len()));
        let back = unpack_bases(&packed, seq.bases.len());
        assert_eq!(back, seq.bases);
    }

    #[test]
    fn minimizer_positions_picks_lowest_hash_window() {
        let seq = PackedSeq::from_ascii(b"ACGTACGTACGTACGT").unwrap();
        let m = 4;
        let w = 3;
        let positions = minimizer_positions(&seq.bases, m, w);
        assert_eq!(positions.len(), seq.bases.len() - (m + w - 1) + 1);
        for &p in &positions {
            assert!((p as usize) + m <= seq.bases.len());
        }
    }

    #[test]
    fn slen_bits_matches_bit_width() {
        assert_eq!(slen_bits(1), 1);
        assert_eq!(slen_bits(63), 6);
        assert_eq!(slen_bits(64), 7);
    }
}
