//! Boundary behaviors from spec.md §8.

use fastk::config::ProfileRequest;
use fastk::pipeline::{run, RunRequest};
use fastk::sort::kmer::read_table;
use std::io::Write;
use std::path::{Path, PathBuf};

fn write_fasta(dir: &Path, name: &str, records: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    for (id, seq) in records {
        writeln!(f, ">{id}").unwrap();
        writeln!(f, "{seq}").unwrap();
    }
    path
}

fn table_shard_path(out_root: &Path, thread: usize) -> PathBuf {
    let dir = out_root.parent().unwrap();
    let name = out_root.file_name().unwrap().to_string_lossy();
    dir.join(format!(".{name}.ktab.{thread}"))
}

fn base_request(out_root: PathBuf, kmer: usize, sources: Vec<PathBuf>) -> RunRequest {
    RunRequest {
        kmer,
        table_cutoff: None,
        profile: ProfileRequest::None,
        compress: false,
        bc_prefix: 0,
        out_root,
        tmp_root: None,
        sort_memory_bytes: 1 << 24,
        nthreads: 1,
        sources,
    }
}

#[test]
fn read_of_exactly_kmer_bases_emits_one_kmer() {
    let tmp = tempfile::tempdir().unwrap();
    // A second, longer read keeps the sample's average length above the
    // 1.5*KMER floor the Scheme Selector requires; "ACGTA" alone (length
    // exactly k) would be rejected as too short on average.
    let src = write_fasta(
        tmp.path(),
        "reads.fa",
        &[("r0", "ACGTA"), ("r1", "TTTTTTTTTTTTTTTTTTTT")],
    );
    let out_root = tmp.path().join("out");

    let outcome = run(base_request(out_root.clone(), 5, vec![src])).unwrap();
    // one window from "ACGTA" plus 16 windows from the 20-base homopolymer read
    assert_eq!(outcome.nkmers, 2); // "ACGTA" canonical form + "AAAAA" canonical form
    let total: u32 = read_table(&table_shard_path(&out_root, 0), 5)
        .unwrap()
        .iter()
        .map(|kc| kc.count)
        .sum();
    assert_eq!(total, 1 + 16);
}

#[test]
fn read_shorter_than_kmer_plus_bc_prefix_is_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    // r0 is too short once the 3-base prefix is stripped (7 - 3 = 4 < k=5)
    // and contributes nothing; r1 is only here to satisfy the Scheme
    // Selector's average-length floor.
    let src = write_fasta(
        tmp.path(),
        "reads.fa",
        &[("r0", "ACGTACG"), ("r1", "ACGTACGTACGTACGTACGT")],
    );
    let out_root = tmp.path().join("out");

    let mut req = base_request(out_root.clone(), 5, vec![src]);
    req.bc_prefix = 3;

    run(req).unwrap();
    // r1 trimmed to 17 bases -> 13 k-mer windows; r0 contributes none.
    let total: u32 = read_table(&table_shard_path(&out_root, 0), 5)
        .unwrap()
        .iter()
        .map(|kc| kc.count)
        .sum();
    assert_eq!(total, 13);
}

#[test]
fn kmer_size_rejected_when_out_of_range() {
    let tmp = tempfile::tempdir().unwrap();
    let src = write_fasta(tmp.path(), "reads.fa", &[("r0", "ACGTACGTAC")]);
    let out_root = tmp.path().join("out");

    let req = base_request(out_root, 0, vec![src]);
    let err = run(req).unwrap_err();
    assert!(err.to_string().contains("kmer size"));
}

#[test]
fn kmer_size_one_past_the_128_bit_packing_ceiling_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let src = write_fasta(tmp.path(), "reads.fa", &[("r0", "ACGTACGTAC")]);
    let out_root = tmp.path().join("out");

    // MAX_KMER is 64 (a Kmer packs 2 bits/base into a u128); 65 must fail
    // the same way 0 does, and the CLI's documented default of 40 (spec.md
    // §6) must fall comfortably inside the supported range.
    let req = base_request(out_root, 65, vec![src]);
    let err = run(req).unwrap_err();
    assert!(err.to_string().contains("kmer size"));
}

#[test]
fn kmer_size_40_the_cli_default_is_accepted() {
    let tmp = tempfile::tempdir().unwrap();
    // A read long enough to hold at least one 40-mer plus the average
    // length floor (1.5 * 40 = 60 bases); non-periodic so this doesn't
    // exercise anything about window uniqueness, just that k=40 (the CLI's
    // documented default, spec.md §6) runs to completion under MAX_KMER=64.
    let seq = "ACGTTGCAACGTAGGCATTACCGGTATCAGCTTGACCATGAACGTACGGTTCAAGCTAGA";
    let src = write_fasta(tmp.path(), "reads.fa", &[("r0", seq)]);
    let out_root = tmp.path().join("out");

    let outcome = run(base_request(out_root, 40, vec![src])).unwrap();
    assert!(outcome.nkmers >= 1);
}

#[test]
fn bc_prefix_is_stripped_from_every_n_split_fragment_independently() {
    let tmp = tempfile::tempdir().unwrap();
    // One read with an internal run of Ns: two 11-base fragments, each
    // starting with the 3-base "TAG" prefix. bc_prefix is applied inside
    // the Splitter, per `PackedRead`, and the N-split already happened in
    // the Input Partition before any `PackedRead` exists — so each
    // post-N fragment gets its own leading 3 bases stripped, not just the
    // read's first fragment. With bc_prefix=3, kmer=4: each fragment trims
    // to 8 bases (5 k-mer windows), for 10 windows total. If only the
    // read's true first fragment were trimmed, the untrimmed second
    // fragment (11 bases) would contribute 8 windows instead of 5, for 13
    // total; this pins the chosen (per-fragment) behavior.
    let src = write_fasta(
        tmp.path(),
        "reads.fa",
        &[("r0", "TAGACGTACGTNNNTAGACGTACGT")],
    );
    let out_root = tmp.path().join("out");

    let mut req = base_request(out_root.clone(), 4, vec![src]);
    req.bc_prefix = 3;
    run(req).unwrap();

    let total: u32 = read_table(&table_shard_path(&out_root, 0), 4)
        .unwrap()
        .iter()
        .map(|kc| kc.count)
        .sum();
    assert_eq!(total, 10);
}

#[test]
fn profiling_against_existing_table_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let src = write_fasta(tmp.path(), "reads.fa", &[("r0", "ACGTACGTAC")]);
    let out_root = tmp.path().join("out");

    let mut req = base_request(out_root, 5, vec![src]);
    req.profile = ProfileRequest::AgainstExistingTable;
    let err = run(req).unwrap_err();
    assert!(err.to_string().contains("not supported"));
}
