//! Configuration and data errors reported by the pairs command.

use std::process::{Command, Output};

use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{Locus, create_header, create_orphan, create_pair, write_sorted_bam};

fn run_failing(args: &[&str]) -> String {
    let output: Output = Command::new(env!("CARGO_BIN_EXE_fgmate"))
        .arg("pairs")
        .args(args)
        .output()
        .expect("Failed to run pairs command");
    assert!(!output.status.success(), "pairs unexpectedly succeeded");
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_missing_input() {
    let stderr = run_failing(&["-i", "/nonexistent/input.bam"]);
    assert!(stderr.contains("does not exist"), "stderr: {stderr}");
}

#[rstest]
#[case("0,2")]
#[case("3,2")]
#[case("1,0")]
#[case("one,two")]
fn test_invalid_shard(#[case] spec: &str) {
    let stderr = run_failing(&["-i", "-", "--shard", spec]);
    assert!(stderr.contains("Invalid shard"), "stderr: {stderr}");
}

#[test]
fn test_invalid_filter() {
    let stderr = run_failing(&["-i", "-", "-e", "mapq >> 3"]);
    assert!(stderr.contains("Invalid filter expression"), "stderr: {stderr}");
}

#[test]
fn test_invalid_region() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    write_sorted_bam(&input, &create_header(&[("chr1", 1000)]), Vec::new());
    let stderr = run_failing(&["-i", input.to_str().unwrap(), "-r", "chr1:200-100"]);
    assert!(stderr.contains("Invalid region"), "stderr: {stderr}");
}

#[test]
fn test_unknown_gene() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let genes = temp_dir.path().join("genes.bed");
    write_sorted_bam(&input, &create_header(&[("chr1", 1000)]), Vec::new());
    std::fs::write(&genes, "chr1\t10\t20\tGENEA\n").unwrap();
    let stderr = run_failing(&[
        "-i",
        input.to_str().unwrap(),
        "-g",
        "NOPE",
        "--gene-table",
        genes.to_str().unwrap(),
    ]);
    assert!(stderr.contains("Gene 'NOPE' not found"), "stderr: {stderr}");
}

#[test]
fn test_duplicate_mate_fails_under_fail_policy() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let mut records = create_pair("dup", Locus::new(0, 100), Locus::new(0, 500));
    records.push(create_orphan("dup", Locus::new(0, 150), Locus::new(0, 500)));
    write_sorted_bam(&input, &create_header(&[("chr1", 1000)]), records);

    let stderr =
        run_failing(&["-i", input.to_str().unwrap(), "--duplicate-policy", "fail"]);
    assert!(stderr.contains("Duplicate first mate for read 'dup'"), "stderr: {stderr}");
}

#[test]
fn test_same_output_twice() {
    let stderr = run_failing(&["-i", "-", "-o", "out.fq", "-2", "out.fq"]);
    assert!(stderr.contains("output2"), "stderr: {stderr}");
}
