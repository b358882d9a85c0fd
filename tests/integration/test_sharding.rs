//! Horizontal sharding across separate fgmate processes.

use std::collections::BTreeSet;
use std::process::Command;

use rstest::rstest;
use tempfile::TempDir;

use crate::helpers::{create_header, create_many_pairs, read_fastq, split_pair_names, write_sorted_bam};

#[rstest]
#[case(1)]
#[case(2)]
#[case(4)]
fn test_shards_partition_pairs(#[case] count: usize) {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let header = create_header(&[("chr1", 200_000), ("chr2", 200_000)]);
    write_sorted_bam(&input, &header, create_many_pairs(400, 2));

    let mut all = BTreeSet::new();
    let mut total = 0;
    for id in 1..=count {
        let r1 = temp_dir.path().join(format!("shard{id}.r1.fq"));
        let r2 = temp_dir.path().join(format!("shard{id}.r2.fq"));
        let output = Command::new(env!("CARGO_BIN_EXE_fgmate"))
            .args(["pairs", "-i", input.to_str().unwrap()])
            .args(["-o", r1.to_str().unwrap(), "-2", r2.to_str().unwrap()])
            .args(["--shard", &format!("{id},{count}"), "--workers", "3"])
            .output()
            .expect("Failed to run pairs command");
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let names = split_pair_names(&read_fastq(&r1), &read_fastq(&r2));
        total += names.len();
        all.extend(names);
    }

    assert_eq!(total, 400, "a pair was written by more than one shard");
    assert_eq!(all.len(), 400, "a pair was written by no shard");
}
