//! Integration tests for fgmate.
//!
//! Run with: `cargo test --test integration_tests`
//!
//! These tests drive the pairing engine through its public API on larger synthetic inputs
//! than the unit tests use, checking the properties that must hold for any worker count.

use std::collections::{BTreeMap, BTreeSet};

use fgmate_lib::fastq::{OutputLayout, PairFormatter};
use fgmate_lib::filter::FilterExpression;
use fgmate_lib::locator::DuplicatePolicy;
use fgmate_lib::record::{AlignedRead, MateOrder};
use fgmate_lib::regions::RegionSet;
use fgmate_lib::scanner::{PairScanner, ScanOptions, ScanReport};
use fgmate_lib::shard::{ReadNameHash, ShardSpec};
use fgmate_lib::sink::FastqSink;
use rstest::rstest;

/// A deterministic, coordinate-sorted mix of pairs (some far apart, some across contigs) and
/// orphans whose mate never appears.
fn synthetic_reads(pairs: usize, orphans: usize) -> Vec<AlignedRead> {
    let contigs = ["chr1", "chr2", "chr3"];
    let mut reads = Vec::with_capacity(2 * pairs + orphans);
    for i in 0..pairs {
        let name = format!("pair{i:06}");
        let c1 = contigs[i % 3];
        let c2 = contigs[(i / 3 + i) % 3];
        let s1 = 1 + (i * 131) % 100_000;
        let s2 = 1 + (i * 7919) % 100_000;
        reads.push(
            AlignedRead::builder(&name, MateOrder::First)
                .position(c1, s1)
                .mate_position(c2, s2)
                .bases("ACGTAC", &[35; 6])
                .mapping_quality((i % 60) as u8)
                .build(),
        );
        reads.push(
            AlignedRead::builder(&name, MateOrder::Second)
                .position(c2, s2)
                .mate_position(c1, s1)
                .bases("TTGACA", &[25; 6])
                .mapping_quality(60)
                .build(),
        );
    }
    for i in 0..orphans {
        reads.push(
            AlignedRead::builder(&format!("orphan{i:04}"), MateOrder::Second)
                .position(contigs[i % 3], 1 + i * 977)
                .mate_position("chr9", 5)
                .bases("GGG", &[20; 3])
                .build(),
        );
    }
    reads.sort_by(|a, b| {
        (a.reference_name(), a.alignment_start()).cmp(&(b.reference_name(), b.alignment_start()))
    });
    reads
}

fn scan(scanner: &PairScanner, reads: &[AlignedRead]) -> (ScanReport, Vec<String>) {
    let sink = FastqSink::interleaved(Vec::new());
    let report = scanner.scan(reads.iter().cloned().map(Ok), &sink).unwrap();
    let text = String::from_utf8(sink.into_inner().0).unwrap();
    let names = text.lines().step_by(4).map(|line| line[1..].to_string()).collect();
    (report, names)
}

/// Checks interleaving and returns each pair's base name.
fn pair_names(names: &[String]) -> Vec<String> {
    assert_eq!(names.len() % 2, 0);
    names
        .chunks(2)
        .map(|pair| {
            let r1 = pair[0].strip_suffix("/1").expect("first record is /1");
            let r2 = pair[1].strip_suffix("/2").expect("second record is /2");
            assert_eq!(r1, r2);
            r1.to_string()
        })
        .collect()
}

fn interleaved(options: ScanOptions) -> PairScanner {
    PairScanner::new(options, PairFormatter::new(OutputLayout::Interleaved)).unwrap()
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(7)]
#[case(64)]
fn test_pairing_is_complete_for_any_worker_count(#[case] workers: usize) {
    let reads = synthetic_reads(2_000, 25);
    let scanner = interleaved(ScanOptions { workers, ..ScanOptions::default() });
    let (report, names) = scan(&scanner, &reads);

    let pairs = pair_names(&names);
    let unique: BTreeSet<&String> = pairs.iter().collect();
    assert_eq!(pairs.len(), 2_000, "every pair is written");
    assert_eq!(unique.len(), 2_000, "no pair is written twice");

    let residual_names: Vec<&str> = report.residuals.iter().map(|r| r.name.as_str()).collect();
    let expected: Vec<String> = (0..25).map(|i| format!("orphan{i:04}")).collect();
    assert_eq!(residual_names, expected);
    assert!(report.residuals.iter().all(|r| r.mate == MateOrder::Second));
    assert!(report.residuals.iter().all(|r| r.mate_reference_name.as_deref() == Some("chr9")));
}

#[test]
fn test_output_set_is_independent_of_worker_count() {
    let reads = synthetic_reads(500, 5);
    let baseline: BTreeSet<String> = {
        let (_, names) = scan(&interleaved(ScanOptions { workers: 1, ..ScanOptions::default() }), &reads);
        names.into_iter().collect()
    };
    for workers in [3, 16] {
        let (_, names) =
            scan(&interleaved(ScanOptions { workers, ..ScanOptions::default() }), &reads);
        assert_eq!(names.into_iter().collect::<BTreeSet<_>>(), baseline);
    }
}

#[rstest]
#[case(2)]
#[case(3)]
#[case(8)]
fn test_shards_partition_by_name_hash(#[case] count: usize) {
    let reads = synthetic_reads(600, 0);
    let mut owners: BTreeMap<String, usize> = BTreeMap::new();
    for id in 0..count {
        let shard = ShardSpec::new(id, count).unwrap();
        let (report, names) = scan(&interleaved(ScanOptions { shard, ..ScanOptions::default() }), &reads);
        assert_eq!(report.diagnostics.counts.pairs_matched, 600);
        for name in pair_names(&names) {
            assert_eq!(ReadNameHash::of(name.as_bytes()).shard(count), id);
            assert!(owners.insert(name, id).is_none(), "pair written by two shards");
        }
    }
    assert_eq!(owners.len(), 600);
}

#[test]
fn test_region_never_splits_pairs() {
    let reads = synthetic_reads(1_000, 10);
    let region: RegionSet = "chr2:10,000-30,000".parse().unwrap();
    let scanner = interleaved(ScanOptions { workers: 4, ..ScanOptions::default() })
        .with_regions(region);
    let (report, names) = scan(&scanner, &reads);

    // pair_names asserts every written record has its mate right after it
    let written: BTreeSet<String> = pair_names(&names).into_iter().collect();
    let in_region = |contig: Option<&str>, start: Option<usize>| {
        contig == Some("chr2") && start.is_some_and(|s| (10_000..=30_000).contains(&s))
    };
    let expected: BTreeSet<String> = reads
        .iter()
        .filter(|r| r.mate().is_paired())
        .filter(|r| {
            in_region(r.reference_name(), r.alignment_start())
                || in_region(r.reference_name(), r.alignment_end())
        })
        .map(|r| r.name().to_string())
        .collect();
    assert!(!expected.is_empty());
    assert_eq!(written, expected);
    assert!(report.residuals.iter().all(|r| r.name.starts_with("orphan")));
}

#[test]
fn test_filter_expression_drops_whole_pairs() {
    let reads = synthetic_reads(300, 0);
    let filter = FilterExpression::parse("mapq >= 30").unwrap();
    let scanner = interleaved(ScanOptions { workers: 5, ..ScanOptions::default() }).with_filter(filter);
    let (report, names) = scan(&scanner, &reads);

    // first mates carry mapq i % 60, second mates 60
    let expected: BTreeSet<String> =
        (0..300).filter(|i| i % 60 >= 30).map(|i| format!("pair{i:06}")).collect();
    assert_eq!(pair_names(&names).into_iter().collect::<BTreeSet<_>>(), expected);
    assert!(report.residuals.is_empty(), "filtered pairs must not leave residuals");
    assert_eq!(report.diagnostics.counts.pairs_filtered, 150);
}

#[rstest]
#[case(DuplicatePolicy::KeepFirst, "ACGTAC")]
#[case(DuplicatePolicy::KeepLast, "CCCCCC")]
fn test_duplicate_policy(#[case] policy: DuplicatePolicy, #[case] expected_r1: &str) {
    let reads = vec![
        AlignedRead::builder("d", MateOrder::First).position("chr1", 10).bases("ACGTAC", &[30; 6]).build(),
        AlignedRead::builder("d", MateOrder::First).position("chr1", 20).bases("CCCCCC", &[30; 6]).build(),
        AlignedRead::builder("d", MateOrder::Second).position("chr1", 90).bases("GGGGGG", &[30; 6]).build(),
    ];
    let scanner = interleaved(ScanOptions { duplicate_policy: policy, ..ScanOptions::default() });
    let sink = FastqSink::interleaved(Vec::new());
    let report = scanner.scan(reads.into_iter().map(Ok), &sink).unwrap();
    let text = String::from_utf8(sink.into_inner().0).unwrap();

    assert_eq!(text.lines().nth(1), Some(expected_r1));
    assert_eq!(report.diagnostics.counts.duplicates, 1);
    assert_eq!(report.diagnostics.duplicate_examples.len(), 1);
}

#[test]
fn test_split_outputs_stay_in_step() {
    let reads = synthetic_reads(1_500, 0);
    let scanner = PairScanner::new(
        ScanOptions { workers: 12, flush_bytes: 512, ..ScanOptions::default() },
        PairFormatter::new(OutputLayout::Split),
    )
    .unwrap();
    let sink = FastqSink::split(Vec::new(), Vec::new());
    scanner.scan(reads.into_iter().map(Ok), &sink).unwrap();

    let (first, second) = sink.into_inner();
    let names = |bytes: Vec<u8>| -> Vec<String> {
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .step_by(4)
            .map(|line| line[1..line.len() - 2].to_string())
            .collect()
    };
    let first = names(first);
    assert_eq!(first.len(), 1_500);
    assert_eq!(first, names(second.unwrap()));
}
