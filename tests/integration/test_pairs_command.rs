//! Integration tests for the pairs command.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use fgmate_lib::metrics::PairScanMetrics;
use fgoxide::io::DelimFile;
use tempfile::TempDir;

use crate::helpers::{
    Locus, create_header, create_orphan, create_pair, create_pair_with_mapq, interleaved_pair_names,
    parse_fastq, read_fastq, split_pair_names, write_sorted_bam,
};

fn run_pairs(args: &[&str]) -> Output {
    let output = Command::new(env!("CARGO_BIN_EXE_fgmate"))
        .arg("pairs")
        .args(args)
        .output()
        .expect("Failed to run pairs command");
    assert!(
        output.status.success(),
        "pairs command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}

/// Three pairs on two contigs, one of them spanning contigs, and one orphan.
fn write_basic_bam(path: &Path) {
    let header = create_header(&[("chr1", 100_000), ("chr2", 100_000)]);
    let mut records = Vec::new();
    records.extend(create_pair("near", Locus::new(0, 100), Locus::new(0, 300)));
    records.extend(create_pair("far", Locus::new(0, 200), Locus::new(0, 80_000)));
    records.extend(create_pair("cross", Locus::new(0, 500), Locus::new(1, 1_000)));
    records.push(create_orphan("lonely", Locus::new(0, 600), Locus::new(1, 50_000)));
    write_sorted_bam(path, &header, records);
}

#[test]
fn test_pairs_interleaved_to_stdout() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    write_basic_bam(&input);

    let output = run_pairs(&["-i", path_str(&input), "-w", "2"]);
    let records = parse_fastq(&String::from_utf8(output.stdout).unwrap());

    let names = interleaved_pair_names(&records);
    assert_eq!(names.into_iter().collect::<Vec<_>>(), ["cross", "far", "near"]);

    // R2 is stored reverse-complemented and is restored to sequencing orientation
    let near_r2 = records.iter().find(|r| r.name == "near/2").unwrap();
    assert_eq!(near_r2.sequence, "GGTTGGCCAA");
    let near_r1 = records.iter().find(|r| r.name == "near/1").unwrap();
    assert_eq!(near_r1.sequence, "ACGTACGTAA");
    assert_eq!(near_r1.quality, "??????????");
}

#[test]
fn test_pairs_split_gzip_with_reports() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let r1 = temp_dir.path().join("r1.fq.gz");
    let r2 = temp_dir.path().join("r2.fq.gz");
    let metrics = temp_dir.path().join("metrics.tsv");
    let residuals = temp_dir.path().join("residuals.tsv");
    write_basic_bam(&input);

    run_pairs(&[
        "-i",
        path_str(&input),
        "-o",
        path_str(&r1),
        "-2",
        path_str(&r2),
        "--metrics",
        path_str(&metrics),
        "--residuals",
        path_str(&residuals),
    ]);

    let first = read_fastq(&r1);
    let second = read_fastq(&r2);
    assert!(first.iter().all(|r| r.name.ends_with("/1")));
    assert!(second.iter().all(|r| r.name.ends_with("/2")));
    assert_eq!(split_pair_names(&first, &second).len(), 3);

    let rows: Vec<PairScanMetrics> = DelimFile::default().read_tsv(&metrics).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].records_read, 7);
    assert_eq!(rows[0].pairs_emitted, 3);
    assert_eq!(rows[0].residual_reads, 1);
    assert_eq!(rows[0].shard, "1,1");

    let residual_text = fs::read_to_string(&residuals).unwrap();
    let lines: Vec<&str> = residual_text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1], "lonely\tfirst\tchr1\t600\tchr2\t50000");
}

#[test]
fn test_pairs_region_keeps_pairs_whole() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    write_basic_bam(&input);

    // Bare contig names are renamed to match the chr-prefixed BAM; only "far"'s second mate
    // is inside the region, yet both of its mates are written.
    let output = run_pairs(&["-i", path_str(&input), "-r", "1:79,000-81,000"]);
    let records = parse_fastq(&String::from_utf8(output.stdout).unwrap());
    let names = interleaved_pair_names(&records);
    assert_eq!(names.into_iter().collect::<Vec<_>>(), ["far"]);
}

#[test]
fn test_pairs_regions_bed_with_padding() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let bed = temp_dir.path().join("regions.bed");
    write_basic_bam(&input);
    // 0-based [950, 960) on chr2 is 1-based 951-960; padding reaches "cross" R2 at 1000
    fs::write(&bed, "chr2\t950\t960\n").unwrap();

    let unpadded = run_pairs(&["-i", path_str(&input), "-L", path_str(&bed)]);
    assert!(parse_fastq(&String::from_utf8(unpadded.stdout).unwrap()).is_empty());

    let padded =
        run_pairs(&["-i", path_str(&input), "-L", path_str(&bed), "--padding", "50"]);
    let records = parse_fastq(&String::from_utf8(padded.stdout).unwrap());
    let names = interleaved_pair_names(&records);
    assert_eq!(names.into_iter().collect::<Vec<_>>(), ["cross"]);
}

#[test]
fn test_pairs_gene_lookup() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let genes = temp_dir.path().join("genes.bed");
    write_basic_bam(&input);
    fs::write(&genes, "chr1\t50\t150\tGENEA\nchr1\t70000\t90000\tGENEB\n").unwrap();

    let output = run_pairs(&[
        "-i",
        path_str(&input),
        "-g",
        "genea",
        "--gene-table",
        path_str(&genes),
    ]);
    let records = parse_fastq(&String::from_utf8(output.stdout).unwrap());
    let names = interleaved_pair_names(&records);
    assert_eq!(names.into_iter().collect::<Vec<_>>(), ["near"]);
}

#[test]
fn test_pairs_filter_drops_whole_pairs() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let residuals = temp_dir.path().join("residuals.tsv");
    let header = create_header(&[("chr1", 100_000)]);
    let mut records = Vec::new();
    records.extend(create_pair_with_mapq("good", Locus::new(0, 100), Locus::new(0, 400), 60, 60));
    records.extend(create_pair_with_mapq("bad_r1", Locus::new(0, 200), Locus::new(0, 500), 5, 60));
    records.extend(create_pair_with_mapq("bad_r2", Locus::new(0, 300), Locus::new(0, 600), 60, 5));
    write_sorted_bam(&input, &header, records);

    let output = run_pairs(&[
        "-i",
        path_str(&input),
        "-e",
        "mapq >= 20 && proper_pair",
        "--residuals",
        path_str(&residuals),
    ]);
    let records = parse_fastq(&String::from_utf8(output.stdout).unwrap());
    let names = interleaved_pair_names(&records);
    assert_eq!(names.into_iter().collect::<Vec<_>>(), ["good"]);
    // filtered pairs leave no residuals behind
    let residual_text = fs::read_to_string(&residuals).unwrap();
    assert!(!residual_text.contains("bad_r"), "residuals: {residual_text}");
}

#[test]
fn test_pairs_annotated_names_without_suffix() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let header = create_header(&[("chr1", 100_000), ("chr2", 100_000)]);
    write_sorted_bam(&input, &header, create_pair("q", Locus::new(0, 10), Locus::new(1, 20)));

    let output = run_pairs(&["-i", path_str(&input), "--annotate-positions", "-n"]);
    let records = parse_fastq(&String::from_utf8(output.stdout).unwrap());
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, ["q|chr1:10|chr2:20", "q|chr1:10|chr2:20"]);
}

#[test]
fn test_pairs_include_unpaired() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    let header = create_header(&[("chr1", 100_000)]);
    let mut records = create_pair("p", Locus::new(0, 10), Locus::new(0, 90));
    records.push(crate::helpers::mapped_record(
        "single",
        noodles::sam::alignment::record::Flags::empty(),
        Locus::new(0, 50),
        Locus::new(0, 50),
        "ACGT",
        60,
    ));
    write_sorted_bam(&input, &header, records);

    let without = run_pairs(&["-i", path_str(&input)]);
    assert_eq!(parse_fastq(&String::from_utf8(without.stdout).unwrap()).len(), 2);

    let with = run_pairs(&["-i", path_str(&input), "--include-unpaired"]);
    let records = parse_fastq(&String::from_utf8(with.stdout).unwrap());
    assert_eq!(records.len(), 3);
    assert!(records.iter().any(|r| r.name == "single" && r.sequence == "ACGT"));
}

#[test]
fn test_pairs_debug_read_is_logged() {
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("input.bam");
    write_basic_bam(&input);

    let output = run_pairs(&["-i", path_str(&input), "--debug-read", "far"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[trace far] buffered"), "stderr: {stderr}");
    assert!(stderr.contains("[trace far] paired"), "stderr: {stderr}");
    assert!(!stderr.contains("[trace near]"));
}
