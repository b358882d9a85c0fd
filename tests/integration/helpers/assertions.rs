//! FASTQ parsing and assertions shared by the command tests.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::MultiGzDecoder;

/// One parsed FASTQ record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    pub name: String,
    pub sequence: String,
    pub quality: String,
}

/// Parses FASTQ text.
pub fn parse_fastq(text: &str) -> Vec<FastqRecord> {
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len() % 4, 0, "FASTQ has a partial record");
    lines
        .chunks(4)
        .map(|chunk| {
            assert!(chunk[0].starts_with('@'), "bad header line: {}", chunk[0]);
            assert_eq!(chunk[2], "+");
            assert_eq!(chunk[1].len(), chunk[3].len());
            FastqRecord {
                name: chunk[0][1..].to_string(),
                sequence: chunk[1].to_string(),
                quality: chunk[3].to_string(),
            }
        })
        .collect()
}

/// Reads a FASTQ file, gunzipping `.gz` files.
pub fn read_fastq(path: &Path) -> Vec<FastqRecord> {
    let mut text = String::new();
    let file = File::open(path).expect("Failed to open FASTQ");
    if path.extension().is_some_and(|ext| ext == "gz") {
        MultiGzDecoder::new(file).read_to_string(&mut text).expect("Failed to gunzip FASTQ");
    } else {
        let mut file = file;
        file.read_to_string(&mut text).expect("Failed to read FASTQ");
    }
    parse_fastq(&text)
}

/// Strips a trailing `/1` or `/2`.
pub fn base_name(name: &str) -> &str {
    name.strip_suffix("/1").or_else(|| name.strip_suffix("/2")).unwrap_or(name)
}

/// Asserts interleaved records alternate `/1` `/2` for the same name and returns the names.
pub fn interleaved_pair_names(records: &[FastqRecord]) -> BTreeSet<String> {
    assert_eq!(records.len() % 2, 0, "odd number of interleaved records");
    records
        .chunks(2)
        .map(|pair| {
            assert!(pair[0].name.ends_with("/1"), "expected /1, got {}", pair[0].name);
            assert!(pair[1].name.ends_with("/2"), "expected /2, got {}", pair[1].name);
            assert_eq!(base_name(&pair[0].name), base_name(&pair[1].name));
            base_name(&pair[0].name).to_string()
        })
        .collect()
}

/// Asserts split outputs list the same names in the same order and returns the names.
pub fn split_pair_names(first: &[FastqRecord], second: &[FastqRecord]) -> BTreeSet<String> {
    assert_eq!(first.len(), second.len(), "split outputs differ in length");
    first
        .iter()
        .zip(second)
        .map(|(r1, r2)| {
            assert_eq!(base_name(&r1.name), base_name(&r2.name));
            base_name(&r1.name).to_string()
        })
        .collect()
}
