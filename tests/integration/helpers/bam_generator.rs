//! Utilities for generating coordinate-sorted test BAMs programmatically.

use std::fs::File;
use std::num::NonZeroUsize;
use std::path::Path;

use bstr::BString;
use noodles::bam;
use noodles::core::Position;
use noodles::sam::Header;
use noodles::sam::alignment::io::Write as AlignmentWrite;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::{Flags, MappingQuality};
use noodles::sam::alignment::record_buf::{Cigar, QualityScores, RecordBuf, Sequence};
use noodles::sam::header::record::value::{Map, map::ReferenceSequence};

/// Creates a header with the given `(name, length)` reference sequences.
pub fn create_header(contigs: &[(&str, usize)]) -> Header {
    contigs
        .iter()
        .fold(Header::builder(), |builder, (name, len)| {
            let reference_sequence = Map::<ReferenceSequence>::new(
                NonZeroUsize::new(*len).expect("reference length must be non-zero"),
            );
            builder.add_reference_sequence(BString::from(*name), reference_sequence)
        })
        .build()
}

/// Where one mate of a test pair aligns.
#[derive(Clone, Copy, Debug)]
pub struct Locus {
    /// Reference sequence index
    pub ref_id: usize,
    /// 1-based alignment start
    pub start: usize,
}

impl Locus {
    pub fn new(ref_id: usize, start: usize) -> Self {
        Self { ref_id, start }
    }
}

/// A mapped record with a full-length match CIGAR and its mate's coordinates.
pub fn mapped_record(
    name: &str,
    flags: Flags,
    locus: Locus,
    mate: Locus,
    sequence: &str,
    mapq: u8,
) -> RecordBuf {
    let mut record = RecordBuf::default();
    *record.name_mut() = Some(BString::from(name));
    *record.flags_mut() = flags;
    *record.reference_sequence_id_mut() = Some(locus.ref_id);
    *record.alignment_start_mut() = Position::new(locus.start);
    *record.mapping_quality_mut() = MappingQuality::new(mapq);
    *record.cigar_mut() = [Op::new(Kind::Match, sequence.len())].into_iter().collect::<Cigar>();
    *record.mate_reference_sequence_id_mut() = Some(mate.ref_id);
    *record.mate_alignment_start_mut() = Position::new(mate.start);
    *record.sequence_mut() = Sequence::from(sequence.as_bytes().to_vec());
    *record.quality_scores_mut() = QualityScores::from(vec![30; sequence.len()]);
    record
}

/// Both mates of a pair: R1 forward at `r1`, R2 reverse-complemented at `r2`.
pub fn create_pair(name: &str, r1: Locus, r2: Locus) -> Vec<RecordBuf> {
    create_pair_with_mapq(name, r1, r2, 60, 60)
}

/// Like [`create_pair`] with explicit mapping qualities.
pub fn create_pair_with_mapq(
    name: &str,
    r1: Locus,
    r2: Locus,
    r1_mapq: u8,
    r2_mapq: u8,
) -> Vec<RecordBuf> {
    let paired = Flags::SEGMENTED | Flags::PROPERLY_SEGMENTED;
    vec![
        mapped_record(
            name,
            paired | Flags::FIRST_SEGMENT | Flags::MATE_REVERSE_COMPLEMENTED,
            r1,
            r2,
            "ACGTACGTAA",
            r1_mapq,
        ),
        mapped_record(
            name,
            paired | Flags::LAST_SEGMENT | Flags::REVERSE_COMPLEMENTED,
            r2,
            r1,
            "TTGGCCAACC",
            r2_mapq,
        ),
    ]
}

/// Only the first mate of a pair, so the read stays residual.
pub fn create_orphan(name: &str, r1: Locus, mate: Locus) -> RecordBuf {
    mapped_record(
        name,
        Flags::SEGMENTED | Flags::FIRST_SEGMENT,
        r1,
        mate,
        "ACGTACGTAA",
        60,
    )
}

/// `n` pairs spread over the header's contigs with inserts of up to ~50kb.
pub fn create_many_pairs(n: usize, contigs: usize) -> Vec<RecordBuf> {
    (0..n)
        .flat_map(|i| {
            let ref_id = i % contigs;
            let start = 1 + (i * 37) % 40_000;
            let mate_start = start + 100 + (i * 7919) % 50_000;
            create_pair(&format!("pair{i:06}"), Locus::new(ref_id, start), Locus::new(ref_id, mate_start))
        })
        .collect()
}

/// Writes `records` to `path` in coordinate order.
pub fn write_sorted_bam(path: &Path, header: &Header, mut records: Vec<RecordBuf>) {
    records.sort_by_key(|r| (r.reference_sequence_id(), r.alignment_start()));
    let mut writer = bam::io::Writer::new(File::create(path).expect("Failed to create BAM file"));
    writer.write_header(header).expect("Failed to write header");
    for record in &records {
        writer.write_alignment_record(header, record).expect("Failed to write record");
    }
    writer.finish(header).expect("Failed to finish BAM");
}
