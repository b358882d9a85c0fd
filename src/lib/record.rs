//! Owned alignment records and mate pairs.
//!
//! [`AlignedRead`] is the unit that flows through the pairing engine. It carries everything
//! needed for pairing (name and mate designator), for region and filter decisions (positions,
//! flags, mapping quality) and for FASTQ output (bases and qualities). Reads are immutable once
//! built and are moved, never shared, between the reader, the locators and the formatter.
//!
//! [`ReadPair`] can only be built from two reads with the same name and complementary mate
//! designators, and always stores them as `(first, second)` regardless of arrival order.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use bstr::{BStr, BString, ByteSlice};
use noodles::sam::Header;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::alignment::record::Flags;
use serde::{Deserialize, Serialize};

use crate::shard::ReadNameHash;

/// Which end of a sequenced fragment a record represents.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MateOrder {
    /// First segment in the template (flag 0x40)
    First,
    /// Last segment in the template (flag 0x80)
    Second,
    /// Not paired, or paired with ambiguous segment flags
    Unpaired,
}

impl MateOrder {
    /// Derives the mate designator from SAM flags.
    ///
    /// Records without the segmented flag, or with both or neither of the first/last segment
    /// flags, are treated as unpaired.
    #[must_use]
    pub fn from_flags(flags: Flags) -> Self {
        if !flags.is_segmented() {
            return Self::Unpaired;
        }
        match (flags.is_first_segment(), flags.is_last_segment()) {
            (true, false) => Self::First,
            (false, true) => Self::Second,
            _ => Self::Unpaired,
        }
    }

    /// The designator of the other end of the template.
    #[must_use]
    pub fn mate(self) -> Self {
        match self {
            Self::First => Self::Second,
            Self::Second => Self::First,
            Self::Unpaired => Self::Unpaired,
        }
    }

    /// True for the two paired designators.
    #[must_use]
    pub fn is_paired(self) -> bool {
        self != Self::Unpaired
    }

    /// FASTQ read name suffix (`/1`, `/2`, or nothing).
    #[must_use]
    pub fn suffix(self) -> &'static [u8] {
        match self {
            Self::First => b"/1",
            Self::Second => b"/2",
            Self::Unpaired => b"",
        }
    }

    /// Short label used in logs and reports.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::Second => "second",
            Self::Unpaired => "unpaired",
        }
    }
}

impl fmt::Display for MateOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reference sequence names from a BAM header, indexed by reference sequence ID.
///
/// Names are shared through `Arc<str>` so that each read only pays for a pointer copy.
#[derive(Debug, Clone, Default)]
pub struct ContigNames {
    names: Vec<Arc<str>>,
}

impl ContigNames {
    /// Collects the reference sequence names of a header in ID order.
    #[must_use]
    pub fn from_header(header: &Header) -> Self {
        let names = header
            .reference_sequences()
            .keys()
            .map(|name| Arc::<str>::from(name.to_str_lossy().as_ref()))
            .collect();
        Self { names }
    }

    /// Name for a reference sequence ID, if it is in range.
    #[must_use]
    pub fn get(&self, id: usize) -> Option<&Arc<str>> {
        self.names.get(id)
    }

    /// Number of reference sequences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if the header declared no reference sequences.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One alignment record, owned and immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignedRead {
    name: BString,
    flags: Flags,
    mate: MateOrder,
    reference_name: Option<Arc<str>>,
    alignment_start: Option<usize>,
    alignment_end: Option<usize>,
    mate_reference_name: Option<Arc<str>>,
    mate_alignment_start: Option<usize>,
    mapping_quality: Option<u8>,
    template_length: i32,
    sequence: Vec<u8>,
    quality_scores: Vec<u8>,
}

impl AlignedRead {
    /// Starts building a read by hand; used by tests and by callers without a BAM source.
    #[must_use]
    pub fn builder(name: &str, mate: MateOrder) -> ReadBuilder {
        ReadBuilder::new(name, mate)
    }

    /// Converts a decoded SAM/BAM record, resolving reference names through `contigs`.
    ///
    /// # Errors
    ///
    /// Returns an error if the record has no read name or refers to a reference sequence ID
    /// that is not declared in the header.
    pub fn from_record_buf(record: &RecordBuf, contigs: &ContigNames) -> Result<Self> {
        let name = record.name().context("Record missing read name")?;
        let flags = record.flags();

        let resolve = |id: Option<usize>| -> Result<Option<Arc<str>>> {
            id.map(|id| {
                contigs.get(id).cloned().with_context(|| {
                    format!("Reference sequence ID {id} for read '{name}' not found in header")
                })
            })
            .transpose()
        };

        let reference_name = resolve(record.reference_sequence_id())?;
        let mate_reference_name = resolve(record.mate_reference_sequence_id())?;

        // 255 means unavailable and noodles surfaces it as None
        let mapping_quality = record.mapping_quality().map(|mq| mq.get());

        Ok(Self {
            name: BString::from(name.as_bytes()),
            flags,
            mate: MateOrder::from_flags(flags),
            reference_name,
            alignment_start: record.alignment_start().map(usize::from),
            alignment_end: record.alignment_end().map(usize::from),
            mate_reference_name,
            mate_alignment_start: record.mate_alignment_start().map(usize::from),
            mapping_quality,
            template_length: record.template_length(),
            sequence: record.sequence().as_ref().to_vec(),
            quality_scores: record.quality_scores().as_ref().to_vec(),
        })
    }

    /// Read name, the pairing key.
    #[must_use]
    pub fn name(&self) -> &BStr {
        self.name.as_bstr()
    }

    /// Stable hash of the read name used for routing and horizontal sharding.
    #[must_use]
    pub fn name_hash(&self) -> ReadNameHash {
        ReadNameHash::of(self.name.as_bytes())
    }

    /// SAM flags.
    #[must_use]
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Mate designator derived from the flags.
    #[must_use]
    pub fn mate(&self) -> MateOrder {
        self.mate
    }

    /// Reference sequence name, `None` for unplaced reads.
    #[must_use]
    pub fn reference_name(&self) -> Option<&str> {
        self.reference_name.as_deref()
    }

    /// 1-based alignment start.
    #[must_use]
    pub fn alignment_start(&self) -> Option<usize> {
        self.alignment_start
    }

    /// 1-based inclusive alignment end; falls back to the start when no CIGAR span is known.
    #[must_use]
    pub fn alignment_end(&self) -> Option<usize> {
        self.alignment_end.or(self.alignment_start)
    }

    /// Reference sequence name of the mate.
    #[must_use]
    pub fn mate_reference_name(&self) -> Option<&str> {
        self.mate_reference_name.as_deref()
    }

    /// 1-based alignment start of the mate.
    #[must_use]
    pub fn mate_alignment_start(&self) -> Option<usize> {
        self.mate_alignment_start
    }

    /// Mapping quality, `None` when unavailable.
    #[must_use]
    pub fn mapping_quality(&self) -> Option<u8> {
        self.mapping_quality
    }

    /// Observed template length (TLEN).
    #[must_use]
    pub fn template_length(&self) -> i32 {
        self.template_length
    }

    /// Bases as stored in the record (reference orientation).
    #[must_use]
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    /// Raw Phred quality scores as stored in the record.
    #[must_use]
    pub fn quality_scores(&self) -> &[u8] {
        &self.quality_scores
    }

    /// `contig:start` for logs, `*:0` when unplaced.
    #[must_use]
    pub fn locus(&self) -> String {
        format_locus(self.reference_name(), self.alignment_start)
    }

    /// `contig:start` of the mate, `*:0` when unplaced.
    #[must_use]
    pub fn mate_locus(&self) -> String {
        format_locus(self.mate_reference_name(), self.mate_alignment_start)
    }
}

pub(crate) fn format_locus(contig: Option<&str>, start: Option<usize>) -> String {
    match (contig, start) {
        (Some(contig), Some(start)) => format!("{contig}:{start}"),
        (Some(contig), None) => format!("{contig}:0"),
        _ => "*:0".to_string(),
    }
}

/// Builder for [`AlignedRead`].
#[derive(Debug, Clone)]
pub struct ReadBuilder {
    read: AlignedRead,
}

impl ReadBuilder {
    fn new(name: &str, mate: MateOrder) -> Self {
        let flags = match mate {
            MateOrder::First => Flags::SEGMENTED | Flags::FIRST_SEGMENT,
            MateOrder::Second => Flags::SEGMENTED | Flags::LAST_SEGMENT,
            MateOrder::Unpaired => Flags::empty(),
        };
        Self {
            read: AlignedRead {
                name: BString::from(name),
                flags,
                mate,
                reference_name: None,
                alignment_start: None,
                alignment_end: None,
                mate_reference_name: None,
                mate_alignment_start: None,
                mapping_quality: None,
                template_length: 0,
                sequence: Vec::new(),
                quality_scores: Vec::new(),
            },
        }
    }

    /// Places the read at `contig:start`; the end is derived from the sequence length.
    #[must_use]
    pub fn position(mut self, contig: &str, start: usize) -> Self {
        self.read.reference_name = Some(Arc::from(contig));
        self.read.alignment_start = Some(start);
        self
    }

    /// Sets the mate's placement.
    #[must_use]
    pub fn mate_position(mut self, contig: &str, start: usize) -> Self {
        self.read.mate_reference_name = Some(Arc::from(contig));
        self.read.mate_alignment_start = Some(start);
        self
    }

    /// Sets bases and raw (not ASCII-offset) quality scores.
    #[must_use]
    pub fn bases(mut self, sequence: &str, quality_scores: &[u8]) -> Self {
        self.read.sequence = sequence.as_bytes().to_vec();
        self.read.quality_scores = quality_scores.to_vec();
        self
    }

    /// Sets the mapping quality.
    #[must_use]
    pub fn mapping_quality(mut self, mapq: u8) -> Self {
        self.read.mapping_quality = Some(mapq);
        self
    }

    /// Sets the template length.
    #[must_use]
    pub fn template_length(mut self, tlen: i32) -> Self {
        self.read.template_length = tlen;
        self
    }

    /// Adds flags on top of those implied by the mate designator.
    #[must_use]
    pub fn flags(mut self, flags: Flags) -> Self {
        self.read.flags |= flags;
        self
    }

    /// Builds the read.
    #[must_use]
    pub fn build(mut self) -> AlignedRead {
        if self.read.alignment_end.is_none() {
            if let Some(start) = self.read.alignment_start {
                let span = self.read.sequence.len().max(1);
                self.read.alignment_end = Some(start + span - 1);
            }
        }
        if self.read.alignment_start.is_none() {
            self.read.flags |= Flags::UNMAPPED;
        }
        self.read
    }
}

/// Two mates of one template, stored canonically as `(first, second)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPair {
    first: AlignedRead,
    second: AlignedRead,
}

impl ReadPair {
    /// Pairs two reads in either arrival order.
    ///
    /// Returns `None` unless the names are equal and one read is the first mate and the other
    /// the second mate.
    #[must_use]
    pub fn new(a: AlignedRead, b: AlignedRead) -> Option<Self> {
        if a.name != b.name {
            return None;
        }
        match (a.mate, b.mate) {
            (MateOrder::First, MateOrder::Second) => Some(Self { first: a, second: b }),
            (MateOrder::Second, MateOrder::First) => Some(Self { first: b, second: a }),
            _ => None,
        }
    }

    /// The shared read name.
    #[must_use]
    pub fn name(&self) -> &BStr {
        self.first.name()
    }

    /// The first mate.
    #[must_use]
    pub fn first(&self) -> &AlignedRead {
        &self.first
    }

    /// The second mate.
    #[must_use]
    pub fn second(&self) -> &AlignedRead {
        &self.second
    }

    /// Consumes the pair, returning `(first, second)`.
    #[must_use]
    pub fn into_parts(self) -> (AlignedRead, AlignedRead) {
        (self.first, self.second)
    }
}
