//! FASTQ rendering of read pairs.
//!
//! [`PairFormatter`] turns a [`ReadPair`] (or a lone unpaired read) into FASTQ text appended
//! to a [`FastqBatch`]. Reads on the reverse strand are reverse-complemented and their
//! qualities reversed, so each record is in sequencing orientation again. Qualities are
//! written as Phred+33, clamped at `~`.
//!
//! With [`OutputLayout::Interleaved`] both records go to the first buffer, first mate then
//! second. With [`OutputLayout::Split`] second mates go to their own buffer, in the same order
//! as the first mates.

use std::fmt;
use std::str::FromStr;

use bstr::ByteSlice;

use crate::record::{AlignedRead, ReadPair, format_locus};

/// Lookup table for Phred to Phred+33 ASCII conversion (clamped to 126)
pub(crate) static QUAL_TO_ASCII: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let val = (i as u8).saturating_add(33);
        table[i] = if val > 126 { 126 } else { val };
        i += 1;
    }
    table
};

/// Lookup table for base complement (A<->T, C<->G, others->N)
pub(crate) static COMPLEMENT: [u8; 256] = {
    let mut table = [b'N'; 256];
    table[b'A' as usize] = b'T';
    table[b'a' as usize] = b'T';
    table[b'T' as usize] = b'A';
    table[b't' as usize] = b'A';
    table[b'C' as usize] = b'G';
    table[b'c' as usize] = b'G';
    table[b'G' as usize] = b'C';
    table[b'g' as usize] = b'C';
    table
};

/// Where the two mates of a pair are written.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OutputLayout {
    /// One destination, first mate immediately followed by second mate
    #[default]
    Interleaved,
    /// First mates to destination 1, second mates to destination 2
    Split,
}

impl OutputLayout {
    /// Number of destinations the layout writes to.
    #[must_use]
    pub fn destinations(self) -> usize {
        match self {
            Self::Interleaved => 1,
            Self::Split => 2,
        }
    }
}

impl fmt::Display for OutputLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interleaved => "interleaved",
            Self::Split => "split",
        })
    }
}

impl FromStr for OutputLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "interleaved" => Ok(Self::Interleaved),
            "split" => Ok(Self::Split),
            other => Err(format!("unknown output layout '{other}'")),
        }
    }
}

/// Rendered FASTQ text waiting to be written, one buffer per destination.
#[derive(Debug, Default)]
pub struct FastqBatch {
    first: Vec<u8>,
    second: Vec<u8>,
    records: u64,
}

impl FastqBatch {
    /// An empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Text for destination 1.
    #[must_use]
    pub fn first(&self) -> &[u8] {
        &self.first
    }

    /// Text for destination 2; always empty for the interleaved layout.
    #[must_use]
    pub fn second(&self) -> &[u8] {
        &self.second
    }

    /// Total bytes buffered across both destinations.
    #[must_use]
    pub fn len_bytes(&self) -> usize {
        self.first.len() + self.second.len()
    }

    /// Number of FASTQ records buffered.
    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// True if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Empties the batch, keeping its allocations.
    pub fn clear(&mut self) {
        self.first.clear();
        self.second.clear();
        self.records = 0;
    }
}

/// Renders pairs and single reads as FASTQ.
#[derive(Clone, Copy, Debug, Default)]
pub struct PairFormatter {
    layout: OutputLayout,
    no_suffix: bool,
    annotate_positions: bool,
}

impl PairFormatter {
    /// Creates a formatter for a layout with `/1` `/2` suffixes and no annotation.
    #[must_use]
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout, no_suffix: false, annotate_positions: false }
    }

    /// Drops the `/1` and `/2` read name suffixes.
    #[must_use]
    pub fn with_no_suffix(mut self, no_suffix: bool) -> Self {
        self.no_suffix = no_suffix;
        self
    }

    /// Appends the original alignment coordinates to read names.
    #[must_use]
    pub fn with_annotate_positions(mut self, annotate: bool) -> Self {
        self.annotate_positions = annotate;
        self
    }

    /// The layout this formatter renders for.
    #[must_use]
    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    /// Appends both mates of a pair.
    ///
    /// Both records carry the same base name (annotated or not) so aligners still see them as
    /// mates.
    pub fn render_pair(&self, pair: &ReadPair, batch: &mut FastqBatch) {
        let name = if self.annotate_positions {
            let (first, second) = (pair.first(), pair.second());
            format!(
                "{}|{}|{}",
                pair.name(),
                format_locus(first.reference_name(), first.alignment_start()),
                format_locus(second.reference_name(), second.alignment_start())
            )
            .into_bytes()
        } else {
            pair.name().as_bytes().to_vec()
        };

        self.write_record(&mut batch.first, &name, pair.first());
        match self.layout {
            OutputLayout::Interleaved => self.write_record(&mut batch.first, &name, pair.second()),
            OutputLayout::Split => self.write_record(&mut batch.second, &name, pair.second()),
        }
        batch.records += 2;
    }

    /// Appends one unpaired read to destination 1.
    pub fn render_single(&self, read: &AlignedRead, batch: &mut FastqBatch) {
        let name = if self.annotate_positions {
            format!("{}|{}", read.name(), read.locus()).into_bytes()
        } else {
            read.name().as_bytes().to_vec()
        };
        self.write_record(&mut batch.first, &name, read);
        batch.records += 1;
    }

    fn write_record(&self, out: &mut Vec<u8>, name: &[u8], read: &AlignedRead) {
        let suffix: &[u8] = if self.no_suffix { b"" } else { read.mate().suffix() };
        let sequence = read.sequence();
        let qualities = read.quality_scores();

        out.push(b'@');
        out.extend_from_slice(name);
        out.extend_from_slice(suffix);
        out.push(b'\n');

        if read.flags().is_reverse_complemented() {
            out.extend(sequence.iter().rev().map(|&b| COMPLEMENT[b as usize]));
            out.extend_from_slice(b"\n+\n");
            out.extend(qualities.iter().rev().map(|&q| QUAL_TO_ASCII[q as usize]));
        } else {
            out.extend_from_slice(sequence);
            out.extend_from_slice(b"\n+\n");
            out.extend(qualities.iter().map(|&q| QUAL_TO_ASCII[q as usize]));
        }
        // Records without stored qualities still need a line of matching length
        if qualities.is_empty() && !sequence.is_empty() {
            out.extend(std::iter::repeat_n(b'!', sequence.len()));
        }
        out.push(b'\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::MateOrder;
    use noodles::sam::alignment::record::Flags;

    fn pair() -> ReadPair {
        let r1 = AlignedRead::builder("q1", MateOrder::First)
            .position("chr1", 100)
            .bases("AACG", &[30, 31, 32, 33])
            .build();
        let r2 = AlignedRead::builder("q1", MateOrder::Second)
            .position("chr2", 900)
            .bases("AACG", &[10, 20, 30, 40])
            .flags(Flags::REVERSE_COMPLEMENTED)
            .build();
        ReadPair::new(r2, r1).unwrap()
    }

    #[test]
    fn test_qual_to_ascii_lookup_table() {
        assert_eq!(QUAL_TO_ASCII[0], b'!');
        assert_eq!(QUAL_TO_ASCII[30], b'?');
        assert_eq!(QUAL_TO_ASCII[93], b'~');
        assert_eq!(QUAL_TO_ASCII[94], b'~');
        assert_eq!(QUAL_TO_ASCII[255], b'~');
    }

    #[test]
    fn test_complement_lookup_table() {
        assert_eq!(COMPLEMENT[b'A' as usize], b'T');
        assert_eq!(COMPLEMENT[b'g' as usize], b'C');
        assert_eq!(COMPLEMENT[b'N' as usize], b'N');
        assert_eq!(COMPLEMENT[b'R' as usize], b'N');
    }

    #[test]
    fn test_interleaved_pair() {
        let formatter = PairFormatter::new(OutputLayout::Interleaved);
        let mut batch = FastqBatch::new();
        formatter.render_pair(&pair(), &mut batch);

        assert_eq!(batch.first(), b"@q1/1\nAACG\n+\n?@AB\n@q1/2\nCGTT\n+\nI?5+\n".as_slice());
        assert!(batch.second().is_empty());
        assert_eq!(batch.records(), 2);
    }

    #[test]
    fn test_split_pair_without_suffix() {
        let formatter = PairFormatter::new(OutputLayout::Split).with_no_suffix(true);
        let mut batch = FastqBatch::new();
        formatter.render_pair(&pair(), &mut batch);

        assert_eq!(batch.first(), b"@q1\nAACG\n+\n?@AB\n".as_slice());
        assert_eq!(batch.second(), b"@q1\nCGTT\n+\nI?5+\n".as_slice());
        assert_eq!(batch.len_bytes(), batch.first().len() + batch.second().len());
    }

    #[test]
    fn test_annotated_names_match_between_mates() {
        let formatter = PairFormatter::new(OutputLayout::Split).with_annotate_positions(true);
        let mut batch = FastqBatch::new();
        formatter.render_pair(&pair(), &mut batch);

        assert!(batch.first().starts_with(b"@q1|chr1:100|chr2:900/1\n"));
        assert!(batch.second().starts_with(b"@q1|chr1:100|chr2:900/2\n"));
    }

    #[test]
    fn test_single_read() {
        let formatter = PairFormatter::new(OutputLayout::Split).with_annotate_positions(true);
        let read = AlignedRead::builder("solo", MateOrder::Unpaired).bases("AC", &[]).build();
        let mut batch = FastqBatch::new();
        formatter.render_single(&read, &mut batch);

        assert_eq!(batch.first(), b"@solo|*:0\nAC\n+\n!!\n".as_slice());
        assert!(batch.second().is_empty());
        assert_eq!(batch.records(), 1);

        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.len_bytes(), 0);
    }

    #[test]
    fn test_layout_parsing() {
        assert_eq!("split".parse::<OutputLayout>().unwrap(), OutputLayout::Split);
        assert_eq!("Interleaved".parse::<OutputLayout>().unwrap(), OutputLayout::Interleaved);
        assert!("both".parse::<OutputLayout>().is_err());
        assert_eq!(OutputLayout::Split.destinations(), 2);
    }
}
