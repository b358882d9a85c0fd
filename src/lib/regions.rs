//! Genomic region sets used to restrict which pairs are extracted.
//!
//! A [`RegionSet`] holds 1-based closed intervals per contig, stored as merged half-open
//! `[start, end + 1)` intervals in a [`Lapper`] for fast overlap queries. Sets are built from
//! literals (`chr1:100-200`), BED files (plain or gzipped) or gene names looked up in a BED4
//! gene table.
//!
//! The pairing engine only sees the [`RegionPredicate`] trait.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use ahash::AHashMap;
use bio::io::bed;
use flate2::read::MultiGzDecoder;
use rust_lapper::{Interval, Lapper};

use crate::errors::{FgmateError, Result};
use crate::genome::ContigNaming;
use crate::record::AlignedRead;

type Span = Interval<u64, ()>;

/// Decides whether a read lies in the region of interest.
pub trait RegionPredicate: Send + Sync {
    /// True if the 1-based closed interval `[start, end]` on `contig` overlaps the region.
    fn includes(&self, contig: &str, start: usize, end: usize) -> bool;

    /// True if the read overlaps the region or its mate starts inside it.
    ///
    /// Admitting a read because of its mate keeps pairs whole when only one end falls in the
    /// region.
    fn admits(&self, read: &AlignedRead) -> bool {
        let overlaps = match (read.reference_name(), read.alignment_start(), read.alignment_end())
        {
            (Some(contig), Some(start), Some(end)) => self.includes(contig, start, end),
            _ => false,
        };
        overlaps
            || match (read.mate_reference_name(), read.mate_alignment_start()) {
                (Some(contig), Some(start)) => self.includes(contig, start, start),
                _ => false,
            }
    }
}

/// A set of genomic intervals, merged per contig.
#[derive(Debug, Clone, Default)]
pub struct RegionSet {
    contigs: AHashMap<String, Lapper<u64, ()>>,
}

impl RegionSet {
    /// An empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the 1-based closed interval `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `start` is zero or `end < start`.
    pub fn insert(&mut self, contig: &str, start: u64, end: u64) -> Result<()> {
        if start == 0 || end < start {
            return Err(FgmateError::InvalidRegion {
                region: format!("{contig}:{start}-{end}"),
                reason: "start must be >= 1 and end must be >= start".to_string(),
            });
        }
        let span = Span { start, stop: end.saturating_add(1), val: () };
        self.merge_into(contig.to_string(), std::iter::once(span));
        Ok(())
    }

    /// Adds every interval of `other`.
    pub fn extend(&mut self, other: RegionSet) {
        for (contig, lapper) in other.contigs {
            self.merge_into(contig, lapper.iter().cloned());
        }
    }

    fn merge_into(&mut self, contig: String, spans: impl IntoIterator<Item = Span>) {
        let mut all: Vec<Span> = self
            .contigs
            .remove(&contig)
            .map(|lapper| lapper.iter().cloned().collect())
            .unwrap_or_default();
        all.extend(spans);
        let mut lapper = Lapper::new(all);
        lapper.merge_overlaps();
        self.contigs.insert(contig, lapper);
    }

    /// Loads a BED file; `.gz` files are decompressed.
    ///
    /// BED intervals are 0-based half-open and are converted to 1-based closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a record is malformed.
    pub fn from_bed<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut set = Self::new();
        for record in read_bed(path)? {
            let (contig, start, end) = record?;
            set.insert(&contig, start, end)?;
        }
        Ok(set)
    }

    /// Widens every interval by `padding` bases on each side; starts are clamped at 1.
    #[must_use]
    pub fn pad(&self, padding: u64) -> Self {
        if padding == 0 {
            return self.clone();
        }
        let mut padded = Self::new();
        for (contig, lapper) in &self.contigs {
            let spans = lapper.iter().map(|span| Span {
                start: span.start.saturating_sub(padding).max(1),
                stop: span.stop.saturating_add(padding),
                val: (),
            });
            padded.merge_into(contig.clone(), spans);
        }
        padded
    }

    /// Rewrites contig names to the given naming style so they match the BAM header.
    #[must_use]
    pub fn conform_to(&self, naming: ContigNaming) -> Self {
        let mut conformed = Self::new();
        for (contig, lapper) in &self.contigs {
            conformed.merge_into(naming.apply(contig), lapper.iter().cloned());
        }
        conformed
    }

    /// Number of bases covered, counting overlapping intervals once.
    ///
    /// Whole-contig regions have no known end, so the total saturates at `u64::MAX`.
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.contigs
            .values()
            .flat_map(Lapper::iter)
            .fold(0u64, |total, span| total.saturating_add(span.stop - span.start))
    }

    /// Number of merged intervals.
    #[must_use]
    pub fn interval_count(&self) -> usize {
        self.contigs.values().map(Lapper::len).sum()
    }

    /// True if the set has no intervals.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contigs.is_empty()
    }

    /// Contig names with at least one interval, sorted.
    #[must_use]
    pub fn contig_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.contigs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl RegionPredicate for RegionSet {
    fn includes(&self, contig: &str, start: usize, end: usize) -> bool {
        self.contigs
            .get(contig)
            .is_some_and(|lapper| lapper.find(start as u64, end as u64 + 1).next().is_some())
    }
}

impl FromStr for RegionSet {
    type Err = FgmateError;

    /// Parses `contig`, `contig:pos` or `contig:start-end`; thousands separators are allowed.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| FgmateError::InvalidRegion {
            region: s.to_string(),
            reason: reason.to_string(),
        };
        let parse_pos = |text: &str| -> Result<u64> {
            text.replace(',', "").trim().parse::<u64>().map_err(|_| invalid("position is not an integer"))
        };

        let s_trim = s.trim();
        if s_trim.is_empty() {
            return Err(invalid("region is empty"));
        }

        let (contig, start, end) = match s_trim.rsplit_once(':') {
            None => (s_trim, 1, u64::MAX - 1),
            Some((contig, range)) => match range.split_once('-') {
                Some((start, end)) => (contig, parse_pos(start)?, parse_pos(end)?),
                None => {
                    let pos = parse_pos(range)?;
                    (contig, pos, pos)
                }
            },
        };
        if contig.is_empty() {
            return Err(invalid("contig name is empty"));
        }
        if start == 0 {
            return Err(invalid("positions are 1-based"));
        }
        if end < start {
            return Err(invalid("end is before start"));
        }

        let mut set = Self::new();
        set.insert(contig, start, end)?;
        Ok(set)
    }
}

/// Gene name to locus lookup backed by a BED4 file.
#[derive(Debug, Clone)]
pub struct GeneTable {
    path: String,
    genes: AHashMap<String, Vec<(String, u64, u64)>>,
}

impl GeneTable {
    /// Loads a BED file whose fourth column is the gene name. Rows without a name are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a record is malformed.
    pub fn from_bed<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut genes: AHashMap<String, Vec<(String, u64, u64)>> = AHashMap::new();
        let mut reader = open_bed(path)?;
        for record in reader.records() {
            let record = record.map_err(|e| bed_error(path, &e.to_string()))?;
            let Some(name) = record.name() else { continue };
            genes.entry(name.to_string()).or_default().push((
                record.chrom().to_string(),
                record.start() + 1,
                record.end(),
            ));
        }
        Ok(Self { path: path.display().to_string(), genes })
    }

    /// Region covering every row for `gene`; falls back to a case-insensitive match.
    ///
    /// # Errors
    ///
    /// Returns [`FgmateError::UnknownGene`] if the gene is not in the table.
    pub fn region(&self, gene: &str) -> Result<RegionSet> {
        let rows = self
            .genes
            .get(gene)
            .or_else(|| {
                self.genes
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(gene))
                    .map(|(_, rows)| rows)
            })
            .ok_or_else(|| FgmateError::UnknownGene {
                gene: gene.to_string(),
                table: self.path.clone(),
            })?;

        let mut set = RegionSet::new();
        for (contig, start, end) in rows {
            set.insert(contig, *start, *end)?;
        }
        Ok(set)
    }

    /// Number of distinct gene names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.genes.len()
    }

    /// True if the table has no named rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

fn bed_error(path: &Path, reason: &str) -> FgmateError {
    FgmateError::InvalidFileFormat {
        file_type: "BED".to_string(),
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn open_bed(path: &Path) -> Result<bed::Reader<Box<dyn Read>>> {
    let file = File::open(path).map_err(|e| bed_error(path, &e.to_string()))?;
    let raw: Box<dyn Read> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(bed::Reader::new(raw))
}

/// Reads `(contig, start, end)` triples from a BED file, converted to 1-based closed.
fn read_bed(path: &Path) -> Result<Vec<Result<(String, u64, u64)>>> {
    let mut reader = open_bed(path)?;
    Ok(reader
        .records()
        .enumerate()
        .map(|(i, record)| {
            let record = record.map_err(|e| bed_error(path, &e.to_string()))?;
            if record.end() <= record.start() {
                return Err(bed_error(path, &format!("record {} has end <= start", i + 1)));
            }
            Ok((record.chrom().to_string(), record.start() + 1, record.end()))
        })
        .collect())
}
