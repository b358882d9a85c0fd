//! Counters, duplicate examples, trace events and residual reads collected during a scan.
//!
//! Each worker owns a [`LocatorDiagnostics`]; at the end of a scan they are merged into one
//! [`ScanDiagnostics`]. Nothing here is global, so concurrent scans never share state.

use std::fmt;
use std::ops::AddAssign;

use bstr::{BStr, BString, ByteSlice};
use log::info;
use serde::{Deserialize, Serialize};

use crate::record::{AlignedRead, MateOrder};

/// Maximum duplicate examples kept per collector.
pub const MAX_DUPLICATE_EXAMPLES: usize = 100;

/// Event counters for a scan or one worker's share of it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PairCounts {
    /// Records pulled from the source
    pub records_read: u64,
    /// Records rejected by the require/exclude flag masks
    pub flag_filtered: u64,
    /// Records dropped by the region gate
    pub outside_region: u64,
    /// Records dropped by the filter predicate
    pub filtered: u64,
    /// Unpaired records skipped
    pub unpaired_skipped: u64,
    /// Unpaired records written as single FASTQ records
    pub unpaired_emitted: u64,
    /// Second arrivals of an already-buffered mate
    pub duplicates: u64,
    /// Pairs completed by a locator
    pub pairs_matched: u64,
    /// Pairs written to the sink
    pub pairs_emitted: u64,
    /// Pairs completed but owned by another horizontal shard
    pub pairs_other_shard: u64,
    /// Buffered mates discarded because their partner failed the filter
    pub pairs_filtered: u64,
}

impl AddAssign for PairCounts {
    fn add_assign(&mut self, other: Self) {
        self.records_read += other.records_read;
        self.flag_filtered += other.flag_filtered;
        self.outside_region += other.outside_region;
        self.filtered += other.filtered;
        self.unpaired_skipped += other.unpaired_skipped;
        self.unpaired_emitted += other.unpaired_emitted;
        self.duplicates += other.duplicates;
        self.pairs_matched += other.pairs_matched;
        self.pairs_emitted += other.pairs_emitted;
        self.pairs_other_shard += other.pairs_other_shard;
        self.pairs_filtered += other.pairs_filtered;
    }
}

/// A mate seen twice for the same name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DuplicateMate {
    /// Read name
    pub name: String,
    /// Which mate was duplicated
    pub mate: MateOrder,
    /// Locus of the record kept in the buffer
    pub kept: String,
    /// Locus of the record dropped
    pub dropped: String,
}

impl fmt::Display for DuplicateMate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} mate): kept {}, dropped {}", self.name, self.mate, self.kept, self.dropped)
    }
}

/// State transitions recorded for the traced read name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TraceKind {
    /// Routed from the reader to a worker
    Routed,
    /// Stored in the locator to wait for its mate
    Buffered,
    /// Matched with its buffered mate
    Paired,
    /// Arrived while the same mate was already buffered
    Duplicate,
    /// Dropped by the region gate
    OutsideRegion,
    /// Dropped by the filter predicate
    Filtered,
    /// Buffered mate removed because its partner failed the filter
    Discarded,
    /// Pair completed but belongs to another horizontal shard
    OtherShard,
    /// Written to the sink
    Emitted,
    /// Still buffered at the end of the scan
    Residual,
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Routed => "routed",
            Self::Buffered => "buffered",
            Self::Paired => "paired",
            Self::Duplicate => "duplicate",
            Self::OutsideRegion => "outside region",
            Self::Filtered => "filtered",
            Self::Discarded => "discarded",
            Self::OtherShard => "other shard",
            Self::Emitted => "emitted",
            Self::Residual => "residual",
        })
    }
}

/// One step in the life of the traced read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TraceEvent {
    /// What happened
    pub kind: TraceKind,
    /// Which mate it happened to
    pub mate: MateOrder,
    /// The mate's locus at the time
    pub locus: String,
    /// Worker that handled it, `None` on the reader thread
    pub worker: Option<usize>,
}

/// A buffered mate whose partner never arrived.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ResidualRead {
    /// Read name
    pub name: String,
    /// Which mate was buffered
    pub mate: MateOrder,
    /// Reference of the buffered mate
    pub reference_name: Option<String>,
    /// 1-based start of the buffered mate
    pub alignment_start: Option<usize>,
    /// Reference where the missing mate was expected
    pub mate_reference_name: Option<String>,
    /// 1-based start where the missing mate was expected
    pub mate_alignment_start: Option<usize>,
}

impl From<&AlignedRead> for ResidualRead {
    fn from(read: &AlignedRead) -> Self {
        Self {
            name: read.name().to_string(),
            mate: read.mate(),
            reference_name: read.reference_name().map(str::to_string),
            alignment_start: read.alignment_start(),
            mate_reference_name: read.mate_reference_name().map(str::to_string),
            mate_alignment_start: read.mate_alignment_start(),
        }
    }
}

impl fmt::Display for ResidualRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let locus = |contig: &Option<String>, start: Option<usize>| match (contig, start) {
            (Some(contig), Some(start)) => format!("{contig}:{start}"),
            _ => "*:0".to_string(),
        };
        write!(
            f,
            "{} ({} mate at {}, mate expected at {})",
            self.name,
            self.mate,
            locus(&self.reference_name, self.alignment_start),
            locus(&self.mate_reference_name, self.mate_alignment_start)
        )
    }
}

/// Per-worker collector.
#[derive(Debug, Default)]
pub struct LocatorDiagnostics {
    /// Event counters
    pub counts: PairCounts,
    /// Up to [`MAX_DUPLICATE_EXAMPLES`] duplicates
    pub duplicates: Vec<DuplicateMate>,
    /// Events for the traced read
    pub trace: Vec<TraceEvent>,
    debug_read: Option<BString>,
    worker: Option<usize>,
}

impl LocatorDiagnostics {
    /// A collector tracing `debug_read`, if given.
    #[must_use]
    pub fn new(debug_read: Option<&str>) -> Self {
        Self { debug_read: debug_read.map(BString::from), ..Self::default() }
    }

    /// Tags trace events with the owning worker.
    #[must_use]
    pub fn for_worker(mut self, worker: usize) -> Self {
        self.worker = Some(worker);
        self
    }

    /// True if `name` is the traced read.
    #[must_use]
    pub fn is_traced(&self, name: &BStr) -> bool {
        self.debug_read.as_ref().is_some_and(|traced| traced.as_bytes() == name.as_bytes())
    }

    /// Logs and records a transition if `read` is the traced read.
    pub fn trace(&mut self, kind: TraceKind, read: &AlignedRead) {
        if !self.is_traced(read.name()) {
            return;
        }
        let locus = read.locus();
        match self.worker {
            Some(worker) => {
                info!("[trace {}] {kind}: {} mate at {locus} (worker {worker})", read.name(), read.mate());
            }
            None => info!("[trace {}] {kind}: {} mate at {locus}", read.name(), read.mate()),
        }
        self.trace.push(TraceEvent { kind, mate: read.mate(), locus, worker: self.worker });
    }

    /// Counts a duplicate and keeps it as an example while there is room.
    pub fn record_duplicate(&mut self, kept: &AlignedRead, dropped: &AlignedRead) {
        self.record_duplicate_at(kept, kept.locus(), dropped.locus());
    }

    /// Like [`record_duplicate`](Self::record_duplicate) when only the loci of the two copies
    /// are at hand; name and mate are taken from `read`.
    pub fn record_duplicate_at(&mut self, read: &AlignedRead, kept: String, dropped: String) {
        self.counts.duplicates += 1;
        if self.duplicates.len() < MAX_DUPLICATE_EXAMPLES {
            self.duplicates.push(DuplicateMate {
                name: read.name().to_string(),
                mate: read.mate(),
                kept,
                dropped,
            });
        }
    }
}

/// Diagnostics merged across every worker of a scan.
#[derive(Debug, Default)]
pub struct ScanDiagnostics {
    /// Event counters
    pub counts: PairCounts,
    /// Up to [`MAX_DUPLICATE_EXAMPLES`] duplicates
    pub duplicate_examples: Vec<DuplicateMate>,
    /// Events for the traced read, reader events first then by worker
    pub trace: Vec<TraceEvent>,
}

impl ScanDiagnostics {
    /// Folds one worker's diagnostics in.
    pub fn merge(&mut self, other: LocatorDiagnostics) {
        self.counts += other.counts;
        let room = MAX_DUPLICATE_EXAMPLES.saturating_sub(self.duplicate_examples.len());
        self.duplicate_examples.extend(other.duplicates.into_iter().take(room));
        self.trace.extend(other.trace);
    }
}
