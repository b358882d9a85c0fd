//! Mate buffering and matching for one shard of read names.
//!
//! A [`PairLocator`] maps read names to the mate seen first. When the complementary mate
//! arrives the entry is removed and a [`ReadPair`] is returned; until then the first mate waits.
//! A locator is owned by exactly one worker and is never shared.

use std::fmt;

use ahash::AHashMap;
use bstr::{BStr, BString, ByteSlice};
use clap::ValueEnum;

use crate::diagnostics::{LocatorDiagnostics, TraceKind};
use crate::errors::{FgmateError, Result};
use crate::record::{AlignedRead, ReadPair};

/// What to do when the same mate of a name arrives twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum DuplicatePolicy {
    /// Keep the buffered record and drop the new one.
    #[default]
    #[value(name = "keep-first")]
    KeepFirst,
    /// Replace the buffered record with the new one.
    #[value(name = "keep-last")]
    KeepLast,
    /// Stop the scan with an error.
    #[value(name = "fail")]
    Fail,
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::KeepFirst => "keep-first",
            Self::KeepLast => "keep-last",
            Self::Fail => "fail",
        })
    }
}

/// Name-keyed buffer of mates waiting for their partner.
#[derive(Debug)]
pub struct PairLocator {
    pending: AHashMap<BString, AlignedRead>,
    policy: DuplicatePolicy,
    diagnostics: LocatorDiagnostics,
    peak_pending: usize,
}

impl PairLocator {
    /// An empty locator.
    #[must_use]
    pub fn new(policy: DuplicatePolicy, diagnostics: LocatorDiagnostics) -> Self {
        Self { pending: AHashMap::new(), policy, diagnostics, peak_pending: 0 }
    }

    /// Offers a read to the locator.
    ///
    /// Returns the completed pair when `read` is the partner of a buffered mate, `None` when it
    /// was buffered, dropped as a duplicate, or is unpaired (unpaired reads are only counted).
    ///
    /// # Errors
    ///
    /// Returns [`FgmateError::DuplicateMate`] for a duplicate under [`DuplicatePolicy::Fail`].
    pub fn accept(&mut self, read: AlignedRead) -> Result<Option<ReadPair>> {
        if !read.mate().is_paired() {
            self.diagnostics.counts.unpaired_skipped += 1;
            return Ok(None);
        }

        let buffered_mate = self.pending.get(read.name()).map(AlignedRead::mate);
        match buffered_mate {
            None => {
                self.diagnostics.trace(TraceKind::Buffered, &read);
                self.pending.insert(BString::from(read.name().as_bytes()), read);
                self.peak_pending = self.peak_pending.max(self.pending.len());
                Ok(None)
            }
            Some(mate) if mate == read.mate() => self.duplicate(read).map(|()| None),
            Some(_) => {
                self.diagnostics.trace(TraceKind::Paired, &read);
                self.diagnostics.counts.pairs_matched += 1;
                Ok(self
                    .pending
                    .remove(read.name())
                    .and_then(|buffered| ReadPair::new(buffered, read)))
            }
        }
    }

    fn duplicate(&mut self, read: AlignedRead) -> Result<()> {
        self.diagnostics.trace(TraceKind::Duplicate, &read);
        let Some(buffered) = self.pending.get(read.name()) else {
            return Ok(());
        };
        match self.policy {
            DuplicatePolicy::KeepFirst => {
                self.diagnostics.record_duplicate(buffered, &read);
            }
            DuplicatePolicy::KeepLast => {
                self.diagnostics.record_duplicate(&read, buffered);
                self.pending.insert(BString::from(read.name().as_bytes()), read);
            }
            DuplicatePolicy::Fail => return Err(duplicate_error(&read, buffered.locus())),
        }
        Ok(())
    }

    /// Drops `read` as another copy of a mate first seen at `kept_locus`.
    ///
    /// Used for copies that may not enter the buffer (they failed the filter, or their mate
    /// already did), so the copy is never kept, whatever the policy. Under
    /// [`DuplicatePolicy::Fail`] the duplicate is still an error.
    ///
    /// # Errors
    ///
    /// Returns [`FgmateError::DuplicateMate`] under [`DuplicatePolicy::Fail`].
    pub fn drop_duplicate(&mut self, read: &AlignedRead, kept_locus: String) -> Result<()> {
        self.diagnostics.trace(TraceKind::Duplicate, read);
        if self.policy == DuplicatePolicy::Fail {
            return Err(duplicate_error(read, kept_locus));
        }
        self.diagnostics.record_duplicate_at(read, kept_locus, read.locus());
        Ok(())
    }

    /// True if a mate with this name is buffered.
    #[must_use]
    pub fn contains(&self, name: &BStr) -> bool {
        self.pending.contains_key(name)
    }

    /// The mate buffered under `name`, if any.
    #[must_use]
    pub fn buffered(&self, name: &BStr) -> Option<&AlignedRead> {
        self.pending.get(name)
    }

    /// Removes and returns the buffered mate for `name`.
    pub fn discard(&mut self, name: &BStr) -> Option<AlignedRead> {
        let discarded = self.pending.remove(name);
        if let Some(read) = &discarded {
            self.diagnostics.trace(TraceKind::Discarded, read);
        }
        discarded
    }

    /// Number of buffered mates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Largest number of mates buffered at once.
    #[must_use]
    pub fn peak_len(&self) -> usize {
        self.peak_pending
    }

    /// Buffered mates, in no particular order.
    pub fn residuals(&self) -> impl Iterator<Item = &AlignedRead> {
        self.pending.values()
    }

    /// The diagnostics collector.
    #[must_use]
    pub fn diagnostics(&self) -> &LocatorDiagnostics {
        &self.diagnostics
    }

    /// Mutable access to the diagnostics collector, for gates applied around `accept`.
    pub fn diagnostics_mut(&mut self) -> &mut LocatorDiagnostics {
        &mut self.diagnostics
    }

    /// Consumes the locator, returning the residual mates sorted by name and the diagnostics.
    #[must_use]
    pub fn into_parts(mut self) -> (Vec<AlignedRead>, LocatorDiagnostics) {
        let mut residuals: Vec<AlignedRead> = self.pending.into_values().collect();
        residuals.sort_by(|a, b| a.name().cmp(b.name()));
        for read in &residuals {
            self.diagnostics.trace(TraceKind::Residual, read);
        }
        (residuals, self.diagnostics)
    }
}

fn duplicate_error(read: &AlignedRead, first_position: String) -> FgmateError {
    FgmateError::DuplicateMate {
        name: read.name().to_string(),
        mate: read.mate().to_string(),
        first_position,
        second_position: read.locus(),
    }
}
