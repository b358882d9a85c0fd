//! Genome build and contig naming detection from a BAM header.

use std::fmt;

use bstr::BStr;
use noodles::sam::Header;

/// Reference assembly inferred from the length of chromosome 1.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GenomeBuild {
    /// GRCh37 / hg19
    Hg19,
    /// GRCh38 / hg38
    Hg38,
    /// GRCm38 / mm10
    Mm10,
    /// GRCm39 / mm39
    Mm39,
    /// Anything else
    Unknown,
}

impl GenomeBuild {
    fn from_chr1_length(length: usize) -> Self {
        match length {
            249_250_621 => Self::Hg19,
            248_956_422 => Self::Hg38,
            195_471_971 => Self::Mm10,
            195_154_279 => Self::Mm39,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for GenomeBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hg19 => "hg19",
            Self::Hg38 => "hg38",
            Self::Mm10 => "mm10",
            Self::Mm39 => "mm39",
            Self::Unknown => "unknown",
        })
    }
}

/// Whether contig names carry the UCSC `chr` prefix.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContigNaming {
    /// `chr1`, `chrX`, ...
    ChrPrefixed,
    /// `1`, `X`, ...
    Bare,
}

impl ContigNaming {
    /// Rewrites a contig name to this naming style.
    ///
    /// `chrM` and `MT` are treated as the same mitochondrial contig.
    #[must_use]
    pub fn apply(self, contig: &str) -> String {
        match self {
            Self::ChrPrefixed if contig.starts_with("chr") => contig.to_string(),
            Self::ChrPrefixed if contig == "MT" => "chrM".to_string(),
            Self::ChrPrefixed => format!("chr{contig}"),
            Self::Bare if contig == "chrM" => "MT".to_string(),
            Self::Bare => contig.strip_prefix("chr").unwrap_or(contig).to_string(),
        }
    }
}

/// Build and naming facts about the reference a BAM was aligned to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GenomeInfo {
    /// Inferred assembly
    pub build: GenomeBuild,
    /// Contig naming style
    pub naming: ContigNaming,
}

impl GenomeInfo {
    /// Inspects the header's reference sequences.
    ///
    /// Naming is `ChrPrefixed` when most contigs start with `chr`. The build is read from the
    /// length of `chr1` or `1`; headers without either are `Unknown`.
    #[must_use]
    pub fn sniff(header: &Header) -> Self {
        let references = header.reference_sequences();
        let prefixed = references.keys().filter(|name| name.starts_with(b"chr")).count();
        let naming = if prefixed * 2 > references.len() {
            ContigNaming::ChrPrefixed
        } else {
            ContigNaming::Bare
        };

        let build = references
            .get(BStr::new("chr1"))
            .or_else(|| references.get(BStr::new("1")))
            .map_or(GenomeBuild::Unknown, |chr1| {
                GenomeBuild::from_chr1_length(chr1.length().get())
            });

        Self { build, naming }
    }
}

impl fmt::Display for GenomeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let naming = match self.naming {
            ContigNaming::ChrPrefixed => "chr-prefixed",
            ContigNaming::Bare => "bare",
        };
        write!(f, "{} ({naming} contig names)", self.build)
    }
}
