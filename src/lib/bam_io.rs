//! BAM input.
//!
//! Opens a BAM file (or stdin) with single- or multi-threaded BGZF decompression and adapts its
//! records into [`AlignedRead`]s for the pairing engine.
//!
//! # Threading Model
//!
//! - `threads <= 1`: a plain BGZF reader on the calling thread.
//! - `threads > 1`: noodles' multithreaded reader inflates blocks on `threads` workers while
//!   the calling thread decodes records.

use std::fs::File;
use std::io::{self, BufRead, Read};
use std::num::NonZero;
use std::path::Path;

use anyhow::{Context, Result};
use noodles::bgzf::io::{MultithreadedReader, Reader as BgzfReader};
use noodles::sam::Header;
use noodles::sam::alignment::RecordBuf;

use crate::record::{AlignedRead, ContigNames};

/// Byte source behind the BGZF layer: a file or stdin.
pub type RawSource = Box<dyn Read + Send>;

/// Single- or multi-threaded BGZF reader behind one `BufRead` impl.
pub enum BgzfSource {
    /// Inflate on the calling thread
    SingleThreaded(BgzfReader<RawSource>),
    /// Inflate on a pool of noodles worker threads
    MultiThreaded(MultithreadedReader<RawSource>),
}

impl Read for BgzfSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::SingleThreaded(r) => r.read(buf),
            Self::MultiThreaded(r) => r.read(buf),
        }
    }
}

impl BufRead for BgzfSource {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        match self {
            Self::SingleThreaded(r) => r.fill_buf(),
            Self::MultiThreaded(r) => r.fill_buf(),
        }
    }

    fn consume(&mut self, amt: usize) {
        match self {
            Self::SingleThreaded(r) => r.consume(amt),
            Self::MultiThreaded(r) => r.consume(amt),
        }
    }
}

/// BAM reader over either BGZF flavour.
pub type BamSource = noodles::bam::io::Reader<BgzfSource>;

/// True for the paths that mean "standard stream": `-`, `/dev/stdin` and `/dev/stdout`.
///
/// ```
/// use fgmate_lib::bam_io::is_stdio_path;
/// use std::path::Path;
///
/// assert!(is_stdio_path(Path::new("-")));
/// assert!(is_stdio_path(Path::new("/dev/stdin")));
/// assert!(!is_stdio_path(Path::new("input.bam")));
/// ```
pub fn is_stdio_path<P: AsRef<Path>>(path: P) -> bool {
    let path = path.as_ref().to_string_lossy();
    path == "-" || path == "/dev/stdin" || path == "/dev/stdout"
}

/// Opens a BAM file, or stdin for `-`, and reads its header.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or the header cannot be read.
///
/// # Panics
///
/// Panics if `threads > 1` but `NonZero::new` fails (should not happen).
///
/// ```no_run
/// use fgmate_lib::bam_io::open_bam;
///
/// let (reader, header) = open_bam("input.bam", 4).unwrap();
/// ```
pub fn open_bam<P: AsRef<Path>>(path: P, threads: usize) -> Result<(BamSource, Header)> {
    let path = path.as_ref();
    let raw: RawSource = if is_stdio_path(path) {
        Box::new(io::stdin())
    } else {
        let file = File::open(path)
            .with_context(|| format!("Failed to open input BAM: {}", path.display()))?;
        Box::new(file)
    };

    let bgzf = if threads > 1 {
        let worker_count = NonZero::new(threads).expect("threads > 1 checked above");
        BgzfSource::MultiThreaded(MultithreadedReader::with_worker_count(worker_count, raw))
    } else {
        BgzfSource::SingleThreaded(BgzfReader::new(raw))
    };

    let mut reader = noodles::bam::io::Reader::from(bgzf);
    let header = reader
        .read_header()
        .with_context(|| format!("Failed to read header from: {}", path.display()))?;
    Ok((reader, header))
}

/// Iterator adapting decoded BAM records into [`AlignedRead`]s.
///
/// One [`RecordBuf`] is reused for every record. The iterator stops at end of file and yields
/// decode failures as errors, after which callers are expected to stop.
pub struct BamRecords<R> {
    reader: noodles::bam::io::Reader<R>,
    header: Header,
    contigs: ContigNames,
    record: RecordBuf,
    source: String,
    done: bool,
}

impl<R: BufRead> BamRecords<R> {
    /// The header the records are decoded against.
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }
}

impl<R: BufRead> Iterator for BamRecords<R> {
    type Item = Result<AlignedRead>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read_record_buf(&self.header, &mut self.record) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => Some(AlignedRead::from_record_buf(&self.record, &self.contigs)),
            Err(e) => {
                self.done = true;
                Some(Err(e).with_context(|| format!("Failed to read record from: {}", self.source)))
            }
        }
    }
}

/// Wraps an opened BAM reader as an [`AlignedRead`] iterator.
///
/// `source` names the input in error messages.
pub fn records_from_bam<R: BufRead>(
    reader: noodles::bam::io::Reader<R>,
    header: Header,
    source: &str,
) -> BamRecords<R> {
    let contigs = ContigNames::from_header(&header);
    BamRecords {
        reader,
        header,
        contigs,
        record: RecordBuf::default(),
        source: source.to_string(),
        done: false,
    }
}
