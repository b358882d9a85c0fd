//! Output destinations for rendered FASTQ.
//!
//! Workers render into private [`FastqBatch`]es and hand them to a shared [`PairSink`]. Each
//! destination sits behind its own mutex. With two destinations a batch locks destination 1
//! and then destination 2, always in that order, and writes both halves before releasing
//! either lock, so the two files list mates in the same order.

use std::fs::File;
use std::io::{self, BufWriter, Stdout, Write};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use parking_lot::Mutex;

use crate::bam_io::is_stdio_path;
use crate::fastq::FastqBatch;

/// Output buffer size per destination.
const WRITE_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Shared destination for rendered batches.
pub trait PairSink: Send + Sync {
    /// Number of destinations; a batch with second-mate text needs two.
    fn destinations(&self) -> usize;

    /// Writes a batch atomically with respect to other batches.
    ///
    /// # Errors
    ///
    /// Returns an error if a destination fails to write.
    fn write_batch(&self, batch: &FastqBatch) -> io::Result<()>;

    /// Flushes every destination.
    ///
    /// # Errors
    ///
    /// Returns an error if a destination fails to flush.
    fn flush(&self) -> io::Result<()>;
}

/// FASTQ sink over one (interleaved) or two (split) writers.
pub struct FastqSink<W: Write + Send> {
    first: Mutex<W>,
    second: Option<Mutex<W>>,
}

impl<W: Write + Send> FastqSink<W> {
    /// A single destination receiving both mates.
    pub fn interleaved(writer: W) -> Self {
        Self { first: Mutex::new(writer), second: None }
    }

    /// Separate destinations for first and second mates.
    pub fn split(first: W, second: W) -> Self {
        Self { first: Mutex::new(first), second: Some(Mutex::new(second)) }
    }

    /// Returns the writers.
    pub fn into_inner(self) -> (W, Option<W>) {
        (self.first.into_inner(), self.second.map(Mutex::into_inner))
    }
}

impl<W: Write + Send> PairSink for FastqSink<W> {
    fn destinations(&self) -> usize {
        if self.second.is_some() { 2 } else { 1 }
    }

    fn write_batch(&self, batch: &FastqBatch) -> io::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut first = self.first.lock();
        match &self.second {
            Some(second) => {
                let mut second = second.lock();
                first.write_all(batch.first())?;
                second.write_all(batch.second())
            }
            None => {
                first.write_all(batch.first())?;
                first.write_all(batch.second())
            }
        }
    }

    fn flush(&self) -> io::Result<()> {
        self.first.lock().flush()?;
        if let Some(second) = &self.second {
            second.lock().flush()?;
        }
        Ok(())
    }
}

impl FastqSink<SinkWriter> {
    /// Flushes and closes every destination, writing gzip trailers where needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a destination fails to finish.
    pub fn finish(self) -> io::Result<()> {
        let (first, second) = self.into_inner();
        first.finish()?;
        if let Some(second) = second {
            second.finish()?;
        }
        Ok(())
    }
}

/// A FASTQ destination: stdout, a plain file, or a gzip file (by `.gz` extension).
pub enum SinkWriter {
    /// Standard output
    Stdout(BufWriter<Stdout>),
    /// Uncompressed file
    Plain(BufWriter<File>),
    /// Gzip-compressed file
    Gzip(GzEncoder<BufWriter<File>>),
}

impl SinkWriter {
    /// Opens a destination. `-` means stdout; paths ending in `.gz` are gzip-compressed at
    /// `compression_level` (0-9).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, compression_level: u32) -> Result<Self> {
        let path = path.as_ref();
        if is_stdio_path(path) {
            return Ok(Self::Stdout(BufWriter::with_capacity(WRITE_BUFFER_SIZE, io::stdout())));
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create output FASTQ: {}", path.display()))?;
        let buffered = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        if path.extension().is_some_and(|ext| ext == "gz") {
            Ok(Self::Gzip(GzEncoder::new(buffered, Compression::new(compression_level.min(9)))))
        } else {
            Ok(Self::Plain(buffered))
        }
    }

    /// Flushes buffered output and, for gzip, writes the trailer.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn finish(self) -> io::Result<()> {
        match self {
            Self::Stdout(mut w) => w.flush(),
            Self::Plain(mut w) => w.flush(),
            Self::Gzip(w) => w.finish()?.flush(),
        }
    }
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(w) => w.write(buf),
            Self::Plain(w) => w.write(buf),
            Self::Gzip(w) => w.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::Stdout(w) => w.write_all(buf),
            Self::Plain(w) => w.write_all(buf),
            Self::Gzip(w) => w.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::Plain(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
        }
    }
}
