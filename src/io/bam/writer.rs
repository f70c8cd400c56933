//! Sequential BAM writing.
//!
//! Writes the header envelope followed by framed records, through any
//! [`StreamWriter`] output. The default is block compression, which
//! keeps the output indexable: [`BamWriter::virtual_offset`] reports
//! where the next record will land, and [`BamWriter::flush_block`]
//! forces a block boundary.

use crate::error::{BamseekError, Result};
use crate::io::backend::{StreamFormat, StreamWriter};
use crate::io::bam::header::{self, Header};
use crate::io::bam::record::Record;
use std::io::{self, Write};
use std::path::Path;

/// Writer for BAM data.
///
/// The header must be written before the first record.
///
/// # Example
///
/// ```no_run
/// use bamseek::io::bam::{BamWriter, Header, Record, Reference};
///
/// # fn main() -> bamseek::Result<()> {
/// let header = Header::new("@HD\tVN:1.6\tSO:coordinate\n", vec![
///     Reference::new("chr1", 248_956_422),
/// ]);
/// let mut writer = BamWriter::create("out.bam")?;
/// writer.write_header(&header)?;
/// writer.write_record(&Record::aligned("read1", 0, 10_000, 100))?;
/// writer.finish()?;
/// # Ok(())
/// # }
/// ```
pub struct BamWriter {
    inner: StreamWriter,
    wrote_header: bool,
    scratch: Vec<u8>,
}

impl BamWriter {
    /// Create a block-compressed BAM file. `"-"` writes to standard
    /// output.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let inner = StreamWriter::create(path, Some(StreamFormat::BlockGzip))?;
        Ok(Self::from_stream(inner))
    }

    /// Create with an explicit output format.
    pub fn create_with<P: AsRef<Path>>(path: P, format: StreamFormat) -> Result<Self> {
        let inner = StreamWriter::create(path, Some(format))?;
        Ok(Self::from_stream(inner))
    }

    /// Wrap an already-opened output stream.
    pub fn from_stream(inner: StreamWriter) -> Self {
        Self {
            inner,
            wrote_header: false,
            scratch: Vec::new(),
        }
    }

    /// The output encoding.
    pub fn format(&self) -> StreamFormat {
        self.inner.format()
    }

    /// Write the header envelope. Must happen exactly once, first.
    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        if self.wrote_header {
            return Err(BamseekError::Io(io::Error::new(
                io::ErrorKind::Other,
                "header already written",
            )));
        }
        self.scratch.clear();
        header::write_header(&mut self.scratch, header)?;
        self.inner.write_all(&self.scratch)?;
        self.wrote_header = true;
        Ok(())
    }

    /// Append one record.
    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        if !self.wrote_header {
            return Err(BamseekError::Io(io::Error::new(
                io::ErrorKind::Other,
                "header must be written before records",
            )));
        }
        self.scratch.clear();
        record.encode(&mut self.scratch)?;
        self.inner.write_all(&self.scratch)?;
        Ok(())
    }

    /// Virtual offset the next byte will land at, on block-compressed
    /// output. `None` for other formats.
    pub fn virtual_offset(&self) -> Option<u64> {
        self.inner.virtual_offset()
    }

    /// Force a block boundary on block-compressed output; a no-op for
    /// other formats.
    pub fn flush_block(&mut self) -> Result<()> {
        self.inner.flush_block()?;
        Ok(())
    }

    /// Flush everything and finalize the output (including the
    /// end-of-file marker on block-compressed streams).
    pub fn finish(self) -> Result<()> {
        self.inner.finish()?;
        Ok(())
    }
}

impl std::fmt::Debug for BamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BamWriter")
            .field("format", &self.format())
            .field("wrote_header", &self.wrote_header)
            .finish()
    }
}
