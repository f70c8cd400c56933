//! Byte-stream backends with format auto-detection.
//!
//! A data file may be stored uncompressed, as ordinary gzip, or as BGZF
//! (block gzip). Each encoding gets one [`ByteStream`] implementation;
//! [`open_stream`] sniffs the leading bytes and picks the right one, so
//! callers never name the encoding on the read path. The write path is the
//! mirror image: [`StreamWriter::create`] chooses from an explicit format or
//! the file extension, defaulting to uncompressed.
//!
//! Seek and tell use plain byte offsets on uncompressed streams and virtual
//! offsets on BGZF streams. Plain gzip supports neither beyond a rewind.

use crate::error::{BamseekError, Result};
use crate::io::bgzf::{BgzfReader, BgzfWriter};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Encoding of an open byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// No compression; offsets are file byte offsets.
    Uncompressed,
    /// Ordinary gzip; forward reading only.
    Gzip,
    /// Block gzip; offsets are virtual offsets.
    BlockGzip,
}

/// Options for opening a read stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamOptions {
    /// Skip sniffing and force a format.
    pub format: Option<StreamFormat>,
    /// Reject BGZF data missing the trailing end-of-file block.
    pub require_eof_block: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            format: None,
            require_eof_block: true,
        }
    }
}

/// A positioned, format-aware byte source.
///
/// `seek`/`tell` speak byte offsets for uncompressed data and raw virtual
/// offsets for BGZF; streams that cannot honor a call return
/// [`BamseekError::SeekUnsupported`] instead of a misleading position.
pub trait ByteStream: Read {
    /// The encoding this stream decodes.
    fn format(&self) -> StreamFormat;

    /// Reposition to `offset` (byte offset or raw virtual offset).
    fn seek(&mut self, offset: u64) -> Result<()>;

    /// Offset of the next byte to be read.
    fn tell(&self) -> Result<u64>;

    /// Return to the start of the stream.
    fn rewind(&mut self) -> Result<()> {
        self.seek(0)
    }

    /// True once a read has gone past the last byte.
    fn is_eof(&self) -> bool;
}

impl fmt::Debug for dyn ByteStream + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("format", &self.format())
            .finish_non_exhaustive()
    }
}

/// Classify leading bytes as one of the supported encodings.
///
/// The gzip magic splits compressed from uncompressed; within gzip, an
/// FEXTRA field carrying the `BC` subfield marks BGZF. Callers should pass
/// at least the first 18 bytes of the file; shorter input degrades to the
/// coarser answer.
pub fn detect_stream_format(head: &[u8]) -> StreamFormat {
    if head.len() < 2 || head[0] != 31 || head[1] != 139 {
        return StreamFormat::Uncompressed;
    }
    if head.len() >= 14 && head[3] & 0x04 != 0 {
        let xlen = u16::from_le_bytes([head[10], head[11]]) as usize;
        let extra = &head[12..head.len().min(12 + xlen)];
        let mut pos = 0;
        while pos + 4 <= extra.len() {
            let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
            if extra[pos] == 66 && extra[pos + 1] == 67 && slen == 2 {
                return StreamFormat::BlockGzip;
            }
            pos += 4 + slen;
        }
    }
    StreamFormat::Gzip
}

/// Infer a write format from a file extension.
///
/// `.gz` means gzip; `.bam`, `.bgz`, and `.bgzf` mean BGZF; anything else
/// is uncompressed.
pub fn extension_format<P: AsRef<Path>>(path: P) -> StreamFormat {
    match path
        .as_ref()
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
    {
        "gz" => StreamFormat::Gzip,
        "bam" | "bgz" | "bgzf" => StreamFormat::BlockGzip,
        _ => StreamFormat::Uncompressed,
    }
}

/// Open `path` for reading, sniffing the encoding.
///
/// `"-"` reads standard input (always treated as uncompressed).
pub fn open_stream<P: AsRef<Path>>(path: P) -> Result<Box<dyn ByteStream>> {
    open_stream_with(path, StreamOptions::default())
}

/// Open `path` for reading with explicit [`StreamOptions`].
pub fn open_stream_with<P: AsRef<Path>>(
    path: P,
    options: StreamOptions,
) -> Result<Box<dyn ByteStream>> {
    let path = path.as_ref();
    if path == Path::new("-") {
        return Ok(Box::new(StdinStream::new()));
    }

    let mut file = File::open(path).map_err(|source| BamseekError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut head = [0u8; 18];
    let head_len = read_head(&mut file, &mut head)?;
    file.seek(SeekFrom::Start(0))?;
    let sniffed = detect_stream_format(&head[..head_len]);

    let format = match options.format {
        Some(forced) => {
            if forced != StreamFormat::Uncompressed && sniffed == StreamFormat::Uncompressed {
                return Err(BamseekError::FormatDetection(format!(
                    "{} does not start with the gzip magic but {forced:?} was requested",
                    path.display()
                )));
            }
            forced
        }
        None => sniffed,
    };

    match format {
        StreamFormat::Uncompressed => Ok(Box::new(RawStream::new(file))),
        StreamFormat::Gzip => Ok(Box::new(GzipStream::new(file, path.to_path_buf()))),
        StreamFormat::BlockGzip => {
            let reader =
                BgzfReader::with_eof_check(BufReader::new(file), options.require_eof_block)?;
            Ok(Box::new(reader))
        }
    }
}

/// Fill as much of `head` as the stream offers.
fn read_head<R: Read>(reader: &mut R, head: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < head.len() {
        match reader.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Uncompressed pass-through stream over a seekable source.
pub struct RawStream<R: Read + Seek> {
    inner: R,
    pos: u64,
    eof: bool,
}

impl<R: Read + Seek> RawStream<R> {
    /// Wrap a seekable source, starting at offset 0.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pos: 0,
            eof: false,
        }
    }
}

impl<R: Read + Seek> Read for RawStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        if n == 0 && !buf.is_empty() {
            self.eof = true;
        }
        Ok(n)
    }
}

impl<R: Read + Seek> ByteStream for RawStream<R> {
    fn format(&self) -> StreamFormat {
        StreamFormat::Uncompressed
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.pos = offset;
        self.eof = false;
        Ok(())
    }

    fn tell(&self) -> Result<u64> {
        Ok(self.pos)
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}

/// Standard input as an unseekable uncompressed stream.
pub struct StdinStream {
    inner: io::Stdin,
    pos: u64,
    eof: bool,
}

impl StdinStream {
    /// Attach to the process's standard input.
    pub fn new() -> Self {
        Self {
            inner: io::stdin(),
            pos: 0,
            eof: false,
        }
    }
}

impl Default for StdinStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for StdinStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        if n == 0 && !buf.is_empty() {
            self.eof = true;
        }
        Ok(n)
    }
}

impl ByteStream for StdinStream {
    fn format(&self) -> StreamFormat {
        StreamFormat::Uncompressed
    }

    fn seek(&mut self, _offset: u64) -> Result<()> {
        Err(BamseekError::SeekUnsupported(
            "standard input is not seekable".to_string(),
        ))
    }

    fn tell(&self) -> Result<u64> {
        Ok(self.pos)
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}

/// Ordinary gzip stream: forward reads, rewind by reopening.
pub struct GzipStream {
    decoder: MultiGzDecoder<BufReader<File>>,
    path: PathBuf,
    /// Uncompressed bytes delivered so far.
    pos: u64,
    eof: bool,
}

impl GzipStream {
    /// Wrap an already opened file; `path` is kept for rewinds.
    pub fn new(file: File, path: PathBuf) -> Self {
        Self {
            decoder: MultiGzDecoder::new(BufReader::new(file)),
            path,
            pos: 0,
            eof: false,
        }
    }
}

impl Read for GzipStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.decoder.read(buf)?;
        self.pos += n as u64;
        if n == 0 && !buf.is_empty() {
            self.eof = true;
        }
        Ok(n)
    }
}

impl ByteStream for GzipStream {
    fn format(&self) -> StreamFormat {
        StreamFormat::Gzip
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        if offset != 0 {
            return Err(BamseekError::SeekUnsupported(format!(
                "gzip streams only support rewinding, not seeking to {offset}"
            )));
        }
        let file = File::open(&self.path).map_err(|source| BamseekError::Open {
            path: self.path.clone(),
            source,
        })?;
        self.decoder = MultiGzDecoder::new(BufReader::new(file));
        self.pos = 0;
        self.eof = false;
        Ok(())
    }

    fn tell(&self) -> Result<u64> {
        Ok(self.pos)
    }

    fn is_eof(&self) -> bool {
        self.eof
    }
}

impl<R: Read + Seek> ByteStream for BgzfReader<R> {
    fn format(&self) -> StreamFormat {
        StreamFormat::BlockGzip
    }

    fn seek(&mut self, offset: u64) -> Result<()> {
        self.seek_to_virtual_offset(offset)
    }

    fn tell(&self) -> Result<u64> {
        Ok(self.virtual_offset())
    }

    fn is_eof(&self) -> bool {
        BgzfReader::is_eof(self)
    }
}

/// Write counterpart of the read backends.
///
/// One variant per encoding; pick one with [`StreamWriter::create`] or the
/// per-format constructors. Always call [`StreamWriter::finish`] so
/// compressed formats are finalized; dropping only flushes best-effort.
pub enum StreamWriter {
    /// Uncompressed writer with buffering.
    Plain(Option<BufWriter<Box<dyn Write>>>),
    /// Gzip writer at the default compression level.
    Gzip(Option<GzEncoder<BufWriter<Box<dyn Write>>>>),
    /// BGZF writer; `finish` appends the end-of-file block.
    BlockGzip(Option<BgzfWriter<Box<dyn Write>>>),
}

impl StreamWriter {
    /// Create `path` for writing.
    ///
    /// Without an explicit format the extension decides (see
    /// [`extension_format`]). `"-"` writes standard output, uncompressed.
    pub fn create<P: AsRef<Path>>(path: P, format: Option<StreamFormat>) -> Result<Self> {
        let path = path.as_ref();
        if path == Path::new("-") {
            return Ok(Self::new_plain(Box::new(io::stdout())));
        }
        let file = File::create(path).map_err(|source| BamseekError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let format = format.unwrap_or_else(|| extension_format(path));
        Ok(match format {
            StreamFormat::Uncompressed => Self::new_plain(Box::new(file)),
            StreamFormat::Gzip => Self::new_gzip(Box::new(file)),
            StreamFormat::BlockGzip => Self::new_block_gzip(Box::new(file)),
        })
    }

    /// Write uncompressed bytes to `writer`.
    pub fn new_plain(writer: Box<dyn Write>) -> Self {
        Self::Plain(Some(BufWriter::new(writer)))
    }

    /// Gzip-compress everything written to `writer`.
    pub fn new_gzip(writer: Box<dyn Write>) -> Self {
        Self::Gzip(Some(GzEncoder::new(
            BufWriter::new(writer),
            Compression::default(),
        )))
    }

    /// BGZF-compress everything written to `writer`.
    pub fn new_block_gzip(writer: Box<dyn Write>) -> Self {
        Self::BlockGzip(Some(BgzfWriter::new(writer)))
    }

    /// The encoding being written.
    pub fn format(&self) -> StreamFormat {
        match self {
            Self::Plain(_) => StreamFormat::Uncompressed,
            Self::Gzip(_) => StreamFormat::Gzip,
            Self::BlockGzip(_) => StreamFormat::BlockGzip,
        }
    }

    /// Virtual offset of the next byte, on BGZF output only.
    pub fn virtual_offset(&self) -> Option<u64> {
        match self {
            Self::BlockGzip(Some(w)) => Some(w.virtual_offset()),
            _ => None,
        }
    }

    /// Force a BGZF block boundary; a no-op on other encodings.
    pub fn flush_block(&mut self) -> io::Result<()> {
        match self {
            Self::BlockGzip(Some(w)) => w.flush_block(),
            _ => Ok(()),
        }
    }

    /// Finalize the output and consume the writer.
    ///
    /// Flushes everything and writes the format's end-of-stream framing
    /// (gzip trailer, BGZF end-of-file block).
    pub fn finish(mut self) -> io::Result<()> {
        match &mut self {
            Self::Plain(w) => match w.take() {
                Some(mut writer) => writer.flush(),
                None => Ok(()),
            },
            Self::Gzip(w) => match w.take() {
                Some(encoder) => {
                    let mut inner = encoder.finish()?;
                    inner.flush()
                }
                None => Ok(()),
            },
            Self::BlockGzip(w) => match w.take() {
                Some(writer) => {
                    let mut inner = writer.finish()?;
                    inner.flush()
                }
                None => Ok(()),
            },
        }
    }
}

impl Write for StreamWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(Some(w)) => w.write(buf),
            Self::Gzip(Some(w)) => w.write(buf),
            Self::BlockGzip(Some(w)) => w.write(buf),
            _ => Err(io::Error::new(
                io::ErrorKind::Other,
                "cannot write to a finished writer",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(Some(w)) => w.flush(),
            Self::Gzip(Some(w)) => w.flush(),
            Self::BlockGzip(Some(w)) => w.flush(),
            _ => Ok(()),
        }
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        // Best-effort flush; finish() is the supported path.
        let _ = self.flush();
    }
}
