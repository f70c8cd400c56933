//! Application-level read buffering over a [`ByteStream`].
//!
//! A [`BufferedStream`] keeps one resident buffer (1 MB by default) so that
//! character- and line-oriented reads do not pay a backend call per byte.
//! Large reads pass straight through to the backend when nothing is
//! buffered, so bulk decoding keeps its throughput.
//!
//! # Buffering and virtual offsets
//!
//! `tell` delegates to the backend, which reports the position of the
//! *backend* cursor. With buffering active that cursor runs ahead of the
//! bytes the caller has consumed. For plain files that is a documented
//! skew; for BGZF it is worse: a virtual offset cannot be walked back by a
//! byte count at all, so `tell` on a buffered BGZF stream refuses with
//! [`BamseekError::BufferedTellConflict`] rather than return a misleading
//! address. Callers that need exact virtual offsets (index-driven seeking)
//! must call [`BufferedStream::disable_buffering`] first.

use crate::error::{BamseekError, Result};
use crate::io::backend::{open_stream_with, ByteStream, StreamFormat, StreamOptions};
use std::io::{self, Read};
use std::path::Path;

/// Default read buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 20;

/// Buffered reader over an auto-detected byte-stream backend.
pub struct BufferedStream {
    backend: Box<dyn ByteStream>,
    /// Buffered bytes; `start..buffer.len()` is unconsumed.
    buffer: Vec<u8>,
    start: usize,
    /// Refill size; 1 means buffering is effectively disabled.
    capacity: usize,
}

impl BufferedStream {
    /// Open `path`, sniffing the encoding.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, StreamOptions::default())
    }

    /// Open `path` with explicit [`StreamOptions`].
    pub fn open_with<P: AsRef<Path>>(path: P, options: StreamOptions) -> Result<Self> {
        Ok(Self::with_backend(open_stream_with(path, options)?))
    }

    /// Wrap an already-open backend.
    pub fn with_backend(backend: Box<dyn ByteStream>) -> Self {
        Self {
            backend,
            buffer: Vec::new(),
            start: 0,
            capacity: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Encoding of the underlying backend.
    pub fn backend_format(&self) -> StreamFormat {
        self.backend.format()
    }

    /// Unconsumed bytes currently buffered.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len() - self.start
    }

    /// Shrink the refill size to one byte.
    ///
    /// Already-buffered bytes are still served; the change applies from the
    /// next refill. Once the buffer drains, `tell` is exact for every
    /// backend.
    pub fn disable_buffering(&mut self) {
        self.capacity = 1;
    }

    /// Restore the default refill size.
    pub fn enable_buffering(&mut self) {
        self.capacity = DEFAULT_BUFFER_SIZE;
    }

    /// Set an explicit refill size (clamped to at least one byte).
    pub fn set_buffer_size(&mut self, size: usize) {
        self.capacity = size.max(1);
    }

    /// One byte, or `None` at end of stream.
    pub fn read_char(&mut self) -> io::Result<Option<u8>> {
        if self.start >= self.buffer.len() && self.refill()? == 0 {
            return Ok(None);
        }
        let byte = self.buffer[self.start];
        self.start += 1;
        Ok(Some(byte))
    }

    /// Append one line (terminator excluded, but consumed) to `out`.
    ///
    /// The line's bytes are gathered untouched and appended in one
    /// piece, so multibyte UTF-8 sequences survive refill boundaries. A
    /// line that is not valid UTF-8 is an [`io::ErrorKind::InvalidData`]
    /// error and leaves `out` unchanged.
    ///
    /// Returns `false` only when the stream ended before any byte was
    /// read, so a final unterminated line still reports `true`.
    pub fn read_line(&mut self, out: &mut String) -> io::Result<bool> {
        let mut bytes = Vec::new();
        let any = loop {
            match self.read_char()? {
                None => break !bytes.is_empty(),
                Some(b'\n') => break true,
                Some(byte) => bytes.push(byte),
            }
        };
        let text = std::str::from_utf8(&bytes).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line is not valid UTF-8: {e}"),
            )
        })?;
        out.push_str(text);
        Ok(any)
    }

    /// Discard buffered bytes and return to the start of the stream.
    pub fn rewind(&mut self) -> Result<()> {
        self.buffer.clear();
        self.start = 0;
        self.backend.rewind()
    }

    /// Discard buffered bytes and reposition the backend.
    ///
    /// The offset is a byte offset or raw virtual offset, per the backend.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.buffer.clear();
        self.start = 0;
        self.backend.seek(offset)
    }

    /// The backend cursor's position.
    ///
    /// On a BGZF backend this is a virtual offset and is only answerable
    /// while no read buffering is in effect (see the module docs); it
    /// otherwise fails with [`BamseekError::BufferedTellConflict`].
    pub fn tell(&self) -> Result<u64> {
        if self.backend.format() == StreamFormat::BlockGzip
            && (self.capacity > 1 || self.buffered_len() > 0)
        {
            return Err(BamseekError::BufferedTellConflict);
        }
        self.backend.tell()
    }

    /// True once the buffer is drained and the backend has hit end of
    /// stream.
    pub fn eof(&self) -> bool {
        self.buffered_len() == 0 && self.backend.is_eof()
    }

    fn refill(&mut self) -> io::Result<usize> {
        self.buffer.resize(self.capacity, 0);
        let n = self.backend.read(&mut self.buffer)?;
        self.buffer.truncate(n);
        self.start = 0;
        Ok(n)
    }
}

impl Read for BufferedStream {
    /// Serve buffered bytes first, then pass the remainder through.
    ///
    /// Three cases: an empty buffer reads straight from the backend into
    /// `out`; a buffer holding enough is a pure copy; a short buffer is
    /// drained and the rest read directly. No refill happens here; only
    /// [`BufferedStream::read_char`] (and `read_line` atop it) refills.
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let pending = self.buffered_len();
        if pending == 0 {
            return self.backend.read(out);
        }
        if pending >= out.len() {
            let end = self.start + out.len();
            out.copy_from_slice(&self.buffer[self.start..end]);
            self.start = end;
            return Ok(out.len());
        }
        out[..pending].copy_from_slice(&self.buffer[self.start..]);
        self.start = self.buffer.len();
        match self.backend.read(&mut out[pending..]) {
            Ok(n) => Ok(pending + n),
            // The drained bytes are already in `out`; report them and let
            // the error resurface on the next call.
            Err(_) => Ok(pending),
        }
    }
}
