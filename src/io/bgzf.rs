//! BGZF block compression: a seekable reader and a sequential writer.
//!
//! BGZF is a restricted variant of gzip used by coordinate-sorted genomic
//! files. The data is a series of independently deflated blocks, each a
//! complete gzip member carrying its own compressed size in a `BC` extra
//! subfield, so a reader can jump to any block without scanning from the
//! start of the file.
//!
//! # Block Structure
//!
//! ```text
//! Each BGZF block:
//! - Bytes 0-1: Gzip magic (31, 139)
//! - Byte 2: CM=8 (deflate), Byte 3: FLG=4 (FEXTRA)
//! - Bytes 4-9: MTIME, XFL, OS
//! - Bytes 10-11: XLEN (extra field length)
//! - Bytes 12+: Extra subfields, including BSIZE
//!   - SI1=66 ('B'), SI2=67 ('C'), SLEN=2
//!   - BSIZE (little-endian u16): total block size - 1
//! - Deflated payload
//! - CRC32 (4 bytes) and ISIZE (4 bytes) of the uncompressed payload
//! ```
//!
//! Positions inside BGZF data are virtual offsets: a `u64` holding the file
//! offset of a block in the upper 48 bits and the offset into that block's
//! decompressed contents in the lower 16 bits.

use crate::error::{BamseekError, Result};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Maximum decompressed size of a single BGZF block.
pub const MAX_BLOCK_SIZE: usize = 64 * 1024;

/// Uncompressed payload target per written block.
///
/// The format caps a block at 64 KB compressed; 60 KB of payload leaves
/// headroom for incompressible data.
const BLOCK_PAYLOAD_TARGET: usize = 60 * 1024;

/// Fixed gzip header bytes preceding XLEN in every BGZF block.
const HEADER_LEN: usize = 12;

/// The empty BGZF block written at end of stream.
///
/// A reader can verify the last 28 bytes of a file against this marker to
/// detect truncation: a partially copied BGZF file is otherwise a valid
/// (shorter) sequence of blocks.
pub const BGZF_EOF: [u8; 28] = [
    31, 139, 8, 4, 0, 0, 0, 0, 0, 255, // header
    6, 0, 66, 67, 2, 0, 27, 0, // extra field with BSIZE=27
    3, 0, // empty deflate block
    0, 0, 0, 0, // CRC32
    0, 0, 0, 0, // ISIZE=0
];

/// Pack a (compressed block offset, within-block offset) pair into a raw
/// virtual offset.
#[inline]
pub fn virtual_offset(block_offset: u64, within: u16) -> u64 {
    (block_offset << 16) | u64::from(within)
}

/// Check whether a file ends with the BGZF end-of-file marker.
///
/// Leaves the stream positioned at the start. Files shorter than the marker
/// (including empty files) report `false`.
pub fn has_eof_block<R: Read + Seek>(inner: &mut R) -> io::Result<bool> {
    let len = inner.seek(SeekFrom::End(0))?;
    let ok = if len >= BGZF_EOF.len() as u64 {
        inner.seek(SeekFrom::End(-(BGZF_EOF.len() as i64)))?;
        let mut tail = [0u8; 28];
        inner.read_exact(&mut tail)?;
        tail == BGZF_EOF
    } else {
        false
    };
    inner.seek(SeekFrom::Start(0))?;
    Ok(ok)
}

/// Seekable BGZF reader.
///
/// Decodes one block at a time, so memory stays bounded by the 64 KB block
/// cap regardless of file size. `seek_to_virtual_offset` repositions onto
/// any block boundary recorded by an index; `virtual_offset` reports the
/// address of the next byte to be read.
#[derive(Debug)]
pub struct BgzfReader<R: Read + Seek> {
    inner: R,
    /// Decompressed contents of the current block.
    block: Vec<u8>,
    /// Read cursor within `block`.
    block_pos: usize,
    /// File offset of the current block.
    block_offset: u64,
    /// File offset of the block after the current one.
    next_block_offset: u64,
    eof: bool,
}

impl<R: Read + Seek> BgzfReader<R> {
    /// Open a BGZF stream, requiring the trailing end-of-file block.
    pub fn new(inner: R) -> Result<Self> {
        Self::with_eof_check(inner, true)
    }

    /// Open a BGZF stream, optionally verifying the end-of-file block.
    ///
    /// With `require_eof_block` set, a stream that does not end in the
    /// 28-byte empty block is rejected as truncated before any data is
    /// read. Disabling the check accepts files produced by writers that
    /// omit the marker.
    pub fn with_eof_check(mut inner: R, require_eof_block: bool) -> Result<Self> {
        if require_eof_block && !has_eof_block(&mut inner)? {
            return Err(BamseekError::Truncated(
                "missing BGZF end-of-file block".to_string(),
            ));
        }
        Ok(Self {
            inner,
            block: Vec::new(),
            block_pos: 0,
            block_offset: 0,
            next_block_offset: 0,
            eof: false,
        })
    }

    /// Virtual offset of the next byte to be read.
    pub fn virtual_offset(&self) -> u64 {
        if self.block_pos >= self.block.len() {
            virtual_offset(self.next_block_offset, 0)
        } else {
            virtual_offset(self.block_offset, self.block_pos as u16)
        }
    }

    /// Whether a read has run past the last block.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Position the reader at a virtual offset.
    ///
    /// The upper 48 bits must name the file offset of a block start; the
    /// lower 16 bits must not exceed that block's decompressed length.
    pub fn seek_to_virtual_offset(&mut self, voffset: u64) -> Result<()> {
        let block_offset = voffset >> 16;
        let within = (voffset & 0xFFFF) as usize;

        if !(block_offset == self.block_offset && !self.block.is_empty()) {
            self.inner.seek(SeekFrom::Start(block_offset))?;
            self.next_block_offset = block_offset;
            self.block.clear();
            self.block_pos = 0;
            self.eof = false;
            if !self.load_block().map_err(lift_block_err)? {
                // Seeking to the file end (e.g. the EOF block) is valid
                // only with a zero within-block offset.
                if within == 0 {
                    return Ok(());
                }
                return Err(BamseekError::InvalidRange(format!(
                    "virtual offset {voffset:#x} points past the last block"
                )));
            }
        }

        if within > self.block.len() {
            return Err(BamseekError::InvalidRange(format!(
                "within-block offset {} exceeds block length {}",
                within,
                self.block.len()
            )));
        }
        self.block_pos = within;
        self.eof = false;
        Ok(())
    }

    /// Decode the next block into `self.block`.
    ///
    /// Returns `Ok(false)` at a clean end of stream. Empty blocks (such as
    /// the EOF marker) are decoded as empty and left for the caller to
    /// skip.
    fn load_block(&mut self) -> io::Result<bool> {
        let mut header = [0u8; HEADER_LEN];
        match read_exact_or_none(&mut self.inner, &mut header)? {
            Some(()) => {}
            None => return Ok(false),
        }

        if header[0] != 31 || header[1] != 139 {
            return Err(corrupt(format!(
                "invalid gzip magic at offset {}: [{}, {}]",
                self.next_block_offset, header[0], header[1]
            )));
        }
        if header[3] & 0x04 == 0 {
            return Err(corrupt(format!(
                "gzip member at offset {} has no extra field; not BGZF data",
                self.next_block_offset
            )));
        }

        let xlen = u16::from_le_bytes([header[10], header[11]]) as usize;
        let mut extra = vec![0u8; xlen];
        self.inner.read_exact(&mut extra)?;

        // Scan the extra subfields for BSIZE (SI1='B', SI2='C', SLEN=2).
        let mut bsize: Option<u16> = None;
        let mut pos = 0;
        while pos + 4 <= xlen {
            let si1 = extra[pos];
            let si2 = extra[pos + 1];
            let slen = u16::from_le_bytes([extra[pos + 2], extra[pos + 3]]) as usize;
            if si1 == 66 && si2 == 67 && slen == 2 {
                if pos + 6 > xlen {
                    return Err(corrupt("incomplete BSIZE field"));
                }
                bsize = Some(u16::from_le_bytes([extra[pos + 4], extra[pos + 5]]));
                break;
            }
            pos += 4 + slen;
        }
        let block_size = match bsize {
            Some(bs) => bs as usize + 1,
            None => {
                return Err(corrupt(format!(
                    "no BSIZE subfield in block at offset {}",
                    self.next_block_offset
                )));
            }
        };
        if block_size < HEADER_LEN + xlen + 8 {
            return Err(corrupt(format!(
                "block size {block_size} smaller than its own header"
            )));
        }

        // Deflated payload plus the 8-byte CRC32/ISIZE trailer.
        let mut rest = vec![0u8; block_size - HEADER_LEN - xlen];
        self.inner.read_exact(&mut rest)?;
        let (payload, trailer) = rest.split_at(rest.len() - 8);
        let expected_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
        let isize = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]) as usize;
        if isize > MAX_BLOCK_SIZE {
            return Err(corrupt(format!(
                "block claims {isize} uncompressed bytes, above the 64 KB cap"
            )));
        }

        self.block.clear();
        self.block.reserve(isize);
        let mut decoder = DeflateDecoder::new(payload);
        decoder.read_to_end(&mut self.block).map_err(|e| {
            corrupt(format!(
                "inflate failed in block at offset {}: {e}",
                self.next_block_offset
            ))
        })?;

        if self.block.len() != isize {
            return Err(corrupt(format!(
                "block inflated to {} bytes but declared {}",
                self.block.len(),
                isize
            )));
        }
        if crc32fast::hash(&self.block) != expected_crc {
            return Err(corrupt(format!(
                "CRC mismatch in block at offset {}",
                self.next_block_offset
            )));
        }

        self.block_pos = 0;
        self.block_offset = self.next_block_offset;
        self.next_block_offset += block_size as u64;
        Ok(true)
    }
}

impl<R: Read + Seek> Read for BgzfReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.block_pos >= self.block.len() {
            if !self.load_block()? {
                self.eof = true;
                return Ok(0);
            }
            // Zero-length blocks (the EOF marker among them) carry no data.
        }
        let available = &self.block[self.block_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.block_pos += n;
        Ok(n)
    }
}

/// Sequential BGZF writer.
///
/// Buffers payload bytes and emits a finished block whenever the 60 KB
/// target fills, or on `flush_block`. `finish` appends the end-of-file
/// marker; without it the output is readable but looks truncated to readers
/// that require the marker.
pub struct BgzfWriter<W: Write> {
    inner: Option<W>,
    /// Uncompressed payload waiting for the current block.
    pending: Vec<u8>,
    /// Compressed bytes emitted so far; the file offset of the next block.
    compressed_offset: u64,
    level: Compression,
}

impl<W: Write> BgzfWriter<W> {
    /// Create a writer with the default compression level.
    pub fn new(inner: W) -> Self {
        Self::with_level(inner, Compression::default())
    }

    /// Create a writer with an explicit compression level.
    pub fn with_level(inner: W, level: Compression) -> Self {
        Self {
            inner: Some(inner),
            pending: Vec::with_capacity(BLOCK_PAYLOAD_TARGET),
            compressed_offset: 0,
            level,
        }
    }

    /// Virtual offset where the next written byte will land.
    ///
    /// Recording this before each item gives the offsets an index needs.
    pub fn virtual_offset(&self) -> u64 {
        virtual_offset(self.compressed_offset, self.pending.len() as u16)
    }

    /// Compress any pending payload into a finished block.
    ///
    /// Forces a block boundary, which makes the current `virtual_offset`
    /// land on a fresh block. A no-op when nothing is pending.
    pub fn flush_block(&mut self) -> io::Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let block = compress_block(&self.pending, self.level)?;
        let writer = self
            .inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "writer already finished"))?;
        writer.write_all(&block)?;
        self.compressed_offset += block.len() as u64;
        self.pending.clear();
        Ok(())
    }

    /// Flush remaining payload, append the EOF marker, and return the sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.flush_block()?;
        let mut writer = self
            .inner
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "writer already finished"))?;
        writer.write_all(&BGZF_EOF)?;
        writer.flush()?;
        Ok(writer)
    }
}

impl<W: Write> Write for BgzfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut remaining = buf;
        while !remaining.is_empty() {
            let space = BLOCK_PAYLOAD_TARGET - self.pending.len();
            let take = remaining.len().min(space);
            self.pending.extend_from_slice(&remaining[..take]);
            remaining = &remaining[take..];
            if self.pending.len() >= BLOCK_PAYLOAD_TARGET {
                self.flush_block()?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_block()?;
        match self.inner.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for BgzfWriter<W> {
    fn drop(&mut self) {
        // Best-effort: callers should use finish() so the EOF marker is
        // written and errors surface.
        if self.inner.is_some() {
            let _ = self.flush_block();
        }
    }
}

/// Compress one payload into a complete BGZF block.
fn compress_block(data: &[u8], level: Compression) -> io::Result<Vec<u8>> {
    debug_assert!(data.len() <= BLOCK_PAYLOAD_TARGET);

    let mut deflate = DeflateEncoder::new(Vec::new(), level);
    deflate.write_all(data)?;
    let deflated = deflate.finish()?;

    let crc = crc32fast::hash(data);
    let isize = data.len() as u32;

    let mut block = Vec::with_capacity(HEADER_LEN + 8 + deflated.len() + 8);
    block.push(31); // ID1
    block.push(139); // ID2
    block.push(8); // CM (deflate)
    block.push(4); // FLG (FEXTRA)
    block.extend_from_slice(&[0, 0, 0, 0]); // MTIME
    block.push(0); // XFL
    block.push(255); // OS (unknown)
    block.extend_from_slice(&6u16.to_le_bytes()); // XLEN
    block.push(66); // SI1='B'
    block.push(67); // SI2='C'
    block.extend_from_slice(&2u16.to_le_bytes()); // SLEN

    // BSIZE is patched in once the total size is known.
    let bsize_pos = block.len();
    block.extend_from_slice(&0u16.to_le_bytes());

    block.extend_from_slice(&deflated);
    block.extend_from_slice(&crc.to_le_bytes());
    block.extend_from_slice(&isize.to_le_bytes());

    let total = block.len();
    if total > MAX_BLOCK_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("compressed block size {total} exceeds the 64 KB cap"),
        ));
    }
    let bsize = (total - 1) as u16;
    block[bsize_pos..bsize_pos + 2].copy_from_slice(&bsize.to_le_bytes());
    Ok(block)
}

/// Marker wrapped inside `io::Error` for structurally corrupt blocks.
///
/// Block decoding runs under the `Read` trait, which can only report
/// `io::Error`. Carrying this payload lets the crate boundary tell file
/// corruption apart from ordinary I/O failures after the error has
/// crossed that trait.
#[derive(Debug)]
struct BlockCorruption(String);

impl fmt::Display for BlockCorruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for BlockCorruption {}

/// An `io::Error` reporting a structurally corrupt block.
fn corrupt(message: impl Into<String>) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        BlockCorruption(message.into()),
    )
}

/// Whether `err` carries the corrupt-block marker.
pub(crate) fn is_block_corruption(err: &io::Error) -> bool {
    err.get_ref()
        .map_or(false, |inner| inner.is::<BlockCorruption>())
}

/// Lift a block-decode error into the crate error, surfacing corrupt
/// blocks as [`BamseekError::Compression`].
pub(crate) fn lift_block_err(err: io::Error) -> BamseekError {
    if is_block_corruption(&err) {
        BamseekError::Compression(err.to_string())
    } else {
        BamseekError::Io(err)
    }
}

/// `read_exact` that reports a clean EOF (no bytes at all) as `None`.
fn read_exact_or_none<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<Option<()>> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended {filled} bytes into a block header"),
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(Some(()))
}
