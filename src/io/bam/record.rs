//! BAM record structure and codec.
//!
//! Records are decoded just far enough to support coordinate filtering
//! and sort checking: placement fields and the CIGAR come out as typed
//! values, while the packed sequence, quality scores, and auxiliary
//! tags stay as raw bytes. A decoded record re-encodes byte for byte.
//!
//! # Binary format
//!
//! ```text
//! BAM Record (little-endian):
//! - block_size (int32): Record size in bytes, excluding this field
//! - refID (int32): Reference sequence id (-1 for unmapped)
//! - pos (int32): 0-based leftmost position (-1 for unmapped)
//! - l_read_name (uint8): Name length, includes null terminator
//! - mapq (uint8): Mapping quality (255 = unavailable)
//! - bin (uint16): Index bin of the alignment
//! - n_cigar_op (uint16): Number of CIGAR operations
//! - flag (uint16): Bitwise flags
//! - l_seq (int32): Sequence length
//! - next_refID (int32): Mate reference id
//! - next_pos (int32): Mate position
//! - tlen (int32): Template length
//! - read_name (char[l_read_name]): Null-terminated name
//! - cigar (uint32[n_cigar_op]): op_len << 4 | op
//! - seq (uint8[(l_seq+1)/2]): 4-bit encoded bases
//! - qual (char[l_seq]): Quality scores
//! - tags: Auxiliary data to end of record
//! ```

use crate::io::bam::index::region_to_bin;
use std::io::{self, Read};

/// Flag bit: segment unmapped.
pub const FLAG_UNMAPPED: u16 = 0x4;

/// Fixed-size portion of a record body (after block_size).
const FIXED_FIELDS_LEN: usize = 32;

/// One alignment record.
///
/// Placement fields keep their on-disk sentinel encodings (`-1` for
/// "none", `255` for missing mapq); the typed accessors translate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Reference id, -1 when unmapped
    pub ref_id: i32,
    /// 0-based leftmost position, -1 when unmapped
    pub pos: i32,
    /// Mapping quality, 255 when unavailable
    pub mapq: u8,
    /// Index bin of the alignment
    pub bin: u16,
    /// Bitwise flags
    pub flags: u16,
    /// Mate reference id, -1 when absent
    pub mate_ref_id: i32,
    /// Mate position, -1 when absent
    pub mate_pos: i32,
    /// Template length
    pub template_length: i32,
    /// Read name, without the null terminator
    pub name: String,
    /// CIGAR operations, packed as `op_len << 4 | op`
    pub cigar: Vec<u32>,
    /// Declared sequence length
    pub l_seq: i32,
    /// Packed sequence, quality scores, and tags, byte for byte
    pub tail: Vec<u8>,
}

impl Record {
    /// An empty, unplaced record.
    pub fn new() -> Self {
        Self {
            ref_id: -1,
            pos: -1,
            mapq: 255,
            bin: 0,
            flags: FLAG_UNMAPPED,
            mate_ref_id: -1,
            mate_pos: -1,
            template_length: 0,
            name: String::new(),
            cigar: Vec::new(),
            l_seq: 0,
            tail: Vec::new(),
        }
    }

    /// A mapped record spanning `span` reference bases from `pos`, with
    /// a single-match CIGAR and the index bin filled in.
    pub fn aligned(name: impl Into<String>, ref_id: i32, pos: i32, span: u32) -> Self {
        let end = pos + (span.max(1) as i32);
        Self {
            ref_id,
            pos,
            mapq: 60,
            bin: region_to_bin(pos, end) as u16,
            flags: 0,
            mate_ref_id: -1,
            mate_pos: -1,
            template_length: 0,
            name: name.into(),
            // op code 0 is M
            cigar: if span > 0 { vec![span << 4] } else { Vec::new() },
            l_seq: 0,
            tail: Vec::new(),
        }
    }

    /// Reference id as an index into the header dictionary.
    pub fn reference_id(&self) -> Option<usize> {
        if self.ref_id >= 0 {
            Some(self.ref_id as usize)
        } else {
            None
        }
    }

    /// Leftmost position, when placed.
    pub fn position(&self) -> Option<i32> {
        if self.pos >= 0 {
            Some(self.pos)
        } else {
            None
        }
    }

    /// Mapping quality, `None` when the 255 sentinel is stored.
    pub fn mapping_quality(&self) -> Option<u8> {
        if self.mapq == 255 {
            None
        } else {
            Some(self.mapq)
        }
    }

    /// Whether the unmapped flag bit is set.
    pub fn is_unmapped(&self) -> bool {
        self.flags & FLAG_UNMAPPED != 0
    }

    /// Declared sequence length.
    pub fn sequence_length(&self) -> usize {
        self.l_seq.max(0) as usize
    }

    /// Reference bases consumed by the CIGAR (M, D, N, =, X ops).
    pub fn reference_length(&self) -> i32 {
        let mut span = 0i64;
        for &packed in &self.cigar {
            let op = packed & 0xF;
            if matches!(op, 0 | 2 | 3 | 7 | 8) {
                span += (packed >> 4) as i64;
            }
        }
        span.min(i32::MAX as i64) as i32
    }

    /// One past the last reference base touched by the alignment.
    ///
    /// A placement with no reference-consuming CIGAR still occupies one
    /// base, so the end is always past the start.
    pub fn alignment_end(&self) -> Option<i32> {
        self.position()
            .map(|pos| pos.saturating_add(self.reference_length().max(1)))
    }

    /// Number of bases shared between the alignment and `[start, end)`
    /// on its reference. Zero for unplaced records and empty overlaps.
    pub fn overlap_length(&self, start: i32, end: i32) -> i32 {
        match (self.position(), self.alignment_end()) {
            (Some(pos), Some(align_end)) => {
                (align_end.min(end) - pos.max(start)).max(0)
            }
            _ => 0,
        }
    }

    /// Decode from a record body (everything after block_size).
    pub fn decode(body: &[u8]) -> io::Result<Record> {
        if body.len() < FIXED_FIELDS_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "record body too short: {} bytes (minimum {FIXED_FIELDS_LEN})",
                    body.len()
                ),
            ));
        }

        let mut cursor = 0;
        let ref_id = read_i32_le(body, &mut cursor)?;
        let pos = read_i32_le(body, &mut cursor)?;
        let l_read_name = read_u8(body, &mut cursor)? as usize;
        let mapq = read_u8(body, &mut cursor)?;
        let bin = read_u16_le(body, &mut cursor)?;
        let n_cigar_op = read_u16_le(body, &mut cursor)? as usize;
        let flags = read_u16_le(body, &mut cursor)?;
        let l_seq = read_i32_le(body, &mut cursor)?;
        let mate_ref_id = read_i32_le(body, &mut cursor)?;
        let mate_pos = read_i32_le(body, &mut cursor)?;
        let template_length = read_i32_le(body, &mut cursor)?;

        validate_reference_id(ref_id, "record")?;
        validate_reference_id(mate_ref_id, "mate")?;
        if l_read_name == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "read name length must be at least 1",
            ));
        }
        if l_seq < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid sequence length: {l_seq}"),
            ));
        }

        if cursor + l_read_name > body.len() {
            return Err(truncated("read name", cursor, l_read_name, body.len()));
        }
        let mut name_bytes = body[cursor..cursor + l_read_name].to_vec();
        if name_bytes.pop() != Some(0) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("read name not null-terminated at offset {cursor}"),
            ));
        }
        let name = String::from_utf8(name_bytes).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid UTF-8 in read name: {e}"),
            )
        })?;
        cursor += l_read_name;

        let cigar_len = n_cigar_op.checked_mul(4).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("CIGAR operation count too large: {n_cigar_op}"),
            )
        })?;
        if cursor + cigar_len > body.len() {
            return Err(truncated("CIGAR", cursor, cigar_len, body.len()));
        }
        let mut cigar = Vec::with_capacity(n_cigar_op);
        for chunk in body[cursor..cursor + cigar_len].chunks_exact(4) {
            cigar.push(u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }
        cursor += cigar_len;

        // The tail must cover at least the sequence and quality arrays;
        // anything beyond is tag data.
        let seq_and_qual = (l_seq as usize).div_ceil(2) + l_seq as usize;
        if cursor + seq_and_qual > body.len() {
            return Err(truncated("sequence and quality", cursor, seq_and_qual, body.len()));
        }
        let tail = body[cursor..].to_vec();

        Ok(Record {
            ref_id,
            pos,
            mapq,
            bin,
            flags,
            mate_ref_id,
            mate_pos,
            template_length,
            name,
            cigar,
            l_seq,
            tail,
        })
    }

    /// Append the framed record (block_size first) to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) -> io::Result<()> {
        let name_len = self.name.len() + 1;
        if name_len > u8::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("read name too long: {} bytes", self.name.len()),
            ));
        }
        if self.cigar.len() > u16::MAX as usize {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("too many CIGAR operations: {}", self.cigar.len()),
            ));
        }

        let block_size = FIXED_FIELDS_LEN + name_len + self.cigar.len() * 4 + self.tail.len();
        out.reserve(4 + block_size);
        out.extend_from_slice(&(block_size as i32).to_le_bytes());
        out.extend_from_slice(&self.ref_id.to_le_bytes());
        out.extend_from_slice(&self.pos.to_le_bytes());
        out.push(name_len as u8);
        out.push(self.mapq);
        out.extend_from_slice(&self.bin.to_le_bytes());
        out.extend_from_slice(&(self.cigar.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.extend_from_slice(&self.l_seq.to_le_bytes());
        out.extend_from_slice(&self.mate_ref_id.to_le_bytes());
        out.extend_from_slice(&self.mate_pos.to_le_bytes());
        out.extend_from_slice(&self.template_length.to_le_bytes());
        out.extend_from_slice(self.name.as_bytes());
        out.push(0);
        for &op in &self.cigar {
            out.extend_from_slice(&op.to_le_bytes());
        }
        out.extend_from_slice(&self.tail);
        Ok(())
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new()
    }
}

/// Read one framed record.
///
/// Returns `Ok(None)` only at a clean end of stream, before any byte of
/// the next record. A stream ending inside a record is an error.
pub fn read_record<R: Read>(reader: &mut R) -> io::Result<Option<Record>> {
    let mut size_bytes = [0u8; 4];

    // Probe one byte first so clean EOF and a torn length prefix are
    // distinguishable.
    let mut first = [0u8; 1];
    loop {
        match reader.read(&mut first) {
            Ok(0) => return Ok(None),
            Ok(_) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    size_bytes[0] = first[0];
    reader.read_exact(&mut size_bytes[1..]).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            io::Error::new(io::ErrorKind::UnexpectedEof, "stream ends inside a record length")
        } else {
            e
        }
    })?;

    let block_size = i32::from_le_bytes(size_bytes);
    if block_size < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid record block size: {block_size}"),
        ));
    }

    let mut body = vec![0u8; block_size as usize];
    reader.read_exact(&mut body).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stream ends inside a record of {block_size} bytes"),
            )
        } else {
            e
        }
    })?;

    Record::decode(&body).map(Some)
}

fn validate_reference_id(ref_id: i32, field: &str) -> io::Result<()> {
    if ref_id < -1 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid {field} reference id: {ref_id}"),
        ));
    }
    Ok(())
}

fn truncated(what: &str, offset: usize, need: usize, have: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("record truncated at {what}: offset {offset} needs {need} bytes, body has {have}"),
    )
}

fn read_i32_le(data: &[u8], cursor: &mut usize) -> io::Result<i32> {
    if *cursor + 4 > data.len() {
        return Err(truncated("int32 field", *cursor, 4, data.len()));
    }
    let value = i32::from_le_bytes([
        data[*cursor],
        data[*cursor + 1],
        data[*cursor + 2],
        data[*cursor + 3],
    ]);
    *cursor += 4;
    Ok(value)
}

fn read_u16_le(data: &[u8], cursor: &mut usize) -> io::Result<u16> {
    if *cursor + 2 > data.len() {
        return Err(truncated("uint16 field", *cursor, 2, data.len()));
    }
    let value = u16::from_le_bytes([data[*cursor], data[*cursor + 1]]);
    *cursor += 2;
    Ok(value)
}

fn read_u8(data: &[u8], cursor: &mut usize) -> io::Result<u8> {
    if *cursor >= data.len() {
        return Err(truncated("uint8 field", *cursor, 1, data.len()));
    }
    let value = data[*cursor];
    *cursor += 1;
    Ok(value)
}
