//! Coordinate index (BAI) support.
//!
//! A BAI sidecar file answers one question: which byte ranges of a BGZF
//! data file could hold records overlapping `[start, end)` on a reference?
//! Per reference it stores a hierarchical bin table and a linear index:
//!
//! - **Bins** partition `[0, 512 Mbp)` at six granularities. Level 0 is one
//!   bin over the whole reference; each level below splits a bin into 8, so
//!   level 5 holds 16 Kbp bins (ids 4681-37449). A record is filed under
//!   the smallest bin containing its whole span; a query gathers the bins
//!   of every level that intersect the region.
//! - **Linear index**: for each 16 Kbp window, the lowest virtual offset of
//!   any record overlapping that window. A chunk whose end precedes the
//!   query window's entry cannot contain matching records and is pruned.
//!
//! Bin id 37450 never holds records: it is the pseudo-bin carrying the
//! per-reference mapped/unmapped record counts.
//!
//! The index is immutable once loaded; independent readers may share one
//! `&BaiIndex`.

use crate::error::{BamseekError, Result};
use crate::io::bam::header::Header;
use crate::io::buffered::BufferedStream;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

/// Positions beyond this cannot be indexed (2^29, the level-0 bin width).
pub const MAX_POSITION: i32 = 1 << 29;

/// Bin id of the pseudo-bin holding per-reference record counts.
const PSEUDO_BIN: u32 = 37450;

/// Largest real bin id (level 5 ends at 4681 + (1 << 15) - 1).
const MAX_BIN: u32 = 37449;

/// Virtual file offset into BGZF data.
///
/// A 64-bit value combining:
/// - Bits 63-16: compressed file offset of a block
/// - Bits 15-0: offset within that block's decompressed contents
///
/// Ordering on the raw value is exactly lexicographic ordering on the
/// (block, within-block) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    /// Combine compressed and within-block components.
    pub fn new(compressed: u64, uncompressed: u16) -> Self {
        VirtualOffset((compressed << 16) | (uncompressed as u64))
    }

    /// Interpret a raw 64-bit value.
    pub fn from_raw(value: u64) -> Self {
        VirtualOffset(value)
    }

    /// The raw 64-bit value.
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Compressed file offset (high 48 bits).
    pub fn compressed_offset(self) -> u64 {
        self.0 >> 16
    }

    /// Offset within the decompressed block (low 16 bits).
    pub fn uncompressed_offset(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

/// A contiguous range `[start, end)` of virtual offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Virtual offset where the chunk starts
    pub start: VirtualOffset,
    /// Virtual offset where the chunk ends
    pub end: VirtualOffset,
}

impl Chunk {
    /// Create a chunk from its bounding virtual offsets.
    pub fn new(start: VirtualOffset, end: VirtualOffset) -> Self {
        Chunk { start, end }
    }
}

/// One bin of the hierarchical spatial index.
#[derive(Debug, Clone)]
pub struct Bin {
    /// Bin number (0-37449)
    pub bin_id: u32,
    /// Chunks of file data filed under this bin
    pub chunks: Vec<Chunk>,
}

/// Mapped/unmapped record counts from a reference's pseudo-bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceCounts {
    /// Records mapped to this reference
    pub mapped: u64,
    /// Unmapped records placed on this reference (mate-placed)
    pub unmapped: u64,
}

/// Index data for one reference sequence.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    /// Hierarchical bins, in file order
    pub bins: Vec<Bin>,
    /// Linear index: one virtual offset per 16 Kbp window
    pub intervals: Vec<VirtualOffset>,
    /// Counts from the pseudo-bin, when the index carried one
    pub counts: Option<ReferenceCounts>,
}

impl ReferenceIndex {
    /// Lower bound, from the linear index, on where a record overlapping
    /// `start` or anything after it can begin.
    fn min_offset(&self, start: i32) -> Option<VirtualOffset> {
        if self.intervals.is_empty() {
            return None;
        }
        let window = (start.max(0) >> 14) as usize;
        if window >= self.intervals.len() {
            // Past the indexed windows; the last entry is still a valid
            // (conservative) lower bound.
            return self.intervals.last().copied();
        }
        Some(self.intervals[window])
    }
}

/// Chunks selected for one section: sorted by start, overlaps merged.
///
/// Built fresh per query; never a view into the index.
#[derive(Debug, Clone, Default)]
pub struct SortedChunkList {
    chunks: Vec<Chunk>,
}

impl SortedChunkList {
    /// Sort by start offset and merge overlapping or adjacent chunks.
    pub fn from_unsorted(mut chunks: Vec<Chunk>) -> Self {
        if chunks.is_empty() {
            return Self { chunks };
        }
        chunks.sort_by_key(|c| c.start);

        let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
        let mut current = chunks[0];
        for chunk in chunks.into_iter().skip(1) {
            if chunk.start <= current.end {
                current.end = current.end.max(chunk.end);
            } else {
                merged.push(current);
                current = chunk;
            }
        }
        merged.push(current);
        Self { chunks: merged }
    }

    /// Number of merged chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the list holds no chunks at all.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The chunk at `idx`, in start order.
    pub fn get(&self, idx: usize) -> Option<&Chunk> {
        self.chunks.get(idx)
    }

    /// All chunks, sorted by start.
    pub fn as_slice(&self) -> &[Chunk] {
        &self.chunks
    }
}

/// An in-memory BAI coordinate index.
///
/// # Example
///
/// ```no_run
/// use bamseek::io::bam::BaiIndex;
///
/// # fn main() -> bamseek::Result<()> {
/// let index = BaiIndex::for_data_path("alignments.bam")?;
/// let chunks = index.region_chunks(0, 1_000, 2_000)?;
/// println!("{} byte ranges to visit", chunks.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BaiIndex {
    /// Per-reference index data, in header order
    pub references: Vec<ReferenceIndex>,
    /// Count of records with no placement at all, when recorded
    pub n_no_coor: Option<u64>,
}

impl BaiIndex {
    /// Load an index from an explicit path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut stream = BufferedStream::open(path.as_ref())?;
        Self::read_from(&mut stream)
            .map_err(|e| index_load_error(path.as_ref(), &e))
    }

    /// Load the sidecar index for a data file.
    ///
    /// Tries `<name>.bai` first; if the data name carries a known
    /// extension, strips it and retries (`sample.bam` -> `sample.bai`).
    pub fn for_data_path<P: AsRef<Path>>(data_path: P) -> Result<Self> {
        let data_path = data_path.as_ref();

        let mut candidates: Vec<PathBuf> = Vec::with_capacity(2);
        let mut appended = data_path.as_os_str().to_owned();
        appended.push(".bai");
        candidates.push(PathBuf::from(appended));
        if matches!(
            data_path.extension().and_then(|e| e.to_str()),
            Some("bam" | "bgz" | "bgzf")
        ) {
            candidates.push(data_path.with_extension("bai"));
        }

        for candidate in &candidates {
            if candidate.is_file() {
                return Self::from_path(candidate);
            }
        }
        Err(BamseekError::IndexLoad(format!(
            "no index found for {} (tried {})",
            data_path.display(),
            candidates
                .iter()
                .map(|c| c.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    /// Read an index from any byte source.
    ///
    /// # Format
    ///
    /// ```text
    /// magic[4]       "BAI\1"
    /// n_ref[4]       Number of reference sequences (int32)
    /// For each reference:
    ///   n_bin[4]     Number of bins (int32)
    ///   For each bin:
    ///     bin[4]     Bin number (uint32)
    ///     n_chunk[4] Number of chunks (int32)
    ///     For each chunk:
    ///       chunk_beg[8]  Virtual offset (uint64)
    ///       chunk_end[8]  Virtual offset (uint64)
    ///   n_intv[4]    Number of 16 Kbp windows (int32)
    ///   For each window:
    ///     ioffset[8] Virtual offset (uint64)
    /// n_no_coor[8]   Unplaced record count (uint64, optional)
    /// ```
    ///
    /// Bin 37450 is the counts pseudo-bin: its second chunk carries
    /// (mapped, unmapped) rather than file offsets.
    pub fn read_from<R: Read>(reader: &mut R) -> io::Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if &magic != b"BAI\x01" {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid BAI magic: expected \"BAI\\x01\", got {magic:?}"),
            ));
        }

        let n_ref = read_i32_le(reader)?;
        if n_ref < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid reference count: {n_ref}"),
            ));
        }

        let mut references = Vec::with_capacity(n_ref as usize);
        for _ in 0..n_ref {
            references.push(Self::read_reference_index(reader)?);
        }

        // The unplaced-record count trails the last reference and is
        // optional; distinguish "absent" from a torn write.
        let n_no_coor = match try_read_u64_le(reader)? {
            TailRead::Value(v) => Some(v),
            TailRead::Absent => None,
        };

        Ok(BaiIndex {
            references,
            n_no_coor,
        })
    }

    fn read_reference_index<R: Read>(reader: &mut R) -> io::Result<ReferenceIndex> {
        let n_bin = read_i32_le(reader)?;
        if n_bin < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid bin count: {n_bin}"),
            ));
        }

        let mut bins = Vec::with_capacity(n_bin as usize);
        let mut counts = None;

        for _ in 0..n_bin {
            let bin_id = read_u32_le(reader)?;
            let n_chunk = read_i32_le(reader)?;
            if n_chunk < 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid chunk count in bin {bin_id}: {n_chunk}"),
                ));
            }

            if bin_id == PSEUDO_BIN {
                // Pseudo-chunk 1 is the placed-unmapped offset range
                // (unused here); pseudo-chunk 2 is the count pair.
                let mut pair = [0u64; 4];
                for slot in pair.iter_mut().take((n_chunk as usize * 2).min(4)) {
                    *slot = read_u64_le(reader)?;
                }
                for _ in 4..(n_chunk as usize * 2) {
                    read_u64_le(reader)?;
                }
                if n_chunk >= 2 {
                    counts = Some(ReferenceCounts {
                        mapped: pair[2],
                        unmapped: pair[3],
                    });
                }
                continue;
            }
            if bin_id > MAX_BIN {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("bin id {bin_id} out of range"),
                ));
            }

            let mut chunks = Vec::with_capacity(n_chunk as usize);
            for _ in 0..n_chunk {
                let start = VirtualOffset::from_raw(read_u64_le(reader)?);
                let end = VirtualOffset::from_raw(read_u64_le(reader)?);
                chunks.push(Chunk::new(start, end));
            }
            bins.push(Bin { bin_id, chunks });
        }

        let n_intv = read_i32_le(reader)?;
        if n_intv < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid window count: {n_intv}"),
            ));
        }
        let mut intervals = Vec::with_capacity(n_intv as usize);
        for _ in 0..n_intv {
            intervals.push(VirtualOffset::from_raw(read_u64_le(reader)?));
        }

        Ok(ReferenceIndex {
            bins,
            intervals,
            counts,
        })
    }

    /// Number of references the index covers.
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Whether `ref_id` falls inside the indexed references.
    pub fn has_reference(&self, ref_id: usize) -> bool {
        ref_id < self.references.len()
    }

    /// Byte ranges that could contain records overlapping
    /// `[start, end)` on `ref_id`, sorted and merged.
    pub fn region_chunks(&self, ref_id: usize, start: i32, end: i32) -> Result<SortedChunkList> {
        let reference = self.references.get(ref_id).ok_or_else(|| {
            BamseekError::InvalidRange(format!(
                "reference {ref_id} out of range (index covers {})",
                self.references.len()
            ))
        })?;

        let start = start.max(0);
        let end = end.min(MAX_POSITION);
        if start >= end {
            return Ok(SortedChunkList::default());
        }

        let bin_ids = region_to_bins(start, end);
        let mut chunks = Vec::new();
        for bin in &reference.bins {
            if bin_ids.contains(&bin.bin_id) {
                chunks.extend_from_slice(&bin.chunks);
            }
        }
        if chunks.is_empty() {
            return Ok(SortedChunkList::default());
        }

        if let Some(min_offset) = reference.min_offset(start) {
            chunks.retain(|chunk| chunk.end >= min_offset);
        }

        Ok(SortedChunkList::from_unsorted(chunks))
    }

    /// Chunks covering everything placed on `ref_id`.
    pub fn whole_reference_chunks(&self, ref_id: usize) -> Result<SortedChunkList> {
        self.region_chunks(ref_id, 0, MAX_POSITION)
    }

    /// Mapped-record count for a reference; -1 when the id is out of
    /// range or the index recorded no counts. Never fails.
    pub fn mapped_count(&self, ref_id: usize) -> i64 {
        match self.references.get(ref_id).and_then(|r| r.counts) {
            Some(c) => c.mapped as i64,
            None => -1,
        }
    }

    /// Unmapped-record count for a reference; -1 when unavailable.
    pub fn unmapped_count(&self, ref_id: usize) -> i64 {
        match self.references.get(ref_id).and_then(|r| r.counts) {
            Some(c) => c.unmapped as i64,
            None => -1,
        }
    }

    /// Mapped-record count by reference name; -1 for unknown names.
    pub fn mapped_count_by_name(&self, name: &str, header: &Header) -> i64 {
        match header.reference_id(name) {
            Some(id) => self.mapped_count(id),
            None => -1,
        }
    }

    /// Unmapped-record count by reference name; -1 for unknown names.
    pub fn unmapped_count_by_name(&self, name: &str, header: &Header) -> i64 {
        match header.reference_id(name) {
            Some(id) => self.unmapped_count(id),
            None => -1,
        }
    }

    /// Count of records with no placement, when the index recorded it.
    pub fn unplaced_count(&self) -> Option<u64> {
        self.n_no_coor
    }
}

fn index_load_error(path: &Path, err: &io::Error) -> BamseekError {
    BamseekError::IndexLoad(format!("{}: {err}", path.display()))
}

/// Bin ids, across all six levels, whose interval intersects
/// `[start, end)`.
pub fn region_to_bins(start: i32, end: i32) -> Vec<u32> {
    let start = start.max(0);
    let end = (end.min(MAX_POSITION) - 1).max(start); // inclusive
    let mut bins = vec![0u32];
    for shift in [26, 23, 20, 17, 14] {
        let offset = ((1 << (29 - shift)) - 1) / 7;
        for bin in (offset + (start >> shift))..=(offset + (end >> shift)) {
            bins.push(bin as u32);
        }
    }
    bins
}

/// The smallest bin fully containing `[start, end)`; used when filing a
/// record into an index.
pub fn region_to_bin(start: i32, end: i32) -> u32 {
    let end = end - 1;
    for shift in [14, 17, 20, 23, 26] {
        if start >> shift == end >> shift {
            let offset = ((1 << (29 - shift)) - 1) / 7;
            return (offset + (start >> shift)) as u32;
        }
    }
    0
}

fn read_i32_le<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u32_le<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64_le<R: Read>(reader: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

enum TailRead {
    Value(u64),
    Absent,
}

/// Read a trailing u64 that may legitimately be absent, but must not be
/// torn.
fn try_read_u64_le<R: Read>(reader: &mut R) -> io::Result<TailRead> {
    let mut buf = [0u8; 8];
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return Ok(TailRead::Absent);
                }
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("index ends {filled} bytes into the trailing count"),
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(TailRead::Value(u64::from_le_bytes(buf)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn voff(raw: u64) -> VirtualOffset {
        VirtualOffset::from_raw(raw)
    }

    fn push_i32(out: &mut Vec<u8>, v: i32) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    fn push_u32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    fn push_u64(out: &mut Vec<u8>, v: u64) {
        out.extend_from_slice(&v.to_le_bytes());
    }

    /// One reference's worth of raw index data for the builder below.
    struct RefSpec {
        bins: Vec<(u32, Vec<(u64, u64)>)>,
        intervals: Vec<u64>,
        counts: Option<(u64, u64)>,
    }

    fn bai_bytes(refs: &[RefSpec], n_no_coor: Option<u64>) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"BAI\x01");
        push_i32(&mut out, refs.len() as i32);
        for spec in refs {
            let n_bin = spec.bins.len() as i32 + i32::from(spec.counts.is_some());
            push_i32(&mut out, n_bin);
            for (bin_id, chunks) in &spec.bins {
                push_u32(&mut out, *bin_id);
                push_i32(&mut out, chunks.len() as i32);
                for (start, end) in chunks {
                    push_u64(&mut out, *start);
                    push_u64(&mut out, *end);
                }
            }
            if let Some((mapped, unmapped)) = spec.counts {
                push_u32(&mut out, 37450);
                push_i32(&mut out, 2);
                push_u64(&mut out, 0); // placed-unmapped range start
                push_u64(&mut out, 0); // placed-unmapped range end
                push_u64(&mut out, mapped);
                push_u64(&mut out, unmapped);
            }
            push_i32(&mut out, spec.intervals.len() as i32);
            for ioffset in &spec.intervals {
                push_u64(&mut out, *ioffset);
            }
        }
        if let Some(n) = n_no_coor {
            push_u64(&mut out, n);
        }
        out
    }

    #[test]
    fn test_virtual_offset_round_trip() {
        let offset = VirtualOffset::new(12345, 67);
        assert_eq!(offset.compressed_offset(), 12345);
        assert_eq!(offset.uncompressed_offset(), 67);
        assert_eq!(VirtualOffset::from_raw(offset.as_raw()), offset);
    }

    #[test]
    fn test_virtual_offset_ordering_is_lexicographic() {
        let pairs = [(0u64, 0u16), (0, 1), (1, 0), (1, 65535), (2, 0)];
        for (i, &(c1, u1)) in pairs.iter().enumerate() {
            for &(c2, u2) in &pairs[i + 1..] {
                let a = VirtualOffset::new(c1, u1);
                let b = VirtualOffset::new(c2, u2);
                assert!(a < b, "({c1},{u1}) should sort before ({c2},{u2})");
            }
        }
    }

    #[test]
    fn test_region_to_bins_levels() {
        let bins = region_to_bins(100_000, 200_000);
        // Bin 0 plus one bin per coarse level, two at level 4, seven at
        // level 5 (windows 6..=12).
        for expected in [0u32, 1, 9, 73, 585, 586] {
            assert!(bins.contains(&expected), "missing bin {expected}");
        }
        for window in 6..=12u32 {
            assert!(bins.contains(&(4681 + window)));
        }
        assert_eq!(bins.len(), 13);
    }

    #[test]
    fn test_region_to_bin_smallest_container() {
        assert_eq!(region_to_bin(100, 200), 4681);
        assert_eq!(region_to_bin(16384, 16385), 4682);
        // Spans two 16 Kbp windows, so the level above holds it.
        assert_eq!(region_to_bin(16000, 17000), 585);
        assert_eq!(region_to_bin(0, MAX_POSITION), 0);
    }

    #[test]
    fn test_chunk_merge_adjacent_and_overlapping() {
        let list = SortedChunkList::from_unsorted(vec![
            Chunk::new(voff(20), voff(30)),
            Chunk::new(voff(10), voff(20)),
        ]);
        assert_eq!(list.as_slice(), &[Chunk::new(voff(10), voff(30))]);

        let list = SortedChunkList::from_unsorted(vec![
            Chunk::new(voff(10), voff(20)),
            Chunk::new(voff(25), voff(35)),
        ]);
        assert_eq!(
            list.as_slice(),
            &[
                Chunk::new(voff(10), voff(20)),
                Chunk::new(voff(25), voff(35)),
            ]
        );
    }

    #[test]
    fn test_chunk_merge_contained() {
        let list = SortedChunkList::from_unsorted(vec![
            Chunk::new(voff(10), voff(100)),
            Chunk::new(voff(20), voff(30)),
        ]);
        assert_eq!(list.as_slice(), &[Chunk::new(voff(10), voff(100))]);
    }

    #[test]
    fn test_parse_index_with_counts_and_tail() {
        let bytes = bai_bytes(
            &[
                RefSpec {
                    bins: vec![(4681, vec![(100, 200)]), (0, vec![(50, 400)])],
                    intervals: vec![100],
                    counts: Some((7, 2)),
                },
                RefSpec {
                    bins: vec![],
                    intervals: vec![],
                    counts: None,
                },
            ],
            Some(11),
        );

        let index = BaiIndex::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(index.reference_count(), 2);
        assert!(index.has_reference(1));
        assert!(!index.has_reference(2));

        // The pseudo-bin becomes counts, not a queryable bin.
        assert_eq!(index.references[0].bins.len(), 2);
        assert_eq!(index.mapped_count(0), 7);
        assert_eq!(index.unmapped_count(0), 2);
        assert_eq!(index.mapped_count(1), -1);
        assert_eq!(index.mapped_count(99), -1);
        assert_eq!(index.unplaced_count(), Some(11));
    }

    #[test]
    fn test_parse_index_without_tail() {
        let bytes = bai_bytes(
            &[RefSpec {
                bins: vec![],
                intervals: vec![],
                counts: None,
            }],
            None,
        );
        let index = BaiIndex::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(index.unplaced_count(), None);
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        let err = BaiIndex::read_from(&mut Cursor::new(b"CSI\x01".to_vec())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_parse_rejects_torn_tail() {
        let mut bytes = bai_bytes(
            &[RefSpec {
                bins: vec![],
                intervals: vec![],
                counts: None,
            }],
            Some(5),
        );
        bytes.truncate(bytes.len() - 3);
        let err = BaiIndex::read_from(&mut Cursor::new(bytes)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_region_chunks_gathers_all_levels() {
        // Records filed under a fine bin and a coarse bin both matter.
        let bytes = bai_bytes(
            &[RefSpec {
                bins: vec![
                    (4681, vec![(1_000, 2_000)]),
                    (0, vec![(10, 500)]),
                    // Far-away fine bin that must not be returned.
                    (4681 + 100, vec![(9_000, 9_500)]),
                ],
                intervals: vec![10],
                counts: None,
            }],
            None,
        );
        let index = BaiIndex::read_from(&mut Cursor::new(bytes)).unwrap();

        let list = index.region_chunks(0, 100, 200).unwrap();
        assert_eq!(
            list.as_slice(),
            &[
                Chunk::new(voff(10), voff(500)),
                Chunk::new(voff(1_000), voff(2_000)),
            ]
        );
    }

    #[test]
    fn test_region_chunks_prunes_with_linear_index() {
        // Window 1 (16384..32768) starts at offset 5_000; a chunk ending
        // before that cannot hold overlapping records.
        let bytes = bai_bytes(
            &[RefSpec {
                bins: vec![
                    (4682, vec![(5_000, 6_000)]),
                    (0, vec![(100, 400)]),
                ],
                intervals: vec![100, 5_000],
                counts: None,
            }],
            None,
        );
        let index = BaiIndex::read_from(&mut Cursor::new(bytes)).unwrap();

        let list = index.region_chunks(0, 20_000, 30_000).unwrap();
        assert_eq!(list.as_slice(), &[Chunk::new(voff(5_000), voff(6_000))]);

        // Querying from the first window keeps both.
        let list = index.region_chunks(0, 0, 30_000).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_region_chunks_out_of_range_reference() {
        let bytes = bai_bytes(
            &[RefSpec {
                bins: vec![],
                intervals: vec![],
                counts: None,
            }],
            None,
        );
        let index = BaiIndex::read_from(&mut Cursor::new(bytes)).unwrap();
        assert!(matches!(
            index.region_chunks(3, 0, 100),
            Err(BamseekError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_empty_query_range() {
        let bytes = bai_bytes(
            &[RefSpec {
                bins: vec![(0, vec![(1, 2)])],
                intervals: vec![],
                counts: None,
            }],
            None,
        );
        let index = BaiIndex::read_from(&mut Cursor::new(bytes)).unwrap();
        assert!(index.region_chunks(0, 500, 500).unwrap().is_empty());
    }
}
