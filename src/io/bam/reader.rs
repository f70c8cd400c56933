//! BAM reading: sequential, and random access through a loaded index.
//!
//! A [`BamReader`] always supports sequential reading. Loading a
//! [`BaiIndex`] and setting a read section turns it into a region
//! reader: records come back filtered to one reference (optionally one
//! `[start, end)` range of it), visiting only the byte ranges the index
//! selected.
//!
//! A section is a reading mode, not a query result. Setting one plans
//! the chunk walk; every subsequent [`BamReader::read_record`] call
//! advances through it until the section is exhausted. Two "no more
//! records" conditions are kept apart: [`BamReader::section_exhausted`]
//! reports that the walk passed the end of the section, while
//! [`BamReader::is_eof`] reports that the underlying stream ran out.
//!
//! Without an index (or on a stream whose positions are not virtual
//! offsets) a section degrades to a filtered scan of the remaining
//! records. The scan honors the same filters but cannot skip anything
//! or stop early.

use crate::error::{BamseekError, Result};
use crate::io::backend::{StreamFormat, StreamOptions};
use crate::io::bam::header::{read_header, Header};
use crate::io::bam::index::{BaiIndex, SortedChunkList, VirtualOffset, MAX_POSITION};
use crate::io::bam::record::{self, Record};
use crate::io::bgzf;
use crate::io::buffered::BufferedStream;
use std::io;
use std::path::{Path, PathBuf};

/// Record-ordering contract to check while reading.
///
/// Checking never interrupts the stream: out-of-order records are
/// counted and described, and reading continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortPolicy {
    /// Accept any order.
    Unsorted,
    /// Check whatever order the header's `@HD SO:` line declares;
    /// no declaration means no checking.
    #[default]
    AsDeclaredInHeader,
    /// Require (reference, position) order, unmapped records last.
    Coordinate,
    /// Require read-name order.
    QueryName,
}

/// The filters a read section applies, before any index lookup.
///
/// Build one with [`ReadSection::reference`] or [`ReadSection::named`],
/// then narrow it:
///
/// ```
/// use bamseek::io::bam::ReadSection;
///
/// let whole = ReadSection::named("chr2");
/// let range = ReadSection::named("chr2").with_range(1_000, 2_000);
/// let strict = ReadSection::reference(0).with_range(0, 500).contained_only();
/// # let _ = (whole, range, strict);
/// ```
#[derive(Debug, Clone)]
pub struct ReadSection {
    target: SectionTarget,
    range: Option<(i32, i32)>,
    contained: bool,
}

#[derive(Debug, Clone)]
enum SectionTarget {
    ById(usize),
    ByName(String),
}

impl ReadSection {
    /// Section over a reference by id.
    pub fn reference(ref_id: usize) -> Self {
        Self {
            target: SectionTarget::ById(ref_id),
            range: None,
            contained: false,
        }
    }

    /// Section over a reference by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            target: SectionTarget::ByName(name.into()),
            range: None,
            contained: false,
        }
    }

    /// Restrict to `[start, end)` on the reference. Without a range the
    /// section covers the whole reference.
    pub fn with_range(mut self, start: i32, end: i32) -> Self {
        self.range = Some((start, end));
        self
    }

    /// Only yield records lying entirely inside the range. The default
    /// yields every record overlapping it.
    pub fn contained_only(mut self) -> Self {
        self.contained = true;
        self
    }
}

/// Planned state for one active section.
#[derive(Debug)]
struct SectionState {
    ref_id: usize,
    start: i32,
    end: i32,
    contained: bool,
    /// Byte ranges to visit; `None` means filtered linear scan.
    chunks: Option<SortedChunkList>,
    chunk_idx: usize,
    exhausted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolvedOrder {
    None,
    Coordinate,
    QueryName,
}

/// Streaming order checker. Violations accumulate; they never stop the
/// stream.
#[derive(Debug)]
struct SortValidator {
    policy: SortPolicy,
    order: ResolvedOrder,
    prev_coord: Option<(u32, i32)>,
    prev_name: Option<String>,
    violations: u64,
    last_violation: Option<String>,
}

impl SortValidator {
    fn new(policy: SortPolicy, header: &Header) -> Self {
        let mut validator = Self {
            policy,
            order: ResolvedOrder::None,
            prev_coord: None,
            prev_name: None,
            violations: 0,
            last_violation: None,
        };
        validator.set_policy(policy, header);
        validator
    }

    fn set_policy(&mut self, policy: SortPolicy, header: &Header) {
        self.policy = policy;
        self.order = match policy {
            SortPolicy::Unsorted => ResolvedOrder::None,
            SortPolicy::Coordinate => ResolvedOrder::Coordinate,
            SortPolicy::QueryName => ResolvedOrder::QueryName,
            SortPolicy::AsDeclaredInHeader => match header.sort_order_text() {
                Some("coordinate") => ResolvedOrder::Coordinate,
                Some("queryname") => ResolvedOrder::QueryName,
                _ => ResolvedOrder::None,
            },
        };
        self.reset_position();
    }

    /// Forget the previous record. Called after any jump in the stream
    /// so the discontinuity itself is not counted.
    fn reset_position(&mut self) {
        self.prev_coord = None;
        self.prev_name = None;
    }

    fn observe(&mut self, record: &Record) {
        match self.order {
            ResolvedOrder::None => {}
            ResolvedOrder::Coordinate => {
                // Unmapped records sort after every reference.
                let key = (
                    if record.ref_id < 0 {
                        u32::MAX
                    } else {
                        record.ref_id as u32
                    },
                    record.pos,
                );
                if let Some(prev) = self.prev_coord {
                    if key < prev {
                        self.violations += 1;
                        self.last_violation = Some(format!(
                            "record '{}' at ref {}, pos {} breaks coordinate order \
                             (previous ref {}, pos {})",
                            record.name, record.ref_id, record.pos, prev.0 as i64, prev.1
                        ));
                    }
                }
                self.prev_coord = Some(key);
            }
            ResolvedOrder::QueryName => {
                if let Some(prev) = &self.prev_name {
                    if record.name < *prev {
                        self.violations += 1;
                        self.last_violation = Some(format!(
                            "record '{}' breaks queryname order (previous '{prev}')",
                            record.name
                        ));
                    }
                }
                self.prev_name = Some(record.name.clone());
            }
        }
    }
}

/// Reader for BAM data over any supported byte stream.
///
/// # Example
///
/// ```no_run
/// use bamseek::io::bam::{BamReader, ReadSection};
///
/// # fn main() -> bamseek::Result<()> {
/// let mut reader = BamReader::open("alignments.bam")?;
/// reader.load_default_index()?;
/// reader.set_read_section(ReadSection::named("chr1").with_range(10_000, 20_000))?;
/// while let Some(record) = reader.read_record()? {
///     println!("{} at {:?}", record.name, record.position());
/// }
/// # Ok(())
/// # }
/// ```
pub struct BamReader {
    stream: BufferedStream,
    header: Header,
    index: Option<BaiIndex>,
    section: Option<SectionState>,
    validator: SortValidator,
    data_path: Option<PathBuf>,
}

impl BamReader {
    /// Open a data file, detecting its compression from content.
    /// `"-"` reads from standard input.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, StreamOptions::default())
    }

    /// Open with explicit stream options.
    pub fn open_with<P: AsRef<Path>>(path: P, options: StreamOptions) -> Result<Self> {
        let path = path.as_ref();
        let stream = BufferedStream::open_with(path, options)?;
        let mut reader = Self::from_stream(stream)?;
        reader.data_path = Some(path.to_path_buf());
        Ok(reader)
    }

    /// Wrap an already-opened stream. The header is read immediately.
    pub fn from_stream(mut stream: BufferedStream) -> Result<Self> {
        let header = read_header(&mut stream).map_err(map_envelope_err)?;
        let validator = SortValidator::new(SortPolicy::default(), &header);
        Ok(Self {
            stream,
            header,
            index: None,
            section: None,
            validator,
            data_path: None,
        })
    }

    /// The header read at open time.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The loaded index, if any.
    pub fn index(&self) -> Option<&BaiIndex> {
        self.index.as_ref()
    }

    /// Whether an index has been loaded.
    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Load an index from an explicit path. On failure the reader keeps
    /// whatever index it had before.
    pub fn load_index<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let index = BaiIndex::from_path(path)?;
        self.index = Some(index);
        Ok(())
    }

    /// Load the sidecar index derived from the data path
    /// (`name.bam.bai`, then `name.bai`).
    pub fn load_default_index(&mut self) -> Result<()> {
        let data_path = self.data_path.clone().ok_or_else(|| {
            BamseekError::IndexLoad("no data path to derive an index from".to_string())
        })?;
        let index = BaiIndex::for_data_path(&data_path)?;
        self.index = Some(index);
        Ok(())
    }

    /// Restrict reading to one section of the data.
    ///
    /// With an index and a block-compressed stream, reading visits only
    /// the chunks the index selected, seeking past everything else.
    /// Otherwise the section filters a linear scan of the records after
    /// the current position.
    ///
    /// Setting a section disables read buffering so virtual offsets
    /// stay exact; [`clear_section`](Self::clear_section) re-enables it.
    ///
    /// An empty range is allowed and yields no records.
    pub fn set_read_section(&mut self, section: ReadSection) -> Result<()> {
        let ref_id = match &section.target {
            SectionTarget::ById(id) => {
                if *id >= self.header.reference_count() {
                    return Err(BamseekError::InvalidRange(format!(
                        "reference {id} out of range (header declares {})",
                        self.header.reference_count()
                    )));
                }
                *id
            }
            SectionTarget::ByName(name) => self
                .header
                .reference_id(name)
                .ok_or_else(|| BamseekError::UnknownReference(name.clone()))?,
        };

        let (start, end) = match section.range {
            Some((start, end)) => (start.max(0), end.min(MAX_POSITION)),
            None => (0, MAX_POSITION),
        };

        // Chunk walking compares stream positions against index
        // offsets, which only line up on a block-compressed stream.
        let chunks = match (&self.index, self.stream.backend_format()) {
            (Some(index), StreamFormat::BlockGzip) if start < end => {
                Some(index.region_chunks(ref_id, start, end)?)
            }
            (Some(_), StreamFormat::BlockGzip) => Some(SortedChunkList::default()),
            _ => None,
        };

        self.stream.disable_buffering();
        self.validator.reset_position();

        if let Some(first) = chunks.as_ref().and_then(|list| list.get(0)) {
            let target = first.start.as_raw();
            self.seek_if_needed(target)?;
        }

        self.section = Some(SectionState {
            ref_id,
            start,
            end,
            contained: section.contained,
            chunks,
            chunk_idx: 0,
            exhausted: false,
        });
        Ok(())
    }

    /// Drop the active section and return to plain sequential reading
    /// from the current position. Read buffering is re-enabled.
    pub fn clear_section(&mut self) {
        self.section = None;
        self.stream.enable_buffering();
        self.validator.reset_position();
    }

    /// Whether the last `Ok(None)` came from passing the end of the
    /// active section rather than the end of the stream.
    pub fn section_exhausted(&self) -> bool {
        self.section.as_ref().is_some_and(|s| s.exhausted)
    }

    /// Whether the underlying stream has reached its end.
    pub fn is_eof(&self) -> bool {
        self.stream.eof()
    }

    /// Read the next record, honoring the active section.
    ///
    /// `Ok(None)` means no more records here: either the section is
    /// exhausted (see [`section_exhausted`](Self::section_exhausted))
    /// or the stream ended.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        match self.section.take() {
            None => {
                let next = self.read_next()?;
                if let Some(record) = &next {
                    self.validator.observe(record);
                }
                Ok(next)
            }
            Some(mut state) => {
                let result = self.read_in_section(&mut state);
                self.section = Some(state);
                result
            }
        }
    }

    fn read_in_section(&mut self, state: &mut SectionState) -> Result<Option<Record>> {
        if state.exhausted {
            return Ok(None);
        }
        loop {
            if state.chunks.is_some() && !self.position_in_chunks(state)? {
                state.exhausted = true;
                return Ok(None);
            }

            let record = match self.read_next()? {
                Some(record) => record,
                // Stream ended before the section did.
                None => return Ok(None),
            };

            match record.reference_id() {
                Some(id) if id == state.ref_id => {}
                Some(id) if id > state.ref_id && state.chunks.is_some() => {
                    // Indexed data is coordinate-sorted: a later
                    // reference means the section is behind us.
                    state.exhausted = true;
                    return Ok(None);
                }
                _ => continue,
            }

            let pos = match record.position() {
                Some(pos) => pos,
                None => continue,
            };
            if pos >= state.end {
                if state.chunks.is_some() {
                    // Coordinate-sorted: records only start later.
                    state.exhausted = true;
                    return Ok(None);
                }
                continue;
            }

            let end_pos = match record.alignment_end() {
                Some(end) => end,
                None => continue,
            };
            let keep = if state.contained {
                pos >= state.start && end_pos <= state.end
            } else {
                end_pos > state.start
            };
            if keep {
                // Ordering is a contract on what the caller receives;
                // records the filters drop are not part of it.
                self.validator.observe(&record);
                return Ok(Some(record));
            }
        }
    }

    /// Ensure the stream sits inside the chunk list, advancing and
    /// seeking as chunks are consumed. Returns false when the walk is
    /// complete.
    fn position_in_chunks(&mut self, state: &mut SectionState) -> Result<bool> {
        loop {
            let current = match state.chunks.as_ref().and_then(|c| c.get(state.chunk_idx)) {
                Some(chunk) => *chunk,
                None => return Ok(false),
            };
            let offset = VirtualOffset::from_raw(self.stream.tell()?);
            if offset >= current.end {
                state.chunk_idx += 1;
                continue;
            }
            if offset < current.start {
                self.seek_if_needed(current.start.as_raw())?;
            }
            return Ok(true);
        }
    }

    fn seek_if_needed(&mut self, target: u64) -> Result<()> {
        if self.stream.buffered_len() == 0 {
            if let Ok(current) = self.stream.tell() {
                if current == target {
                    return Ok(());
                }
            }
        }
        self.stream.seek(target)
    }

    fn read_next(&mut self) -> Result<Option<Record>> {
        record::read_record(&mut self.stream).map_err(map_record_err)
    }

    /// Iterator over the remaining records of the current mode.
    pub fn records(&mut self) -> Records<'_> {
        Records { reader: self }
    }

    /// Ordering policy applied to subsequent reads. Position history is
    /// reset; accumulated violation counts are kept.
    pub fn set_sort_policy(&mut self, policy: SortPolicy) {
        self.validator.set_policy(policy, &self.header);
    }

    /// The active ordering policy.
    pub fn sort_policy(&self) -> SortPolicy {
        self.validator.policy
    }

    /// Number of ordering violations observed so far.
    pub fn sort_violations(&self) -> u64 {
        self.validator.violations
    }

    /// Description of the most recent ordering violation.
    pub fn last_sort_violation(&self) -> Option<&str> {
        self.validator.last_violation.as_deref()
    }

    /// Current stream position (a virtual offset on block-compressed
    /// streams). Subject to the buffering restrictions of
    /// [`BufferedStream::tell`].
    pub fn tell(&self) -> Result<u64> {
        self.stream.tell()
    }

    /// Jump to a previously observed position. Clears any active
    /// section.
    ///
    /// Unlike [`clear_section`](Self::clear_section), this leaves the
    /// buffering state alone: a section's disabled buffering stays
    /// disabled, so a [`tell`](Self::tell) right after the seek is
    /// still exact.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.section = None;
        self.validator.reset_position();
        self.stream.seek(offset)
    }

    /// Return to the first record. Clears any active section.
    pub fn rewind(&mut self) -> Result<()> {
        self.section = None;
        self.validator.reset_position();
        self.stream.rewind()?;
        // Skip back over the envelope.
        read_header(&mut self.stream).map_err(map_envelope_err)?;
        Ok(())
    }

    /// Disable read buffering so `tell` stays exact on block-compressed
    /// streams.
    pub fn disable_buffering(&mut self) {
        self.stream.disable_buffering();
    }

    /// Restore the default read buffering.
    pub fn enable_buffering(&mut self) {
        self.stream.enable_buffering();
    }

    /// Mapped-record count for a reference id, from the index;
    /// -1 without an index or counts.
    pub fn mapped_count(&self, ref_id: usize) -> i64 {
        self.index.as_ref().map_or(-1, |i| i.mapped_count(ref_id))
    }

    /// Placed-unmapped count for a reference id; -1 when unavailable.
    pub fn unmapped_count(&self, ref_id: usize) -> i64 {
        self.index.as_ref().map_or(-1, |i| i.unmapped_count(ref_id))
    }

    /// Mapped-record count for a reference name; -1 when unavailable.
    pub fn mapped_count_by_name(&self, name: &str) -> i64 {
        self.index
            .as_ref()
            .map_or(-1, |i| i.mapped_count_by_name(name, &self.header))
    }

    /// Placed-unmapped count for a reference name; -1 when unavailable.
    pub fn unmapped_count_by_name(&self, name: &str) -> i64 {
        self.index
            .as_ref()
            .map_or(-1, |i| i.unmapped_count_by_name(name, &self.header))
    }

    /// Count of fully unplaced records, when the index recorded it.
    pub fn unplaced_count(&self) -> Option<u64> {
        self.index.as_ref().and_then(|i| i.unplaced_count())
    }

    /// Bases shared between a record and the active section's range.
    /// Zero without a section, or when the record is elsewhere.
    pub fn section_overlap(&self, record: &Record) -> i32 {
        match &self.section {
            Some(state) if record.reference_id() == Some(state.ref_id) => {
                record.overlap_length(state.start, state.end)
            }
            _ => 0,
        }
    }
}

impl std::fmt::Debug for BamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BamReader")
            .field("references", &self.header.reference_count())
            .field("has_index", &self.index.is_some())
            .field("in_section", &self.section.is_some())
            .finish()
    }
}

/// Iterator over records; yields until the current mode runs out.
pub struct Records<'a> {
    reader: &'a mut BamReader,
}

impl Iterator for Records<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.read_record().transpose()
    }
}

fn map_envelope_err(e: io::Error) -> BamseekError {
    if bgzf::is_block_corruption(&e) {
        BamseekError::Compression(e.to_string())
    } else if e.kind() == io::ErrorKind::UnexpectedEof {
        BamseekError::Truncated(format!("data ends inside the header: {e}"))
    } else {
        BamseekError::Io(e)
    }
}

fn map_record_err(e: io::Error) -> BamseekError {
    if bgzf::is_block_corruption(&e) {
        return BamseekError::Compression(e.to_string());
    }
    match e.kind() {
        io::ErrorKind::UnexpectedEof => BamseekError::Truncated(e.to_string()),
        io::ErrorKind::InvalidData => BamseekError::InvalidRecord(e.to_string()),
        _ => BamseekError::Io(e),
    }
}
