//! BAM (Binary Alignment Map) support: headers, records, indexes, and
//! readers/writers built on the byte-stream layer.
//!
//! The pieces compose rather than stack:
//!
//! - [`header`]: the file envelope (magic, SAM text, reference
//!   dictionary)
//! - [`record`]: the record codec, decoded only as far as coordinate
//!   filtering needs
//! - [`index`]: BAI sidecar files mapped to chunk lists and counts
//! - [`reader`]: sequential reading, and sectioned reading driven by a
//!   loaded index
//! - [`writer`]: sequential writing with block-boundary control
//!
//! # Example
//!
//! ```no_run
//! use bamseek::io::bam::{BamReader, ReadSection};
//!
//! # fn main() -> bamseek::Result<()> {
//! let mut bam = BamReader::open("alignments.bam")?;
//! println!("{} references", bam.header().reference_count());
//!
//! // Whole-file streaming
//! for record in bam.records() {
//!     let record = record?;
//!     println!("{}", record.name);
//! }
//!
//! // Indexed region reading
//! bam.load_default_index()?;
//! bam.set_read_section(ReadSection::named("chr1").with_range(1_000, 2_000))?;
//! while let Some(record) = bam.read_record()? {
//!     println!("{} overlaps by {}", record.name, bam.section_overlap(&record));
//! }
//! # Ok(())
//! # }
//! ```

pub mod header;
pub mod index;
pub mod reader;
pub mod record;
pub mod writer;

// Re-export main types for convenience
pub use header::{Header, Reference};
pub use index::{BaiIndex, Chunk, ReferenceCounts, SortedChunkList, VirtualOffset};
pub use reader::{BamReader, ReadSection, Records, SortPolicy};
pub use record::Record;
pub use writer::BamWriter;
