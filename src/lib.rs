//! bamseek: random access to coordinate-sorted alignment data.
//!
//! # Overview
//!
//! bamseek reads and writes BAM-family files over pluggable byte
//! streams, with the compression format detected from content. Loading
//! a sidecar BAI index turns a reader into a region reader: it visits
//! only the byte ranges that can hold records overlapping a genomic
//! interval, instead of scanning the file.
//!
//! ## Key pieces
//!
//! - **Byte streams**: uncompressed, gzip, and block-gzip (BGZF)
//!   backends behind one trait, chosen by sniffing the first bytes
//! - **Virtual offsets**: stable positions into block-compressed data,
//!   usable for `tell`/`seek` round trips
//! - **Coordinate index**: BAI bins, linear windows, chunk merging, and
//!   per-reference record counts
//! - **Read sections**: iterate one reference or one `[start, end)`
//!   range of it, with overlap or strict-containment filtering
//! - **Sort checking**: declared record order is verified as a side
//!   channel, never by interrupting the stream
//!
//! ## Quick Start
//!
//! ```no_run
//! use bamseek::{BamReader, ReadSection};
//!
//! # fn main() -> bamseek::Result<()> {
//! let mut bam = BamReader::open("alignments.bam")?;
//! bam.load_default_index()?;
//!
//! bam.set_read_section(ReadSection::named("chr7").with_range(140_000, 160_000))?;
//! while let Some(record) = bam.read_record()? {
//!     println!("{} at {:?}", record.name, record.position());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`io::backend`]: stream formats, sniffing, and the
//!   [`ByteStream`](io::backend::ByteStream) trait
//! - [`io::bgzf`]: the BGZF block codec (reader, writer, EOF marker)
//! - [`io::buffered`]: byte-level buffering with explicit control
//! - [`io::bam`]: header, record, index, reader, and writer types

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod error;
pub mod io;

// Re-export commonly used types
pub use error::{BamseekError, Result};
pub use io::bam::{
    BaiIndex, BamReader, BamWriter, Header, ReadSection, Record, Reference, SortPolicy,
    VirtualOffset,
};
pub use io::{BufferedStream, ByteStream, StreamFormat, StreamOptions};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
