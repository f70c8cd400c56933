//! I/O module: pluggable byte streams, block compression, buffering,
//! and the BAM layer on top of them.
//!
//! The layering is strict: [`backend`] opens and sniffs raw streams,
//! [`bgzf`] implements the block-compressed codec, [`buffered`] puts a
//! byte-level buffer over any backend, and [`bam`] interprets the
//! bytes.

pub mod backend;
pub mod bam;
pub mod bgzf;
pub mod buffered;

pub use backend::{
    detect_stream_format, open_stream, open_stream_with, ByteStream, StreamFormat, StreamOptions,
    StreamWriter,
};
pub use bam::{BamReader, BamWriter};
pub use bgzf::{BgzfReader, BgzfWriter};
pub use buffered::BufferedStream;
