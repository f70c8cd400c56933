//! Error types for bamseek

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for bamseek operations
pub type Result<T> = std::result::Result<T, BamseekError>;

/// Error types that can occur in bamseek
#[derive(Debug, Error)]
pub enum BamseekError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to open a data or index file
    #[error("Failed to open {path}: {source}")]
    Open {
        /// Path that could not be opened
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Leading bytes of the file do not match any supported format
    #[error("Format detection failed: {0}")]
    FormatDetection(String),

    /// Sidecar index file is missing, truncated, or malformed
    #[error("Index load failed: {0}")]
    IndexLoad(String),

    /// Seek requested on a stream that cannot honor it
    #[error("Seek unsupported: {0}")]
    SeekUnsupported(String),

    /// Virtual-offset tell while read buffering holds undrained bytes
    #[error(
        "tell() on a BGZF stream is undefined while read buffering is active; \
         disable buffering (or seek) before querying the virtual offset"
    )]
    BufferedTellConflict,

    /// BGZF stream ends without the empty end-of-file block
    #[error("Truncated BGZF file: {0}")]
    Truncated(String),

    /// Record bytes cannot be decoded
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Reference name not present in the file header
    #[error("Unknown reference sequence: {0}")]
    UnknownReference(String),

    /// Invalid range or region
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Compression/decompression error
    #[error("Compression error: {0}")]
    Compression(String),
}
