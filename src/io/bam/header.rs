//! BAM header reading and writing.
//!
//! Every BAM data stream opens with the same envelope: magic bytes, the
//! SAM header text, then the reference dictionary that record reference
//! ids point into.
//!
//! # Format
//!
//! ```text
//! BAM Header:
//! - 4 bytes: Magic ("BAM\1")
//! - 4 bytes: SAM header text length (l_text, int32)
//! - l_text bytes: SAM header text
//! - 4 bytes: Number of reference sequences (n_ref, int32)
//! - For each reference:
//!   - 4 bytes: Name length (l_name, int32, includes null terminator)
//!   - l_name bytes: Name (null-terminated)
//!   - 4 bytes: Sequence length (int32)
//! ```

use std::io::{self, Read, Write};

/// BAM magic bytes.
pub const BAM_MAGIC: &[u8; 4] = b"BAM\x01";

/// One reference sequence from the dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Reference sequence name (e.g., "chr1", "chrM")
    pub name: String,
    /// Reference sequence length in bases
    pub length: u32,
}

impl Reference {
    /// Create a reference dictionary entry.
    pub fn new(name: impl Into<String>, length: u32) -> Self {
        Self {
            name: name.into(),
            length,
        }
    }
}

/// BAM file header: SAM header text plus the reference dictionary.
///
/// Records carry reference *ids*; this is the table that gives them
/// names and lengths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// SAM header text (@HD, @SQ, @RG, @PG lines)
    pub text: String,
    /// Reference sequences, in id order
    pub references: Vec<Reference>,
}

impl Header {
    /// Build a header from SAM text and a reference dictionary.
    pub fn new(text: impl Into<String>, references: Vec<Reference>) -> Self {
        Self {
            text: text.into(),
            references,
        }
    }

    /// Get a reference by id. `None` when the id is out of bounds.
    pub fn reference(&self, id: usize) -> Option<&Reference> {
        self.references.get(id)
    }

    /// Get a reference name by id.
    pub fn reference_name(&self, id: usize) -> Option<&str> {
        self.reference(id).map(|r| r.name.as_str())
    }

    /// Find the id of a named reference.
    pub fn reference_id(&self, name: &str) -> Option<usize> {
        self.references.iter().position(|r| r.name == name)
    }

    /// Number of reference sequences.
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// The `SO:` value from the `@HD` line, if the header declares one
    /// (e.g. "coordinate", "queryname", "unsorted").
    pub fn sort_order_text(&self) -> Option<&str> {
        let hd = self.text.lines().find(|line| line.starts_with("@HD"))?;
        hd.split('\t')
            .find_map(|field| field.strip_prefix("SO:"))
    }
}

/// Read and validate the complete BAM header.
///
/// # Example
///
/// ```no_run
/// use bamseek::io::bam::header::read_header;
/// use std::fs::File;
/// use std::io::BufReader;
///
/// # fn main() -> std::io::Result<()> {
/// let file = File::open("alignments.bam")?;
/// let mut reader = BufReader::new(file);
/// let header = read_header(&mut reader)?;
/// println!("References: {}", header.reference_count());
/// # Ok(())
/// # }
/// ```
pub fn read_header<R: Read>(reader: &mut R) -> io::Result<Header> {
    read_magic(reader)?;
    let text = read_header_text(reader)?;
    let references = read_references(reader)?;
    Ok(Header::new(text, references))
}

/// Write the complete header, magic bytes included.
pub fn write_header<W: Write>(writer: &mut W, header: &Header) -> io::Result<()> {
    writer.write_all(BAM_MAGIC)?;

    let text = header.text.as_bytes();
    writer.write_all(&(text.len() as i32).to_le_bytes())?;
    writer.write_all(text)?;

    writer.write_all(&(header.references.len() as i32).to_le_bytes())?;
    for reference in &header.references {
        let name = reference.name.as_bytes();
        writer.write_all(&((name.len() + 1) as i32).to_le_bytes())?;
        writer.write_all(name)?;
        writer.write_all(&[0])?;
        writer.write_all(&(reference.length as i32).to_le_bytes())?;
    }
    Ok(())
}

fn read_magic<R: Read>(reader: &mut R) -> io::Result<()> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != BAM_MAGIC {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid BAM magic: expected {BAM_MAGIC:?}, got {magic:?}"),
        ));
    }
    Ok(())
}

fn read_header_text<R: Read>(reader: &mut R) -> io::Result<String> {
    let len = read_i32_le(reader)?;
    if len < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid SAM header length: {len}"),
        ));
    }

    let mut text = vec![0u8; len as usize];
    reader.read_exact(&mut text)?;
    String::from_utf8(text).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid UTF-8 in SAM header: {e}"),
        )
    })
}

fn read_references<R: Read>(reader: &mut R) -> io::Result<Vec<Reference>> {
    let count = read_i32_le(reader)?;
    if count < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid reference count: {count}"),
        ));
    }

    let mut references = Vec::with_capacity(count as usize);
    for i in 0..count {
        let reference = read_reference(reader).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("error reading reference {i}: {e}"),
            )
        })?;
        references.push(reference);
    }
    Ok(references)
}

fn read_reference<R: Read>(reader: &mut R) -> io::Result<Reference> {
    let name_len = read_i32_le(reader)?;
    if name_len <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid reference name length: {name_len}"),
        ));
    }

    let mut name = vec![0u8; name_len as usize];
    reader.read_exact(&mut name)?;
    if name.pop() != Some(0) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "reference name not null-terminated",
        ));
    }
    let name = String::from_utf8(name).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid UTF-8 in reference name: {e}"),
        )
    })?;

    let length = read_i32_le(reader)?;
    if length < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid reference length: {length}"),
        ));
    }

    Ok(Reference::new(name, length as u32))
}

fn read_i32_le<R: Read>(reader: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}
