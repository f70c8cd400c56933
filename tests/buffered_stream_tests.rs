//! Buffered reading over real files in each supported format.

use bamseek::error::BamseekError;
use bamseek::io::bgzf::BgzfWriter;
use bamseek::io::{BufferedStream, StreamFormat, StreamOptions};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const LINES: &str = "alpha\nbeta\ngamma\n";

fn plain_file(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn gzip_file(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
    encoder.write_all(contents).unwrap();
    encoder.finish().unwrap();
    path
}

fn bgzf_file(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    let mut writer = BgzfWriter::new(File::create(&path).unwrap());
    writer.write_all(contents).unwrap();
    writer.finish().unwrap();
    path
}

fn read_all_lines(path: &Path) -> Vec<String> {
    let mut stream = BufferedStream::open(path).unwrap();
    let mut lines = Vec::new();
    let mut line = String::new();
    while stream.read_line(&mut line).unwrap() {
        lines.push(std::mem::take(&mut line));
    }
    lines
}

#[test]
fn test_lines_identical_across_formats() {
    let dir = TempDir::new().unwrap();
    let plain = plain_file(&dir, "data.txt", LINES.as_bytes());
    let gz = gzip_file(&dir, "data.txt.gz", LINES.as_bytes());
    let bgzf = bgzf_file(&dir, "data.bgzf", LINES.as_bytes());

    let expected = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
    assert_eq!(read_all_lines(&plain), expected);
    assert_eq!(read_all_lines(&gz), expected);
    assert_eq!(read_all_lines(&bgzf), expected);
}

#[test]
fn test_format_detected_from_content_not_name() {
    let dir = TempDir::new().unwrap();
    // Misleading names; the sniffer must not care.
    let gz = gzip_file(&dir, "actually_gzip.txt", LINES.as_bytes());
    let bgzf = bgzf_file(&dir, "actually_bgzf.txt", LINES.as_bytes());
    let plain = plain_file(&dir, "actually_plain.gz", LINES.as_bytes());

    assert_eq!(
        BufferedStream::open(&gz).unwrap().backend_format(),
        StreamFormat::Gzip
    );
    assert_eq!(
        BufferedStream::open(&bgzf).unwrap().backend_format(),
        StreamFormat::BlockGzip
    );
    assert_eq!(
        BufferedStream::open(&plain).unwrap().backend_format(),
        StreamFormat::Uncompressed
    );
}

#[test]
fn test_read_char_and_eof() {
    let dir = TempDir::new().unwrap();
    let path = plain_file(&dir, "short.txt", b"ab");

    let mut stream = BufferedStream::open(&path).unwrap();
    assert!(!stream.eof());
    assert_eq!(stream.read_char().unwrap(), Some(b'a'));
    assert_eq!(stream.read_char().unwrap(), Some(b'b'));
    assert_eq!(stream.read_char().unwrap(), None);
    assert!(stream.eof());
}

#[test]
fn test_rewind_restarts_all_formats() {
    let dir = TempDir::new().unwrap();
    for path in [
        plain_file(&dir, "r.txt", LINES.as_bytes()),
        gzip_file(&dir, "r.gz", LINES.as_bytes()),
        bgzf_file(&dir, "r.bgzf", LINES.as_bytes()),
    ] {
        let mut stream = BufferedStream::open(&path).unwrap();
        let mut line = String::new();
        stream.read_line(&mut line).unwrap();
        assert_eq!(line, "alpha");

        stream.rewind().unwrap();
        line.clear();
        stream.read_line(&mut line).unwrap();
        assert_eq!(line, "alpha", "rewind failed for {}", path.display());
    }
}

#[test]
fn test_gzip_tell_reports_uncompressed_position() {
    let dir = TempDir::new().unwrap();
    let path = gzip_file(&dir, "pos.gz", LINES.as_bytes());

    let mut stream = BufferedStream::open(&path).unwrap();
    stream.disable_buffering();
    let mut line = String::new();
    stream.read_line(&mut line).unwrap();
    // "alpha\n" is six bytes of decompressed output.
    assert_eq!(stream.tell().unwrap(), 6);

    // Gzip streams only support rewinding, not arbitrary seeks.
    assert!(matches!(
        stream.seek(3),
        Err(BamseekError::SeekUnsupported(_))
    ));
    stream.seek(0).unwrap();
    line.clear();
    stream.read_line(&mut line).unwrap();
    assert_eq!(line, "alpha");
}

#[test]
fn test_bgzf_tell_conflicts_with_buffering() {
    let dir = TempDir::new().unwrap();
    let path = bgzf_file(&dir, "conflict.bgzf", LINES.as_bytes());

    let mut stream = BufferedStream::open(&path).unwrap();
    assert!(matches!(
        stream.tell(),
        Err(BamseekError::BufferedTellConflict)
    ));

    stream.disable_buffering();
    let first = stream.tell().unwrap();
    let mut line = String::new();
    stream.read_line(&mut line).unwrap();
    let second = stream.tell().unwrap();
    assert!(second > first);

    // Turning buffering back on restores the conflict.
    stream.enable_buffering();
    assert!(matches!(
        stream.tell(),
        Err(BamseekError::BufferedTellConflict)
    ));
}

#[test]
fn test_bgzf_virtual_offset_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("blocks.bgzf");

    let mut writer = BgzfWriter::new(File::create(&path).unwrap());
    writer.write_all(b"first block line\n").unwrap();
    writer.flush_block().unwrap();
    let second_block = writer.virtual_offset();
    writer.write_all(b"second block line\n").unwrap();
    writer.finish().unwrap();

    let mut stream = BufferedStream::open(&path).unwrap();
    stream.disable_buffering();
    stream.seek(second_block).unwrap();
    let mut line = String::new();
    stream.read_line(&mut line).unwrap();
    assert_eq!(line, "second block line");

    // And back to the start of the first block.
    stream.seek(0).unwrap();
    line.clear();
    stream.read_line(&mut line).unwrap();
    assert_eq!(line, "first block line");
}

#[test]
fn test_forced_format_mismatch_rejected() {
    let dir = TempDir::new().unwrap();
    let path = plain_file(&dir, "plain.txt", LINES.as_bytes());

    let options = StreamOptions {
        format: Some(StreamFormat::BlockGzip),
        ..Default::default()
    };
    assert!(matches!(
        BufferedStream::open_with(&path, options),
        Err(BamseekError::FormatDetection(_))
    ));
}

#[test]
fn test_missing_eof_marker_rejected_then_waived() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("no_eof.bgzf");

    // Write a block but drop the trailing end-of-file marker.
    let mut writer = BgzfWriter::new(Vec::new());
    writer.write_all(LINES.as_bytes()).unwrap();
    let full = writer.finish().unwrap();
    let truncated = &full[..full.len() - 28];
    fs::write(&path, truncated).unwrap();

    assert!(matches!(
        BufferedStream::open(&path),
        Err(BamseekError::Truncated(_))
    ));

    let options = StreamOptions {
        require_eof_block: false,
        ..Default::default()
    };
    let mut stream = BufferedStream::open_with(&path, options).unwrap();
    let mut contents = String::new();
    stream.read_to_string(&mut contents).unwrap();
    assert_eq!(contents, LINES);
}

#[test]
fn test_tiny_buffer_still_reads_correctly() {
    let dir = TempDir::new().unwrap();
    let path = plain_file(&dir, "tiny.txt", LINES.as_bytes());

    let mut stream = BufferedStream::open(&path).unwrap();
    stream.set_buffer_size(4); // smaller than every line
    let mut lines = Vec::new();
    let mut line = String::new();
    while stream.read_line(&mut line).unwrap() {
        lines.push(std::mem::take(&mut line));
    }
    assert_eq!(lines, ["alpha", "beta", "gamma"]);
}

#[test]
fn test_mixed_char_and_bulk_reads() {
    let dir = TempDir::new().unwrap();
    let body: Vec<u8> = (0..=255u8).cycle().take(5_000).collect();
    let path = plain_file(&dir, "mixed.bin", &body);

    let mut stream = BufferedStream::open(&path).unwrap();
    stream.set_buffer_size(64);

    let mut collected = Vec::new();
    for _ in 0..10 {
        collected.push(stream.read_char().unwrap().unwrap());
    }
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    collected.extend_from_slice(&rest);

    assert_eq!(collected, body);
    assert!(stream.eof());
}
