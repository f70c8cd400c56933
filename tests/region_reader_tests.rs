//! End-to-end sectioned reading: data and index files are written on
//! the fly, with reference boundaries forced onto separate compressed
//! blocks so section seeks cross real block boundaries.

use bamseek::error::BamseekError;
use bamseek::io::bam::{
    BamReader, BamWriter, Header, ReadSection, Record, Reference, VirtualOffset,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn scenario_header() -> Header {
    Header::new(
        "@HD\tVN:1.6\tSO:coordinate\n",
        vec![Reference::new("R0", 1_000), Reference::new("R1", 2_000)],
    )
}

fn scenario_records() -> Vec<Record> {
    vec![
        Record::aligned("r0_100", 0, 100, 100),
        Record::aligned("r0_500", 0, 500, 100),
        Record::aligned("r0_650", 0, 650, 100),
        Record::aligned("r1_50", 1, 50, 100),
        Record::aligned("r1_1500", 1, 1500, 100),
    ]
}

/// Write the scenario BAM plus a matching sidecar index. Each record's
/// virtual offset range is captured from the writer; a block boundary
/// is forced between references.
fn build_scenario(dir: &Path) -> PathBuf {
    let bam_path = dir.join("scenario.bam");
    let mut writer = BamWriter::create(&bam_path).unwrap();
    writer.write_header(&scenario_header()).unwrap();

    let mut placed: Vec<(Record, u64, u64)> = Vec::new();
    let mut prev_ref = None;
    for record in scenario_records() {
        if prev_ref.is_some() && prev_ref != Some(record.ref_id) {
            writer.flush_block().unwrap();
        }
        prev_ref = Some(record.ref_id);

        let start = writer.virtual_offset().unwrap();
        writer.write_record(&record).unwrap();
        let end = writer.virtual_offset().unwrap();
        assert!(end > start);
        placed.push((record, start, end));
    }
    writer.finish().unwrap();

    write_sidecar_index(&bam_path, &placed);
    bam_path
}

fn write_sidecar_index(bam_path: &Path, placed: &[(Record, u64, u64)]) {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"BAI\x01");
    bytes.extend_from_slice(&2i32.to_le_bytes());

    for ref_id in 0..2i32 {
        let on_ref: Vec<_> = placed.iter().filter(|(r, _, _)| r.ref_id == ref_id).collect();

        let mut bins: BTreeMap<u32, Vec<(u64, u64)>> = BTreeMap::new();
        for (record, start, end) in &on_ref {
            bins.entry(record.bin as u32).or_default().push((*start, *end));
        }

        // Real bins plus the counts pseudo-bin.
        bytes.extend_from_slice(&(bins.len() as i32 + 1).to_le_bytes());
        for (bin_id, chunks) in &bins {
            bytes.extend_from_slice(&bin_id.to_le_bytes());
            bytes.extend_from_slice(&(chunks.len() as i32).to_le_bytes());
            for (start, end) in chunks {
                bytes.extend_from_slice(&start.to_le_bytes());
                bytes.extend_from_slice(&end.to_le_bytes());
            }
        }
        bytes.extend_from_slice(&37450u32.to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes()); // placed-unmapped range
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(&(on_ref.len() as u64).to_le_bytes()); // mapped
        bytes.extend_from_slice(&0u64.to_le_bytes()); // unmapped

        // Every scenario position falls in the first 16 Kbp window.
        let min_start = on_ref.iter().map(|(_, s, _)| *s).min().unwrap();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&min_start.to_le_bytes());
    }
    bytes.extend_from_slice(&0u64.to_le_bytes()); // n_no_coor

    let mut index_path = bam_path.as_os_str().to_owned();
    index_path.push(".bai");
    fs::write(PathBuf::from(index_path), bytes).unwrap();
}

fn indexed_reader(bam_path: &Path) -> BamReader {
    let mut reader = BamReader::open(bam_path).unwrap();
    reader.load_default_index().unwrap();
    reader
}

fn section_names(reader: &mut BamReader, section: ReadSection) -> Vec<String> {
    reader.set_read_section(section).unwrap();
    let mut names = Vec::new();
    while let Some(record) = reader.read_record().unwrap() {
        names.push(record.name);
    }
    names
}

#[test]
fn test_range_section_returns_exact_records() {
    let dir = TempDir::new().unwrap();
    let mut reader = indexed_reader(&build_scenario(dir.path()));

    let names = section_names(&mut reader, ReadSection::named("R1").with_range(0, 1_000));
    assert_eq!(names, ["r1_50"]);

    // The walk ended because a record started past the range, not
    // because the file did.
    assert!(reader.section_exhausted());
    assert!(!reader.is_eof());

    // Further reads in the exhausted section stay at None.
    assert!(reader.read_record().unwrap().is_none());
}

#[test]
fn test_whole_reference_section_in_order() {
    let dir = TempDir::new().unwrap();
    let mut reader = indexed_reader(&build_scenario(dir.path()));

    let names = section_names(&mut reader, ReadSection::named("R0"));
    assert_eq!(names, ["r0_100", "r0_500", "r0_650"]);
    assert!(reader.section_exhausted());
    assert!(!reader.is_eof());
}

#[test]
fn test_overlap_vs_contained_filtering() {
    let dir = TempDir::new().unwrap();
    let bam_path = build_scenario(dir.path());
    let mut reader = indexed_reader(&bam_path);

    // r0_500 spans [500, 600), r0_650 spans [650, 750): both overlap
    // [450, 700), but only r0_500 lies entirely inside it.
    let overlap = section_names(&mut reader, ReadSection::named("R0").with_range(450, 700));
    assert_eq!(overlap, ["r0_500", "r0_650"]);

    let contained = section_names(
        &mut reader,
        ReadSection::named("R0").with_range(450, 700).contained_only(),
    );
    assert_eq!(contained, ["r0_500"]);
}

#[test]
fn test_sections_are_repeatable() {
    let dir = TempDir::new().unwrap();
    let mut reader = indexed_reader(&build_scenario(dir.path()));

    let section = ReadSection::named("R1").with_range(0, 1_000);
    let first = section_names(&mut reader, section.clone());
    let second = section_names(&mut reader, section);
    assert_eq!(first, second);
    assert_eq!(first, ["r1_50"]);
}

#[test]
fn test_by_id_matches_by_name() {
    let dir = TempDir::new().unwrap();
    let bam_path = build_scenario(dir.path());
    let mut reader = indexed_reader(&bam_path);

    let by_name = section_names(&mut reader, ReadSection::named("R1"));
    let by_id = section_names(&mut reader, ReadSection::reference(1));
    assert_eq!(by_name, by_id);
    assert_eq!(by_name, ["r1_50", "r1_1500"]);
}

#[test]
fn test_indexed_empty_region() {
    let dir = TempDir::new().unwrap();
    let mut reader = indexed_reader(&build_scenario(dir.path()));

    // Chunks exist for the covering bins, but nothing overlaps.
    let names = section_names(&mut reader, ReadSection::named("R0").with_range(800, 900));
    assert!(names.is_empty());
    assert!(reader.section_exhausted());
}

#[test]
fn test_empty_range_is_not_an_error() {
    let dir = TempDir::new().unwrap();
    let mut reader = indexed_reader(&build_scenario(dir.path()));

    let names = section_names(&mut reader, ReadSection::named("R0").with_range(500, 500));
    assert!(names.is_empty());
    assert!(reader.section_exhausted());
}

#[test]
fn test_section_switching_never_counts_violations() {
    let dir = TempDir::new().unwrap();
    let mut reader = indexed_reader(&build_scenario(dir.path()));

    // R1 first, then the seek back to R0: coordinates jump backwards
    // between sections, which must not register as disorder.
    let r1 = section_names(&mut reader, ReadSection::named("R1"));
    let r0 = section_names(&mut reader, ReadSection::named("R0"));
    assert_eq!(r1.len(), 2);
    assert_eq!(r0.len(), 3);
    assert_eq!(reader.sort_violations(), 0);
    assert_eq!(reader.last_sort_violation(), None);
}

#[test]
fn test_fallback_scan_without_index() {
    let dir = TempDir::new().unwrap();
    let bam_path = build_scenario(dir.path());

    let mut reader = BamReader::open(&bam_path).unwrap();
    assert!(!reader.has_index());
    let names = section_names(&mut reader, ReadSection::named("R1").with_range(0, 1_000));
    assert_eq!(names, ["r1_50"]);

    // A linear scan only stops at the end of the stream.
    assert!(!reader.section_exhausted());
    assert!(reader.is_eof());
}

#[test]
fn test_counts_through_reader() {
    let dir = TempDir::new().unwrap();
    let reader = indexed_reader(&build_scenario(dir.path()));

    assert_eq!(reader.mapped_count(0), 3);
    assert_eq!(reader.mapped_count(1), 2);
    assert_eq!(reader.unmapped_count(0), 0);
    assert_eq!(reader.mapped_count_by_name("R1"), 2);
    assert_eq!(reader.mapped_count_by_name("R9"), -1);
    assert_eq!(reader.mapped_count(5), -1);
    assert_eq!(reader.unplaced_count(), Some(0));
}

#[test]
fn test_tell_seek_round_trip_during_section() {
    let dir = TempDir::new().unwrap();
    let mut reader = indexed_reader(&build_scenario(dir.path()));

    reader.set_read_section(ReadSection::named("R0")).unwrap();
    let first = reader.read_record().unwrap().unwrap();
    assert_eq!(first.name, "r0_100");

    // Sections disable buffering, so positions are exact.
    let offset = reader.tell().unwrap();
    let second = reader.read_record().unwrap().unwrap();
    assert_eq!(second.name, "r0_500");

    // Seeking drops the section and resumes plain reading there.
    reader.seek(offset).unwrap();
    let again = reader.read_record().unwrap().unwrap();
    assert_eq!(again.name, "r0_500");
}

#[test]
fn test_seek_preserves_disabled_buffering() {
    let dir = TempDir::new().unwrap();
    let mut reader = indexed_reader(&build_scenario(dir.path()));

    reader.set_read_section(ReadSection::named("R0")).unwrap();
    let first = reader.read_record().unwrap().unwrap();
    assert_eq!(first.name, "r0_100");
    let mark = reader.tell().unwrap();

    // Seeking drops the section but keeps buffering off, so the
    // position stays answerable.
    reader.seek(mark).unwrap();
    assert_eq!(reader.tell().unwrap(), mark);

    // clear_section is the call that turns buffering back on.
    reader.clear_section();
    assert!(matches!(
        reader.tell(),
        Err(BamseekError::BufferedTellConflict)
    ));
}

#[test]
fn test_unknown_reference_leaves_reader_usable() {
    let dir = TempDir::new().unwrap();
    let mut reader = indexed_reader(&build_scenario(dir.path()));

    assert!(matches!(
        reader.set_read_section(ReadSection::named("R7")),
        Err(BamseekError::UnknownReference(_))
    ));

    // No section was installed; sequential reading is unaffected.
    let first = reader.read_record().unwrap().unwrap();
    assert_eq!(first.name, "r0_100");
}

#[test]
fn test_corrupt_block_reported_as_compression() {
    let dir = TempDir::new().unwrap();
    let bam_path = build_scenario(dir.path());

    // Flip one byte of the first block's deflate payload, which starts
    // after the 12 fixed header bytes and the 6-byte BC extra field.
    let mut bytes = fs::read(&bam_path).unwrap();
    bytes[18] ^= 0xFF;
    fs::write(&bam_path, &bytes).unwrap();

    assert!(matches!(
        BamReader::open(&bam_path),
        Err(BamseekError::Compression(_))
    ));
}

#[test]
fn test_section_overlap_reporting() {
    let dir = TempDir::new().unwrap();
    let mut reader = indexed_reader(&build_scenario(dir.path()));

    reader
        .set_read_section(ReadSection::named("R0").with_range(450, 700))
        .unwrap();
    let record = reader.read_record().unwrap().unwrap();
    assert_eq!(record.name, "r0_500");
    // [500, 600) lies entirely inside [450, 700).
    assert_eq!(reader.section_overlap(&record), 100);

    let partial = reader.read_record().unwrap().unwrap();
    assert_eq!(partial.name, "r0_650");
    // [650, 750) sticks out past 700.
    assert_eq!(reader.section_overlap(&partial), 50);
}

#[test]
fn test_captured_offsets_are_monotonic_virtual_offsets() {
    let dir = TempDir::new().unwrap();
    let bam_path = dir.path().join("offsets.bam");
    let mut writer = BamWriter::create(&bam_path).unwrap();
    writer.write_header(&scenario_header()).unwrap();

    let mut offsets = Vec::new();
    for record in scenario_records() {
        offsets.push(writer.virtual_offset().unwrap());
        writer.write_record(&record).unwrap();
        writer.flush_block().unwrap();
    }
    writer.finish().unwrap();

    for pair in offsets.windows(2) {
        assert!(pair[0] < pair[1]);
    }
    // After the first flush every record starts a block, so the
    // within-block component is zero from the second offset on.
    for &raw in &offsets[1..] {
        assert_eq!(VirtualOffset::from_raw(raw).uncompressed_offset(), 0);
        assert!(VirtualOffset::from_raw(raw).compressed_offset() > 0);
    }
}
