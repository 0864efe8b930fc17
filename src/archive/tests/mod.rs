use crate::archive::*;
use crate::archive::{COPY_BUFFER_SIZE, copy_stream};
use crate::config::OutputCompression;
use crate::error::Error;
use crate::test_helpers::{read_zip, sevenz_bytes, write_sevenz, write_zip};
use crate::types::{ArchiveFormat, Stage};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Collect (name, contents) for every file entry via the streaming visitor
fn stream_all(reader: &mut dyn ArchiveReader) -> Vec<(String, Vec<u8>)> {
    let mut out = Vec::new();
    reader
        .for_each_entry(&mut |entry, stream| {
            if !entry.is_dir {
                let mut data = Vec::new();
                stream.read_to_end(&mut data).unwrap();
                out.push((entry.name.clone(), data));
            }
            Ok(true)
        })
        .unwrap();
    out.sort();
    out
}

struct FailingReader;

impl Read for FailingReader {
    fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "crc mismatch",
        ))
    }
}

struct FailingWriter;

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::other("disk full"))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Format detection
// ---------------------------------------------------------------------------

#[test]
fn detect_format_by_content_not_extension() {
    let dir = TempDir::new().unwrap();

    let sevenz = dir.path().join("plugin.fomod");
    write_sevenz(&sevenz, &[("a.txt", Some(b"a".as_slice()))]);
    assert_eq!(
        detect_archive_format(&sevenz).unwrap(),
        Some(ArchiveFormat::SevenZip)
    );

    let zip = dir.path().join("other.fomod");
    write_zip(&zip, &[("a.txt", Some(b"a".as_slice()))]);
    assert_eq!(detect_archive_format(&zip).unwrap(), Some(ArchiveFormat::Zip));

    let text = dir.path().join("notes.7z");
    std::fs::write(&text, b"not an archive").unwrap();
    assert_eq!(detect_archive_format(&text).unwrap(), None);

    let short = dir.path().join("short.bin");
    std::fs::write(&short, b"7z").unwrap();
    assert_eq!(detect_archive_format(&short).unwrap(), None);
}

#[test]
fn detect_format_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.7z");
    match detect_archive_format(&missing).unwrap_err() {
        Error::Io { stage, path, .. } => {
            assert_eq!(stage, Stage::Open);
            assert_eq!(path, missing);
        }
        other => panic!("expected Io error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Opening
// ---------------------------------------------------------------------------

#[test]
fn open_archive_dispatches_on_format() {
    let dir = TempDir::new().unwrap();

    let sevenz = dir.path().join("a.bin");
    write_sevenz(&sevenz, &[("x.txt", Some(b"x".as_slice()))]);
    let reader = open_archive(&sevenz).unwrap();
    assert_eq!(reader.format(), ArchiveFormat::SevenZip);
    assert_eq!(reader.path(), sevenz.as_path());

    let zip = dir.path().join("b.bin");
    write_zip(&zip, &[("x.txt", Some(b"x".as_slice()))]);
    let reader = open_archive(&zip).unwrap();
    assert_eq!(reader.format(), ArchiveFormat::Zip);
}

#[test]
fn open_garbage_is_format_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("garbage.7z");
    std::fs::write(&path, vec![0xAB; 512]).unwrap();

    match open_archive(&path).unwrap_err() {
        Error::Format { stage, archive, .. } => {
            assert_eq!(stage, Stage::Open);
            assert_eq!(archive, path);
        }
        other => panic!("expected Format error, got {other:?}"),
    }
}

#[test]
fn open_truncated_sevenz_is_format_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("truncated.7z");
    let bytes = sevenz_bytes(&[("a.txt", Some(b"some contents".as_slice()))]);
    std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let err = open_archive(&path).unwrap_err();
    assert!(matches!(err, Error::Format { .. }), "got {err:?}");
}

#[test]
fn open_empty_sevenz_is_format_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.7z");
    std::fs::write(&path, sevenz_bytes(&[])).unwrap();

    match SevenZipReader::open(&path).unwrap_err() {
        Error::Format { stage, archive, reason } => {
            assert_eq!(stage, Stage::Open);
            assert_eq!(archive, path);
            assert_eq!(reason, "archive is empty");
        }
        other => panic!("expected Format error, got {other:?}"),
    }
}

#[test]
fn open_empty_zip_is_format_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.zip");
    write_zip(&path, &[]);

    match ZipReader::open(&path).unwrap_err() {
        Error::Format { reason, .. } => assert_eq!(reason, "archive is empty"),
        other => panic!("expected Format error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Listing and streaming
// ---------------------------------------------------------------------------

#[test]
fn sevenz_lists_entries_with_sizes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.7z");
    write_sevenz(
        &path,
        &[
            ("readme.txt", Some(b"read me".as_slice())),
            ("data", None),
            ("data/plugin.esp", Some(b"TES4".as_slice())),
        ],
    );

    let reader = SevenZipReader::open(&path).unwrap();
    let mut entries: Vec<_> = reader
        .entries()
        .iter()
        .map(|e| (e.name.as_str(), e.size, e.is_dir))
        .collect();
    entries.sort();
    assert_eq!(
        entries,
        vec![
            ("data", 0, true),
            ("data/plugin.esp", 4, false),
            ("readme.txt", 7, false),
        ]
    );
}

#[test]
fn sevenz_streams_entry_bytes_verbatim() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.7z");
    let binary: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();
    write_sevenz(
        &path,
        &[
            ("bin/blob.dat", Some(binary.as_slice())),
            ("empty.txt", Some(b"".as_slice())),
            ("readme.txt", Some(b"read me".as_slice())),
        ],
    );

    let mut reader = SevenZipReader::open(&path).unwrap();
    let streamed = stream_all(&mut reader);
    assert_eq!(
        streamed,
        vec![
            ("bin/blob.dat".to_string(), binary),
            ("empty.txt".to_string(), Vec::new()),
            ("readme.txt".to_string(), b"read me".to_vec()),
        ]
    );
}

#[test]
fn sevenz_visitor_may_skip_entry_contents() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.7z");
    write_sevenz(
        &path,
        &[
            ("first.txt", Some(b"first".as_slice())),
            ("second.txt", Some(b"second".as_slice())),
        ],
    );

    let mut reader = SevenZipReader::open(&path).unwrap();
    let mut second = Vec::new();
    reader
        .for_each_entry(&mut |entry, stream| {
            if entry.name == "second.txt" {
                stream.read_to_end(&mut second).unwrap();
            }
            Ok(true)
        })
        .unwrap();
    assert_eq!(second, b"second");
}

#[test]
fn visitor_error_stops_the_walk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.7z");
    write_sevenz(
        &path,
        &[
            ("a.txt", Some(b"a".as_slice())),
            ("b.txt", Some(b"b".as_slice())),
        ],
    );

    let mut reader = SevenZipReader::open(&path).unwrap();
    let mut visited = 0;
    let err = reader
        .for_each_entry(&mut |_, _| {
            visited += 1;
            Err(Error::format(Stage::Extract, "x", "stop"))
        })
        .unwrap_err();
    assert_eq!(visited, 1);
    assert_eq!(err.stage(), Some(Stage::Extract));
}

#[test]
fn sevenz_first_visitor_error_is_returned() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.7z");
    write_sevenz(
        &path,
        &[
            ("a.txt", Some(b"a".as_slice())),
            ("b.txt", Some(b"b".as_slice())),
            ("c.txt", Some(b"c".as_slice())),
            ("dir", None),
        ],
    );

    let mut reader = SevenZipReader::open(&path).unwrap();
    let mut visited = Vec::new();
    let err = reader
        .for_each_entry(&mut |entry, _| {
            visited.push(entry.name.clone());
            Err(Error::format(Stage::Extract, &entry.name, "rejected"))
        })
        .unwrap_err();

    assert_eq!(visited, vec!["a.txt"]);
    match err {
        Error::Format { archive, reason, .. } => {
            assert_eq!(archive, PathBuf::from("a.txt"));
            assert_eq!(reason, "rejected");
        }
        other => panic!("expected Format error, got {other:?}"),
    }
}

#[test]
fn sevenz_visitor_stop_ends_the_walk_cleanly() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.7z");
    write_sevenz(
        &path,
        &[
            ("a.txt", Some(b"a".as_slice())),
            ("b.txt", Some(b"b".as_slice())),
            ("dir", None),
        ],
    );

    let mut reader = SevenZipReader::open(&path).unwrap();
    let mut visited = Vec::new();
    reader
        .for_each_entry(&mut |entry, _| {
            visited.push(entry.name.clone());
            Ok(entry.name != "b.txt")
        })
        .unwrap();
    assert_eq!(visited, vec!["a.txt", "b.txt"]);
}

#[test]
fn sevenz_read_entry_copies_only_the_first_match() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.7z");
    write_sevenz(
        &path,
        &[
            ("same.txt", Some(b"first".as_slice())),
            ("same.txt", Some(b"second".as_slice())),
        ],
    );

    let mut reader = SevenZipReader::open(&path).unwrap();
    let mut sink = Vec::new();
    let copied = reader.read_entry("same.txt", &mut sink).unwrap();
    assert_eq!(copied, 5);
    assert_eq!(sink, b"first");
}

#[test]
fn zip_streams_entries_in_archive_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.zip");
    write_zip(
        &path,
        &[
            ("z.txt", Some(b"zz".as_slice())),
            ("dir/", None),
            ("a.txt", Some(b"aa".as_slice())),
        ],
    );

    let mut reader = ZipReader::open(&path).unwrap();
    let names: Vec<_> = reader.entries().iter().map(|e| e.name.clone()).collect();
    assert_eq!(names, vec!["z.txt", "dir/", "a.txt"]);
    assert!(reader.entries()[1].is_dir);

    let mut order = Vec::new();
    reader
        .for_each_entry(&mut |entry, _| {
            order.push(entry.name.clone());
            Ok(entry.name != "dir/")
        })
        .unwrap();
    assert_eq!(order, vec!["z.txt", "dir/"]);
}

#[test]
fn read_entry_copies_named_entry() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.7z");
    write_sevenz(
        &path,
        &[
            ("one.txt", Some(b"one".as_slice())),
            ("two.txt", Some(b"two two".as_slice())),
        ],
    );

    let mut reader = open_archive(&path).unwrap();
    let mut sink = Vec::new();
    let copied = reader.read_entry("two.txt", &mut sink).unwrap();
    assert_eq!(copied, 7);
    assert_eq!(sink, b"two two");
}

#[test]
fn read_entry_missing_name_is_not_found() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("a.zip");
    write_zip(&path, &[("one.txt", Some(b"one".as_slice()))]);

    let mut reader = open_archive(&path).unwrap();
    match reader.read_entry("two.txt", &mut Vec::new()).unwrap_err() {
        Error::NotFound { archive, marker } => {
            assert_eq!(archive, path);
            assert_eq!(marker, "two.txt");
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Entry paths
// ---------------------------------------------------------------------------

#[test]
fn enclosed_entry_path_accepts_relative_names() {
    assert_eq!(
        enclosed_entry_path("plugin.fomod"),
        Some(PathBuf::from("plugin.fomod"))
    );
    assert_eq!(
        enclosed_entry_path("data/sub/plugin.fomod"),
        Some(Path::new("data").join("sub").join("plugin.fomod"))
    );
    assert_eq!(
        enclosed_entry_path("data\\plugin.fomod"),
        Some(Path::new("data").join("plugin.fomod"))
    );
    assert_eq!(
        enclosed_entry_path("./data//a.fomod"),
        Some(Path::new("data").join("a.fomod"))
    );
}

#[test]
fn enclosed_entry_path_rejects_escapes() {
    for name in [
        "../evil.fomod",
        "data/../../evil.fomod",
        "..\\evil.fomod",
        "/etc/evil.fomod",
        "\\evil.fomod",
        "",
        "./",
    ] {
        assert_eq!(enclosed_entry_path(name), None, "{name:?} should be rejected");
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

#[test]
fn zip_writer_round_trips_files_and_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.zip");

    let mut writer = ZipArchiveWriter::create(&path, OutputCompression::Deflated).unwrap();
    assert!(writer.is_empty());
    writer.create_directory("meshes/").unwrap();
    writer
        .create_entry("meshes/a.nif")
        .unwrap()
        .write_all(b"NIF mesh data")
        .unwrap();
    writer.create_entry("empty.txt").unwrap();
    assert_eq!(writer.len(), 3);
    assert!(writer.contains("meshes/a.nif"));
    assert!(!writer.contains("meshes/b.nif"));

    let finished = writer.finish().unwrap();
    assert_eq!(finished, path);

    assert_eq!(
        read_zip(&path),
        vec![
            ("meshes/".to_string(), Vec::new()),
            ("meshes/a.nif".to_string(), b"NIF mesh data".to_vec()),
            ("empty.txt".to_string(), Vec::new()),
        ]
    );
}

#[test]
fn zip_writer_rejects_duplicate_names() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out.zip");

    let mut writer = ZipArchiveWriter::create(&path, OutputCompression::Stored).unwrap();
    writer.create_entry("a.txt").unwrap().write_all(b"a").unwrap();

    let Err(err) = writer.create_entry("a.txt") else {
        panic!("expected NameCollision for a second a.txt");
    };
    match err {
        Error::NameCollision { name, archive } => {
            assert_eq!(name, "a.txt");
            assert_eq!(archive, path);
        }
        other => panic!("expected NameCollision, got {other:?}"),
    }
    assert_eq!(writer.len(), 1);
}

#[test]
fn zip_writer_output_is_deterministic() {
    let dir = TempDir::new().unwrap();

    let build = |name: &str| {
        let path = dir.path().join(name);
        let mut writer = ZipArchiveWriter::create(&path, OutputCompression::Deflated).unwrap();
        writer
            .create_entry("meshes/a.nif")
            .unwrap()
            .write_all(&[7u8; 4096])
            .unwrap();
        writer
            .create_entry("readme.txt")
            .unwrap()
            .write_all(b"read me")
            .unwrap();
        writer.finish().unwrap();
        std::fs::read(path).unwrap()
    };

    let first = build("first.zip");
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let second = build("second.zip");
    assert_eq!(first, second);
}

#[test]
fn zip_writer_create_in_missing_directory_is_io_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing").join("out.zip");

    match ZipArchiveWriter::create(&path, OutputCompression::Stored).unwrap_err() {
        Error::Io { stage, path: p, .. } => {
            assert_eq!(stage, Stage::Repackage);
            assert_eq!(p, path);
        }
        other => panic!("expected Io error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Stream copies
// ---------------------------------------------------------------------------

#[test]
fn copy_stream_counts_bytes() {
    let data = vec![1u8; COPY_BUFFER_SIZE * 2 + 17];
    let mut out = Vec::new();
    let copied = copy_stream(&mut data.as_slice(), &mut out).unwrap();
    assert_eq!(copied, data.len() as u64);
    assert_eq!(out, data);
}

#[test]
fn copy_stream_distinguishes_read_and_write_failures() {
    let err = copy_stream(&mut FailingReader, &mut Vec::new()).unwrap_err();
    let err = err.into_error(
        Stage::Extract,
        Path::new("/tmp/a.7z"),
        "plugin.fomod",
        Path::new("/tmp/x/plugin.fomod"),
    );
    match err {
        Error::Format { stage, archive, reason } => {
            assert_eq!(stage, Stage::Extract);
            assert_eq!(archive, PathBuf::from("/tmp/a.7z"));
            assert!(reason.contains("plugin.fomod"), "{reason}");
        }
        other => panic!("expected Format error, got {other:?}"),
    }

    let err = copy_stream(&mut b"data".as_slice(), &mut FailingWriter).unwrap_err();
    let err = err.into_error(
        Stage::Extract,
        Path::new("/tmp/a.7z"),
        "plugin.fomod",
        Path::new("/tmp/x/plugin.fomod"),
    );
    match err {
        Error::Io { path, .. } => assert_eq!(path, PathBuf::from("/tmp/x/plugin.fomod")),
        other => panic!("expected Io error, got {other:?}"),
    }
}
