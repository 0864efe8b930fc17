//! Nested archive location and extraction
//!
//! The outer archive is scanned once: every file entry whose name contains
//! the locate marker is streamed straight into the workspace, so the index is
//! never walked twice.

use crate::archive::{ArchiveReader, copy_stream, enclosed_entry_path};
use crate::error::{Error, Result};
use crate::types::{ExtractedNestedArchive, Stage};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

/// Whether `name` contains `marker`
///
/// Matching is a plain substring test, optionally ignoring ASCII case.
pub fn matches_marker(name: &str, marker: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        name.to_ascii_lowercase()
            .contains(&marker.to_ascii_lowercase())
    } else {
        name.contains(marker)
    }
}

/// Names of file entries matching `marker`, in index order
pub fn locate_entries(
    reader: &dyn ArchiveReader,
    marker: &str,
    case_insensitive: bool,
) -> Vec<String> {
    reader
        .entries()
        .iter()
        .filter(|entry| !entry.is_dir && matches_marker(&entry.name, marker, case_insensitive))
        .map(|entry| entry.name.clone())
        .collect()
}

/// Extract every file entry matching `marker` into `dest_dir`
///
/// Each match is written to `dest_dir/<entry name>`, creating intermediate
/// directories. Returns the extracted archives in stream order.
///
/// # Errors
///
/// - [`Error::NotFound`] when no file entry matches
/// - [`Error::Format`] when an entry name escapes `dest_dir` or its data is corrupt
/// - [`Error::Io`] when the destination cannot be written
pub fn extract_nested_archives(
    reader: &mut dyn ArchiveReader,
    marker: &str,
    case_insensitive: bool,
    dest_dir: &Path,
) -> Result<Vec<ExtractedNestedArchive>> {
    let archive = reader.path().to_path_buf();

    if locate_entries(reader, marker, case_insensitive).is_empty() {
        return Err(Error::NotFound {
            archive,
            marker: marker.to_string(),
        });
    }

    std::fs::create_dir_all(dest_dir).map_err(|e| Error::io(Stage::Extract, dest_dir, e))?;

    let mut extracted = Vec::new();
    reader
        .for_each_entry(&mut |entry, stream| {
            if entry.is_dir || !matches_marker(&entry.name, marker, case_insensitive) {
                return Ok(true);
            }

            let relative = enclosed_entry_path(&entry.name).ok_or_else(|| {
                Error::format(
                    Stage::Extract,
                    &archive,
                    format!("entry {:?} escapes the extraction directory", entry.name),
                )
            })?;
            let dest = dest_dir.join(relative);

            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::io(Stage::Extract, parent, e))?;
            }

            let file = File::create(&dest).map_err(|e| Error::io(Stage::Extract, &dest, e))?;
            let mut out = BufWriter::new(file);
            let bytes = copy_stream(stream, &mut out)
                .map_err(|e| e.into_error(Stage::Extract, &archive, &entry.name, &dest))?;
            out.flush()
                .map_err(|e| Error::io(Stage::Extract, &dest, e))?;

            debug!(entry = %entry.name, ?dest, bytes, "extracted nested archive");

            extracted.push(ExtractedNestedArchive {
                entry_name: entry.name.clone(),
                path: dest,
            });
            Ok(true)
        })
        .map_err(|e| e.at_stage(Stage::Extract))?;

    info!(
        archive = ?archive,
        marker,
        count = extracted.len(),
        "extracted nested archives"
    );

    Ok(extracted)
}
