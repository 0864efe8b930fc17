//! Filtered repackaging of nested archives into the output container

use crate::archive::{ArchiveWriter, copy_stream, open_archive};
use crate::error::{Error, Result};
use crate::locate::matches_marker;
use crate::types::{ExtractedNestedArchive, Stage};
use std::path::Path;
use tracing::{debug, info};

/// Progress notifications raised while repackaging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepackProgress<'a> {
    /// A nested archive is about to be copied
    Source(&'a Path),
    /// An entry matched the exclusion marker and was left out
    Skipped(&'a str),
}

/// Totals for one repackaging run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepackTotals {
    /// Entries written to the output container (files and directories)
    pub entries_written: usize,
    /// Entries left out because they matched the exclusion marker
    pub entries_skipped: usize,
    /// Uncompressed bytes copied into file entries
    pub bytes_written: u64,
}

/// Copy every entry not matching `exclude_marker` from each source into `writer`
///
/// Sources are processed in order and their entries accumulate in one output
/// container. Entry names and contents are copied verbatim. Directory entries
/// present in several sources are written once; a file name written twice is
/// an [`Error::NameCollision`] naming the source that supplied the duplicate.
///
/// The writer is not finished here, so a failure leaves no finalized output.
pub fn repackage<W: ArchiveWriter>(
    sources: &[ExtractedNestedArchive],
    exclude_marker: &str,
    case_insensitive: bool,
    writer: &mut W,
    on_progress: &mut dyn FnMut(RepackProgress<'_>),
) -> Result<RepackTotals> {
    let mut totals = RepackTotals::default();
    let output = writer.path().to_path_buf();

    for source in sources {
        on_progress(RepackProgress::Source(&source.path));

        let mut reader = open_archive(&source.path).map_err(|e| e.at_stage(Stage::Repackage))?;
        let archive = source.path.clone();

        reader
            .for_each_entry(&mut |entry, stream| {
                if matches_marker(&entry.name, exclude_marker, case_insensitive) {
                    debug!(entry = %entry.name, "skipping excluded entry");
                    totals.entries_skipped += 1;
                    on_progress(RepackProgress::Skipped(&entry.name));
                    return Ok(true);
                }

                if entry.is_dir {
                    let trimmed = entry.name.trim_end_matches(['/', '\\']);
                    if trimmed.is_empty() {
                        return Ok(true);
                    }
                    let name = format!("{}/", trimmed);
                    if !writer.contains(&name) {
                        writer.create_directory(&name)?;
                        totals.entries_written += 1;
                    }
                    return Ok(true);
                }

                if writer.contains(&entry.name) {
                    return Err(Error::NameCollision {
                        name: entry.name.clone(),
                        archive: archive.clone(),
                    });
                }

                let sink = writer.create_entry(&entry.name)?;
                let bytes = copy_stream(stream, sink).map_err(|e| {
                    e.into_error(Stage::Repackage, &archive, &entry.name, &output)
                })?;
                totals.entries_written += 1;
                totals.bytes_written += bytes;
                Ok(true)
            })
            .map_err(|e| e.at_stage(Stage::Repackage))?;

        debug!(source = ?source.path, "repackaged nested archive");
    }

    info!(
        entries_written = totals.entries_written,
        entries_skipped = totals.entries_skipped,
        bytes_written = totals.bytes_written,
        "repackaging complete"
    );

    Ok(totals)
}
