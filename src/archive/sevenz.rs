use crate::error::{Error, Result};
use crate::types::{ArchiveEntry, ArchiveFormat, Stage};
use sevenz_rust::{Password, SevenZArchiveEntry, SevenZReader};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{ArchiveReader, EntryVisitor};

/// Reason carried by the error that ends a 7z walk early
const WALK_STOPPED: &str = "entry walk stopped";

/// Archive reader for 7z files
pub struct SevenZipReader {
    path: PathBuf,
    reader: SevenZReader<File>,
    entries: Vec<ArchiveEntry>,
}

impl SevenZipReader {
    /// Open a 7z archive and parse its index
    ///
    /// An archive without entries is rejected as a format error.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(Stage::Open, path, e))?;
        let len = file
            .metadata()
            .map_err(|e| Error::io(Stage::Open, path, e))?
            .len();

        let reader = SevenZReader::new(file, len, Password::from("")).map_err(|e| {
            Error::format(
                Stage::Open,
                path,
                format!("failed to read 7z archive: {}", e),
            )
        })?;

        let entries: Vec<ArchiveEntry> = reader.archive().files.iter().map(to_entry).collect();
        if entries.is_empty() {
            return Err(Error::format(Stage::Open, path, "archive is empty"));
        }

        debug!(?path, entry_count = entries.len(), "opened 7z archive");

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            entries,
        })
    }
}

fn to_entry(entry: &SevenZArchiveEntry) -> ArchiveEntry {
    ArchiveEntry {
        name: entry.name.clone(),
        size: entry.size,
        is_dir: entry.is_directory,
    }
}

impl ArchiveReader for SevenZipReader {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::SevenZip
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn for_each_entry(&mut self, visit: &mut EntryVisitor<'_>) -> Result<()> {
        // The 7z walk only ends early on an error from the callback, so a
        // stop or a visitor error is signalled with a sentinel error. The
        // first visitor error is parked here and returned in its place.
        let mut failure: Option<Error> = None;
        let mut stopped = false;

        let walk = self.reader.for_each_entries(|entry, reader| {
            let entry = to_entry(entry);
            match visit(&entry, reader) {
                Ok(true) => {
                    // Skip whatever the visitor left unread before the next entry
                    if let Err(e) = std::io::copy(reader, &mut std::io::sink()) {
                        failure.get_or_insert(Error::format(
                            Stage::Open,
                            &self.path,
                            format!("failed to read entry {:?}: {}", entry.name, e),
                        ));
                        return Err(sevenz_rust::Error::other(WALK_STOPPED));
                    }
                    Ok(true)
                }
                Ok(false) => {
                    stopped = true;
                    Err(sevenz_rust::Error::other(WALK_STOPPED))
                }
                Err(e) => {
                    failure.get_or_insert(e);
                    Err(sevenz_rust::Error::other(WALK_STOPPED))
                }
            }
        });

        if let Some(e) = failure {
            return Err(e);
        }
        if stopped {
            return Ok(());
        }

        walk.map_err(|e| {
            Error::format(
                Stage::Open,
                &self.path,
                format!("failed to read 7z archive: {}", e),
            )
        })
    }
}

impl std::fmt::Debug for SevenZipReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SevenZipReader")
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .finish()
    }
}
