use crate::config::OutputCompression;
use crate::error::{Error, Result};
use crate::types::{ArchiveEntry, ArchiveFormat, Stage};
use ::zip::result::ZipError;
use ::zip::write::FileOptions;
use ::zip::{CompressionMethod, ZipArchive, ZipWriter};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{ArchiveReader, ArchiveWriter, EntryVisitor};

/// Map a ZIP library error to an I/O error or a format error
fn zip_error(stage: Stage, path: &Path, e: ZipError) -> Error {
    match e {
        ZipError::Io(e) => Error::io(stage, path, e),
        other => Error::format(stage, path, format!("ZIP error: {}", other)),
    }
}

/// Archive reader for ZIP files
pub struct ZipReader {
    path: PathBuf,
    archive: ZipArchive<File>,
    entries: Vec<ArchiveEntry>,
}

impl ZipReader {
    /// Open a ZIP archive and read its central directory
    ///
    /// An archive without entries is rejected as a format error.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::io(Stage::Open, path, e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| zip_error(Stage::Open, path, e))?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let file = archive
                .by_index(i)
                .map_err(|e| zip_error(Stage::Open, path, e))?;
            entries.push(ArchiveEntry {
                name: file.name().to_string(),
                size: file.size(),
                is_dir: file.is_dir(),
            });
        }

        if entries.is_empty() {
            return Err(Error::format(Stage::Open, path, "archive is empty"));
        }

        debug!(?path, entry_count = entries.len(), "opened ZIP archive");

        Ok(Self {
            path: path.to_path_buf(),
            archive,
            entries,
        })
    }
}

impl ArchiveReader for ZipReader {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    fn for_each_entry(&mut self, visit: &mut EntryVisitor<'_>) -> Result<()> {
        for (i, entry) in self.entries.iter().enumerate() {
            let mut file = self
                .archive
                .by_index(i)
                .map_err(|e| zip_error(Stage::Open, &self.path, e))?;
            if !visit(entry, &mut file)? {
                break;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ZipReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipReader")
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// ZIP archive writer with unique entry names
///
/// Entries carry a fixed modification time so identical input produces a
/// byte-identical archive.
pub struct ZipArchiveWriter {
    path: PathBuf,
    writer: ZipWriter<BufWriter<File>>,
    options: FileOptions,
    names: HashSet<String>,
}

impl ZipArchiveWriter {
    /// Create (or truncate) a ZIP file at `path`
    pub fn create(path: &Path, compression: OutputCompression) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::io(Stage::Repackage, path, e))?;

        let method = match compression {
            OutputCompression::Stored => CompressionMethod::Stored,
            OutputCompression::Deflated => CompressionMethod::Deflated,
        };
        let options = FileOptions::default()
            .compression_method(method)
            .last_modified_time(::zip::DateTime::default());

        debug!(?path, ?compression, "created ZIP archive");

        Ok(Self {
            path: path.to_path_buf(),
            writer: ZipWriter::new(BufWriter::new(file)),
            options,
            names: HashSet::new(),
        })
    }

    fn claim(&mut self, name: &str) -> Result<()> {
        if !self.names.insert(name.to_string()) {
            return Err(Error::NameCollision {
                name: name.to_string(),
                archive: self.path.clone(),
            });
        }
        Ok(())
    }
}

impl ArchiveWriter for ZipArchiveWriter {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn len(&self) -> usize {
        self.names.len()
    }

    fn create_directory(&mut self, name: &str) -> Result<()> {
        self.claim(name)?;
        self.writer
            .add_directory(name, self.options)
            .map_err(|e| zip_error(Stage::Repackage, &self.path, e))
    }

    fn create_entry(&mut self, name: &str) -> Result<&mut dyn Write> {
        self.claim(name)?;
        self.writer
            .start_file(name, self.options)
            .map_err(|e| zip_error(Stage::Repackage, &self.path, e))?;
        Ok(&mut self.writer)
    }

    fn finish(mut self) -> Result<PathBuf> {
        let mut inner = self
            .writer
            .finish()
            .map_err(|e| zip_error(Stage::Repackage, &self.path, e))?;
        inner
            .flush()
            .map_err(|e| Error::io(Stage::Repackage, &self.path, e))?;
        let file = inner
            .into_inner()
            .map_err(|e| Error::io(Stage::Repackage, &self.path, e.into_error()))?;
        file.sync_all()
            .map_err(|e| Error::io(Stage::Repackage, &self.path, e))?;

        info!(path = ?self.path, entry_count = self.names.len(), "finished ZIP archive");
        Ok(self.path)
    }
}

impl std::fmt::Debug for ZipArchiveWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipArchiveWriter")
            .field("path", &self.path)
            .field("entries", &self.names.len())
            .finish()
    }
}
