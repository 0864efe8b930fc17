//! Archive container access
//!
//! Two small capability traits decouple the pipeline from concrete formats:
//! [`ArchiveReader`] lists and streams entries of a source container (7z or
//! ZIP), [`ArchiveWriter`] creates entries in a destination container (ZIP).

mod sevenz;
mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use self::sevenz::SevenZipReader;
pub use self::zip::{ZipArchiveWriter, ZipReader};

use crate::error::{Error, Result};
use crate::types::{ArchiveEntry, ArchiveFormat, Stage};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// 7z signature: `7z\xBC\xAF\x27\x1C`
const SEVENZ_MAGIC: [u8; 6] = [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];
/// ZIP local file header, empty archive and spanned archive signatures
const ZIP_MAGICS: [[u8; 4]; 3] = [
    [b'P', b'K', 0x03, 0x04],
    [b'P', b'K', 0x05, 0x06],
    [b'P', b'K', 0x07, 0x08],
];

/// Buffer size for entry stream copies
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Visitor called for each entry with a stream positioned at its first byte
///
/// Return `Ok(true)` to continue with the next entry, `Ok(false)` to stop.
pub type EntryVisitor<'a> = dyn FnMut(&ArchiveEntry, &mut dyn Read) -> Result<bool> + 'a;

/// Read side of a container format
pub trait ArchiveReader: std::fmt::Debug {
    /// Container format of this archive
    fn format(&self) -> ArchiveFormat;

    /// Backing file
    fn path(&self) -> &Path;

    /// Entry index, in archive order
    fn entries(&self) -> &[ArchiveEntry];

    /// Stream entries one after another
    ///
    /// Each stream is only valid inside the visitor call, so it is always
    /// closed before the next entry is opened or the reader is dropped.
    /// Entries are visited in the container's stream order, which for 7z
    /// places entries without data (directories, empty files) last.
    fn for_each_entry(&mut self, visit: &mut EntryVisitor<'_>) -> Result<()>;

    /// Copy the entry named `name` into `sink`, returning the bytes copied
    fn read_entry(&mut self, name: &str, sink: &mut dyn Write) -> Result<u64> {
        let archive = self.path().to_path_buf();
        let mut copied = None;

        self.for_each_entry(&mut |entry, reader| {
            if entry.name != name {
                return Ok(true);
            }
            let bytes = copy_stream(reader, sink).map_err(|e| {
                e.into_error(Stage::Open, &archive, &entry.name, Path::new(name))
            })?;
            copied = Some(bytes);
            Ok(false)
        })?;

        copied.ok_or_else(|| Error::NotFound {
            archive,
            marker: name.to_string(),
        })
    }
}

/// Write side of a container format
pub trait ArchiveWriter {
    /// Container format produced
    fn format(&self) -> ArchiveFormat;

    /// Path of the archive being written
    fn path(&self) -> &Path;

    /// Whether an entry with this name was already written
    fn contains(&self, name: &str) -> bool;

    /// Number of entries written so far
    fn len(&self) -> usize;

    /// Whether no entry has been written yet
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add a directory entry
    fn create_directory(&mut self, name: &str) -> Result<()>;

    /// Start a file entry and return a writer for its contents
    ///
    /// The entry ends when the next entry is created or the archive finished.
    fn create_entry(&mut self, name: &str) -> Result<&mut dyn Write>;

    /// Write the container index and close the file
    fn finish(self) -> Result<PathBuf>
    where
        Self: Sized;
}

/// Detect an archive's container format from its leading bytes
///
/// Returns `Ok(None)` for files that are neither 7z nor ZIP.
pub fn detect_archive_format(path: &Path) -> Result<Option<ArchiveFormat>> {
    let mut file = std::fs::File::open(path).map_err(|e| Error::io(Stage::Open, path, e))?;
    let mut header = [0u8; 6];
    let mut filled = 0;
    while filled < header.len() {
        match file.read(&mut header[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::io(Stage::Open, path, e)),
        }
    }
    let header = &header[..filled];

    if header.starts_with(&SEVENZ_MAGIC) {
        return Ok(Some(ArchiveFormat::SevenZip));
    }
    if ZIP_MAGICS.iter().any(|magic| header.starts_with(magic)) {
        return Ok(Some(ArchiveFormat::Zip));
    }
    Ok(None)
}

/// Open `path` with the reader matching its detected format
///
/// Nested archives are recognized by content, so an entry such as
/// `plugin.fomod` opens as 7z or ZIP regardless of its extension.
pub fn open_archive(path: &Path) -> Result<Box<dyn ArchiveReader>> {
    let format = detect_archive_format(path)?
        .ok_or_else(|| Error::format(Stage::Open, path, "unrecognized archive format"))?;

    debug!(?path, %format, "opening archive");

    match format {
        ArchiveFormat::SevenZip => Ok(Box::new(SevenZipReader::open(path)?)),
        ArchiveFormat::Zip => Ok(Box::new(ZipReader::open(path)?)),
    }
}

/// Map an entry name to a relative path that cannot leave its parent
///
/// Both `/` and `\` separate components. Returns `None` for names that are
/// absolute, contain `..`, or have no normal component.
pub fn enclosed_entry_path(name: &str) -> Option<PathBuf> {
    let mut path = PathBuf::new();
    for part in name.split(['/', '\\']) {
        if part.is_empty() || part == "." {
            continue;
        }
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(c)), None) => path.push(c),
            _ => return None,
        }
    }
    if name.starts_with(['/', '\\']) || path.as_os_str().is_empty() {
        return None;
    }
    Some(path)
}

/// Which side of a stream copy failed
#[derive(Debug)]
pub(crate) enum CopyError {
    /// Reading the entry stream failed (corrupt or truncated data)
    Read(std::io::Error),
    /// Writing the destination failed
    Write(std::io::Error),
}

impl CopyError {
    /// Turn a copy failure into a format error (read side) or I/O error (write side)
    pub(crate) fn into_error(self, stage: Stage, archive: &Path, entry: &str, dest: &Path) -> Error {
        match self {
            CopyError::Read(e) => {
                Error::format(stage, archive, format!("failed to read entry {:?}: {}", entry, e))
            }
            CopyError::Write(e) => Error::io(stage, dest, e),
        }
    }
}

/// Copy `reader` to `writer` verbatim, returning the number of bytes copied
pub(crate) fn copy_stream(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
) -> std::result::Result<u64, CopyError> {
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        writer.write_all(&buf[..n]).map_err(CopyError::Write)?;
        total += n as u64;
    }
    Ok(total)
}
