//! Core types for repack-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Pipeline stage, used to attribute errors and events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Workspace setup and teardown
    Workspace,
    /// Fetching the remote archive
    Download,
    /// Opening the downloaded archive
    Open,
    /// Scanning entries for the locate marker
    Locate,
    /// Extracting nested archives into the workspace
    Extract,
    /// Copying filtered entries into the output archive
    Repackage,
}

impl Stage {
    /// Lowercase stage name
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Workspace => "workspace",
            Stage::Download => "download",
            Stage::Open => "open",
            Stage::Locate => "locate",
            Stage::Extract => "extract",
            Stage::Repackage => "repackage",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container format tag
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    /// 7-Zip archive
    SevenZip,
    /// ZIP archive
    Zip,
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveFormat::SevenZip => f.write_str("7z"),
            ArchiveFormat::Zip => f.write_str("zip"),
        }
    }
}

/// A remote resource to download
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteArtifact {
    /// Where to fetch the archive from
    pub url: Url,
    /// Declared total size; `None` or zero means unknown
    pub expected_size: Option<u64>,
}

impl RemoteArtifact {
    /// Create an artifact with unknown size
    pub fn new(url: Url) -> Self {
        Self {
            url,
            expected_size: None,
        }
    }

    /// Set the declared total size
    pub fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    /// Declared size, with zero normalized to unknown
    pub fn declared_size(&self) -> Option<u64> {
        self.expected_size.filter(|&size| size > 0)
    }
}

/// A file written by the downloader
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalDownload {
    /// Path of the downloaded file
    pub path: PathBuf,
    /// Number of body bytes written
    pub bytes_written: u64,
    /// Set once the file has been flushed and closed
    pub complete: bool,
}

/// One entry of an opened archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path-like entry name as stored in the archive
    pub name: String,
    /// Uncompressed size in bytes
    pub size: u64,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

/// A nested archive extracted into the workspace
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractedNestedArchive {
    /// Name of the entry in the outer archive
    pub entry_name: String,
    /// Where the entry was written
    pub path: PathBuf,
}

/// One repackaging run: what to fetch, what to look for and where to write
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RepackJob {
    /// Display name, used in events and logs
    pub name: String,

    /// Archive URL
    pub url: Url,

    /// Declared archive size, if known ahead of the request
    #[serde(default)]
    pub expected_size: Option<u64>,

    /// Marker for nested archive entries (falls back to the configured default)
    #[serde(default)]
    pub locate_marker: Option<String>,

    /// Marker for entries to leave out (falls back to the configured default)
    #[serde(default)]
    pub exclude_marker: Option<String>,

    /// Destination ZIP path
    pub output: PathBuf,
}

impl RepackJob {
    /// Create a job using the configured default markers
    pub fn new(name: impl Into<String>, url: Url, output: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            url,
            expected_size: None,
            locate_marker: None,
            exclude_marker: None,
            output: output.into(),
        }
    }

    /// Override the locate marker
    pub fn with_locate_marker(mut self, marker: impl Into<String>) -> Self {
        self.locate_marker = Some(marker.into());
        self
    }

    /// Override the exclusion marker
    pub fn with_exclude_marker(mut self, marker: impl Into<String>) -> Self {
        self.exclude_marker = Some(marker.into());
        self
    }

    /// Set the declared archive size
    pub fn with_expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    /// Short filesystem-safe name for workspace paths
    pub fn stub(&self) -> String {
        let stub: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        let stub = stub.trim_matches('_');
        if stub.is_empty() {
            "archive".to_string()
        } else {
            stub.to_string()
        }
    }
}

/// Summary of a successful repackaging run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepackReport {
    /// Final path of the output archive
    pub output: PathBuf,
    /// Names of the nested archives that were repackaged, in order
    pub sources: Vec<String>,
    /// Entries copied into the output archive
    pub entries_written: usize,
    /// Entries left out because they contain the exclusion marker
    pub entries_skipped: usize,
    /// Total entry bytes copied
    pub bytes_written: u64,
    /// Size of the downloaded archive
    pub downloaded_bytes: u64,
}

/// Event emitted while a job runs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Download request sent
    DownloadStarted {
        /// Job name
        name: String,
        /// Archive URL
        url: String,
    },

    /// Download progress update
    Downloading {
        /// Job name
        name: String,
        /// Bytes received so far
        downloaded: u64,
        /// Total size, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },

    /// Download finished
    DownloadComplete {
        /// Job name
        name: String,
        /// Final byte count
        bytes: u64,
    },

    /// A nested archive was found and extracted
    NestedArchiveFound {
        /// Job name
        name: String,
        /// Entry name in the outer archive
        entry: String,
    },

    /// Repackaging a nested archive started
    Repackaging {
        /// Job name
        name: String,
        /// Entry name of the nested archive being processed
        source: String,
    },

    /// An entry was left out of the output
    EntrySkipped {
        /// Job name
        name: String,
        /// Skipped entry name
        entry: String,
    },

    /// Job finished successfully
    Complete {
        /// Job name
        name: String,
        /// Output archive path
        output: PathBuf,
    },

    /// Job failed
    Failed {
        /// Job name
        name: String,
        /// Failing stage, if any
        #[serde(skip_serializing_if = "Option::is_none")]
        stage: Option<Stage>,
        /// Error message
        error: String,
    },
}
