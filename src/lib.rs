//! # repack-dl
//!
//! Download an archive, pull out the archives nested inside it and repackage
//! their contents into a fresh ZIP file.
//!
//! ## Design Philosophy
//!
//! repack-dl is designed to be:
//! - **Streaming** - Archive bytes flow from the network to disk and between
//!   containers without being buffered whole in memory
//! - **Format-agnostic** - 7z and ZIP sources are recognized by content
//! - **Clean on failure** - Every intermediate file lives in a scoped workspace
//!   that is removed however a run ends
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use repack_dl::{Config, Pipeline, RepackJob};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(Config::default())?;
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let job = RepackJob::new(
//!         "mcm",
//!         "https://example.com/files/mcm.7z".parse()?,
//!         "mods/mcm.zip",
//!     );
//!     let report = pipeline.run(&job).await?;
//!     println!("wrote {} entries to {}", report.entries_written, report.output.display());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Archive container readers and writers
pub mod archive;
/// Configuration types
pub mod config;
/// Streaming HTTP download
pub mod download;
/// Error types
pub mod error;
/// Nested archive location and extraction
pub mod locate;
/// Stage orchestration
pub mod pipeline;
/// Filtered repackaging
pub mod repack;
/// Core types
pub mod types;
/// Scoped temporary workspace
pub mod workspace;


// Re-export commonly used types
pub use archive::{
    ArchiveReader, ArchiveWriter, SevenZipReader, ZipArchiveWriter, ZipReader,
    detect_archive_format, open_archive,
};
pub use config::{
    Config, DownloadConfig, OutputCollision, OutputCompression, RepackConfig, WorkspaceConfig,
};
pub use error::{Error, ErrorReport, Result};
pub use pipeline::Pipeline;
pub use types::{
    ArchiveEntry, ArchiveFormat, Event, ExtractedNestedArchive, LocalDownload, RemoteArtifact,
    RepackJob, RepackReport, Stage,
};
pub use workspace::Workspace;
