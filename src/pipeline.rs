//! Download → locate → extract → repackage orchestration
//!
//! A [`Pipeline`] runs [`RepackJob`]s one stage at a time. Every run gets its
//! own [`Workspace`]; the output archive is staged inside it and only moved to
//! the job's destination once it has been finalized, so a failed run never
//! leaves an output file behind.

use crate::archive::{ArchiveWriter, ZipArchiveWriter, open_archive};
use crate::config::{Config, OutputCollision, validate_marker};
use crate::download::{build_client, download_to_file};
use crate::error::{Error, Result};
use crate::locate::extract_nested_archives;
use crate::repack::{RepackProgress, repackage};
use crate::types::{
    Event, ExtractedNestedArchive, RemoteArtifact, RepackJob, RepackReport, Stage,
};
use crate::workspace::Workspace;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Maximum number of " (N)" suffixes tried when renaming a colliding output
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Runs repackaging jobs and broadcasts their progress
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<Config>,
    client: reqwest::Client,
    event_tx: broadcast::Sender<Event>,
}

impl Pipeline {
    /// Create a pipeline after validating `config`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = build_client(&config.download)?;

        // Events are dropped when nobody is subscribed
        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            config: Arc::new(config),
            client,
            event_tx,
        })
    }

    /// Subscribe to job events
    ///
    /// Events sent before this call are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run jobs one after another, stopping at the first failure
    pub async fn run_all(&self, jobs: &[RepackJob]) -> Result<Vec<RepackReport>> {
        let mut reports = Vec::with_capacity(jobs.len());
        for job in jobs {
            reports.push(self.run(job).await?);
        }
        Ok(reports)
    }

    /// Run one job to completion
    ///
    /// Emits [`Event::Complete`] or [`Event::Failed`] before returning. The
    /// workspace is removed on every exit path.
    pub async fn run(&self, job: &RepackJob) -> Result<RepackReport> {
        info!(job = %job.name, url = %job.url, "starting repack job");

        match self.run_job(job).await {
            Ok(report) => {
                info!(
                    job = %job.name,
                    output = ?report.output,
                    entries = report.entries_written,
                    "repack job complete"
                );
                self.emit(Event::Complete {
                    name: job.name.clone(),
                    output: report.output.clone(),
                });
                Ok(report)
            }
            Err(e) => {
                warn!(job = %job.name, stage = ?e.stage(), error = %e, "repack job failed");
                self.emit(Event::Failed {
                    name: job.name.clone(),
                    stage: e.stage(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn run_job(&self, job: &RepackJob) -> Result<RepackReport> {
        let repack = &self.config.repack;
        let locate_marker = job
            .locate_marker
            .clone()
            .unwrap_or_else(|| repack.locate_marker.clone());
        let exclude_marker = job
            .exclude_marker
            .clone()
            .unwrap_or_else(|| repack.exclude_marker.clone());
        validate_marker("locate_marker", &locate_marker)?;
        validate_marker("exclude_marker", &exclude_marker)?;
        let output_name = output_file_name(&job.output)?;

        let workspace = Workspace::create(&self.config.workspace)?;
        let report = self
            .run_in_workspace(job, &workspace, locate_marker, exclude_marker, output_name)
            .await;

        // Cleanup failures after a successful move do not undo the output
        if let Err(e) = workspace.close() {
            warn!(job = %job.name, error = %e, "failed to remove workspace");
        }

        report
    }

    async fn run_in_workspace(
        &self,
        job: &RepackJob,
        workspace: &Workspace,
        locate_marker: String,
        exclude_marker: String,
        output_name: String,
    ) -> Result<RepackReport> {
        let stub = job.stub();
        let case_insensitive = self.config.repack.case_insensitive;

        // Download
        let mut artifact = RemoteArtifact::new(job.url.clone());
        artifact.expected_size = job.expected_size;
        let archive_path = workspace.downloads_dir()?.join(format!("{}.archive", stub));

        self.emit(Event::DownloadStarted {
            name: job.name.clone(),
            url: job.url.to_string(),
        });
        let download = download_to_file(&self.client, &artifact, &archive_path, |downloaded, total| {
            self.emit(Event::Downloading {
                name: job.name.clone(),
                downloaded,
                total,
            });
        })
        .await?;
        self.emit(Event::DownloadComplete {
            name: job.name.clone(),
            bytes: download.bytes_written,
        });

        // Open, locate and extract
        let extract_dir = workspace.extraction_dir(&stub)?;
        let outer = download.path.clone();
        let extracted = run_blocking(Stage::Extract, move || {
            let mut reader = open_archive(&outer)?;
            extract_nested_archives(reader.as_mut(), &locate_marker, case_insensitive, &extract_dir)
        })
        .await?;

        for nested in &extracted {
            self.emit(Event::NestedArchiveFound {
                name: job.name.clone(),
                entry: nested.entry_name.clone(),
            });
        }

        // Repackage into the staging area
        let staged = workspace.output_dir()?.join(&output_name);
        let compression = self.config.repack.compression;
        let sources = extracted.clone();
        let name = job.name.clone();
        let (totals, events, staged) = run_blocking(Stage::Repackage, move || {
            let mut writer = ZipArchiveWriter::create(&staged, compression)?;
            let mut events = Vec::new();
            let totals = repackage(
                &sources,
                &exclude_marker,
                case_insensitive,
                &mut writer,
                &mut |progress| events.push(progress_event(&name, &sources, progress)),
            )?;
            let staged = writer.finish()?;
            Ok((totals, events, staged))
        })
        .await?;

        for event in events {
            self.emit(event);
        }

        // Move into place
        let output = place_output(&staged, &job.output, self.config.repack.output_collision).await?;

        Ok(RepackReport {
            output,
            sources: extracted.into_iter().map(|e| e.entry_name).collect(),
            entries_written: totals.entries_written,
            entries_skipped: totals.entries_skipped,
            bytes_written: totals.bytes_written,
            downloaded_bytes: download.bytes_written,
        })
    }

    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("subscribers", &self.event_tx.receiver_count())
            .finish()
    }
}

/// Run a blocking archive stage off the async runtime
async fn run_blocking<T, F>(stage: Stage, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskFailed {
            stage,
            reason: format!("{} task panicked: {}", stage, e),
        })?
}

fn progress_event(
    name: &str,
    sources: &[ExtractedNestedArchive],
    progress: RepackProgress<'_>,
) -> Event {
    match progress {
        RepackProgress::Source(path) => Event::Repackaging {
            name: name.to_string(),
            source: sources
                .iter()
                .find(|s| s.path == path)
                .map(|s| s.entry_name.clone())
                .unwrap_or_else(|| path.display().to_string()),
        },
        RepackProgress::Skipped(entry) => Event::EntrySkipped {
            name: name.to_string(),
            entry: entry.to_string(),
        },
    }
}

/// File name of the job's destination, used for the staged copy
fn output_file_name(output: &Path) -> Result<String> {
    output
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Config {
            message: format!("output path {:?} has no file name", output),
            key: Some("output".to_string()),
        })
}

/// Apply the collision policy to the requested output path
pub fn resolve_output_path(path: &Path, policy: OutputCollision) -> Result<PathBuf> {
    match policy {
        OutputCollision::Overwrite => Ok(path.to_path_buf()),
        OutputCollision::Fail => {
            if path.exists() {
                return Err(Error::io(
                    Stage::Repackage,
                    path,
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "output file already exists",
                    ),
                ));
            }
            Ok(path.to_path_buf())
        }
        OutputCollision::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| Error::Config {
                    message: format!("output path {:?} has no file stem", path),
                    key: Some("output".to_string()),
                })?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path.parent().unwrap_or_else(|| Path::new(""));

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let candidate = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let candidate = parent.join(candidate);
                if !candidate.exists() {
                    return Ok(candidate);
                }
            }

            Err(Error::io(
                Stage::Repackage,
                path,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("no free file name after {} attempts", MAX_RENAME_ATTEMPTS),
                ),
            ))
        }
    }
}

/// Move the finalized archive from the workspace to its destination
///
/// Falls back to copying when the workspace and destination are on
/// different filesystems. A failed copy removes the partial destination.
async fn place_output(staged: &Path, requested: &Path, policy: OutputCollision) -> Result<PathBuf> {
    use tokio::fs;

    if let Some(parent) = requested.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(Stage::Repackage, parent, e))?;
    }

    let destination = resolve_output_path(requested, policy)?;
    debug!(?staged, ?destination, "moving output archive");

    if let Err(e) = fs::rename(staged, &destination).await {
        debug!(error = %e, "rename failed, copying output archive");
        if let Err(e) = fs::copy(staged, &destination).await {
            fs::remove_file(&destination).await.ok();
            return Err(Error::io(Stage::Repackage, &destination, e));
        }
    }

    Ok(destination)
}
