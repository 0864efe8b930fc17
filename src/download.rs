//! Streaming HTTP download into a workspace file
//!
//! The response body is written chunk by chunk; after every chunk the progress
//! observer is called inline with `(bytes_so_far, total)`.

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::types::{LocalDownload, RemoteArtifact, Stage};
use std::path::Path;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Write buffer size for the destination file
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Build the HTTP client used for archive downloads
pub fn build_client(config: &DownloadConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.clone());

    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }

    builder.build().map_err(|e| Error::Config {
        message: format!("failed to create HTTP client: {}", e),
        key: None,
    })
}

/// Download `artifact` into `dest`, reporting progress after every chunk
///
/// `on_progress` receives the running byte count and the total size when it is
/// known (from the artifact, else from `Content-Length`). With an unknown total
/// the count is still exact.
///
/// # Errors
/// * [`Error::Transport`] - connection failure, body read failure or truncated body
/// * [`Error::HttpStatus`] - non-success response
/// * [`Error::Io`] - the destination file could not be created or written
pub async fn download_to_file<F>(
    client: &reqwest::Client,
    artifact: &RemoteArtifact,
    dest: &Path,
    mut on_progress: F,
) -> Result<LocalDownload>
where
    F: FnMut(u64, Option<u64>),
{
    let url = artifact.url.as_str();
    debug!(url, ?dest, "requesting archive");

    let mut response = client
        .get(artifact.url.clone())
        .send()
        .await
        .map_err(|e| transport_error(url, &e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_length = response.content_length().filter(|&len| len > 0);
    let total = artifact.declared_size().or(content_length);

    let file = tokio::fs::File::create(dest)
        .await
        .map_err(|e| Error::io(Stage::Download, dest, e))?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

    info!(url, ?dest, ?total, "downloading archive");

    let mut downloaded: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| transport_error(url, &e))?
    {
        if chunk.is_empty() {
            continue;
        }
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| Error::io(Stage::Download, dest, e))?;
        downloaded += chunk.len() as u64;
        on_progress(downloaded, total);
    }

    writer
        .flush()
        .await
        .map_err(|e| Error::io(Stage::Download, dest, e))?;
    drop(writer);

    if let Some(expected) = content_length
        && downloaded != expected
    {
        warn!(url, downloaded, expected, "response body ended early");
        return Err(Error::Transport {
            url: url.to_string(),
            reason: format!(
                "truncated body: received {} of {} bytes",
                downloaded, expected
            ),
        });
    }

    info!(url, ?dest, bytes = downloaded, "download complete");

    Ok(LocalDownload {
        path: dest.to_path_buf(),
        bytes_written: downloaded,
        complete: true,
    })
}

fn transport_error(url: &str, e: &reqwest::Error) -> Error {
    let reason = if e.is_timeout() {
        format!("timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    };
    Error::Transport {
        url: url.to_string(),
        reason,
    }
}
