//! Configuration types for repack-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// HTTP download settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Connection timeout in seconds (default: 30)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Whole-request timeout in seconds (None = no limit, the default)
    ///
    /// Archive bodies can be large, so no overall deadline is imposed unless
    /// one is configured.
    #[serde(default, with = "optional_duration_serde")]
    pub request_timeout: Option<Duration>,

    /// User-Agent header sent with the request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: None,
            user_agent: default_user_agent(),
        }
    }
}

/// ZIP compression method for output entries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputCompression {
    /// Store entries uncompressed
    Stored,
    /// Deflate entries (default)
    #[default]
    Deflated,
}

/// What to do when the output path already exists
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputCollision {
    /// Replace the existing file (default)
    #[default]
    Overwrite,
    /// Append (1), (2), etc. to the file name
    Rename,
    /// Fail the job
    Fail,
}

/// Locate/filter and output settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepackConfig {
    /// Default marker selecting nested archive entries (default: ".fomod")
    #[serde(default = "default_locate_marker")]
    pub locate_marker: String,

    /// Default marker selecting entries to leave out (default: "fomod")
    #[serde(default = "default_exclude_marker")]
    pub exclude_marker: String,

    /// Match markers ignoring ASCII case (default: false)
    #[serde(default)]
    pub case_insensitive: bool,

    /// Output entry compression
    #[serde(default)]
    pub compression: OutputCompression,

    /// Output path collision handling
    #[serde(default)]
    pub output_collision: OutputCollision,
}

impl Default for RepackConfig {
    fn default() -> Self {
        Self {
            locate_marker: default_locate_marker(),
            exclude_marker: default_exclude_marker(),
            case_insensitive: false,
            compression: OutputCompression::default(),
            output_collision: OutputCollision::default(),
        }
    }
}

/// Temporary workspace settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Parent directory for workspaces (None = system temp directory)
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,

    /// Workspace directory name prefix (default: "repack-dl-")
    #[serde(default = "default_workspace_prefix")]
    pub prefix: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            prefix: default_workspace_prefix(),
        }
    }
}

/// Main configuration for [`Pipeline`](crate::Pipeline)
///
/// Sub-config fields are flattened, so the JSON format has no nesting.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP download settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Marker and output settings
    #[serde(flatten)]
    pub repack: RepackConfig,

    /// Workspace settings
    #[serde(flatten)]
    pub workspace: WorkspaceConfig,
}

impl Config {
    /// Load configuration from a JSON file
    ///
    /// Missing fields take their defaults. The loaded configuration is validated.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file {}: {}", path.display(), e),
            key: None,
        })?;

        let config: Config = serde_json::from_str(&content).map_err(|e| Error::Config {
            message: format!("failed to parse config file {}: {}", path.display(), e),
            key: None,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<()> {
        validate_marker("locate_marker", &self.repack.locate_marker)?;
        validate_marker("exclude_marker", &self.repack.exclude_marker)?;

        if self.download.user_agent.trim().is_empty() {
            return Err(Error::Config {
                message: "user agent must not be empty".to_string(),
                key: Some("user_agent".to_string()),
            });
        }

        if self.workspace.prefix.contains(['/', '\\']) {
            return Err(Error::Config {
                message: format!(
                    "workspace prefix {:?} must not contain path separators",
                    self.workspace.prefix
                ),
                key: Some("prefix".to_string()),
            });
        }

        Ok(())
    }
}

/// Reject empty markers: an empty substring matches every entry name.
pub(crate) fn validate_marker(key: &str, marker: &str) -> Result<()> {
    if marker.is_empty() {
        return Err(Error::Config {
            message: format!("{} must not be empty", key),
            key: Some(key.to_string()),
        });
    }
    Ok(())
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_user_agent() -> String {
    format!("repack-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_locate_marker() -> String {
    ".fomod".to_string()
}

fn default_exclude_marker() -> String {
    "fomod".to_string()
}

fn default_workspace_prefix() -> String {
    "repack-dl-".to_string()
}

// Duration serialization helper (as seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
