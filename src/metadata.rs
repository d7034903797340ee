//! Sidecar metadata for fetched files.
//!
//! Stored as JSON next to the file it describes (`<file>.meta`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// What is known about the last successful fetch of a remote file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchMetadata {
    /// Source URL
    #[serde(default)]
    pub url: Option<String>,
    /// When the file was last fetched
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub last_fetched: Option<DateTime<Utc>>,
    /// `Last-Modified` as sent by the server
    #[serde(default)]
    pub last_modified: Option<String>,
}

impl FetchMetadata {
    /// Record a fetch that happened now.
    pub fn fetched_now(url: &str, last_modified: Option<String>) -> Self {
        Self {
            url: Some(url.to_string()),
            last_fetched: Some(Utc::now()),
            last_modified,
        }
    }

    /// Sidecar path for `path`.
    pub fn sidecar_path(path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(".meta");
        path.with_file_name(name)
    }

    /// Load the sidecar of `path`. A missing sidecar yields empty metadata.
    pub fn load_for(path: impl AsRef<Path>) -> Result<Self> {
        let sidecar = Self::sidecar_path(path);
        if !sidecar.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(sidecar)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the sidecar of `path`.
    pub fn save_for(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(Self::sidecar_path(path), content)?;
        Ok(())
    }
}
