use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::EngineResult;
use crate::spec::spec_model::TestRun;

pub const LOGS_DIR: &str = "logs";
pub const SCREENSHOTS_DIR: &str = "screenshots";

/// A screenshot written to disk, with its base64 form for inline responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredScreenshot {
    pub path: PathBuf,
    pub base64: String,
}

/// Artifact file names grouped by kind, sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactListing {
    pub logs: Vec<String>,
    pub screenshots: Vec<String>,
}

/// Results directory tree: `<root>/logs` and `<root>/screenshots`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join(LOGS_DIR)
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.root.join(SCREENSHOTS_DIR)
    }

    /// Write `logs/{testCaseId}_{timestamp}.json`.
    pub async fn write_run_log(&self, run: &TestRun) -> EngineResult<PathBuf> {
        let dir = self.logs_dir();
        fs::create_dir_all(&dir).await?;

        let at = run.completed_at.unwrap_or_else(Utc::now);
        let path = dir.join(format!(
            "{}_{}.json",
            file_stem(&run.test_case_id),
            file_timestamp(at)
        ));
        let json = serde_json::to_vec_pretty(run)?;
        fs::write(&path, json).await?;

        debug!(path = %path.display(), "run log written");
        Ok(path)
    }

    /// Write `screenshots/{testCaseId}_{label}_{timestamp}.png`.
    pub async fn write_screenshot(
        &self,
        test_case_id: &str,
        label: &str,
        png: &[u8],
    ) -> EngineResult<StoredScreenshot> {
        let dir = self.screenshots_dir();
        fs::create_dir_all(&dir).await?;

        let path = dir.join(format!(
            "{}_{}_{}.png",
            file_stem(test_case_id),
            file_stem(label),
            file_timestamp(Utc::now())
        ));
        fs::write(&path, png).await?;

        debug!(path = %path.display(), "screenshot written");
        Ok(StoredScreenshot {
            path,
            base64: STANDARD.encode(png),
        })
    }

    /// Artifacts whose file name starts with `prefix` (all when empty).
    /// Missing directories list as empty.
    pub async fn list_artifacts(&self, prefix: &str) -> EngineResult<ArtifactListing> {
        Ok(ArtifactListing {
            logs: list_dir(&self.logs_dir(), prefix).await?,
            screenshots: list_dir(&self.screenshots_dir(), prefix).await?,
        })
    }
}

async fn list_dir(dir: &Path, prefix: &str) -> EngineResult<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(prefix) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// ISO-8601 with millisecond precision, `:` replaced for portable file names.
fn file_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H-%M-%S%.3fZ").to_string()
}

/// Keep ids readable in file names while stripping path separators.
pub fn file_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
