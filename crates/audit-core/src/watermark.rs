use crate::error::WatermarkError;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Upper bound of the upstream completion window already processed.
///
/// `last_end_time` is monotonically non-decreasing across successful runs;
/// only an explicit reset rewinds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    pub last_end_time: DateTime<FixedOffset>,
    pub updated_at: Option<DateTime<FixedOffset>>,
}

#[derive(Serialize, Deserialize)]
struct WatermarkFile {
    last_end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
}

/// Persists the watermark to a JSON file with atomic replace.
///
/// Writes go to a sibling temporary file that is renamed over the final
/// name, so a reader never observes a partial state.
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or malformed state degrades to `None` with a diagnostic;
    /// the stored offset is preserved as written.
    pub fn load(&self) -> Option<Watermark> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Failed to read watermark file, treating as absent"
                );
                return None;
            }
        };

        let parsed: WatermarkFile = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Malformed watermark file, treating as absent"
                );
                return None;
            }
        };

        let last_end_time = match DateTime::parse_from_rfc3339(&parsed.last_end_time) {
            Ok(ts) => ts,
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    value = %parsed.last_end_time,
                    error = %err,
                    "Invalid watermark timestamp, treating as absent"
                );
                return None;
            }
        };
        let updated_at = parsed
            .updated_at
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok());

        Some(Watermark {
            last_end_time,
            updated_at,
        })
    }

    pub fn save(&self, last_end_time: DateTime<FixedOffset>) -> Result<(), WatermarkError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let state = WatermarkFile {
            last_end_time: last_end_time.to_rfc3339(),
            updated_at: Some(
                Utc::now()
                    .with_timezone(&last_end_time.timezone())
                    .to_rfc3339(),
            ),
        };

        let mut tmp = NamedTempFile::new_in(&parent)?;
        serde_json::to_writer_pretty(&mut tmp, &state)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path)?;

        debug!(
            path = %self.path.display(),
            last_end_time = %state.last_end_time,
            "Watermark saved"
        );
        Ok(())
    }

    /// Cold-start initialization; an alias of `save` spelled out so call
    /// sites read as intent.
    pub fn initialize_to(&self, instant: DateTime<FixedOffset>) -> Result<(), WatermarkError> {
        self.save(instant)
    }

    /// Deletes the state file. Idempotent.
    pub fn reset(&self) -> Result<(), WatermarkError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
