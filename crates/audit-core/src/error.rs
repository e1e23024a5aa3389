use thiserror::Error;

/// Errors persisting the fetch watermark.
///
/// Load-side problems are deliberately not represented here: a missing or
/// corrupt watermark file degrades to "no watermark" so a damaged state
/// file can never take a run down.
#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize watermark state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to replace watermark file: {0}")]
    Persist(#[from] tempfile::PersistError),
}
