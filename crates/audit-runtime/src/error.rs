use audit_config::error::ConfigError;
use audit_core::error::WatermarkError;
use connectors::clickhouse::error::FetchError;
use thiserror::Error;

/// Top-level failures of an orchestrator run.
///
/// Per-job counting problems are not represented here — they become
/// failed ledger rows. These are the conditions that abort the run or
/// taint its exit status on their own.
#[derive(Debug, Error)]
pub enum AuditRunError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Upstream fetch failed; the watermark is left untouched.
    #[error("Failed to fetch completed tasks: {0}")]
    Fetch(#[from] FetchError),

    /// The run's jobs succeeded but their window could not be sealed; the
    /// next run will re-scan it, so the operator must notice.
    #[error("Failed to persist watermark: {0}")]
    Watermark(#[from] WatermarkError),
}
