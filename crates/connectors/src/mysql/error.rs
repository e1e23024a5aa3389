use thiserror::Error;

/// Failures writing to the audit ledger. A single failed append is
/// recorded against its job; it never aborts other jobs' writes.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to connect to audit database: {0}")]
    Connect(sqlx::Error),

    #[error("Failed to append audit row: {0}")]
    Append(sqlx::Error),
}
