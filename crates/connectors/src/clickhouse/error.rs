use thiserror::Error;

/// Failures pulling completion records from the scheduler log. Any of
/// these aborts the run; the watermark is never advanced past an
/// unfetched window.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("No ClickHouse hosts configured")]
    NoHosts,

    /// Every configured host failed at the connection level.
    #[error("All ClickHouse hosts unreachable ({hosts}): {source}")]
    AllHostsFailed {
        hosts: String,
        #[source]
        source: clickhouse::error::Error,
    },

    /// The server rejected the query; retrying another host won't help.
    #[error("ClickHouse query failed: {0}")]
    Query(#[from] clickhouse::error::Error),
}
