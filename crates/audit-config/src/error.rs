use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// All of these are fatal before any job runs; per-job placeholder
/// problems are not errors but rejected jobs (see `jobs::RejectedJob`).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid date '{0}': expected YYYYMMDD")]
    InvalidDate(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),
}
