use audit_config::error::ConfigError;
use audit_runtime::error::AuditRunError;
use connectors::mysql::error::SinkError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Audit run failed: {0}")]
    Run(#[from] AuditRunError),

    #[error("Failed to connect to audit database: {0}")]
    Sink(#[from] SinkError),

    #[error("hdfs-counter jar not provided; pass --jar or set HDFS_COUNTER_JAR")]
    MissingJar,

    #[error("hdfs-counter jar not found: {0}")]
    JarNotFound(String),
}
