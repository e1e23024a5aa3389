use crate::period::Period;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// On-disk layout of an audited table's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Orc,
    Parquet,
    Textfile,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Orc => "orc",
            FileFormat::Parquet => "parquet",
            FileFormat::Textfile => "textfile",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "orc" => Ok(FileFormat::Orc),
            "parquet" => Ok(FileFormat::Parquet),
            "textfile" => Ok(FileFormat::Textfile),
            other => Err(format!("unknown file format: {other}")),
        }
    }
}

/// Fully-resolved unit of counting work: one table partition to measure
/// for one completion record. Built just in time before fan-out and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditJob {
    pub task_name: String,
    pub interface_id: String,
    pub platform_id: String,
    pub partner_id: String,
    pub table_name: String,
    pub hdfs_path: String,
    pub format: FileFormat,
    /// Line delimiter, textfile only.
    pub delimiter: Option<String>,
    pub period: Period,
    pub batch_no: String,
    /// Thread count handed to the counter subprocess.
    pub jar_threads: usize,
}
