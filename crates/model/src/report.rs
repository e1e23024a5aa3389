use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Outcome class of a counting run, as reported by the counter's JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountStatus {
    Success,
    Partial,
    Failed,
}

impl CountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountStatus::Success => "success",
            CountStatus::Partial => "partial",
            CountStatus::Failed => "failed",
        }
    }

    /// Anything the counter reports outside the known vocabulary counts as
    /// a failure.
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "success" => CountStatus::Success,
            "partial" => CountStatus::Partial,
            _ => CountStatus::Failed,
        }
    }
}

impl fmt::Display for CountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CountStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CountStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(CountStatus::normalize(&raw))
    }
}

/// One file the counter could not read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub message: String,
}

/// Normalized result of measuring one audit job; mirrors the counter
/// subprocess JSON. Missing fields take failure-safe defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountReport {
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_row_count")]
    pub row_count: i64,
    #[serde(default)]
    pub file_count: i64,
    #[serde(default)]
    pub success_file_count: i64,
    #[serde(default)]
    pub total_size_bytes: i64,
    #[serde(default = "default_status")]
    pub status: CountStatus,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub errors: Vec<FileError>,
}

fn default_row_count() -> i64 {
    -1
}

fn default_status() -> CountStatus {
    CountStatus::Failed
}

impl CountReport {
    /// Synthesized total failure: row count −1 and a single error entry.
    pub fn failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            row_count: -1,
            file_count: 0,
            success_file_count: 0,
            total_size_bytes: 0,
            status: CountStatus::Failed,
            duration_ms: 0,
            errors: vec![FileError {
                path: String::new(),
                message: message.into(),
            }],
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == CountStatus::Success
    }

    /// Error list encoded as a JSON string, `None` when there is nothing
    /// to report.
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        serde_json::to_string(&self.errors).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_counter_json() {
        let raw = r#"{
            "path": "/warehouse/dw/user_daily/dt=20260116",
            "row_count": 123456,
            "file_count": 10,
            "success_file_count": 10,
            "total_size_bytes": 1073741824,
            "status": "success",
            "duration_ms": 1500,
            "errors": []
        }"#;

        let report: CountReport = serde_json::from_str(raw).unwrap();
        assert!(report.is_success());
        assert_eq!(report.row_count, 123_456);
        assert_eq!(report.error_message(), None);
    }

    #[test]
    fn missing_fields_default_to_failure() {
        let report: CountReport = serde_json::from_str("{}").unwrap();
        assert_eq!(report.status, CountStatus::Failed);
        assert_eq!(report.row_count, -1);
    }

    #[test]
    fn unknown_status_normalizes_to_failed() {
        let report: CountReport =
            serde_json::from_str(r#"{"status": "EXPLODED", "row_count": 5}"#).unwrap();
        assert_eq!(report.status, CountStatus::Failed);
        assert_eq!(report.row_count, 5);
    }

    #[test]
    fn partial_report_serializes_error_list() {
        let raw = r#"{
            "row_count": 90,
            "status": "partial",
            "errors": [{"path": "/warehouse/x/part-3.orc", "message": "corrupt stripe"}]
        }"#;

        let report: CountReport = serde_json::from_str(raw).unwrap();
        assert_eq!(report.status, CountStatus::Partial);
        let msg = report.error_message().unwrap();
        assert!(msg.contains("corrupt stripe"));
        assert!(msg.contains("part-3.orc"));
    }
}
