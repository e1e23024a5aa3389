use model::{
    job::AuditJob,
    report::{CountReport, CountStatus},
};
use serde::Serialize;

/// Per-job line in the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct JobDetail {
    pub table_name: String,
    pub hdfs_path: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated outcome of one orchestrator run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Jobs planned, including rejected ones.
    pub total: usize,
    pub success: usize,
    pub partial: usize,
    pub failed: usize,
    /// Rows that could not be appended to the ledger.
    pub sink_errors: usize,
    pub cancelled: bool,
    pub watermark_advanced: bool,
    pub details: Vec<JobDetail>,
}

impl RunSummary {
    pub fn record(&mut self, job: &AuditJob, report: &CountReport, sink_error: Option<String>) {
        match report.status {
            CountStatus::Success => self.success += 1,
            CountStatus::Partial => self.partial += 1,
            CountStatus::Failed => self.failed += 1,
        }
        if sink_error.is_some() {
            self.sink_errors += 1;
        }
        self.details.push(JobDetail {
            table_name: job.table_name.clone(),
            hdfs_path: job.hdfs_path.clone(),
            status: report.status.to_string(),
            row_count: Some(report.row_count),
            error: sink_error.or_else(|| report.error_message()),
        });
    }

    /// Every job reported success and every row reached the ledger.
    pub fn all_success(&self) -> bool {
        self.partial == 0 && self.failed == 0 && self.sink_errors == 0
    }

    /// `0` only for a clean, uncancelled run.
    pub fn exit_code(&self) -> i32 {
        if !self.cancelled && self.all_success() {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use model::{job::FileFormat, period::Period};

    fn job(table: &str) -> AuditJob {
        AuditJob {
            task_name: "t".into(),
            interface_id: String::new(),
            platform_id: String::new(),
            partner_id: String::new(),
            table_name: table.into(),
            hdfs_path: format!("/warehouse/{table}"),
            format: FileFormat::Orc,
            delimiter: None,
            period: Period::Daily(NaiveDate::from_ymd_opt(2026, 1, 16).unwrap()),
            batch_no: String::new(),
            jar_threads: 1,
        }
    }

    fn report(status: CountStatus) -> CountReport {
        CountReport {
            path: String::new(),
            row_count: 1,
            file_count: 1,
            success_file_count: 1,
            total_size_bytes: 1,
            status,
            duration_ms: 1,
            errors: vec![],
        }
    }

    #[test]
    fn clean_run_exits_zero() {
        let mut summary = RunSummary::default();
        summary.total = 2;
        summary.record(&job("a"), &report(CountStatus::Success), None);
        summary.record(&job("b"), &report(CountStatus::Success), None);
        assert!(summary.all_success());
        assert_eq!(summary.exit_code(), 0);
    }

    #[test]
    fn partial_and_failed_jobs_exit_one() {
        let mut summary = RunSummary::default();
        summary.record(&job("a"), &report(CountStatus::Partial), None);
        assert_eq!(summary.exit_code(), 1);

        let mut summary = RunSummary::default();
        summary.record(&job("a"), &report(CountStatus::Failed), None);
        assert_eq!((summary.failed, summary.exit_code()), (1, 1));
    }

    #[test]
    fn sink_errors_and_cancellation_exit_one() {
        let mut summary = RunSummary::default();
        summary.record(
            &job("a"),
            &report(CountStatus::Success),
            Some("connection reset".into()),
        );
        assert_eq!(summary.sink_errors, 1);
        assert_eq!(summary.exit_code(), 1);

        let summary = RunSummary {
            cancelled: true,
            ..RunSummary::default()
        };
        assert_eq!(summary.exit_code(), 1);
    }

    #[test]
    fn empty_run_is_a_clean_run() {
        assert_eq!(RunSummary::default().exit_code(), 0);
    }
}
