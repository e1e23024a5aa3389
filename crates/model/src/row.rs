use crate::{
    job::AuditJob,
    period::PeriodType,
    report::{CountReport, CountStatus},
};
use chrono::{DateTime, FixedOffset, NaiveDate};

/// Longest error payload stored in the ledger's `error_msg` column.
pub const ERROR_MSG_MAX_BYTES: usize = 4096;

/// The flat append record for the audit ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditResultRow {
    pub task_name: String,
    pub interface_id: String,
    pub platform_id: String,
    pub partner_id: String,
    pub table_name: String,
    pub hdfs_path: String,
    pub period_type: PeriodType,
    pub batch_no: String,
    pub data_date: Option<NaiveDate>,
    pub data_month: Option<String>,
    pub data_hour: Option<String>,
    pub row_count: i64,
    pub file_count: i64,
    pub total_size_bytes: i64,
    pub status: CountStatus,
    pub error_msg: Option<String>,
    pub duration_ms: i64,
    pub created_at: DateTime<FixedOffset>,
}

impl AuditResultRow {
    pub fn from_report(
        job: &AuditJob,
        report: &CountReport,
        created_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            task_name: job.task_name.clone(),
            interface_id: job.interface_id.clone(),
            platform_id: job.platform_id.clone(),
            partner_id: job.partner_id.clone(),
            table_name: job.table_name.clone(),
            hdfs_path: job.hdfs_path.clone(),
            period_type: job.period.period_type(),
            batch_no: job.batch_no.clone(),
            data_date: job.period.naive_date(),
            data_month: job.period.data_month(),
            data_hour: job.period.data_hour(),
            row_count: report.row_count,
            file_count: report.file_count,
            total_size_bytes: report.total_size_bytes,
            status: report.status,
            error_msg: report
                .error_message()
                .map(|msg| truncate_utf8(msg, ERROR_MSG_MAX_BYTES)),
            duration_ms: report.duration_ms,
            created_at,
        }
    }
}

/// Truncates to at most `max` bytes without splitting a UTF-8 sequence.
fn truncate_utf8(mut text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text
}
