use crate::catalog::{AuditCatalog, ScheduleEntry, TableSpec};
use chrono::{NaiveDate, Timelike};
use chrono_tz::Tz;
use model::{
    completion::CompletionRecord,
    job::AuditJob,
    period::{Period, PeriodType, YearMonth},
};
use tracing::{debug, info, warn};

/// A job whose path still contains an unresolved placeholder. It is not
/// runnable; the orchestrator writes it to the ledger as a synthetic
/// failure so the gap stays visible downstream.
#[derive(Debug, Clone)]
pub struct RejectedJob {
    pub job: AuditJob,
    pub reason: String,
}

/// Outcome of expanding completion records against the catalog.
#[derive(Debug, Default)]
pub struct JobSet {
    pub runnable: Vec<AuditJob>,
    pub rejected: Vec<RejectedJob>,
}

impl JobSet {
    pub fn len(&self) -> usize {
        self.runnable.len() + self.rejected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runnable.is_empty() && self.rejected.is_empty()
    }

    /// Largest per-job thread count, used to clamp effective parallelism.
    pub fn max_jar_threads(&self) -> usize {
        self.runnable
            .iter()
            .map(|job| job.jar_threads)
            .max()
            .unwrap_or(1)
    }
}

/// Expands completion records into audit jobs via the catalog.
pub struct JobPlanner<'a> {
    catalog: &'a AuditCatalog,
    tz: Tz,
}

impl<'a> JobPlanner<'a> {
    pub fn new(catalog: &'a AuditCatalog, tz: Tz) -> Self {
        Self { catalog, tz }
    }

    /// One job per `(record, table)` pair. `resolved_date` is the run's
    /// business date; hourly records keep the date and hour of their own
    /// completion timestamp.
    pub fn build_jobs(&self, records: &[CompletionRecord], resolved_date: NaiveDate) -> JobSet {
        let mut set = JobSet::default();

        for record in records {
            let Some(schedule) = self.catalog.by_task(&record.task_name) else {
                debug!(task = %record.task_name, "Completed task has no catalog entry, ignoring");
                continue;
            };

            if let Some(period_type) = record.period_type {
                if period_type != schedule.period_type {
                    warn!(
                        task = %record.task_name,
                        batch = %record.batch_no,
                        upstream = %period_type,
                        catalog = %schedule.period_type,
                        "Period type mismatch between completion log and catalog, skipping batch"
                    );
                    continue;
                }
            }

            let period = self.resolve_period(schedule.period_type, record, resolved_date);
            for table in &schedule.tables {
                self.build_single(schedule, table, record, period, &mut set);
            }
        }

        info!(
            runnable = set.runnable.len(),
            rejected = set.rejected.len(),
            "Expanded completion records into audit jobs"
        );
        set
    }

    fn resolve_period(
        &self,
        period_type: PeriodType,
        record: &CompletionRecord,
        resolved_date: NaiveDate,
    ) -> Period {
        match period_type {
            PeriodType::Daily => Period::Daily(resolved_date),
            PeriodType::Monthly => Period::Monthly(YearMonth::from_date(resolved_date)),
            PeriodType::Hourly => match record.complete_dt {
                Some(ts) => {
                    let local = ts.with_timezone(&self.tz);
                    Period::Hourly {
                        date: local.date_naive(),
                        hour: Some(local.hour()),
                    }
                }
                None => Period::Hourly {
                    date: resolved_date,
                    hour: None,
                },
            },
        }
    }

    fn build_single(
        &self,
        schedule: &ScheduleEntry,
        table: &TableSpec,
        record: &CompletionRecord,
        period: Period,
        set: &mut JobSet,
    ) {
        let defaults = &self.catalog.defaults;
        let threads = defaults
            .limits
            .clamp_jar_threads(table.threads.unwrap_or(defaults.jar_options.threads))
            .max(1);

        let hdfs_path = match &table.partition_template {
            Some(template) => {
                join_hdfs_path(&table.hdfs_path, &resolve_partition(template, &period))
            }
            None => table.hdfs_path.clone(),
        };

        let job = AuditJob {
            task_name: schedule.task_name.clone(),
            interface_id: schedule.interface_id.clone(),
            platform_id: schedule.platform_id.clone(),
            partner_id: schedule.partner_id.clone(),
            table_name: table.name.clone(),
            hdfs_path,
            format: table.format,
            delimiter: table.delimiter.clone(),
            period,
            batch_no: record.batch_no.clone(),
            jar_threads: threads,
        };

        match first_unresolved(&job.hdfs_path) {
            Some(placeholder) => {
                warn!(
                    task = %job.task_name,
                    table = %job.table_name,
                    path = %job.hdfs_path,
                    "Job path contains unresolved placeholder"
                );
                set.rejected.push(RejectedJob {
                    reason: format!("unresolved placeholder: {placeholder}"),
                    job,
                });
            }
            None => {
                debug!(
                    task = %job.task_name,
                    table = %job.table_name,
                    path = %job.hdfs_path,
                    batch = %job.batch_no,
                    "Created audit job"
                );
                set.runnable.push(job);
            }
        }
    }
}

/// Purely textual substitution. Unknown placeholders survive so callers
/// can detect them.
fn resolve_partition(template: &str, period: &Period) -> String {
    let mut resolved = template.to_string();
    if let Some(date) = period.data_date() {
        resolved = resolved.replace("${data_date}", &date);
    }
    if let Some(month) = period.data_month() {
        resolved = resolved.replace("${data_month}", &month);
    }
    if let Some(hour) = period.data_hour() {
        resolved = resolved.replace("${data_hour}", &hour);
    }
    resolved
}

/// Joins path segments without producing double slashes.
fn join_hdfs_path(base: &str, suffix: &str) -> String {
    if base.is_empty() {
        return suffix.to_string();
    }
    if suffix.is_empty() {
        return base.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        suffix.trim_start_matches('/')
    )
}

fn first_unresolved(path: &str) -> Option<&str> {
    let start = path.find("${")?;
    let rest = &path[start..];
    let end = rest.find('}').map(|i| i + 1).unwrap_or(rest.len());
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Asia::Shanghai;

    fn catalog() -> AuditCatalog {
        serde_yaml::from_str(
            r#"
defaults:
  jar_options:
    threads: 10
  limits:
    max_jar_threads: 8
schedules:
  - task_name: dw_user_daily
    interface_id: "1001"
    platform_id: P01
    partner_id: PT001
    period_type: daily
    tables:
      - name: dw.user_daily
        hdfs_path: /warehouse/dw/user_daily/
        format: orc
        partition_template: "dt=${data_date}"
  - task_name: ods_log_hourly
    period_type: hourly
    tables:
      - name: ods.log_hourly
        hdfs_path: /warehouse/ods/log_hourly
        format: textfile
        delimiter: "\\n"
        partition_template: "dt=${data_date}/hr=${data_hour}"
        threads: 16
  - task_name: rpt_month
    period_type: monthly
    tables:
      - name: rpt.month
        hdfs_path: /warehouse/rpt/month
        format: parquet
        partition_template: "month=${data_month}"
"#,
        )
        .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn daily_record_resolves_to_one_job() {
        let catalog = catalog();
        let planner = JobPlanner::new(&catalog, Shanghai);
        let records = vec![CompletionRecord {
            task_name: "dw_user_daily".into(),
            period_type: Some(PeriodType::Daily),
            batch_no: "20260116".into(),
            complete_dt: Some(Utc.with_ymd_and_hms(2026, 1, 17, 5, 2, 0).unwrap()),
        }];

        let set = planner.build_jobs(&records, date(2026, 1, 16));
        assert_eq!(set.runnable.len(), 1);
        assert!(set.rejected.is_empty());

        let job = &set.runnable[0];
        assert_eq!(job.hdfs_path, "/warehouse/dw/user_daily/dt=20260116");
        assert_eq!(job.batch_no, "20260116");
        assert_eq!(job.interface_id, "1001");
        assert_eq!(job.jar_threads, 8, "clamped by max_jar_threads");
    }

    #[test]
    fn hourly_record_takes_hour_from_completion_timestamp() {
        let catalog = catalog();
        let planner = JobPlanner::new(&catalog, Shanghai);
        // 2026-01-17T09:47+08:00 == 01:47 UTC
        let records = vec![CompletionRecord {
            task_name: "ods_log_hourly".into(),
            period_type: Some(PeriodType::Hourly),
            batch_no: "20260117_09".into(),
            complete_dt: Some(Utc.with_ymd_and_hms(2026, 1, 17, 1, 47, 0).unwrap()),
        }];

        // Explicit --date must not displace the record's own hour or date.
        let set = planner.build_jobs(&records, date(2026, 1, 10));
        let job = &set.runnable[0];
        assert!(job.hdfs_path.ends_with("/dt=20260117/hr=09"));
    }

    #[test]
    fn hourly_record_without_timestamp_is_rejected() {
        let catalog = catalog();
        let planner = JobPlanner::new(&catalog, Shanghai);
        let records = vec![CompletionRecord::synthetic(
            "ods_log_hourly",
            Some(PeriodType::Hourly),
        )];

        let set = planner.build_jobs(&records, date(2026, 1, 16));
        assert!(set.runnable.is_empty());
        assert_eq!(set.rejected.len(), 1);
        let rejected = &set.rejected[0];
        assert_eq!(rejected.reason, "unresolved placeholder: ${data_hour}");
        assert!(rejected.job.hdfs_path.contains("dt=20260116"));
    }

    #[test]
    fn monthly_record_uses_the_resolved_month() {
        let catalog = catalog();
        let planner = JobPlanner::new(&catalog, Shanghai);
        let records = vec![CompletionRecord::synthetic(
            "rpt_month",
            Some(PeriodType::Monthly),
        )];

        let set = planner.build_jobs(&records, date(2025, 12, 31));
        let job = &set.runnable[0];
        assert_eq!(job.hdfs_path, "/warehouse/rpt/month/month=202512");
        assert_eq!(job.period.data_date(), None);
    }

    #[test]
    fn period_mismatch_skips_the_record() {
        let catalog = catalog();
        let planner = JobPlanner::new(&catalog, Shanghai);
        let records = vec![CompletionRecord {
            task_name: "dw_user_daily".into(),
            period_type: Some(PeriodType::Hourly),
            batch_no: "x".into(),
            complete_dt: Some(Utc.with_ymd_and_hms(2026, 1, 17, 1, 0, 0).unwrap()),
        }];

        let set = planner.build_jobs(&records, date(2026, 1, 16));
        assert!(set.is_empty());
    }

    #[test]
    fn unknown_task_is_ignored() {
        let catalog = catalog();
        let planner = JobPlanner::new(&catalog, Shanghai);
        let records = vec![CompletionRecord::synthetic("not_in_catalog", None)];
        assert!(planner.build_jobs(&records, date(2026, 1, 16)).is_empty());
    }

    #[test]
    fn dedup_equivalence_on_duplicate_upstream_rows() {
        // Jobs built from a duplicated upstream result equal the jobs built
        // from its deduplicated projection.
        let catalog = catalog();
        let planner = JobPlanner::new(&catalog, Shanghai);
        let base = CompletionRecord {
            task_name: "dw_user_daily".into(),
            period_type: Some(PeriodType::Daily),
            batch_no: "20260116".into(),
            complete_dt: Some(Utc.with_ymd_and_hms(2026, 1, 17, 5, 0, 0).unwrap()),
        };
        let mut later = base.clone();
        later.complete_dt = Some(Utc.with_ymd_and_hms(2026, 1, 17, 6, 0, 0).unwrap());

        let duplicated = model::completion::dedupe_latest(vec![base, later.clone()]);
        let from_duplicates = planner.build_jobs(&duplicated, date(2026, 1, 16));
        let from_single = planner.build_jobs(std::slice::from_ref(&later), date(2026, 1, 16));
        assert_eq!(from_duplicates.runnable, from_single.runnable);
    }

    #[test]
    fn path_join_avoids_double_slashes() {
        assert_eq!(join_hdfs_path("/a/b/", "/dt=1"), "/a/b/dt=1");
        assert_eq!(join_hdfs_path("/a/b", "dt=1"), "/a/b/dt=1");
        assert_eq!(join_hdfs_path("", "dt=1"), "dt=1");
        assert_eq!(join_hdfs_path("/a/b", ""), "/a/b");
    }

    #[test]
    fn first_unresolved_names_the_placeholder() {
        assert_eq!(
            first_unresolved("/warehouse/t/dt=${data_hour}"),
            Some("${data_hour}")
        );
        assert_eq!(first_unresolved("/warehouse/t/dt=20260116"), None);
        assert_eq!(first_unresolved("/warehouse/t/${broken"), Some("${broken"));
    }
}
