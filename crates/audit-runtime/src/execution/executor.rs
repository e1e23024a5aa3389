use crate::{
    error::AuditRunError,
    execution::workers,
    options::{RunMode, RunOptions},
    summary::{JobDetail, RunSummary},
};
use audit_config::{
    catalog::AuditCatalog,
    date,
    jobs::{JobPlanner, JobSet},
};
use audit_core::{
    watermark::FileWatermarkStore,
    window::{plan_window, FetchWindow},
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use connectors::{
    clickhouse::fetcher::TaskFetcher, counter::driver::JobCounter, mysql::sink::ResultSink,
};
use model::{completion::CompletionRecord, report::CountReport, row::AuditResultRow};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Everything the orchestrator needs wired up before a run.
pub struct ExecutorParts {
    pub catalog: AuditCatalog,
    /// Scheduler timezone; drives window math and business dates.
    pub timezone: Tz,
    /// Absent when no completion log is configured; upstream mode then
    /// degrades to auditing every catalog entry.
    pub fetcher: Option<Arc<dyn TaskFetcher>>,
    pub counter: Arc<dyn JobCounter>,
    /// Absent only for dry runs.
    pub sink: Option<Arc<dyn ResultSink>>,
    pub cancel: CancellationToken,
}

/// The orchestrator core: mode handling, window planning, job expansion,
/// bounded fan-out, aggregation and watermark advancement.
pub struct AuditExecutor {
    parts: ExecutorParts,
}

impl AuditExecutor {
    pub fn new(parts: ExecutorParts) -> Self {
        Self { parts }
    }

    pub async fn run(&self, opts: &RunOptions) -> Result<RunSummary, AuditRunError> {
        let now = Utc::now().with_timezone(&self.parts.timezone);
        self.run_at(opts, now).await
    }

    /// `run` with an injected clock.
    pub async fn run_at(
        &self,
        opts: &RunOptions,
        now: DateTime<Tz>,
    ) -> Result<RunSummary, AuditRunError> {
        let started = std::time::Instant::now();
        let resolved_date = date::resolve_data_date(
            opts.data_date,
            self.parts.catalog.defaults.data_date.as_deref(),
            now,
        )?;
        info!(
            data_date = %resolved_date.format("%Y%m%d"),
            dry_run = opts.dry_run,
            "Starting audit run"
        );

        let store = self.watermark_store(opts);
        if let Some(store) = &store {
            if opts.watermark.reset && !opts.dry_run {
                store.reset()?;
                warn!(path = %store.path().display(), "Watermark reset");
            }
        }

        let (records, window) = match self.gather_records(opts, &store, now, resolved_date).await? {
            Gathered::Records(records, window) => (records, window),
            Gathered::InitializedOnly => {
                return Ok(RunSummary {
                    watermark_advanced: true,
                    ..RunSummary::default()
                });
            }
        };

        let planner = JobPlanner::new(&self.parts.catalog, self.parts.timezone);
        let jobs = planner.build_jobs(&records, resolved_date);

        if opts.dry_run {
            return Ok(self.dry_run_summary(&jobs));
        }

        if jobs.is_empty() {
            warn!("No audit jobs to execute");
            let mut summary = RunSummary::default();
            // Advancing over an empty window avoids re-querying it forever.
            self.advance_watermark_if_due(opts, store.as_ref(), window, &mut summary)?;
            return Ok(summary);
        }

        let sink = self
            .parts
            .sink
            .clone()
            .ok_or_else(|| AuditRunError::Initialization("result sink not configured".into()))?;

        let mut summary = RunSummary {
            total: jobs.len(),
            ..RunSummary::default()
        };
        self.append_rejected(&jobs, sink.as_ref(), now, &mut summary)
            .await;

        let concurrency = self.resolve_concurrency(opts, &jobs);
        let outcomes = workers::run_jobs(
            jobs.runnable,
            self.parts.counter.clone(),
            sink.clone(),
            concurrency,
            self.parts.timezone,
            self.parts.cancel.clone(),
        )
        .await;
        for outcome in outcomes {
            summary.record(&outcome.job, &outcome.report, outcome.sink_error);
        }

        if self.parts.cancel.is_cancelled() {
            summary.cancelled = true;
            warn!("Run cancelled; undispatched jobs dropped, watermark untouched");
        }

        self.advance_watermark_if_due(opts, store.as_ref(), window, &mut summary)?;

        info!(
            total = summary.total,
            success = summary.success,
            partial = summary.partial,
            failed = summary.failed,
            sink_errors = summary.sink_errors,
            duration_s = %format!("{:.1}", started.elapsed().as_secs_f64()),
            "Audit run completed"
        );
        Ok(summary)
    }

    async fn gather_records(
        &self,
        opts: &RunOptions,
        store: &Option<FileWatermarkStore>,
        now: DateTime<Tz>,
        resolved_date: chrono::NaiveDate,
    ) -> Result<Gathered, AuditRunError> {
        match &opts.mode {
            RunMode::ExplicitTasks(names) => {
                info!(tasks = %names.join(","), "Using explicit task list");
                let records = names
                    .iter()
                    .map(|name| CompletionRecord::synthetic(name.clone(), None))
                    .collect();
                Ok(Gathered::Records(records, None))
            }
            RunMode::SkipUpstream => {
                info!("Completion log skipped, auditing all catalog entries");
                Ok(Gathered::Records(self.catalog_records(), None))
            }
            RunMode::Upstream => {
                let Some(fetcher) = &self.parts.fetcher else {
                    info!("No completion log configured, auditing all catalog entries");
                    return Ok(Gathered::Records(self.catalog_records(), None));
                };

                let watermark = store.as_ref().and_then(|s| s.load());
                if watermark.is_none() && opts.watermark.init_now && !opts.dry_run {
                    if let Some(store) = store {
                        store.initialize_to(now.fixed_offset())?;
                        warn!(
                            path = %store.path().display(),
                            last_end_time = %now,
                            "Watermark initialized to now, skipping historical backfill"
                        );
                        return Ok(Gathered::InitializedOnly);
                    }
                }

                let window = plan_window(
                    now.fixed_offset(),
                    watermark.as_ref(),
                    &opts.watermark.window_options(opts.lookback_hours),
                );
                info!(start = %window.start, end = %window.end, "Fetching completed tasks");

                let data_date = resolved_date.format("%Y%m%d").to_string();
                let records = fetcher.fetch(&window, &data_date).await?;
                info!(count = records.len(), "Fetched completion records");
                Ok(Gathered::Records(records, Some(window)))
            }
        }
    }

    fn catalog_records(&self) -> Vec<CompletionRecord> {
        self.parts
            .catalog
            .schedules
            .iter()
            .map(|s| CompletionRecord::synthetic(s.task_name.clone(), Some(s.period_type)))
            .collect()
    }

    /// Jobs that failed construction become synthetic failed rows before
    /// fan-out, so the gap stays visible in the ledger.
    async fn append_rejected(
        &self,
        jobs: &JobSet,
        sink: &dyn ResultSink,
        now: DateTime<Tz>,
        summary: &mut RunSummary,
    ) {
        if jobs.rejected.is_empty() {
            return;
        }

        let created_at = now.fixed_offset();
        let mut rows = Vec::with_capacity(jobs.rejected.len());
        let mut reports = Vec::with_capacity(jobs.rejected.len());
        for rejected in &jobs.rejected {
            let report = CountReport::failed(&rejected.job.hdfs_path, &rejected.reason);
            rows.push(AuditResultRow::from_report(&rejected.job, &report, created_at));
            reports.push(report);
        }

        match sink.append_many(&rows).await {
            Ok(()) => {
                for (rejected, report) in jobs.rejected.iter().zip(&reports) {
                    summary.record(&rejected.job, report, None);
                }
            }
            Err(err) => {
                error!(error = %err, "Failed to append rejected jobs to the ledger");
                for (rejected, report) in jobs.rejected.iter().zip(&reports) {
                    summary.record(&rejected.job, report, Some(err.to_string()));
                }
            }
        }
    }

    fn resolve_concurrency(&self, opts: &RunOptions, jobs: &JobSet) -> usize {
        let defaults = &self.parts.catalog.defaults;
        let limits = &defaults.limits;

        let requested = opts
            .concurrency
            .unwrap_or(defaults.python_concurrency)
            .max(1);
        let clamped = limits.clamp_concurrency(requested);
        let max_threads = jobs.max_jar_threads();
        let concurrency = limits.clamp_effective(clamped, max_threads);

        info!(
            concurrency,
            max_job_threads = max_threads,
            effective = concurrency * max_threads,
            "Orchestration concurrency resolved"
        );
        concurrency
    }

    fn dry_run_summary(&self, jobs: &JobSet) -> RunSummary {
        let mut summary = RunSummary {
            total: jobs.len(),
            ..RunSummary::default()
        };
        for job in &jobs.runnable {
            info!(
                table = %job.table_name,
                path = %job.hdfs_path,
                format = %job.format,
                threads = job.jar_threads,
                "[dry-run] would count"
            );
            summary.details.push(JobDetail {
                table_name: job.table_name.clone(),
                hdfs_path: job.hdfs_path.clone(),
                status: "dry_run".into(),
                row_count: None,
                error: None,
            });
        }
        for rejected in &jobs.rejected {
            warn!(
                table = %rejected.job.table_name,
                path = %rejected.job.hdfs_path,
                reason = %rejected.reason,
                "[dry-run] job would be rejected"
            );
            summary.details.push(JobDetail {
                table_name: rejected.job.table_name.clone(),
                hdfs_path: rejected.job.hdfs_path.clone(),
                status: "invalid".into(),
                row_count: None,
                error: Some(rejected.reason.clone()),
            });
        }
        summary
    }

    /// The watermark moves only for an uncancelled upstream run whose
    /// window is fully accounted for. The value saved is the window's
    /// `end`, not `now`.
    fn advance_watermark_if_due(
        &self,
        opts: &RunOptions,
        store: Option<&FileWatermarkStore>,
        window: Option<FetchWindow>,
        summary: &mut RunSummary,
    ) -> Result<(), AuditRunError> {
        let (Some(store), Some(window)) = (store, window) else {
            return Ok(());
        };
        if summary.cancelled {
            return Ok(());
        }
        if !summary.all_success() && !opts.watermark.advance_on_failure {
            info!("Run had failures; watermark not advanced");
            return Ok(());
        }

        // A fallback window (e.g. after a clock skew put the watermark in
        // the future) may end before the stored instant; never rewind.
        if let Some(current) = store.load() {
            if window.end < current.last_end_time {
                warn!(
                    stored = %current.last_end_time,
                    window_end = %window.end,
                    "Window ends before the stored watermark; not rewinding"
                );
                return Ok(());
            }
        }

        store.save(window.end)?;
        summary.watermark_advanced = true;
        info!(
            path = %store.path().display(),
            last_end_time = %window.end,
            "Watermark advanced"
        );
        Ok(())
    }

    fn watermark_store(&self, opts: &RunOptions) -> Option<FileWatermarkStore> {
        if !opts.watermark.enabled {
            return None;
        }
        opts.watermark
            .path
            .as_ref()
            .map(|path| FileWatermarkStore::new(path.clone()))
    }
}

enum Gathered {
    Records(Vec<CompletionRecord>, Option<FetchWindow>),
    /// `--watermark-init-now` on a cold start: state written, no work.
    InitializedOnly,
}
