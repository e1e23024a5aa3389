use chrono::Utc;
use chrono_tz::Tz;
use connectors::{counter::driver::JobCounter, mysql::sink::ResultSink};
use futures::{future, stream, StreamExt};
use model::{job::AuditJob, report::CountReport, row::AuditResultRow};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// One job's terminal state: its report plus any ledger write failure.
pub(crate) struct JobOutcome {
    pub job: AuditJob,
    pub report: CountReport,
    pub sink_error: Option<String>,
}

/// Fans jobs out with at most `concurrency` counters in flight and
/// appends each result as it completes, so the ledger reflects arrival
/// order. Jobs not yet dispatched when cancellation fires are dropped;
/// in-flight counters terminate their subprocess and report failure.
pub(crate) async fn run_jobs(
    jobs: Vec<AuditJob>,
    counter: Arc<dyn JobCounter>,
    sink: Arc<dyn ResultSink>,
    concurrency: usize,
    tz: Tz,
    cancel: CancellationToken,
) -> Vec<JobOutcome> {
    let total = jobs.len();
    let dispatch_gate = cancel.clone();
    let mut completed = 0usize;
    let mut outcomes = Vec::with_capacity(total);

    let mut results = stream::iter(jobs)
        .filter(move |_| future::ready(!dispatch_gate.is_cancelled()))
        .map(|job| {
            let counter = counter.clone();
            let cancel = cancel.clone();
            async move {
                let report = counter.count(&job, &cancel).await;
                (job, report)
            }
        })
        .buffer_unordered(concurrency.max(1));

    while let Some((job, report)) = results.next().await {
        completed += 1;
        info!(
            done = completed,
            total,
            table = %job.table_name,
            status = %report.status,
            "Job completed"
        );

        let row = AuditResultRow::from_report(
            &job,
            &report,
            Utc::now().with_timezone(&tz).fixed_offset(),
        );
        let sink_error = match sink.append(&row).await {
            Ok(()) => None,
            Err(err) => {
                error!(table = %job.table_name, error = %err, "Failed to append audit row");
                Some(err.to_string())
            }
        };

        outcomes.push(JobOutcome {
            job,
            report,
            sink_error,
        });
    }

    outcomes
}
