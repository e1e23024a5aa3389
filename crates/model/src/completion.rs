use crate::period::PeriodType;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// An upstream scheduler's report that a named task instance finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRecord {
    pub task_name: String,
    /// `None` for synthetic records built from the catalog or an explicit
    /// task list, where the upstream granularity is unknown.
    pub period_type: Option<PeriodType>,
    /// Opaque batch identifier from the scheduler; empty for synthetic
    /// records.
    pub batch_no: String,
    pub complete_dt: Option<DateTime<Utc>>,
}

impl CompletionRecord {
    /// Record standing in for an upstream completion when the completion
    /// log was not consulted.
    pub fn synthetic(task_name: impl Into<String>, period_type: Option<PeriodType>) -> Self {
        Self {
            task_name: task_name.into(),
            period_type,
            batch_no: String::new(),
            complete_dt: None,
        }
    }
}

/// Collapses duplicates on `(task_name, period_type, batch_no)`, keeping
/// the record with the latest completion timestamp. Output order is stable
/// across runs: task name, then batch number.
pub fn dedupe_latest(records: Vec<CompletionRecord>) -> Vec<CompletionRecord> {
    let mut by_key: HashMap<(String, Option<PeriodType>, String), CompletionRecord> =
        HashMap::with_capacity(records.len());

    for record in records {
        let key = (
            record.task_name.clone(),
            record.period_type,
            record.batch_no.clone(),
        );
        match by_key.get(&key) {
            Some(kept) if kept.complete_dt >= record.complete_dt => {}
            _ => {
                by_key.insert(key, record);
            }
        }
    }

    let mut deduped: Vec<_> = by_key.into_values().collect();
    deduped.sort_by(|a, b| {
        a.task_name
            .cmp(&b.task_name)
            .then_with(|| a.batch_no.cmp(&b.batch_no))
    });
    deduped
}
