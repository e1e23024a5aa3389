use crate::clickhouse::{error::FetchError, query};
use async_trait::async_trait;
use audit_config::db::ClickHouseConfig;
use audit_core::window::FetchWindow;
use chrono::{DateTime, Utc};
use ::clickhouse::{Client, Row};
use model::completion::{dedupe_latest, CompletionRecord};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Source of completed-task records for one query window.
#[async_trait]
pub trait TaskFetcher: Send + Sync {
    /// Returns the deduplicated completion records inside `window`.
    async fn fetch(
        &self,
        window: &FetchWindow,
        data_date: &str,
    ) -> Result<Vec<CompletionRecord>, FetchError>;
}

#[derive(Debug, Row, Deserialize)]
struct TaskInstanceRow {
    task_name: String,
    period_type: String,
    batch_no: String,
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    complete_dt: DateTime<Utc>,
}

/// Pulls completions from the scheduler's ClickHouse log, trying each
/// configured host in order and falling over on connection-level errors.
pub struct ClickHouseTaskFetcher {
    hosts: Vec<String>,
    port: u16,
    database: String,
    user: String,
    password: String,
    template: String,
}

impl ClickHouseTaskFetcher {
    pub fn new(config: &ClickHouseConfig) -> Self {
        Self {
            hosts: config.hosts.clone(),
            port: config.port,
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            template: config
                .query_template
                .clone()
                .unwrap_or_else(|| query::DEFAULT_QUERY_TEMPLATE.to_string()),
        }
    }

    fn client_for(&self, host: &str) -> Client {
        Client::default()
            .with_url(format!("http://{host}:{}", self.port))
            .with_database(&self.database)
            .with_user(&self.user)
            .with_password(&self.password)
    }

    /// Connection-level errors are worth trying another host for; server
    /// responses (bad SQL, auth) are not.
    fn is_connection_error(err: &clickhouse::error::Error) -> bool {
        matches!(
            err,
            clickhouse::error::Error::Network(_) | clickhouse::error::Error::TimedOut
        )
    }
}

#[async_trait]
impl TaskFetcher for ClickHouseTaskFetcher {
    async fn fetch(
        &self,
        window: &FetchWindow,
        data_date: &str,
    ) -> Result<Vec<CompletionRecord>, FetchError> {
        if self.hosts.is_empty() {
            return Err(FetchError::NoHosts);
        }

        let sql = query::render_query(&self.template, window.start, window.end, data_date);
        debug!(query = %sql, "Executing completion query");

        let mut last_err = None;
        for host in &self.hosts {
            match self
                .client_for(host)
                .query(&sql)
                .fetch_all::<TaskInstanceRow>()
                .await
            {
                Ok(rows) => {
                    info!(host = %host, rows = rows.len(), "Fetched completed tasks");
                    let records = rows.into_iter().map(record_from_row).collect();
                    return Ok(dedupe_latest(records));
                }
                Err(err) if Self::is_connection_error(&err) => {
                    warn!(host = %host, error = %err, "ClickHouse host unreachable, trying next");
                    last_err = Some(err);
                }
                Err(err) => return Err(FetchError::Query(err)),
            }
        }

        Err(FetchError::AllHostsFailed {
            hosts: self.hosts.join(","),
            source: last_err.unwrap_or(clickhouse::error::Error::TimedOut),
        })
    }
}

fn record_from_row(row: TaskInstanceRow) -> CompletionRecord {
    let period_type = match row.period_type.trim() {
        "" => None,
        raw => match raw.parse() {
            Ok(period) => Some(period),
            Err(_) => {
                warn!(
                    task = %row.task_name,
                    period = %raw,
                    "Unknown period type in completion log"
                );
                None
            }
        },
    };

    CompletionRecord {
        task_name: row.task_name,
        period_type,
        batch_no: row.batch_no,
        complete_dt: Some(row.complete_dt),
    }
}
