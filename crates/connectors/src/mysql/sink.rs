use crate::mysql::error::SinkError;
use async_trait::async_trait;
use audit_config::db::MySqlConfig;
use model::row::AuditResultRow;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use tracing::{debug, info};

const INSERT_AUDIT_RESULT_SQL: &str = include_str!("sql/insert_audit_result.sql");
const POOL_SIZE: u32 = 5;

/// Append-only destination for audit rows. The ledger has no unique key;
/// de-duplication is a consumer concern.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn append(&self, row: &AuditResultRow) -> Result<(), SinkError>;

    /// Batch convenience; each row remains an independent statement.
    async fn append_many(&self, rows: &[AuditResultRow]) -> Result<(), SinkError> {
        for row in rows {
            self.append(row).await?;
        }
        Ok(())
    }
}

/// Writes audit rows through a small pooled MySQL connection.
pub struct MySqlResultSink {
    pool: MySqlPool,
}

impl MySqlResultSink {
    pub async fn connect(config: &MySqlConfig) -> Result<Self, SinkError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect(&config.url())
            .await
            .map_err(SinkError::Connect)?;

        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Audit database pool initialized"
        );
        Ok(Self { pool })
    }
}

#[async_trait]
impl ResultSink for MySqlResultSink {
    async fn append(&self, row: &AuditResultRow) -> Result<(), SinkError> {
        sqlx::query(INSERT_AUDIT_RESULT_SQL)
            .bind(&row.task_name)
            .bind(&row.interface_id)
            .bind(&row.platform_id)
            .bind(&row.partner_id)
            .bind(&row.table_name)
            .bind(&row.hdfs_path)
            .bind(row.period_type.as_str())
            .bind(&row.batch_no)
            .bind(row.data_date)
            .bind(&row.data_month)
            .bind(&row.data_hour)
            .bind(row.row_count)
            .bind(row.file_count)
            .bind(row.total_size_bytes)
            .bind(row.status.as_str())
            .bind(&row.error_msg)
            .bind(row.duration_ms)
            .bind(row.created_at.naive_local())
            .execute(&self.pool)
            .await
            .map_err(SinkError::Append)?;

        debug!(
            table = %row.table_name,
            path = %row.hdfs_path,
            status = %row.status,
            rows = row.row_count,
            "Audit row appended"
        );
        Ok(())
    }
}
