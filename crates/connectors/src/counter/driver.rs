use crate::counter::parse;
use async_trait::async_trait;
use model::{
    job::{AuditJob, FileFormat},
    report::{CountReport, CountStatus},
};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Hard cap on captured subprocess output; excess is drained and dropped
/// so the child never blocks on a full pipe.
const CAPTURE_CAP_BYTES: usize = 8 * 1024 * 1024;
/// Stderr tail attached to synthesized failure reports.
const STDERR_TAIL_BYTES: usize = 4096;
/// Literal handed to the counter for textfile tables with no override.
const DEFAULT_DELIMITER: &str = "\\n";

/// Measures one audit job and returns a normalized report.
///
/// Failures are reports, not errors: a job that cannot be counted still
/// produces a ledger row.
#[async_trait]
pub trait JobCounter: Send + Sync {
    async fn count(&self, job: &AuditJob, cancel: &CancellationToken) -> CountReport;
}

/// Drives the external row-counter process, one invocation per job.
pub struct CounterDriver {
    java_cmd: PathBuf,
    jar_path: PathBuf,
    hadoop_conf_dir: Option<PathBuf>,
    /// Wall-clock limit per invocation; `None` = unbounded.
    timeout: Option<Duration>,
}

impl CounterDriver {
    pub fn new(
        jar_path: PathBuf,
        java_home: Option<&Path>,
        hadoop_conf_dir: Option<PathBuf>,
        timeout: Option<Duration>,
    ) -> Self {
        let java_cmd = match java_home {
            Some(home) => home.join("bin").join("java"),
            None => PathBuf::from("java"),
        };
        Self {
            java_cmd,
            jar_path,
            hadoop_conf_dir,
            timeout,
        }
    }

    fn command_for(&self, job: &AuditJob) -> Command {
        let mut cmd = Command::new(&self.java_cmd);
        cmd.arg("-jar")
            .arg(&self.jar_path)
            .arg("--path")
            .arg(&job.hdfs_path)
            .arg("--format")
            .arg(job.format.as_str())
            .arg("--threads")
            .arg(job.jar_threads.to_string());

        if job.format == FileFormat::Textfile {
            cmd.arg("--delimiter")
                .arg(job.delimiter.as_deref().unwrap_or(DEFAULT_DELIMITER));
        }
        if let Some(dir) = &self.hadoop_conf_dir {
            cmd.arg("--hadoop-conf").arg(dir);
            cmd.env("HADOOP_CONF_DIR", dir);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

#[async_trait]
impl JobCounter for CounterDriver {
    async fn count(&self, job: &AuditJob, cancel: &CancellationToken) -> CountReport {
        info!(
            table = %job.table_name,
            path = %job.hdfs_path,
            format = %job.format,
            threads = job.jar_threads,
            "Launching counter"
        );

        let mut child = match self.command_for(job).spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(java = %self.java_cmd.display(), error = %err, "Failed to spawn counter");
                return CountReport::failed(
                    &job.hdfs_path,
                    format!("failed to spawn counter: {err}"),
                );
            }
        };

        let stdout_task = tokio::spawn(read_capped(child.stdout.take(), CAPTURE_CAP_BYTES));
        let stderr_task = tokio::spawn(read_capped(child.stderr.take(), CAPTURE_CAP_BYTES));

        let wait = tokio::select! {
            wait = child.wait() => wait,
            _ = cancel.cancelled() => {
                warn!(table = %job.table_name, "Cancellation requested, killing counter process group");
                kill_process_group(&mut child).await;
                return CountReport::failed(&job.hdfs_path, "cancelled");
            }
            _ = sleep_or_forever(self.timeout) => {
                let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                error!(table = %job.table_name, timeout_s = secs, "Counter timed out, killing process group");
                kill_process_group(&mut child).await;
                return CountReport::failed(&job.hdfs_path, format!("timeout after {secs}s"));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        let status = match wait {
            Ok(status) => status,
            Err(err) => {
                error!(table = %job.table_name, error = %err, "Failed to await counter");
                return CountReport::failed(
                    &job.hdfs_path,
                    format!("failed to await counter: {err}"),
                );
            }
        };
        if !stderr.is_empty() {
            debug!(
                table = %job.table_name,
                stderr = %parse::tail(&stderr, STDERR_TAIL_BYTES),
                "Counter stderr"
            );
        }

        match parse::extract_report(&stdout) {
            Some(report) => {
                // Exit codes are advisory; the JSON status is authoritative.
                let advisory = status_from_exit(status.code());
                if advisory != report.status {
                    warn!(
                        table = %job.table_name,
                        exit = ?status.code(),
                        json_status = %report.status,
                        "Counter exit code disagrees with JSON status, trusting JSON"
                    );
                }
                info!(
                    table = %job.table_name,
                    rows = report.row_count,
                    files = report.file_count,
                    status = %report.status,
                    "Counter finished"
                );
                report
            }
            None => {
                let mut message = if stdout.is_empty() {
                    format!("no output from counter, exit code {:?}", status.code())
                } else {
                    format!("invalid counter output, exit code {:?}", status.code())
                };
                if !stderr.is_empty() {
                    message.push_str("; stderr: ");
                    message.push_str(parse::tail(&stderr, STDERR_TAIL_BYTES));
                }
                error!(table = %job.table_name, exit = ?status.code(), "Counter produced no parsable report");
                CountReport::failed(&job.hdfs_path, message)
            }
        }
    }
}

/// 0 => success, 2 => partial, anything else => failed.
fn status_from_exit(code: Option<i32>) -> CountStatus {
    match code {
        Some(0) => CountStatus::Success,
        Some(2) => CountStatus::Partial,
        _ => CountStatus::Failed,
    }
}

async fn sleep_or_forever(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// Reads a pipe to EOF, keeping at most `cap` bytes.
async fn read_capped<R>(reader: Option<R>, cap: usize) -> String
where
    R: AsyncRead + Unpin + Send,
{
    let Some(mut reader) = reader else {
        return String::new();
    };

    let mut captured = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if captured.len() < cap {
                    let take = n.min(cap - captured.len());
                    captured.extend_from_slice(&chunk[..take]);
                }
            }
        }
    }
    String::from_utf8_lossy(&captured).into_owned()
}

/// The child runs in its own process group (`process_group(0)`), so the
/// group id equals the child pid and a group kill reaps any helpers the
/// JVM forked.
async fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match child.id() {
            Some(pid) => {
                if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                    warn!(error = %err, "killpg failed, killing child directly");
                    let _ = child.kill().await;
                }
            }
            None => {
                let _ = child.kill().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill().await;
    }
    let _ = child.wait().await;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use model::period::Period;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Stand-in "java home" whose `bin/java` is a shell script.
    fn fake_java(script: &str) -> TempDir {
        let home = TempDir::new().unwrap();
        let bin = home.path().join("bin");
        fs::create_dir_all(&bin).unwrap();
        let java = bin.join("java");
        fs::write(&java, format!("#!/bin/sh\n{script}\n")).unwrap();
        fs::set_permissions(&java, fs::Permissions::from_mode(0o755)).unwrap();
        home
    }

    fn driver(home: &TempDir, timeout: Option<Duration>) -> CounterDriver {
        CounterDriver::new(
            PathBuf::from("/opt/audit/hdfs-counter.jar"),
            Some(home.path()),
            None,
            timeout,
        )
    }

    fn job() -> AuditJob {
        AuditJob {
            task_name: "dw_user_daily".into(),
            interface_id: "1001".into(),
            platform_id: "P01".into(),
            partner_id: "PT001".into(),
            table_name: "dw.user_daily".into(),
            hdfs_path: "/warehouse/dw/user_daily/dt=20260116".into(),
            format: FileFormat::Orc,
            delimiter: None,
            period: Period::Daily(NaiveDate::from_ymd_opt(2026, 1, 16).unwrap()),
            batch_no: "20260116".into(),
            jar_threads: 4,
        }
    }

    #[tokio::test]
    async fn parses_report_behind_log_noise() {
        let home = fake_java(
            r#"echo "INFO starting up"
echo '{"status": "success", "row_count": 99, "file_count": 2}'"#,
        );
        let report = driver(&home, None)
            .count(&job(), &CancellationToken::new())
            .await;
        assert_eq!(report.status, CountStatus::Success);
        assert_eq!(report.row_count, 99);
    }

    #[tokio::test]
    async fn garbage_output_synthesizes_failure_with_stderr_tail() {
        let home = fake_java(
            r#"echo "not json at all"
echo "namenode connection refused" >&2
exit 1"#,
        );
        let report = driver(&home, None)
            .count(&job(), &CancellationToken::new())
            .await;
        assert_eq!(report.status, CountStatus::Failed);
        assert_eq!(report.row_count, -1);
        let msg = &report.errors[0].message;
        assert!(msg.contains("invalid counter output"));
        assert!(msg.contains("namenode connection refused"));
    }

    #[tokio::test]
    async fn timeout_kills_the_process() {
        let home = fake_java("sleep 30");
        let started = std::time::Instant::now();
        let report = driver(&home, Some(Duration::from_millis(200)))
            .count(&job(), &CancellationToken::new())
            .await;
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(report.status, CountStatus::Failed);
        assert!(report.errors[0].message.contains("timeout"));
    }

    #[tokio::test]
    async fn cancellation_kills_the_process() {
        let home = fake_java("sleep 30");
        let cancel = CancellationToken::new();
        let counter = driver(&home, None);
        let handle = {
            let cancel = cancel.clone();
            async move { counter.count(&job(), &cancel).await }
        };
        cancel.cancel();
        let report = handle.await;
        assert_eq!(report.status, CountStatus::Failed);
        assert!(report.errors[0].message.contains("cancelled"));
    }

    #[tokio::test]
    async fn json_status_overrides_exit_code() {
        // Exit 0 but the JSON says partial; the JSON wins.
        let home = fake_java(r#"echo '{"status": "partial", "row_count": 50}'"#);
        let report = driver(&home, None)
            .count(&job(), &CancellationToken::new())
            .await;
        assert_eq!(report.status, CountStatus::Partial);
    }

    #[test]
    fn exit_code_mapping_is_advisory() {
        assert_eq!(status_from_exit(Some(0)), CountStatus::Success);
        assert_eq!(status_from_exit(Some(2)), CountStatus::Partial);
        assert_eq!(status_from_exit(Some(1)), CountStatus::Failed);
        assert_eq!(status_from_exit(None), CountStatus::Failed);
    }
}
