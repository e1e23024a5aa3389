use crate::error::ConfigError;
use model::{job::FileFormat, period::PeriodType};
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// The audit catalog: which production tasks map to which HDFS locations.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditCatalog {
    #[serde(default)]
    pub defaults: Defaults,
    pub schedules: Vec<ScheduleEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Defaults {
    /// Default business date spec: `${yesterday}`, `${today}` or a literal
    /// `YYYYMMDD`.
    #[serde(default)]
    pub data_date: Option<String>,
    /// How many counter processes run in parallel.
    #[serde(default = "default_concurrency")]
    pub python_concurrency: usize,
    #[serde(default)]
    pub jar_options: JarOptions,
    #[serde(default)]
    pub limits: Limits,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            data_date: None,
            python_concurrency: default_concurrency(),
            jar_options: JarOptions::default(),
            limits: Limits::default(),
        }
    }
}

fn default_concurrency() -> usize {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct JarOptions {
    /// Threads inside one counter subprocess.
    #[serde(default = "default_jar_threads")]
    pub threads: usize,
    /// Wall-clock limit per counter invocation, seconds. `0` disables it.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for JarOptions {
    fn default() -> Self {
        Self {
            threads: default_jar_threads(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_jar_threads() -> usize {
    10
}

fn default_timeout_seconds() -> u64 {
    3600
}

/// Safety ceilings so a misconfigured catalog cannot overload the cluster.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Limits {
    #[serde(default)]
    pub max_python_concurrency: Option<usize>,
    #[serde(default)]
    pub max_jar_threads: Option<usize>,
    /// Upper bound on `concurrency * jar_threads`.
    #[serde(default)]
    pub max_effective_parallelism: Option<usize>,
}

impl Limits {
    pub fn clamp_concurrency(&self, concurrency: usize) -> usize {
        match self.max_python_concurrency {
            Some(max) if max > 0 && concurrency > max => {
                warn!(
                    requested = concurrency,
                    max, "Concurrency exceeds max_python_concurrency, clamping"
                );
                max
            }
            _ => concurrency,
        }
    }

    pub fn clamp_jar_threads(&self, threads: usize) -> usize {
        match self.max_jar_threads {
            Some(max) if max > 0 && threads > max => {
                warn!(
                    requested = threads,
                    max, "Jar threads exceed max_jar_threads, clamping"
                );
                max
            }
            _ => threads,
        }
    }

    /// Reduces concurrency (never threads) until `concurrency * threads`
    /// fits under `max_effective_parallelism`.
    pub fn clamp_effective(&self, concurrency: usize, jar_threads: usize) -> usize {
        let Some(max_eff) = self.max_effective_parallelism.filter(|m| *m > 0) else {
            return concurrency;
        };

        let threads = jar_threads.max(1);
        if concurrency * threads <= max_eff {
            return concurrency;
        }

        let clamped = (max_eff / threads).max(1);
        warn!(
            concurrency,
            jar_threads = threads,
            effective = concurrency * threads,
            max_effective = max_eff,
            clamped,
            "Effective parallelism exceeds cap, clamping concurrency"
        );
        clamped
    }
}

/// One production task and the physical tables it writes.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleEntry {
    pub task_name: String,
    #[serde(default, deserialize_with = "stringy")]
    pub interface_id: String,
    #[serde(default, deserialize_with = "stringy")]
    pub platform_id: String,
    #[serde(default, deserialize_with = "stringy")]
    pub partner_id: String,
    #[serde(default)]
    pub period_type: PeriodType,
    pub tables: Vec<TableSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableSpec {
    /// Logical `db.table` name.
    pub name: String,
    pub hdfs_path: String,
    pub format: FileFormat,
    /// Partition suffix template, e.g. `dt=${data_date}/hr=${data_hour}`.
    /// Absent for unpartitioned tables.
    #[serde(default)]
    pub partition_template: Option<String>,
    /// Per-table thread override.
    #[serde(default)]
    pub threads: Option<usize>,
    /// Line delimiter for textfile tables.
    #[serde(default)]
    pub delimiter: Option<String>,
}

impl AuditCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let catalog: AuditCatalog =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        catalog.validate()?;

        info!(
            path = %path.display(),
            schedules = catalog.schedules.len(),
            "Loaded audit catalog"
        );
        Ok(catalog)
    }

    pub fn by_task(&self, task_name: &str) -> Option<&ScheduleEntry> {
        self.schedules.iter().find(|s| s.task_name == task_name)
    }

    pub fn task_names(&self) -> Vec<String> {
        self.schedules.iter().map(|s| s.task_name.clone()).collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.schedules.is_empty() {
            return Err(ConfigError::Invalid(
                "catalog must contain at least one schedule".into(),
            ));
        }

        for schedule in &self.schedules {
            if schedule.task_name.is_empty() {
                return Err(ConfigError::Invalid(
                    "schedule with empty task_name".into(),
                ));
            }
            if schedule.tables.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "schedule '{}' has no tables",
                    schedule.task_name
                )));
            }
            for table in &schedule.tables {
                if let Some(template) = &table.partition_template {
                    validate_template_alignment(
                        schedule.period_type,
                        template,
                        &schedule.task_name,
                        &table.name,
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// A partition template must only reference placeholders its period can
/// resolve, otherwise every job built from it would be rejected.
fn validate_template_alignment(
    period: PeriodType,
    template: &str,
    task: &str,
    table: &str,
) -> Result<(), ConfigError> {
    let has_date = template.contains("${data_date}");
    let has_hour = template.contains("${data_hour}");

    let offending = match period {
        PeriodType::Daily if has_hour => Some("${data_hour}"),
        PeriodType::Monthly if has_date => Some("${data_date}"),
        PeriodType::Monthly if has_hour => Some("${data_hour}"),
        _ => None,
    };

    match offending {
        Some(placeholder) => Err(ConfigError::Invalid(format!(
            "schedule '{task}' table '{table}': {period} period cannot resolve {placeholder}"
        ))),
        None => Ok(()),
    }
}

/// Accepts both quoted and bare scalars for id fields (`partner_id: 1001`).
fn stringy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(text) => text,
        Raw::Number(number) => number.to_string(),
    })
}
