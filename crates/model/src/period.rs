use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Temporal granularity a schedule's partitions are keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Hourly,
    Daily,
    Monthly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Hourly => "hourly",
            PeriodType::Daily => "daily",
            PeriodType::Monthly => "monthly",
        }
    }
}

impl Default for PeriodType {
    fn default() -> Self {
        PeriodType::Daily
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeriodType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(PeriodType::Hourly),
            "daily" => Ok(PeriodType::Daily),
            "monthly" => Ok(PeriodType::Monthly),
            other => Err(format!("unknown period type: {other}")),
        }
    }
}

/// Calendar month, rendered as `YYYYMM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}{:02}", self.year, self.month)
    }
}

/// Resolved business period of one audit job.
///
/// The ledger receives the flat `(data_date, data_month, data_hour)`
/// columns; the accessors below produce exactly those, `None` where the
/// field does not apply to the granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Daily(NaiveDate),
    Monthly(YearMonth),
    /// `hour` is unknown when the record carried no completion timestamp
    /// (explicit task lists, catalog-wide runs). Substitution then leaves
    /// `${data_hour}` unresolved and the job is rejected.
    Hourly { date: NaiveDate, hour: Option<u32> },
}

impl Period {
    pub fn period_type(&self) -> PeriodType {
        match self {
            Period::Daily(_) => PeriodType::Daily,
            Period::Monthly(_) => PeriodType::Monthly,
            Period::Hourly { .. } => PeriodType::Hourly,
        }
    }

    /// Business date as `YYYYMMDD`; monthly periods have none.
    pub fn data_date(&self) -> Option<String> {
        self.naive_date().map(|d| d.format("%Y%m%d").to_string())
    }

    /// Business month as `YYYYMM`, derived from the date when needed.
    pub fn data_month(&self) -> Option<String> {
        match self {
            Period::Monthly(month) => Some(month.to_string()),
            Period::Daily(date) | Period::Hourly { date, .. } => {
                Some(YearMonth::from_date(*date).to_string())
            }
        }
    }

    /// Business hour as `HH`; only hourly periods with a known hour have one.
    pub fn data_hour(&self) -> Option<String> {
        match self {
            Period::Hourly { hour: Some(h), .. } => Some(format!("{h:02}")),
            _ => None,
        }
    }

    pub fn naive_date(&self) -> Option<NaiveDate> {
        match self {
            Period::Daily(date) | Period::Hourly { date, .. } => Some(*date),
            Period::Monthly(_) => None,
        }
    }
}
