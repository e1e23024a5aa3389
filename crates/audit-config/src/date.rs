use crate::error::ConfigError;
use chrono::{DateTime, Duration, NaiveDate};
use chrono_tz::Tz;

/// Parses a `YYYYMMDD` business date.
pub fn parse_data_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d")
        .map_err(|_| ConfigError::InvalidDate(value.to_string()))
}

/// Parses an IANA timezone name, e.g. `Asia/Shanghai`.
pub fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.parse::<Tz>()
        .map_err(|_| ConfigError::UnknownTimezone(name.to_string()))
}

/// Resolves the run's business date: an explicit `--date` wins, then the
/// catalog default (`${yesterday}`, `${today}` or a literal), then
/// yesterday. All calendar math happens in the configured timezone.
pub fn resolve_data_date(
    explicit: Option<NaiveDate>,
    default_spec: Option<&str>,
    now: DateTime<Tz>,
) -> Result<NaiveDate, ConfigError> {
    if let Some(date) = explicit {
        return Ok(date);
    }

    let today = now.date_naive();
    match default_spec.unwrap_or("${yesterday}") {
        "${yesterday}" => Ok(today - Duration::days(1)),
        "${today}" => Ok(today),
        literal => parse_data_date(literal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Shanghai;

    fn now() -> DateTime<Tz> {
        Shanghai.with_ymd_and_hms(2026, 1, 17, 13, 5, 0).unwrap()
    }

    #[test]
    fn explicit_date_wins() {
        let date = resolve_data_date(
            Some(NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()),
            Some("${today}"),
            now(),
        )
        .unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 1, 10).unwrap());
    }

    #[test]
    fn default_is_yesterday_in_the_configured_timezone() {
        let date = resolve_data_date(None, None, now()).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 1, 16).unwrap());

        // 00:30 Shanghai on Jan 17 is still Jan 16 UTC; yesterday must be
        // computed from the local calendar.
        let late = Shanghai.with_ymd_and_hms(2026, 1, 17, 0, 30, 0).unwrap();
        let date = resolve_data_date(None, Some("${yesterday}"), late).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 1, 16).unwrap());
    }

    #[test]
    fn literal_default_must_be_valid() {
        let date = resolve_data_date(None, Some("20251231"), now()).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
        assert!(resolve_data_date(None, Some("2025-12-31"), now()).is_err());
    }

    #[test]
    fn timezone_names_parse() {
        assert!(parse_timezone("Asia/Shanghai").is_ok());
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
