use chrono::{DateTime, FixedOffset};

/// Default completion query; sites override it per scheduler schema via
/// `clickhouse.query_template`.
pub const DEFAULT_QUERY_TEMPLATE: &str = "\
SELECT task_name, period_type, batch_no, end_time AS complete_dt
FROM task_instance
WHERE status = 'SUCCESS'
  AND end_time >= toDateTime('{start_time}')
  AND end_time < toDateTime('{end_time}')";

/// Fills `{start_time}`, `{end_time}` and `{data_date}` into the
/// template. Instants are rendered with the window's own offset, i.e. the
/// configured scheduler timezone.
pub fn render_query(
    template: &str,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    data_date: &str,
) -> String {
    template
        .replace("{start_time}", &format_instant(start))
        .replace("{end_time}", &format_instant(end))
        .replace("{data_date}", data_date)
}

fn format_instant(ts: DateTime<FixedOffset>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, 17, h, m, 0)
            .unwrap()
    }

    #[test]
    fn renders_the_default_template() {
        let sql = render_query(DEFAULT_QUERY_TEMPLATE, at(11, 50), at(13, 5), "20260116");
        assert!(sql.contains("end_time >= toDateTime('2026-01-17 11:50:00')"));
        assert!(sql.contains("end_time < toDateTime('2026-01-17 13:05:00')"));
        assert!(!sql.contains('{'));
    }

    #[test]
    fn renders_a_data_date_filter() {
        let template = "SELECT 1 WHERE batch_no = '{data_date}' \
                        AND end_time >= '{start_time}' AND end_time < '{end_time}'";
        let sql = render_query(template, at(0, 0), at(1, 0), "20260116");
        assert!(sql.contains("batch_no = '20260116'"));
    }

    #[test]
    fn times_keep_the_window_offset() {
        // The window carries +08:00; the rendered wall-clock must match it.
        let start = at(0, 10);
        assert_eq!(format_instant(start), "2026-01-17 00:10:00");
    }
}
