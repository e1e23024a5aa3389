use model::report::CountReport;
use serde::Deserialize;

/// Extracts the counter's JSON report from stdout that may be interleaved
/// with log lines. Only a `{` in column 0 of a line starts a candidate
/// document; the last candidate that deserializes wins.
pub fn extract_report(stdout: &str) -> Option<CountReport> {
    let mut found = None;
    let mut offset = 0;

    for line in stdout.split_inclusive('\n') {
        if line.starts_with('{') {
            let mut de = serde_json::Deserializer::from_str(&stdout[offset..]);
            if let Ok(report) = CountReport::deserialize(&mut de) {
                found = Some(report);
            }
        }
        offset += line.len();
    }

    found
}

/// Last `max_bytes` of `text`, aligned to a character boundary.
pub fn tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::report::CountStatus;

    #[test]
    fn parses_plain_json() {
        let report = extract_report(r#"{"status": "success", "row_count": 10}"#).unwrap();
        assert_eq!(report.status, CountStatus::Success);
        assert_eq!(report.row_count, 10);
    }

    #[test]
    fn skips_log_noise_before_the_document() {
        let stdout = "\
2026-01-17 13:04:01 INFO Connecting to namenode\n\
WARN short-circuit read disabled\n\
{\n  \"status\": \"success\",\n  \"row_count\": 42,\n  \"file_count\": 3\n}\n";
        let report = extract_report(stdout).unwrap();
        assert_eq!(report.row_count, 42);
    }

    #[test]
    fn last_valid_document_wins() {
        let stdout = "\
{\"status\": \"failed\", \"row_count\": -1}\n\
retrying after transient failure\n\
{\"status\": \"success\", \"row_count\": 7}\n";
        let report = extract_report(stdout).unwrap();
        assert_eq!(report.status, CountStatus::Success);
        assert_eq!(report.row_count, 7);
    }

    #[test]
    fn indented_braces_do_not_start_a_document() {
        let stdout = "  {\"status\": \"success\"}\nno json here\n";
        assert!(extract_report(stdout).is_none());
    }

    #[test]
    fn garbage_yields_none() {
        assert!(extract_report("").is_none());
        assert!(extract_report("Exception in thread \"main\"\n\tat com...\n").is_none());
        assert!(extract_report("{not valid json\n").is_none());
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("abc", 10), "abc");
        let multibyte = "xx日本語";
        let tailed = tail(multibyte, 4);
        assert!(tailed.len() <= 4);
        assert!(multibyte.ends_with(tailed));
    }
}
