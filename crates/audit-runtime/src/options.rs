use audit_core::window::WindowOptions;
use chrono::{Duration, NaiveDate};
use std::path::PathBuf;

/// How the run decides which tasks to audit. Priority is fixed: an
/// explicit task list beats skip-upstream beats the completion log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// `--tasks`: audit the named tasks verbatim, no upstream query.
    ExplicitTasks(Vec<String>),
    /// `--skip-clickhouse`: audit every catalog entry.
    SkipUpstream,
    /// Default: pull completions from the scheduler log.
    Upstream,
}

#[derive(Debug, Clone)]
pub struct WatermarkOptions {
    pub enabled: bool,
    /// State file; watermarking is inert without one.
    pub path: Option<PathBuf>,
    pub overlap_seconds: u64,
    /// `<= 0` disables the catch-up cap.
    pub max_window_hours: f64,
    /// Cold start: write `now` and exit with zero work.
    pub init_now: bool,
    /// Delete the state file before the run.
    pub reset: bool,
    /// Advance even when jobs failed. Strongly discouraged.
    pub advance_on_failure: bool,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
            overlap_seconds: 600,
            max_window_hours: 24.0,
            init_now: false,
            reset: false,
            advance_on_failure: false,
        }
    }
}

impl WatermarkOptions {
    pub fn window_options(&self, lookback_hours: f64) -> WindowOptions {
        WindowOptions {
            overlap: Duration::seconds(self.overlap_seconds as i64),
            max_window: (self.max_window_hours > 0.0)
                .then(|| duration_from_hours(self.max_window_hours)),
            fallback_lookback: duration_from_hours(lookback_hours),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: RunMode,
    /// Explicit `--date` override; `None` resolves from the catalog
    /// defaults (usually yesterday).
    pub data_date: Option<NaiveDate>,
    pub dry_run: bool,
    /// `--concurrency` override, still clamped by the catalog limits.
    pub concurrency: Option<usize>,
    /// Cold-start lookback; fractional hours are allowed.
    pub lookback_hours: f64,
    pub watermark: WatermarkOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Upstream,
            data_date: None,
            dry_run: false,
            concurrency: None,
            lookback_hours: 24.0,
            watermark: WatermarkOptions::default(),
        }
    }
}

/// Sub-second precision is irrelevant here; whole seconds are plenty for
/// window math.
fn duration_from_hours(hours: f64) -> Duration {
    Duration::seconds((hours * 3600.0) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fractional_hours_convert_to_seconds() {
        let opts = WatermarkOptions::default();
        let window = opts.window_options(0.5);
        assert_eq!(window.fallback_lookback, Duration::seconds(1800));
        assert_eq!(window.overlap, Duration::seconds(600));
        assert_eq!(window.max_window, Some(Duration::hours(24)));
    }

    #[test]
    fn non_positive_max_window_disables_the_cap() {
        let opts = WatermarkOptions {
            max_window_hours: 0.0,
            ..WatermarkOptions::default()
        };
        assert_eq!(opts.window_options(24.0).max_window, None);

        let opts = WatermarkOptions {
            max_window_hours: -1.0,
            ..WatermarkOptions::default()
        };
        assert_eq!(opts.window_options(24.0).max_window, None);
    }
}
