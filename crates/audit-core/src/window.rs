use crate::watermark::Watermark;
use chrono::{DateTime, Duration, FixedOffset};

/// How the fetch window's lower bound was derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOrigin {
    Watermark,
    Lookback,
}

/// Half-open query window `[start, end)` against the completion log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub origin: WindowOrigin,
}

#[derive(Debug, Clone, Copy)]
pub struct WindowOptions {
    /// Rescan overlap subtracted from the stored watermark, tolerating
    /// upstream ingestion latency.
    pub overlap: Duration,
    /// Cap on a single run's window during catch-up. `None` = unlimited.
    pub max_window: Option<Duration>,
    /// Window size for cold starts and disabled watermarks.
    pub fallback_lookback: Duration,
}

impl Default for WindowOptions {
    fn default() -> Self {
        Self {
            overlap: Duration::seconds(600),
            max_window: Some(Duration::hours(24)),
            fallback_lookback: Duration::hours(24),
        }
    }
}

/// Plans the next query window.
///
/// With a watermark the lower bound rescans `overlap` behind the stored
/// instant and the upper bound is capped at `start + max_window`, so an
/// outage is caught up one bounded window at a time. Without one the
/// window is a fixed lookback ending at `now`. A watermark ahead of `now`
/// falls back to the lookback window.
pub fn plan_window(
    now: DateTime<FixedOffset>,
    watermark: Option<&Watermark>,
    opts: &WindowOptions,
) -> FetchWindow {
    let mut end = now;
    let (mut start, mut origin) = match watermark {
        Some(wm) => {
            let raw_start = wm.last_end_time - opts.overlap;
            if let Some(max) = opts.max_window {
                if end - raw_start > max {
                    end = raw_start + max;
                }
            }
            (raw_start, WindowOrigin::Watermark)
        }
        None => (now - opts.fallback_lookback, WindowOrigin::Lookback),
    };

    if start >= end {
        end = now;
        start = now - opts.fallback_lookback;
        origin = WindowOrigin::Lookback;
    }

    FetchWindow { start, end, origin }
}
