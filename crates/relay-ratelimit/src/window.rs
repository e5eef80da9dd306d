//! Sliding-window arithmetic
//!
//! Two concurrent windows per identity (60 s and 3600 s). A probe
//! appends the request's timestamp to both windows, prunes entries older
//! than each window, and counts; the decision is pure arithmetic over
//! the resulting counts so it is identical for every store.

/// Minute window span in milliseconds
pub(crate) const MINUTE_WINDOW_MS: u64 = 60_000;

/// Hour window span in milliseconds
pub(crate) const HOUR_WINDOW_MS: u64 = 3_600_000;

/// Per-identity caps for the two windows
#[derive(Debug, Clone, Copy)]
pub struct WindowCaps {
    /// Requests allowed per sliding minute
    pub per_minute: u32,
    /// Requests allowed per sliding hour
    pub per_hour: u32,
}

/// Window counts after appending the probe's own timestamp
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct WindowProbe {
    /// Entries in the minute window, including this request
    pub minute_count: u32,
    /// Entries in the hour window, including this request
    pub hour_count: u32,
    /// Oldest surviving minute-window timestamp (epoch ms)
    pub minute_oldest: Option<u64>,
    /// Oldest surviving hour-window timestamp (epoch ms)
    pub hour_oldest: Option<u64>,
}

/// Admission decision for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request is admitted
    pub allowed: bool,
    /// Cap of the governing window
    pub limit: u32,
    /// Remaining budget in the governing window
    pub remaining: u32,
    /// Epoch seconds when the budget resets
    pub reset_at: u64,
    /// Seconds to wait before retrying, on denial
    pub retry_after: Option<u64>,
}

/// Seconds until the oldest entry leaves the window
fn retry_after(window_ms: u64, oldest: Option<u64>, now_ms: u64) -> u64 {
    oldest.map_or(window_ms / 1000, |oldest| {
        let elapsed = now_ms.saturating_sub(oldest);
        window_ms.saturating_sub(elapsed).div_ceil(1000).max(1)
    })
}

/// Decide admission from the two window counts
///
/// Allowed iff both counts (including this request) are within their
/// caps. On denial the governing window is the violated one; when both
/// are violated the *larger* retry-after wins, guaranteeing admission on
/// return.
pub(crate) fn decide(caps: WindowCaps, probe: WindowProbe, now_ms: u64) -> Decision {
    let now_secs = now_ms / 1000;
    let minute_over = probe.minute_count > caps.per_minute;
    let hour_over = probe.hour_count > caps.per_hour;

    if !minute_over && !hour_over {
        let remaining = (caps.per_minute - probe.minute_count).min(caps.per_hour - probe.hour_count);
        return Decision {
            allowed: true,
            limit: caps.per_minute,
            remaining,
            reset_at: now_secs + MINUTE_WINDOW_MS / 1000,
            retry_after: None,
        };
    }

    let minute_retry = minute_over.then(|| retry_after(MINUTE_WINDOW_MS, probe.minute_oldest, now_ms));
    let hour_retry = hour_over.then(|| retry_after(HOUR_WINDOW_MS, probe.hour_oldest, now_ms));

    let (limit, count, retry) = match (minute_retry, hour_retry) {
        (Some(minute), Some(hour)) if hour >= minute => (caps.per_hour, probe.hour_count, hour),
        (Some(minute), _) => (caps.per_minute, probe.minute_count, minute),
        (None, Some(hour)) => (caps.per_hour, probe.hour_count, hour),
        (None, None) => unreachable!("denial requires a violated window"),
    };

    Decision {
        allowed: false,
        limit,
        remaining: limit.saturating_sub(count),
        reset_at: now_secs + retry,
        retry_after: Some(retry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPS: WindowCaps = WindowCaps {
        per_minute: 2,
        per_hour: 10,
    };

    #[test]
    fn under_both_caps_is_allowed() {
        let probe = WindowProbe {
            minute_count: 1,
            hour_count: 1,
            minute_oldest: Some(0),
            hour_oldest: Some(0),
        };
        let decision = decide(CAPS, probe, 0);
        assert!(decision.allowed);
        assert_eq!(decision.limit, 2);
        assert_eq!(decision.remaining, 1);
        assert_eq!(decision.reset_at, 60);
    }

    #[test]
    fn remaining_reports_the_tighter_window() {
        let caps = WindowCaps {
            per_minute: 60,
            per_hour: 5,
        };
        let probe = WindowProbe {
            minute_count: 3,
            hour_count: 3,
            minute_oldest: Some(0),
            hour_oldest: Some(0),
        };
        let decision = decide(caps, probe, 0);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[test]
    fn minute_violation_computes_retry_from_oldest() {
        // Third request at t=10s against per_minute=2; oldest at t=0
        let probe = WindowProbe {
            minute_count: 3,
            hour_count: 3,
            minute_oldest: Some(0),
            hour_oldest: Some(0),
        };
        let decision = decide(CAPS, probe, 10_000);
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after, Some(50));
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at, 10 + 50);
    }

    #[test]
    fn conflicting_windows_take_the_larger_retry_after() {
        let caps = WindowCaps {
            per_minute: 1,
            per_hour: 1,
        };
        let probe = WindowProbe {
            minute_count: 2,
            hour_count: 2,
            minute_oldest: Some(0),
            hour_oldest: Some(0),
        };
        let decision = decide(caps, probe, 1_000);
        // Hour window demands the longer wait; it governs
        assert_eq!(decision.limit, 1);
        assert_eq!(decision.retry_after, Some(3600 - 1));
    }

    #[test]
    fn retry_after_is_at_least_one_second() {
        let probe = WindowProbe {
            minute_count: 3,
            hour_count: 3,
            minute_oldest: Some(0),
            hour_oldest: Some(0),
        };
        // Oldest is about to expire
        let decision = decide(CAPS, probe, 59_999);
        assert_eq!(decision.retry_after, Some(1));
    }
}
