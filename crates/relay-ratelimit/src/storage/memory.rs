//! In-memory sliding-window store
//!
//! One pair of timestamp deques per identity, sharded by the concurrent
//! map. Pruning is opportunistic on every probe; memory per identity is
//! bounded by the hour cap because denied probes roll their timestamp
//! back.

use std::collections::VecDeque;

use dashmap::DashMap;

use crate::window::{HOUR_WINDOW_MS, MINUTE_WINDOW_MS, WindowProbe};

#[derive(Debug, Default)]
struct IdentityWindows {
    minute: VecDeque<u64>,
    hour: VecDeque<u64>,
}

/// Per-process sliding-window store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, IdentityWindows>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `now_ms` to both windows, prune, and count
    pub(crate) fn record(&self, identity: &str, now_ms: u64) -> WindowProbe {
        let mut windows = self.entries.entry(identity.to_owned()).or_default();

        prune(&mut windows.minute, now_ms, MINUTE_WINDOW_MS);
        prune(&mut windows.hour, now_ms, HOUR_WINDOW_MS);
        windows.minute.push_back(now_ms);
        windows.hour.push_back(now_ms);

        WindowProbe {
            minute_count: u32::try_from(windows.minute.len()).unwrap_or(u32::MAX),
            hour_count: u32::try_from(windows.hour.len()).unwrap_or(u32::MAX),
            minute_oldest: windows.minute.front().copied(),
            hour_oldest: windows.hour.front().copied(),
        }
    }

    /// Remove the timestamp a denied probe provisionally appended
    pub(crate) fn rollback(&self, identity: &str, now_ms: u64) {
        if let Some(mut windows) = self.entries.get_mut(identity) {
            remove_last(&mut windows.minute, now_ms);
            remove_last(&mut windows.hour, now_ms);
        }
    }
}

/// Drop entries that have left the window (strictly older than the cutoff)
fn prune(window: &mut VecDeque<u64>, now_ms: u64, span_ms: u64) {
    let cutoff = now_ms.saturating_sub(span_ms);
    while window.front().is_some_and(|&ts| ts <= cutoff) {
        window.pop_front();
    }
}

fn remove_last(window: &mut VecDeque<u64>, value: u64) {
    if let Some(pos) = window.iter().rposition(|&ts| ts == value) {
        window.remove(pos);
    }
}
