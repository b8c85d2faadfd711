//! Per-server usage accounting
//!
//! Every successful send through an outbound server is recorded here. The
//! registry consults the rolling count to keep servers within their hourly
//! quota.

use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::types::ServerId;

/// Length of the rolling window quotas are measured over
pub const USAGE_WINDOW: Duration = Duration::from_secs(3600);

/// Rolling send counter for each server
#[derive(Debug)]
pub struct UsageTracker {
    window: Duration,
    sends: DashMap<ServerId, Arc<Mutex<VecDeque<Instant>>>>,
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::with_window(USAGE_WINDOW)
    }
}

impl UsageTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracker over a custom window
    #[must_use]
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            sends: DashMap::new(),
        }
    }

    fn entry(&self, id: &ServerId) -> Arc<Mutex<VecDeque<Instant>>> {
        self.sends
            .entry(id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }

    fn prune(window: Duration, sends: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = sends.front() {
            if now.duration_since(*oldest) >= window {
                sends.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record one send through `id`
    pub fn record(&self, id: &ServerId) {
        let entry = self.entry(id);
        let mut sends = entry.lock();
        let now = Instant::now();
        Self::prune(self.window, &mut sends, now);
        sends.push_back(now);

        tracing::trace!(server = %id, usage = sends.len(), "Recorded server usage");
    }

    /// Sends through `id` within the current window
    #[must_use]
    pub fn usage_in_window(&self, id: &ServerId) -> u32 {
        let Some(entry) = self.sends.get(id).map(|e| Arc::clone(e.value())) else {
            return 0;
        };

        let mut sends = entry.lock();
        Self::prune(self.window, &mut sends, Instant::now());
        u32::try_from(sends.len()).unwrap_or(u32::MAX)
    }

    /// Whether `id` can take another send under `quota` (`None` is unlimited)
    #[must_use]
    pub fn has_capacity(&self, id: &ServerId, quota: Option<u32>) -> bool {
        quota.is_none_or(|quota| self.usage_in_window(id) < quota)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_count() {
        let tracker = UsageTracker::new();
        let id = ServerId::from("primary");

        assert_eq!(tracker.usage_in_window(&id), 0);
        tracker.record(&id);
        tracker.record(&id);
        assert_eq!(tracker.usage_in_window(&id), 2);
        assert_eq!(tracker.usage_in_window(&ServerId::from("other")), 0);
    }

    #[test]
    fn test_quota() {
        let tracker = UsageTracker::new();
        let id = ServerId::from("primary");

        assert!(tracker.has_capacity(&id, Some(1)));
        tracker.record(&id);
        assert!(!tracker.has_capacity(&id, Some(1)));
        assert!(tracker.has_capacity(&id, Some(2)));
        assert!(tracker.has_capacity(&id, None));
        assert!(!tracker.has_capacity(&id, Some(0)));
    }

    #[test]
    fn test_window_expiry() {
        let tracker = UsageTracker::with_window(Duration::ZERO);
        let id = ServerId::from("primary");

        tracker.record(&id);
        assert_eq!(tracker.usage_in_window(&id), 0);
    }
}
