//! Quota Tracking
//!
//! Two independent fixed windows, one second and one UTC day, each with its
//! own counter. Windows roll lazily: every query first calls
//! [`QuotaTracker::refresh_windows`] with the current time, there is no
//! background tick.

use serde::{Deserialize, Serialize};

/// Length of the short window
pub const SECOND_MS: u64 = 1_000;

/// Length of the long window
pub const DAY_MS: u64 = 86_400_000;

/// Window indices at the moment a request was counted
///
/// Lets a reservation be undone only while it still belongs to the
/// current windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowMarks {
    /// Epoch second
    pub second: u64,
    /// Epoch day
    pub day: u64,
}

impl WindowMarks {
    pub fn at(now_ms: u64) -> Self {
        Self {
            second: now_ms / SECOND_MS,
            day: now_ms / DAY_MS,
        }
    }
}

/// Per-second and per-day counters against optional limits
///
/// A `None` limit never constrains capacity.
#[derive(Debug, Clone)]
pub struct QuotaTracker {
    second_limit: Option<u32>,
    day_limit: Option<u32>,
    requests_this_second: u32,
    second_window_start: u64,
    requests_this_day: u32,
    day_window_start: u64,
}

impl QuotaTracker {
    /// Create a tracker with both windows starting at `now_ms`
    pub fn new(second_limit: Option<u32>, day_limit: Option<u32>, now_ms: u64) -> Self {
        let marks = WindowMarks::at(now_ms);
        Self {
            second_limit,
            day_limit,
            requests_this_second: 0,
            second_window_start: marks.second,
            requests_this_day: 0,
            day_window_start: marks.day,
        }
    }

    /// Roll either window forward if `now_ms` falls in a later bucket
    ///
    /// Markers never move backwards, so a clock that steps back keeps the
    /// current counts. Returns true if any counter was reset.
    pub fn refresh_windows(&mut self, now_ms: u64) -> bool {
        let marks = WindowMarks::at(now_ms);
        let mut reset = false;

        if marks.second > self.second_window_start {
            self.second_window_start = marks.second;
            self.requests_this_second = 0;
            reset = true;
        }

        if marks.day > self.day_window_start {
            self.day_window_start = marks.day;
            self.requests_this_day = 0;
            reset = true;
        }

        reset
    }

    /// True if one more request fits in both windows
    pub fn has_capacity(&self) -> bool {
        !self.second_exhausted() && !self.day_exhausted()
    }

    fn second_exhausted(&self) -> bool {
        matches!(self.second_limit, Some(limit) if self.requests_this_second >= limit)
    }

    fn day_exhausted(&self) -> bool {
        matches!(self.day_limit, Some(limit) if self.requests_this_day >= limit)
    }

    /// Milliseconds until an admission can succeed
    ///
    /// An exhausted day quota is the binding constraint even if the second
    /// quota is also exhausted.
    pub fn time_until_next_slot(&self, now_ms: u64) -> u64 {
        if self.day_exhausted() {
            self.next_day_boundary_ms().saturating_sub(now_ms)
        } else if self.second_exhausted() {
            self.next_second_boundary_ms().saturating_sub(now_ms)
        } else {
            0
        }
    }

    /// Epoch ms of the start of the next second window
    pub fn next_second_boundary_ms(&self) -> u64 {
        (self.second_window_start + 1) * SECOND_MS
    }

    /// Epoch ms of the start of the next day window
    pub fn next_day_boundary_ms(&self) -> u64 {
        (self.day_window_start + 1) * DAY_MS
    }

    /// The nearer of the two window boundaries
    pub fn next_reset_timestamp(&self) -> u64 {
        self.next_second_boundary_ms()
            .min(self.next_day_boundary_ms())
    }

    /// Admissions left before either window blocks; `None` if both are unbounded
    pub fn remaining(&self) -> Option<u32> {
        let second = self
            .second_limit
            .map(|limit| limit.saturating_sub(self.requests_this_second));
        let day = self
            .day_limit
            .map(|limit| limit.saturating_sub(self.requests_this_day));

        match (second, day) {
            (Some(s), Some(d)) => Some(s.min(d)),
            (Some(s), None) => Some(s),
            (None, Some(d)) => Some(d),
            (None, None) => None,
        }
    }

    /// Count one request in both windows
    ///
    /// No capacity check: callers gate first.
    pub fn record(&mut self) -> WindowMarks {
        self.requests_this_second = self.requests_this_second.saturating_add(1);
        self.requests_this_day = self.requests_this_day.saturating_add(1);
        self.marks()
    }

    /// Undo a [`record`](Self::record) whose windows are still current
    ///
    /// Returns true if anything was given back.
    pub fn release(&mut self, marks: WindowMarks) -> bool {
        let mut released = false;

        if marks.second == self.second_window_start && self.requests_this_second > 0 {
            self.requests_this_second -= 1;
            released = true;
        }

        if marks.day == self.day_window_start && self.requests_this_day > 0 {
            self.requests_this_day -= 1;
            released = true;
        }

        released
    }

    pub fn marks(&self) -> WindowMarks {
        WindowMarks {
            second: self.second_window_start,
            day: self.day_window_start,
        }
    }

    pub fn requests_this_second(&self) -> u32 {
        self.requests_this_second
    }

    pub fn requests_this_day(&self) -> u32 {
        self.requests_this_day
    }

    pub fn second_limit(&self) -> Option<u32> {
        self.second_limit
    }

    pub fn day_limit(&self) -> Option<u32> {
        self.day_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // Midnight UTC, 2024-01-01
    const T0: u64 = 1_704_067_200_000;

    #[test]
    fn test_tracker_creation() {
        let tracker = QuotaTracker::new(Some(2), Some(1440), T0);
        assert!(tracker.has_capacity());
        assert_eq!(tracker.requests_this_second(), 0);
        assert_eq!(tracker.requests_this_day(), 0);
        assert_eq!(tracker.remaining(), Some(2));
    }

    #[test]
    fn test_second_limit_exhausts() {
        let mut tracker = QuotaTracker::new(Some(2), Some(1440), T0);
        tracker.record();
        assert!(tracker.has_capacity());
        tracker.record();
        assert!(!tracker.has_capacity());
        assert_eq!(tracker.time_until_next_slot(T0 + 300), 700);
    }

    #[test]
    fn test_day_limit_takes_priority() {
        let mut tracker = QuotaTracker::new(Some(1), Some(1), T0);
        tracker.record();
        assert!(!tracker.has_capacity());

        // Both dimensions exhausted, the day boundary wins
        assert_eq!(tracker.time_until_next_slot(T0 + 10), DAY_MS - 10);

        // The second window rolling does not help
        tracker.refresh_windows(T0 + 1_500);
        assert_eq!(tracker.requests_this_second(), 0);
        assert!(!tracker.has_capacity());
        assert_eq!(tracker.time_until_next_slot(T0 + 1_500), DAY_MS - 1_500);
    }

    #[test]
    fn test_second_rollover_resets_counter() {
        let mut tracker = QuotaTracker::new(Some(2), None, T0);
        tracker.record();
        tracker.record();

        assert!(!tracker.refresh_windows(T0 + 999));
        assert!(!tracker.has_capacity());

        assert!(tracker.refresh_windows(T0 + 1_000));
        assert!(tracker.has_capacity());
        assert_eq!(tracker.requests_this_second(), 0);
    }

    #[test]
    fn test_day_rollover_resets_counter() {
        let mut tracker = QuotaTracker::new(None, Some(1), T0);
        tracker.record();
        assert!(!tracker.has_capacity());

        tracker.refresh_windows(T0 + DAY_MS);
        assert!(tracker.has_capacity());
        assert_eq!(tracker.requests_this_day(), 0);
    }

    #[test]
    fn test_clock_stepping_back_keeps_counts() {
        let mut tracker = QuotaTracker::new(Some(2), None, T0 + 5_000);
        tracker.record();
        tracker.refresh_windows(T0);
        assert_eq!(tracker.requests_this_second(), 1);
        assert_eq!(tracker.marks(), WindowMarks::at(T0 + 5_000));
    }

    #[test]
    fn test_unbounded_dimensions() {
        let mut tracker = QuotaTracker::new(None, None, T0);
        for _ in 0..10_000 {
            tracker.record();
        }
        assert!(tracker.has_capacity());
        assert_eq!(tracker.remaining(), None);
        assert_eq!(tracker.time_until_next_slot(T0), 0);
    }

    #[test]
    fn test_remaining_takes_minimum() {
        let mut tracker = QuotaTracker::new(Some(10), Some(3), T0);
        tracker.record();
        assert_eq!(tracker.remaining(), Some(2));
    }

    #[test]
    fn test_next_reset_is_nearer_boundary() {
        let tracker = QuotaTracker::new(Some(2), Some(10), T0 + 250);
        assert_eq!(tracker.next_reset_timestamp(), T0 + 1_000);

        // Last second of the day: both boundaries coincide
        let tracker = QuotaTracker::new(Some(2), Some(10), T0 + DAY_MS - 1);
        assert_eq!(tracker.next_reset_timestamp(), T0 + DAY_MS);
    }

    #[test]
    fn test_release_only_in_same_window() {
        let mut tracker = QuotaTracker::new(Some(2), Some(10), T0);
        let marks = tracker.record();
        assert!(tracker.release(marks));
        assert_eq!(tracker.requests_this_second(), 0);
        assert_eq!(tracker.requests_this_day(), 0);

        let marks = tracker.record();
        tracker.refresh_windows(T0 + 1_000);
        assert!(tracker.release(marks));
        // Second window moved on, only the day counter gives back
        assert_eq!(tracker.requests_this_second(), 0);
        assert_eq!(tracker.requests_this_day(), 0);
    }

    proptest! {
        #[test]
        fn prop_wait_never_exceeds_window(offset in 0u64..DAY_MS, second_limit in 1u32..20) {
            let now = T0 + offset;
            let mut tracker = QuotaTracker::new(Some(second_limit), None, now);
            for _ in 0..second_limit {
                tracker.record();
            }
            let wait = tracker.time_until_next_slot(now);
            prop_assert!(wait > 0 && wait <= SECOND_MS);
            prop_assert!(tracker.refresh_windows(now + wait));
            prop_assert!(tracker.has_capacity());
        }

        #[test]
        fn prop_counts_bounded_by_limit_when_gated(
            steps in proptest::collection::vec(0u64..400, 1..200),
            second_limit in 1u32..5,
            day_limit in 1u32..50,
        ) {
            let mut now = T0;
            let mut tracker = QuotaTracker::new(Some(second_limit), Some(day_limit), now);
            for step in steps {
                now += step;
                tracker.refresh_windows(now);
                if tracker.has_capacity() {
                    tracker.record();
                }
                prop_assert!(tracker.requests_this_second() <= second_limit);
                prop_assert!(tracker.requests_this_day() <= day_limit);
            }
        }
    }
}
