//! Practice-session controls: A/B loop region, tap tempo, bookmarks
//!
//! Pure state containers layered on top of the transport. No I/O, no
//! callbacks; the transport and the host query them.

// Tap tempo accepts the same range the metronome clamps to
use crate::metronome::{MAX_BPM, MIN_BPM};

/// Taps older than this relative to the newest tap are discarded
const TAP_WINDOW_MS: f64 = 2000.0;

/// A/B loop region
///
/// The marking cycle is three-state: unset -> start marked -> both marked ->
/// unset. Bounds are stored exactly as marked; `span()` normalizes them on
/// read, so marking B chronologically before A still yields a valid region.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopRegion {
    start: Option<f64>,
    end: Option<f64>,
    enabled: bool,
}

impl LoopRegion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the marking cycle at the given time
    pub fn cycle(&mut self, current_time: f64) {
        match (self.start, self.end) {
            (None, _) => self.start = Some(current_time),
            (Some(_), None) => self.end = Some(current_time),
            (Some(_), Some(_)) => {
                self.start = None;
                self.end = None;
            }
        }
    }

    /// Toggle enforcement; a region with fewer than two bounds never loops
    pub fn toggle_enabled(&mut self) {
        self.enabled = !self.enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn start(&self) -> Option<f64> {
        self.start
    }

    pub fn end(&self) -> Option<f64> {
        self.end
    }

    /// The normalized (start, end) bounds, if both are marked
    pub fn span(&self) -> Option<(f64, f64)> {
        match (self.start, self.end) {
            (Some(a), Some(b)) => Some((a.min(b), a.max(b))),
            _ => None,
        }
    }

    /// Where playback should jump to when `current_time` crosses the region
    /// end, or None when the region is inactive
    pub fn wrap_target(&self, current_time: f64) -> Option<f64> {
        if !self.enabled {
            return None;
        }
        match self.span() {
            Some((start, end)) if current_time >= end => Some(start),
            _ => None,
        }
    }
}

/// Tap-tempo estimator
///
/// Keeps a rolling window of tap timestamps (milliseconds); taps older than
/// 2 seconds relative to the newest are discarded. With at least two taps
/// in the window the mean inter-tap interval gives the tempo. Estimates
/// outside the supported BPM range are rejected, not clamped.
#[derive(Debug, Clone, Default)]
pub struct TapTempo {
    taps_ms: Vec<f64>,
}

impl TapTempo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tap at the given timestamp; returns the new BPM estimate
    /// if one is available and in range
    pub fn tap(&mut self, now_ms: f64) -> Option<f64> {
        self.taps_ms.push(now_ms);
        self.taps_ms.retain(|&t| now_ms - t <= TAP_WINDOW_MS);

        if self.taps_ms.len() < 2 {
            return None;
        }

        let first = self.taps_ms[0];
        let last = self.taps_ms[self.taps_ms.len() - 1];
        let mean_interval_ms = (last - first) / (self.taps_ms.len() - 1) as f64;
        if mean_interval_ms <= 0.0 {
            return None;
        }

        let bpm = (60_000.0 / mean_interval_ms).round();
        if (MIN_BPM..=MAX_BPM).contains(&bpm) {
            Some(bpm)
        } else {
            None
        }
    }

    /// Forget all taps
    pub fn reset(&mut self) {
        self.taps_ms.clear();
    }
}

/// Seek-target bookmarks
///
/// Times are rounded to one decimal place, deduplicated, and kept in
/// ascending order.
#[derive(Debug, Clone, Default)]
pub struct Bookmarks {
    times: Vec<f64>,
}

impl Bookmarks {
    pub fn new() -> Self {
        Self::default()
    }

    fn round(seconds: f64) -> f64 {
        (seconds * 10.0).round() / 10.0
    }

    /// Add a bookmark at the given time; duplicates are ignored
    pub fn add(&mut self, seconds: f64) {
        let rounded = Self::round(seconds);
        match self
            .times
            .binary_search_by(|t| t.partial_cmp(&rounded).unwrap_or(std::cmp::Ordering::Less))
        {
            Ok(_) => {}
            Err(pos) => self.times.insert(pos, rounded),
        }
    }

    /// Remove an exact-match bookmark
    pub fn remove(&mut self, seconds: f64) {
        let rounded = Self::round(seconds);
        self.times.retain(|&t| t != rounded);
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.times
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_cycle_three_states() {
        let mut region = LoopRegion::new();
        assert_eq!(region.span(), None);

        region.cycle(10.0);
        assert_eq!(region.start(), Some(10.0));
        assert_eq!(region.span(), None);

        region.cycle(20.0);
        assert_eq!(region.span(), Some((10.0, 20.0)));

        region.cycle(99.0);
        assert_eq!(region.start(), None);
        assert_eq!(region.end(), None);
    }

    #[test]
    fn test_loop_bounds_normalize_on_read() {
        let mut region = LoopRegion::new();
        // Marked in reverse chronological order
        region.cycle(30.0);
        region.cycle(12.0);
        assert_eq!(region.span(), Some((12.0, 30.0)));
    }

    #[test]
    fn test_loop_wrap_only_when_enabled_and_complete() {
        let mut region = LoopRegion::new();
        region.cycle(10.0);
        region.cycle(20.0);

        assert_eq!(region.wrap_target(20.05), None, "disabled region must not loop");

        region.toggle_enabled();
        assert_eq!(region.wrap_target(20.05), Some(10.0));
        assert_eq!(region.wrap_target(15.0), None);

        // Enabled but incomplete
        let mut partial = LoopRegion::new();
        partial.cycle(5.0);
        partial.toggle_enabled();
        assert_eq!(partial.wrap_target(100.0), None);
    }

    #[test]
    fn test_tap_tempo_mean_interval() {
        let mut tap = TapTempo::new();
        assert_eq!(tap.tap(0.0), None);
        assert_eq!(tap.tap(500.0), Some(120.0));
        assert_eq!(tap.tap(1000.0), Some(120.0));
        assert_eq!(tap.tap(1500.0), Some(120.0));
    }

    #[test]
    fn test_tap_tempo_rejects_out_of_range() {
        // 25 BPM: 2400ms interval falls outside the window anyway, so only
        // one tap survives and no estimate is produced
        let mut slow = TapTempo::new();
        slow.tap(0.0);
        assert_eq!(slow.tap(2400.0), None);

        // 305 BPM: ~197ms interval, estimate is produced but out of range
        let mut fast = TapTempo::new();
        fast.tap(0.0);
        fast.tap(196.7);
        fast.tap(393.4);
        assert_eq!(fast.tap(590.1), None);
    }

    #[test]
    fn test_tap_tempo_window_discards_stale_taps() {
        let mut tap = TapTempo::new();
        tap.tap(0.0);
        tap.tap(500.0);
        // Long pause; earlier taps fall out of the 2s window
        assert_eq!(tap.tap(10_000.0), None);
        assert_eq!(tap.tap(10_500.0), Some(120.0));
    }

    #[test]
    fn test_bookmark_rounding_dedup_order() {
        let mut marks = Bookmarks::new();
        marks.add(12.34);
        marks.add(5.0);
        marks.add(12.3);
        assert_eq!(marks.as_slice(), &[5.0, 12.3]);

        marks.remove(12.3);
        assert_eq!(marks.as_slice(), &[5.0]);
    }
}
