//! Relative-time alignment
//!
//! Metrics arrive on separate lines at different cadences, each carrying an
//! absolute wall-clock timestamp. To merge them into rows they are keyed by
//! elapsed time relative to the first timestamp seen in the run, rounded to
//! one decimal place. Several metrics routinely land on the same key; the
//! clock source ticks coarsely and one rendered frame can emit multiple
//! report lines.

use chrono::NaiveTime;

/// Relative elapsed-time bucket key, stored as integer tenths of a second
/// so it can order and hash exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeKey(i64);

impl TimeKey {
    /// Build a key from elapsed seconds, rounding to one decimal place.
    #[must_use]
    pub fn from_seconds(seconds: f64) -> Self {
        Self((seconds * 10.0).round() as i64)
    }

    /// Elapsed seconds this key represents.
    #[must_use]
    pub fn seconds(self) -> f64 {
        self.0 as f64 / 10.0
    }
}

impl std::fmt::Display for TimeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}", self.seconds())
    }
}

/// Converts absolute timestamps into [`TimeKey`]s, anchored to the first
/// timestamp observed.
///
/// One aligner belongs to exactly one run; the epoch anchor is the piece of
/// state that makes record rows comparable across metrics within that run.
/// Timestamps need not strictly increase: equal or coarsely-ticking clocks
/// simply map onto the same key.
#[derive(Debug, Default)]
pub struct TimeAligner {
    epoch: Option<NaiveTime>,
}

impl TimeAligner {
    /// Create an aligner with no epoch anchored yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Align an absolute timestamp to the run's relative axis.
    ///
    /// The first call anchors the epoch and returns key `0.0`; subsequent
    /// calls return `round(timestamp - epoch, 1)`.
    pub fn align(&mut self, timestamp: NaiveTime) -> TimeKey {
        let epoch = *self.epoch.get_or_insert(timestamp);
        let elapsed_ms = timestamp.signed_duration_since(epoch).num_milliseconds();
        TimeKey::from_seconds(elapsed_ms as f64 / 1000.0)
    }

    /// The anchored epoch, if any timestamp has been seen.
    #[must_use]
    pub const fn epoch(&self) -> Option<NaiveTime> {
        self.epoch
    }
}
