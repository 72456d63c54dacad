//! Result reading and steady-state reduction
//!
//! A record file's rows are reduced to one average per metric column after
//! a warm-up window is discarded; the warm-up excludes start-up transients
//! (shader compilation, first-touch allocations) that would bias the
//! steady-state numbers. Columns are sparse, so each metric averages over
//! only the rows where it appears.
//!
//! The foreign path reduces the comparison baseline's free-text logs.
//! Those lines carry no timestamps, so no warm-up window applies and the
//! whole file collapses to flat averages.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::align::TimeKey;
use crate::classify::{LineClassifier, LineEvent};
use crate::record::{self, MetricKind, Row};
use crate::Result;

/// Default warm-up window, in elapsed seconds.
pub const DEFAULT_WARMUP_SECONDS: f64 = 2.0;

/// Reduces record files to steady-state per-metric averages.
#[derive(Debug, Clone, Copy)]
pub struct SteadyStateReducer {
    warmup_seconds: f64,
}

impl Default for SteadyStateReducer {
    fn default() -> Self {
        Self {
            warmup_seconds: DEFAULT_WARMUP_SECONDS,
        }
    }
}

impl SteadyStateReducer {
    /// Create a reducer with a custom warm-up window.
    #[must_use]
    pub const fn new(warmup_seconds: f64) -> Self {
        Self { warmup_seconds }
    }

    /// Reduce one record file to per-metric averages.
    ///
    /// The returned map contains an entry for each metric that appeared in
    /// at least one steady-state row. Use [`averages_or_zero`] on the
    /// result when a missing metric should read as zero.
    ///
    /// # Errors
    /// Propagates record-read errors; an unreadable file is reported, not
    /// averaged as empty.
    pub fn reduce(&self, path: &Path) -> Result<HashMap<MetricKind, f64>> {
        let rows = record::read_rows(path)?;
        Ok(self.reduce_rows(&rows))
    }

    /// Reduce already-loaded rows.
    ///
    /// Rows with `elapsed < warmup` are excluded; a row exactly at the
    /// threshold is kept. Sum and count accumulate independently per
    /// metric, so sparse columns average over only the rows where the
    /// metric appears rather than over all rows.
    #[must_use]
    pub fn reduce_rows(&self, rows: &BTreeMap<TimeKey, Row>) -> HashMap<MetricKind, f64> {
        let mut sums: HashMap<MetricKind, f64> = HashMap::new();
        let mut counts: HashMap<MetricKind, u64> = HashMap::new();

        for (key, row) in rows {
            if key.seconds() < self.warmup_seconds {
                continue;
            }
            for kind in MetricKind::ALL {
                if let Some(value) = row.get(kind) {
                    *sums.entry(kind).or_default() += value;
                    *counts.entry(kind).or_default() += 1;
                }
            }
        }

        sums.into_iter()
            .map(|(kind, sum)| {
                let count = counts.get(&kind).copied().unwrap_or(0);
                let average = if count == 0 { 0.0 } else { sum / count as f64 };
                (kind, average)
            })
            .collect()
    }
}

/// Read a metric from a reduced average map, with absent metrics reading
/// as zero.
///
/// A zero average for a metric that was never reported is indistinguishable
/// from a true zero; callers that need presence (the composite memory rule)
/// must consult the map directly.
#[must_use]
pub fn averages_or_zero(averages: &HashMap<MetricKind, f64>, kind: MetricKind) -> f64 {
    averages.get(&kind).copied().unwrap_or(0.0)
}

/// Flat averages over one foreign baseline log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForeignAverages {
    /// Mean of per-sample `1000 / fps` frame times
    pub mspf: f64,
    /// Mean reported memory, MB
    pub total_memory_mb: f64,
}

/// Reduce a comparison-baseline log to flat averages.
///
/// Frame time is derived as `1000 / fps` per sample and then averaged.
/// Averaging reciprocals is not the same as the reciprocal of the mean
/// FPS; the method is kept as-is for comparability with previously
/// published baseline numbers. Byte counts divide by 1,048,576 to MB.
/// A file with no matching lines reduces to zeros.
///
/// # Errors
/// Returns an IO error if the file cannot be read.
pub fn reduce_foreign_log(path: &Path) -> Result<ForeignAverages> {
    let classifier = LineClassifier::new();
    let file = File::open(path)?;

    let mut mspf_sum = 0.0;
    let mut mspf_count = 0u64;
    let mut mem_sum = 0.0;
    let mut mem_count = 0u64;

    for line in BufReader::new(file).lines() {
        let line = line?;
        for event in classifier.classify(&line) {
            match event {
                LineEvent::ForeignFps(fps) if fps > 0.0 => {
                    mspf_sum += 1000.0 / fps;
                    mspf_count += 1;
                }
                LineEvent::ForeignBytes(bytes) => {
                    mem_sum += bytes as f64 / (1024.0 * 1024.0);
                    mem_count += 1;
                }
                _ => {}
            }
        }
    }

    Ok(ForeignAverages {
        mspf: if mspf_count == 0 {
            0.0
        } else {
            mspf_sum / mspf_count as f64
        },
        total_memory_mb: if mem_count == 0 {
            0.0
        } else {
            mem_sum / mem_count as f64
        },
    })
}
