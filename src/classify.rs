//! Log line classification
//!
//! The benchmark binary reports metrics as free text interleaved with
//! whatever else it prints. Classification is deliberately permissive:
//! every recognized pattern is tested against every line, anything that
//! matches yields an event, and lines that match nothing are dropped
//! without error.
//!
//! Two families of lines exist. Native lines carry an embedded
//! `[HH:MM:SS.mmm]` wall-clock timestamp and feed the time-aligned record
//! pipeline. Foreign lines come from the comparison baseline's logs, carry
//! no timestamp, and are only ever reduced to flat averages.

use chrono::NaiveTime;
use regex::Regex;

use crate::record::MetricKind;

/// Named GPU buffer whose memory usage the benchmark reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryBuffer {
    /// Far-values buffer
    FarValues,
    /// Octree node pool
    OctreeNodes,
    /// Upload staging buffer
    Staging,
}

impl MemoryBuffer {
    /// Metric column this buffer reports into.
    #[must_use]
    pub const fn metric_kind(self) -> MetricKind {
        match self {
            Self::FarValues => MetricKind::FarValuesMemoryMb,
            Self::OctreeNodes => MetricKind::OctreeMemoryMb,
            Self::Staging => MetricKind::StagingMemoryMb,
        }
    }
}

/// Run-level scalar reported once (or occasionally) per run, not part of
/// any time-series row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunScalar {
    /// `Grid height: <int>`
    GridHeight(u32),
    /// `Grid size: <int>`
    GridSize(u32),
}

/// One recognized event extracted from a log line.
///
/// A single line can produce more than one event; the classifier never
/// assumes patterns are mutually exclusive.
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// `FPS: <f>, msPf: <f>` with embedded timestamp; one line yields both
    /// an FPS and a frame-time sample at the same instant.
    FrameTiming {
        /// Wall-clock instant embedded in the line
        timestamp: NaiveTime,
        /// Frames per second
        fps: f64,
        /// Milliseconds per frame
        mspf: f64,
    },
    /// `Average Steps per ray: <f>` with embedded timestamp
    RaySteps {
        /// Wall-clock instant embedded in the line
        timestamp: NaiveTime,
        /// Mean traversal steps per primary ray
        steps: f64,
    },
    /// `<Buffer> Memory used: <f> MB` with embedded timestamp
    MemoryUsage {
        /// Wall-clock instant embedded in the line
        timestamp: NaiveTime,
        /// Which buffer reported
        buffer: MemoryBuffer,
        /// Reported usage in MB
        megabytes: f64,
    },
    /// Untimestamped run-level scalar
    Scalar(RunScalar),
    /// Foreign baseline `<int> FPS` line (no timestamp)
    ForeignFps(f64),
    /// Foreign baseline `<int> BYTES` line (no timestamp)
    ForeignBytes(u64),
}

/// Stateless classifier holding the compiled line patterns.
///
/// Construction compiles every pattern once; [`classify`](Self::classify)
/// borrows immutably and is safe to call from a tight streaming loop.
pub struct LineClassifier {
    frame: Regex,
    steps: Regex,
    far_values: Regex,
    octree: Regex,
    staging: Regex,
    grid_height: Regex,
    grid_size: Regex,
    foreign_fps: Regex,
    foreign_bytes: Regex,
}

const TS: &str = r"\[(\d{2}:\d{2}:\d{2}\.\d+)\]";

impl LineClassifier {
    /// Compile the classifier's patterns.
    #[must_use]
    pub fn new() -> Self {
        Self {
            frame: Regex::new(&format!(r"{TS}.*?FPS:\s*([\d.]+),\s*msPf:\s*([\d.]+)")).unwrap(),
            steps: Regex::new(&format!(r"{TS}.*?Average Steps per ray:\s*([\d.]+)")).unwrap(),
            far_values: Regex::new(&format!(
                r"(?i){TS}.*?Far Values Buffer Memory used:\s*([\d.]+)\s*MB"
            ))
            .unwrap(),
            octree: Regex::new(&format!(
                r"(?i){TS}.*?Octree Nodes Buffer Memory used:\s*([\d.]+)\s*MB"
            ))
            .unwrap(),
            staging: Regex::new(&format!(
                r"(?i){TS}.*?Staging Buffer Memory used:\s*([\d.]+)\s*MB"
            ))
            .unwrap(),
            grid_height: Regex::new(r"(?i)Grid height:\s*(\d+)").unwrap(),
            grid_size: Regex::new(r"(?i)Grid size:\s*(\d+)").unwrap(),
            foreign_fps: Regex::new(r"INFO:\s*([0-9]+)\s*FPS").unwrap(),
            foreign_bytes: Regex::new(r"\s([0-9]+)\s*BYTES").unwrap(),
        }
    }

    /// Classify one line, returning every event it carries.
    ///
    /// Unrecognized lines return an empty vector. Lines whose numerals or
    /// timestamps fail to parse are treated as unrecognized rather than as
    /// errors; the log format is not fully specified.
    #[must_use]
    pub fn classify(&self, line: &str) -> Vec<LineEvent> {
        let mut events = Vec::new();

        if let Some(caps) = self.frame.captures(line) {
            if let (Some(ts), Some(fps), Some(mspf)) = (
                parse_timestamp(&caps[1]),
                caps[2].parse::<f64>().ok(),
                caps[3].parse::<f64>().ok(),
            ) {
                events.push(LineEvent::FrameTiming {
                    timestamp: ts,
                    fps,
                    mspf,
                });
            }
        }

        if let Some(caps) = self.steps.captures(line) {
            if let (Some(ts), Some(steps)) =
                (parse_timestamp(&caps[1]), caps[2].parse::<f64>().ok())
            {
                events.push(LineEvent::RaySteps {
                    timestamp: ts,
                    steps,
                });
            }
        }

        for (pattern, buffer) in [
            (&self.far_values, MemoryBuffer::FarValues),
            (&self.octree, MemoryBuffer::OctreeNodes),
            (&self.staging, MemoryBuffer::Staging),
        ] {
            if let Some(caps) = pattern.captures(line) {
                if let (Some(ts), Some(mb)) =
                    (parse_timestamp(&caps[1]), caps[2].parse::<f64>().ok())
                {
                    events.push(LineEvent::MemoryUsage {
                        timestamp: ts,
                        buffer,
                        megabytes: mb,
                    });
                }
            }
        }

        if let Some(caps) = self.grid_height.captures(line) {
            if let Ok(height) = caps[1].parse::<u32>() {
                events.push(LineEvent::Scalar(RunScalar::GridHeight(height)));
            }
        }

        if let Some(caps) = self.grid_size.captures(line) {
            if let Ok(size) = caps[1].parse::<u32>() {
                events.push(LineEvent::Scalar(RunScalar::GridSize(size)));
            }
        }

        if let Some(caps) = self.foreign_fps.captures(line) {
            if let Ok(fps) = caps[1].parse::<f64>() {
                events.push(LineEvent::ForeignFps(fps));
            }
        }

        if let Some(caps) = self.foreign_bytes.captures(line) {
            if let Ok(bytes) = caps[1].parse::<u64>() {
                events.push(LineEvent::ForeignBytes(bytes));
            }
        }

        events
    }
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_timestamp(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M:%S%.f").ok()
}
