//! Run records and their on-disk format
//!
//! One run produces one CSV file: a header naming the fixed column
//! superset, then one row per [`TimeKey`] in ascending order. Rows are
//! sparse; a metric absent at a key is written blank and reads back as
//! absent, never as zero. Every record file carries the full column set so
//! files from different runs stay column-comparable.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::align::TimeKey;
use crate::{Error, Result};

/// Time-series metric kinds reported by the benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Frames per second
    Fps,
    /// Milliseconds per frame
    FrameTimeMs,
    /// Average traversal steps per primary ray
    RaySteps,
    /// Far-values buffer usage, MB
    FarValuesMemoryMb,
    /// Octree node pool usage, MB
    OctreeMemoryMb,
    /// Staging buffer usage, MB
    StagingMemoryMb,
    /// Derived uniform-grid usage, MB
    GridMemoryMb,
}

impl MetricKind {
    /// Every metric kind, in an arbitrary but fixed order.
    pub const ALL: [Self; 7] = [
        Self::Fps,
        Self::FrameTimeMs,
        Self::RaySteps,
        Self::FarValuesMemoryMb,
        Self::OctreeMemoryMb,
        Self::StagingMemoryMb,
        Self::GridMemoryMb,
    ];

    /// CSV column name for this metric.
    #[must_use]
    pub const fn column_name(self) -> &'static str {
        match self {
            Self::Fps => "fps",
            Self::FrameTimeMs => "mspf",
            Self::RaySteps => "steps",
            Self::FarValuesMemoryMb => "far_values_memory",
            Self::OctreeMemoryMb => "octree_memory",
            Self::StagingMemoryMb => "staging_memory",
            Self::GridMemoryMb => "grid_memory",
        }
    }

    /// Inverse of [`column_name`](Self::column_name).
    #[must_use]
    pub fn from_column_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.column_name() == name)
    }
}

/// Fixed column superset written to every record file: `elapsed_seconds`
/// first, metric columns in alphabetical order after it.
pub const CSV_COLUMNS: [&str; 8] = [
    "elapsed_seconds",
    "far_values_memory",
    "fps",
    "grid_memory",
    "mspf",
    "octree_memory",
    "staging_memory",
    "steps",
];

/// One sparse record row: the metrics observed at one [`TimeKey`].
///
/// Fields are only ever added while a run streams; a repeated report of the
/// same metric at the same key overwrites (last write wins, an acknowledged
/// fidelity-loss case).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Row {
    fps: Option<f64>,
    mspf: Option<f64>,
    steps: Option<f64>,
    far_values_memory: Option<f64>,
    octree_memory: Option<f64>,
    staging_memory: Option<f64>,
    grid_memory: Option<f64>,
}

impl Row {
    /// Set one metric field.
    pub fn set(&mut self, kind: MetricKind, value: f64) {
        match kind {
            MetricKind::Fps => self.fps = Some(value),
            MetricKind::FrameTimeMs => self.mspf = Some(value),
            MetricKind::RaySteps => self.steps = Some(value),
            MetricKind::FarValuesMemoryMb => self.far_values_memory = Some(value),
            MetricKind::OctreeMemoryMb => self.octree_memory = Some(value),
            MetricKind::StagingMemoryMb => self.staging_memory = Some(value),
            MetricKind::GridMemoryMb => self.grid_memory = Some(value),
        }
    }

    /// Get one metric field.
    #[must_use]
    pub const fn get(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::Fps => self.fps,
            MetricKind::FrameTimeMs => self.mspf,
            MetricKind::RaySteps => self.steps,
            MetricKind::FarValuesMemoryMb => self.far_values_memory,
            MetricKind::OctreeMemoryMb => self.octree_memory,
            MetricKind::StagingMemoryMb => self.staging_memory,
            MetricKind::GridMemoryMb => self.grid_memory,
        }
    }

    /// True if no metric is populated.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fps.is_none()
            && self.mspf.is_none()
            && self.steps.is_none()
            && self.far_values_memory.is_none()
            && self.octree_memory.is_none()
            && self.staging_memory.is_none()
            && self.grid_memory.is_none()
    }

    /// Sum of the four memory subcomponents, present only when all four
    /// are. A row missing any subcomponent has no total; it is never
    /// defaulted to zero.
    #[must_use]
    pub fn total_memory(&self) -> Option<f64> {
        Some(
            self.far_values_memory?
                + self.octree_memory?
                + self.staging_memory?
                + self.grid_memory?,
        )
    }
}

/// One benchmark configuration: the argument tuple handed to the external
/// binary and recovered later from the result filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    /// Per-chunk voxel resolution (`--res`)
    pub chunk_resolution: u32,
    /// Grid dimension in chunks (`--grid`)
    pub grid_size: u32,
    /// Grid height in chunks (`--gridheight`); some scenes derive their own
    pub grid_height: Option<u32>,
    /// Scene/test variant id (`--test`)
    pub scene: u32,
}

impl RunConfig {
    /// Command-line arguments for the external binary, precompute and
    /// normal mode alike.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--test".to_string(),
            self.scene.to_string(),
            "--res".to_string(),
            self.chunk_resolution.to_string(),
            "--grid".to_string(),
            self.grid_size.to_string(),
        ];
        if let Some(height) = self.grid_height {
            args.push("--gridheight".to_string());
            args.push(height.to_string());
        }
        args
    }
}

/// A finalized run: its configuration plus rows ordered by [`TimeKey`].
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    config: RunConfig,
    rows: BTreeMap<TimeKey, Row>,
}

impl RunRecord {
    /// Assemble a record from already-merged rows.
    #[must_use]
    pub fn new(config: RunConfig, rows: BTreeMap<TimeKey, Row>) -> Self {
        Self { config, rows }
    }

    /// The configuration this run executed under.
    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Rows ordered by ascending time key.
    #[must_use]
    pub const fn rows(&self) -> &BTreeMap<TimeKey, Row> {
        &self.rows
    }

    /// Write the record as a CSV file, atomically: the full content lands
    /// in a sibling temporary file first and is renamed over the target.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or the file
    /// cannot be written.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("csv.tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            writeln!(writer, "{}", CSV_COLUMNS.join(","))?;
            for (key, row) in &self.rows {
                write_row(&mut writer, *key, row)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn write_row<W: Write>(writer: &mut W, key: TimeKey, row: &Row) -> Result<()> {
    write!(writer, "{key}")?;
    for column in &CSV_COLUMNS[1..] {
        let value = MetricKind::from_column_name(column).and_then(|kind| row.get(kind));
        match value {
            Some(v) => write!(writer, ",{v}")?,
            None => write!(writer, ",")?,
        }
    }
    writeln!(writer)?;
    Ok(())
}

/// Read a record file's rows back, keyed by [`TimeKey`].
///
/// Unknown columns are ignored; blank cells read as absent. Rows whose
/// `elapsed_seconds` cell does not parse are skipped rather than fatal,
/// matching the permissive posture of the rest of the pipeline.
///
/// # Errors
/// Returns [`Error::RecordFormat`] when the header is missing the
/// `elapsed_seconds` column, or an IO error if the file cannot be read.
pub fn read_rows(path: &Path) -> Result<BTreeMap<TimeKey, Row>> {
    let file = File::open(path)?;
    let mut lines = BufReader::new(file).lines();

    let header = match lines.next() {
        Some(line) => line?,
        None => {
            return Err(Error::RecordFormat {
                path: path.to_path_buf(),
                message: "empty file".to_string(),
            })
        }
    };
    let columns: Vec<&str> = header.split(',').map(str::trim).collect();
    let elapsed_idx = columns
        .iter()
        .position(|c| *c == "elapsed_seconds")
        .ok_or_else(|| Error::RecordFormat {
            path: path.to_path_buf(),
            message: "header lacks elapsed_seconds column".to_string(),
        })?;
    let metric_columns: Vec<(usize, MetricKind)> = columns
        .iter()
        .enumerate()
        .filter_map(|(idx, name)| MetricKind::from_column_name(name).map(|kind| (idx, kind)))
        .collect();

    let mut rows = BTreeMap::new();
    for line in lines {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(',').collect();
        let Some(elapsed) = cells
            .get(elapsed_idx)
            .and_then(|cell| cell.trim().parse::<f64>().ok())
        else {
            continue;
        };
        let key = TimeKey::from_seconds(elapsed);
        let row: &mut Row = rows.entry(key).or_default();
        for (idx, kind) in &metric_columns {
            if let Some(value) = cells
                .get(*idx)
                .and_then(|cell| cell.trim().parse::<f64>().ok())
            {
                row.set(*kind, value);
            }
        }
    }
    Ok(rows)
}
