//! Chart boundary
//!
//! The plotting backend is an external collaborator: it receives named
//! groups of `{x, y}` points plus labels and produces image files. This
//! module only produces that input. The built-in [`JsonRenderer`] writes
//! each chart spec as a JSON artifact for the backend to pick up; nothing
//! here rasterizes anything.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::Result;

/// One point of an aggregated series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    /// Independent variable (scene resolution or elapsed seconds)
    pub x: f64,
    /// Metric value
    pub y: f64,
}

/// Named groups of points, one line per group. Built fresh per report and
/// never persisted.
pub type AggregatedSeries = BTreeMap<String, Vec<SeriesPoint>>;

/// What the x axis of a chart means. Groups plotted together must agree;
/// the per-experiment chart builders each produce exactly one semantics,
/// so a mixed chart cannot be assembled without going out of one's way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum XAxis {
    /// Static comparison: x is total scene resolution
    SceneResolution,
    /// Time series: x is elapsed seconds since run start
    ElapsedSeconds,
}

/// A complete chart description handed to the renderer.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSpec {
    /// Chart title
    pub title: String,
    /// X-axis label
    pub x_label: String,
    /// Y-axis label
    pub y_label: String,
    /// X-axis semantics shared by every group
    pub x_axis: XAxis,
    /// Output artifact path
    pub output: PathBuf,
    /// Named groups, each one rendered line
    pub groups: AggregatedSeries,
}

impl ChartSpec {
    /// Build a chart spec, sorting every group by ascending x.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        x_label: impl Into<String>,
        y_label: impl Into<String>,
        x_axis: XAxis,
        output: impl Into<PathBuf>,
        mut groups: AggregatedSeries,
    ) -> Self {
        for points in groups.values_mut() {
            points.sort_by(|a, b| a.x.total_cmp(&b.x));
        }
        Self {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
            x_axis,
            output: output.into(),
            groups,
        }
    }
}

/// External collaborator seam: consumes chart specs, produces artifacts.
pub trait Renderer {
    /// Render one chart.
    ///
    /// # Errors
    /// Implementation-defined; the built-in renderer fails on IO or
    /// serialization errors.
    fn render(&self, chart: &ChartSpec) -> Result<()>;
}

/// Writes each chart spec as a pretty-printed JSON artifact next to where
/// the image would go, for the external plotting backend to consume.
#[derive(Debug, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, chart: &ChartSpec) -> Result<()> {
        if let Some(parent) = chart.output.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&chart.output)?;
        serde_json::to_writer_pretty(BufWriter::new(file), chart)?;
        Ok(())
    }
}

/// Artifact path for one `(metric, grouping)` chart under a figures
/// directory, e.g. `figures/Location_1_memory.json`.
#[must_use]
pub fn artifact_path(figures_dir: &Path, group: &str, metric: &str) -> PathBuf {
    figures_dir.join(format!("{}_{metric}.json", group.replace(' ', "_")))
}
