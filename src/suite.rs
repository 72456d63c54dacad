//! Experiment suites
//!
//! Each suite drives a set of benchmark configurations strictly
//! sequentially, one fresh [`RunRecorder`] per run, and has a matching
//! graphing routine that fans the finished result files into comparison
//! charts. Result files land under per-suite directories
//! (`exp1_results/` etc.) named so their configuration can be parsed back
//! out at aggregation time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use tracing::{error, info};

use crate::aggregate::{
    self, group_records_by_tag, group_reduced_by_tag, resolution_series, time_series,
    SeriesMetric,
};
use crate::chart::{artifact_path, AggregatedSeries, ChartSpec, Renderer, SeriesPoint, XAxis};
use crate::record::{MetricKind, RunConfig};
use crate::recorder::{CancelFlag, RunRecorder};
use crate::reduce::{reduce_foreign_log, SteadyStateReducer};
use crate::{Error, Result};

/// The experiment suites the harness knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suite {
    /// Static camera at two fixed locations, resolution sweep (scenes 0/1)
    StaticLocations,
    /// Scripted camera paths through the scene (scenes 2/3)
    CameraPaths,
    /// Walking and flying traversal configurations (scenes 4/5)
    Movement,
    /// Short runs for the cross-renderer comparison
    Comparison,
}

/// `(chunk_resolution, grid_size, grid_height)` sweep for the static
/// location scenes.
const STATIC_CONFIGURATIONS: [(u32, u32, u32); 14] = [
    (512, 1, 5),
    (512, 3, 5),
    (512, 5, 5),
    (512, 7, 5),
    (512, 9, 5),
    (512, 11, 5),
    (1024, 1, 5),
    (1024, 3, 5),
    (1024, 5, 5),
    (1024, 7, 5),
    (1024, 9, 5),
    (1024, 11, 5),
    (1024, 23, 5),
    (1024, 25, 5),
];

/// Sweep for the scripted camera paths.
const PATH_CONFIGURATIONS: [(u32, u32, u32); 6] = [
    (512, 1, 5),
    (512, 3, 5),
    (512, 5, 5),
    (1024, 1, 5),
    (1024, 3, 5),
    (1024, 5, 5),
];

/// `(chunk_resolution, grid_size)` for the walking traversal; the scene
/// derives its own grid height.
const WALKING_CONFIGURATIONS: [(u32, u32); 2] = [(512, 5), (1024, 5)];

/// `(chunk_resolution, grid_size)` for the flying traversal.
const FLYING_CONFIGURATIONS: [(u32, u32); 2] = [(512, 5), (1024, 5)];

/// Configurations for the cross-renderer comparison runs.
const COMPARISON_CONFIGURATIONS: [(u32, u32, u32); 3] = [(512, 1, 5), (2048, 1, 5), (2048, 3, 5)];

/// Drives one suite's configurations through the external binary.
pub struct SuiteRunner {
    program: PathBuf,
    working_dir: PathBuf,
    results_root: PathBuf,
    force: bool,
    cancel: CancelFlag,
}

impl SuiteRunner {
    /// Create a runner writing results under `results_root`.
    #[must_use]
    pub fn new(
        program: impl Into<PathBuf>,
        working_dir: impl Into<PathBuf>,
        results_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
            results_root: results_root.into(),
            force: false,
            cancel: CancelFlag::new(),
        }
    }

    /// Re-run configurations whose result file already exists.
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Attach a cancellation flag shared with a signal handler.
    #[must_use]
    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every configuration of one suite, sequentially.
    ///
    /// A configuration whose chunk precompute fails is reported and the
    /// suite moves on; re-invoking later retries only the missing results
    /// because existing files are skipped unless forced.
    ///
    /// # Errors
    /// Stops with [`Error::Interrupted`] on cancellation; propagates
    /// spawn/IO failures.
    pub fn run(&self, suite: Suite) -> Result<()> {
        match suite {
            Suite::StaticLocations => self.run_static_locations(),
            Suite::CameraPaths => self.run_camera_paths(),
            Suite::Movement => self.run_movement(),
            Suite::Comparison => self.run_comparison(),
        }
    }

    fn run_static_locations(&self) -> Result<()> {
        let dir = self.results_root.join("exp1_results");
        for scene in [0, 1] {
            for (res, grid, height) in STATIC_CONFIGURATIONS {
                let config = RunConfig {
                    chunk_resolution: res,
                    grid_size: grid,
                    grid_height: Some(height),
                    scene,
                };
                let out = dir.join(format!("location_{}_{res}_{grid}.csv", scene + 1));
                self.run_one(config, Duration::from_secs(20), &out)?;
            }
        }
        Ok(())
    }

    fn run_camera_paths(&self) -> Result<()> {
        let dir = self.results_root.join("exp2_results");
        for scene in [2, 3] {
            for (res, grid, height) in PATH_CONFIGURATIONS {
                let config = RunConfig {
                    chunk_resolution: res,
                    grid_size: grid,
                    grid_height: Some(height),
                    scene,
                };
                let out = dir.join(format!("path_{}_{res}_{grid}.csv", scene - 1));
                self.run_one(config, Duration::from_secs(65), &out)?;
            }
        }
        Ok(())
    }

    fn run_movement(&self) -> Result<()> {
        let dir = self.results_root.join("exp3_results");
        let suites = [(4, "walking", &WALKING_CONFIGURATIONS), (5, "flying", &FLYING_CONFIGURATIONS)];
        for (scene, name, configurations) in suites {
            for (res, grid) in configurations.iter().copied() {
                let config = RunConfig {
                    chunk_resolution: res,
                    grid_size: grid,
                    grid_height: None,
                    scene,
                };
                let out = dir.join(format!("path_{name}_{res}_{grid}.csv"));
                self.run_one(config, Duration::from_secs(65), &out)?;
            }
        }
        Ok(())
    }

    fn run_comparison(&self) -> Result<()> {
        let dir = self.results_root.join("compare_results");
        for (res, grid, height) in COMPARISON_CONFIGURATIONS {
            let config = RunConfig {
                chunk_resolution: res,
                grid_size: grid,
                grid_height: Some(height),
                scene: 0,
            };
            let out = dir.join(format!("{res}_{grid}.csv"));
            self.run_one(config, Duration::from_secs(10), &out)?;
        }
        Ok(())
    }

    fn run_one(&self, config: RunConfig, duration: Duration, out: &Path) -> Result<()> {
        if out.exists() && !self.force {
            info!(path = %out.display(), "result exists; skipping (use force to re-run)");
            return Ok(());
        }
        info!(
            scene = config.scene,
            res = config.chunk_resolution,
            grid = config.grid_size,
            "running configuration"
        );
        let mut recorder = RunRecorder::new(&self.program, &self.working_dir, config)
            .duration(duration)
            .cancel_flag(self.cancel.clone());
        match recorder.execute(out) {
            Ok(_) => Ok(()),
            Err(err @ Error::ChunkGeneration { .. }) => {
                // Aborted run, nothing written; the rest of the suite can
                // still proceed and the operator re-invokes for this one.
                error!(%err, "configuration aborted");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

/// Produce the charts for one suite's finished results.
///
/// # Errors
/// Propagates IO errors from result discovery or the renderer.
pub fn graph(
    suite: Suite,
    results_root: &Path,
    figures_root: &Path,
    warmup_seconds: f64,
    renderer: &dyn Renderer,
) -> Result<()> {
    match suite {
        Suite::StaticLocations => graph_static_locations(
            &results_root.join("exp1_results"),
            &figures_root.join("exp1_figures"),
            warmup_seconds,
            renderer,
        ),
        Suite::CameraPaths => graph_time_series(
            &results_root.join("exp2_results"),
            &figures_root.join("exp2_figures"),
            renderer,
        ),
        Suite::Movement => graph_time_series(
            &results_root.join("exp3_results"),
            &figures_root.join("exp3_figures"),
            renderer,
        ),
        Suite::Comparison => graph_comparison(
            &results_root.join("compare_results"),
            &results_root.join("results_baseline"),
            &figures_root.join("compare_figures"),
            warmup_seconds,
            renderer,
        ),
    }
}

/// Static-comparison charts: steady-state averages against total scene
/// resolution, one chart triple (memory, steps, mspf) per location.
pub fn graph_static_locations(
    results_dir: &Path,
    figures_dir: &Path,
    warmup_seconds: f64,
    renderer: &dyn Renderer,
) -> Result<()> {
    let reducer = SteadyStateReducer::new(warmup_seconds);
    let reduced = aggregate::load_reduced(results_dir, &reducer)?;
    for (tag, results) in group_reduced_by_tag(reduced) {
        let name = display_tag(&tag);
        let charts = [
            (
                SeriesMetric::TotalMemory,
                format!("Average GPU Memory Consumption for {name}"),
                "Average Memory used (MB)",
                "memory",
            ),
            (
                SeriesMetric::Metric(MetricKind::RaySteps),
                format!("Average steps per ray for {name}"),
                "Average steps per ray",
                "steps",
            ),
            (
                SeriesMetric::Metric(MetricKind::FrameTimeMs),
                format!("Average milliseconds per frame for {name}"),
                "Average milliseconds per frame",
                "mspf",
            ),
        ];
        for (metric, title, y_label, stem) in charts {
            let chart = ChartSpec::new(
                title,
                "Total voxel resolution",
                y_label,
                XAxis::SceneResolution,
                artifact_path(figures_dir, &name, stem),
                resolution_series(&results, metric),
            );
            renderer.render(&chart)?;
        }
    }
    Ok(())
}

/// Time-series charts: raw rows against elapsed seconds, one chart triple
/// per path/configuration tag.
pub fn graph_time_series(
    results_dir: &Path,
    figures_dir: &Path,
    renderer: &dyn Renderer,
) -> Result<()> {
    let records = aggregate::load_records(results_dir)?;
    for (tag, records) in group_records_by_tag(records) {
        let name = display_tag(&tag);
        let charts = [
            (
                SeriesMetric::TotalMemory,
                format!("Total GPU Memory Consumption for {name}"),
                "Total GPU Memory used (MB)",
                "memory",
            ),
            (
                SeriesMetric::Metric(MetricKind::RaySteps),
                format!("Average steps per ray for {name}"),
                "Average steps per ray",
                "steps",
            ),
            (
                SeriesMetric::Metric(MetricKind::FrameTimeMs),
                format!("Average milliseconds per frame for {name}"),
                "Average milliseconds per frame",
                "mspf",
            ),
        ];
        for (metric, title, y_label, stem) in charts {
            let chart = ChartSpec::new(
                title,
                "Time in seconds",
                y_label,
                XAxis::ElapsedSeconds,
                artifact_path(figures_dir, &name, stem),
                time_series(&records, metric),
            );
            renderer.render(&chart)?;
        }
    }
    Ok(())
}

/// Ours-vs-baseline comparison charts keyed by total scene resolution.
///
/// Our results reduce from record CSVs; the baseline reduces from its
/// foreign free-text logs named `<total_resolution>.txt`.
pub fn graph_comparison(
    ours_dir: &Path,
    baseline_dir: &Path,
    figures_dir: &Path,
    warmup_seconds: f64,
    renderer: &dyn Renderer,
) -> Result<()> {
    let reducer = SteadyStateReducer::new(warmup_seconds);

    let mut memory = AggregatedSeries::new();
    let mut mspf = AggregatedSeries::new();

    for result in aggregate::load_reduced(ours_dir, &reducer)? {
        let x = result.key.total_resolution();
        if let Some(total) = [
            MetricKind::FarValuesMemoryMb,
            MetricKind::OctreeMemoryMb,
            MetricKind::StagingMemoryMb,
            MetricKind::GridMemoryMb,
        ]
        .iter()
        .try_fold(0.0, |acc, kind| {
            result.averages.get(kind).map(|v| acc + v)
        }) {
            memory
                .entry("ours".to_string())
                .or_default()
                .push(SeriesPoint { x, y: total });
        }
        if let Some(value) = result.averages.get(&MetricKind::FrameTimeMs) {
            mspf.entry("ours".to_string())
                .or_default()
                .push(SeriesPoint { x, y: *value });
        }
    }

    for (resolution, path) in discover_baseline_logs(baseline_dir)? {
        let averages = reduce_foreign_log(&path)?;
        let x = f64::from(resolution);
        memory
            .entry("Arbore et al.".to_string())
            .or_default()
            .push(SeriesPoint {
                x,
                y: averages.total_memory_mb,
            });
        mspf.entry("Arbore et al.".to_string())
            .or_default()
            .push(SeriesPoint {
                x,
                y: averages.mspf,
            });
    }

    renderer.render(&ChartSpec::new(
        "Average GPU Memory Consumption comparison",
        "Total voxel resolution",
        "Average Memory used (MB)",
        XAxis::SceneResolution,
        figures_dir.join("memory.json"),
        memory,
    ))?;
    renderer.render(&ChartSpec::new(
        "Average milliseconds per frame comparison",
        "Total voxel resolution",
        "Average milliseconds per frame",
        XAxis::SceneResolution,
        figures_dir.join("mspf.json"),
        mspf,
    ))?;
    Ok(())
}

/// Baseline logs are named `<total_resolution>.txt`.
fn discover_baseline_logs(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let pattern = Regex::new(r"^(\d+)\.txt$").unwrap();
    let mut found = Vec::new();
    if !dir.exists() {
        return Ok(found);
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(caps) = pattern.captures(name) {
            if let Ok(resolution) = caps[1].parse::<u32>() {
                found.push((resolution, path));
            }
        }
    }
    found.sort_by_key(|(resolution, _)| *resolution);
    Ok(found)
}

/// Human-readable name for a filename tag: `location_1` reads as
/// `Location 1`, `path_flying` as `Flying configuration`.
fn display_tag(tag: &str) -> String {
    match tag.split_once('_') {
        Some(("location", n)) => format!("Location {n}"),
        Some(("path", "flying")) => "Flying configuration".to_string(),
        Some(("path", "walking")) => "Walking configuration".to_string(),
        Some(("path", n)) => format!("Path {n}"),
        _ if tag.is_empty() => "comparison".to_string(),
        _ => tag.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_tags() {
        assert_eq!(display_tag("location_1"), "Location 1");
        assert_eq!(display_tag("path_2"), "Path 2");
        assert_eq!(display_tag("path_flying"), "Flying configuration");
        assert_eq!(display_tag("path_walking"), "Walking configuration");
        assert_eq!(display_tag(""), "comparison");
    }

    #[test]
    fn test_static_configurations_sweep_both_resolutions() {
        assert!(STATIC_CONFIGURATIONS.iter().any(|c| c.0 == 512));
        assert!(STATIC_CONFIGURATIONS.iter().any(|c| c.0 == 1024));
        // Grid height is fixed across the static sweep.
        assert!(STATIC_CONFIGURATIONS.iter().all(|c| c.2 == 5));
    }
}
