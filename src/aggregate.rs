//! Configuration grouping and cross-run aggregation
//!
//! Result files are the only channel carrying configuration identity: the
//! filename embeds `(tag, chunk_resolution, grid_size)`. This module
//! parses those identities back out, fans records into comparison groups,
//! and produces the `{x, y}` series the chart boundary consumes.
//!
//! Aggregation is read-only over finalized files; nothing here mutates
//! shared state, so reducing many files is order-independent.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::warn;

use crate::align::TimeKey;
use crate::chart::{AggregatedSeries, SeriesPoint};
use crate::record::{self, MetricKind, Row};
use crate::reduce::SteadyStateReducer;
use crate::Result;

/// Configuration identity recovered from a result filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigKey {
    /// Location/path tag, e.g. `location_1` or `path_flying`; comparison
    /// results encode no tag
    pub tag: Option<String>,
    /// Per-chunk voxel resolution
    pub chunk_resolution: u32,
    /// Grid dimension in chunks
    pub grid_size: u32,
}

impl ConfigKey {
    /// Parse a result filename of the form `<tag>_<res>_<grid>.csv` or
    /// `<res>_<grid>.csv`.
    #[must_use]
    pub fn parse(file_name: &str) -> Option<Self> {
        let pattern = Regex::new(r"^(?:(.+)_)?(\d+)_(\d+)\.csv$").unwrap();
        let caps = pattern.captures(file_name)?;
        Some(Self {
            tag: caps.get(1).map(|m| m.as_str().to_string()),
            chunk_resolution: caps[2].parse().ok()?,
            grid_size: caps[3].parse().ok()?,
        })
    }

    /// Total scene resolution: `chunk_resolution * (grid_size + 1) / 2`.
    #[must_use]
    pub fn total_resolution(&self) -> f64 {
        f64::from(self.chunk_resolution) * (f64::from(self.grid_size) + 1.0) / 2.0
    }
}

/// One result file reduced to steady-state averages.
#[derive(Debug, Clone)]
pub struct ReducedResult {
    /// Identity parsed from the filename
    pub key: ConfigKey,
    /// Per-metric steady-state averages
    pub averages: HashMap<MetricKind, f64>,
}

/// One result file's raw rows, for time-series charts.
#[derive(Debug, Clone)]
pub struct LoadedRecord {
    /// Identity parsed from the filename
    pub key: ConfigKey,
    /// Rows ordered by time key
    pub rows: BTreeMap<TimeKey, Row>,
}

/// What a series plots: one metric column, or the composite memory total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesMetric {
    /// A single metric column
    Metric(MetricKind),
    /// Sum of the four memory subcomponents; a point missing any
    /// subcomponent is omitted, never defaulted to zero
    TotalMemory,
}

/// Enumerate the result CSVs in a directory, pairing each with its parsed
/// identity. Files whose names do not encode a configuration are reported
/// and skipped, not fatal.
///
/// # Errors
/// Returns an IO error if the directory cannot be read.
pub fn discover_results(dir: &Path) -> Result<Vec<(ConfigKey, PathBuf)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".csv") {
            continue;
        }
        match ConfigKey::parse(name) {
            Some(key) => found.push((key, path)),
            None => warn!(file = name, "result filename does not encode a configuration; skipped"),
        }
    }
    found.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(found)
}

/// Discover and reduce every result file in a directory.
///
/// A file that fails to reduce (unreadable, bad header) is reported and
/// its contribution skipped; remaining files still aggregate.
///
/// # Errors
/// Returns an IO error if the directory cannot be read.
pub fn load_reduced(dir: &Path, reducer: &SteadyStateReducer) -> Result<Vec<ReducedResult>> {
    let mut results = Vec::new();
    for (key, path) in discover_results(dir)? {
        match reducer.reduce(&path) {
            Ok(averages) => results.push(ReducedResult { key, averages }),
            Err(err) => warn!(path = %path.display(), %err, "skipping unreducible result"),
        }
    }
    Ok(results)
}

/// Discover and load raw rows for every result file in a directory.
///
/// # Errors
/// Returns an IO error if the directory cannot be read.
pub fn load_records(dir: &Path) -> Result<Vec<LoadedRecord>> {
    let mut records = Vec::new();
    for (key, path) in discover_results(dir)? {
        match record::read_rows(&path) {
            Ok(rows) => records.push(LoadedRecord { key, rows }),
            Err(err) => warn!(path = %path.display(), %err, "skipping unreadable record"),
        }
    }
    Ok(records)
}

/// Bucket reduced results by their tag. Untagged results land under `""`.
#[must_use]
pub fn group_reduced_by_tag(results: Vec<ReducedResult>) -> BTreeMap<String, Vec<ReducedResult>> {
    let mut groups: BTreeMap<String, Vec<ReducedResult>> = BTreeMap::new();
    for result in results {
        let tag = result.key.tag.clone().unwrap_or_default();
        groups.entry(tag).or_default().push(result);
    }
    groups
}

/// Bucket loaded records by their tag. Untagged records land under `""`.
#[must_use]
pub fn group_records_by_tag(records: Vec<LoadedRecord>) -> BTreeMap<String, Vec<LoadedRecord>> {
    let mut groups: BTreeMap<String, Vec<LoadedRecord>> = BTreeMap::new();
    for rec in records {
        let tag = rec.key.tag.clone().unwrap_or_default();
        groups.entry(tag).or_default().push(rec);
    }
    groups
}

/// Static-comparison series for one tag's reduced results: x is total
/// scene resolution, one group per chunk resolution.
#[must_use]
pub fn resolution_series(results: &[ReducedResult], metric: SeriesMetric) -> AggregatedSeries {
    let mut series = AggregatedSeries::new();
    for result in results {
        let Some(y) = reduced_value(result, metric) else {
            continue;
        };
        series
            .entry(format!("Chunk Res: {}", result.key.chunk_resolution))
            .or_default()
            .push(SeriesPoint {
                x: result.key.total_resolution(),
                y,
            });
    }
    series
}

/// Time series for one tag's loaded records: x is elapsed seconds, one
/// group per total scene resolution.
#[must_use]
pub fn time_series(records: &[LoadedRecord], metric: SeriesMetric) -> AggregatedSeries {
    let mut series = AggregatedSeries::new();
    for rec in records {
        let label = format!("Scene res: {}", rec.key.total_resolution() as i64);
        let points = series.entry(label).or_default();
        for (key, row) in &rec.rows {
            if let Some(y) = row_value(row, metric) {
                points.push(SeriesPoint {
                    x: key.seconds(),
                    y,
                });
            }
        }
    }
    series
}

fn reduced_value(result: &ReducedResult, metric: SeriesMetric) -> Option<f64> {
    match metric {
        SeriesMetric::Metric(kind) => result.averages.get(&kind).copied(),
        SeriesMetric::TotalMemory => {
            let mut total = 0.0;
            for kind in [
                MetricKind::FarValuesMemoryMb,
                MetricKind::OctreeMemoryMb,
                MetricKind::StagingMemoryMb,
                MetricKind::GridMemoryMb,
            ] {
                total += result.averages.get(&kind)?;
            }
            Some(total)
        }
    }
}

fn row_value(row: &Row, metric: SeriesMetric) -> Option<f64> {
    match metric {
        SeriesMetric::Metric(kind) => row.get(kind),
        SeriesMetric::TotalMemory => row.total_memory(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_tagged_filename() {
        let key = ConfigKey::parse("location_1_512_5.csv").unwrap();
        assert_eq!(key.tag.as_deref(), Some("location_1"));
        assert_eq!(key.chunk_resolution, 512);
        assert_eq!(key.grid_size, 5);
    }

    #[test]
    fn test_parse_path_style_tags() {
        let key = ConfigKey::parse("path_flying_1024_3.csv").unwrap();
        assert_eq!(key.tag.as_deref(), Some("path_flying"));
        assert_eq!(key.chunk_resolution, 1024);
        assert_eq!(key.grid_size, 3);
    }

    #[test]
    fn test_parse_untagged_comparison_filename() {
        let key = ConfigKey::parse("2048_3.csv").unwrap();
        assert_eq!(key.tag, None);
        assert_eq!(key.chunk_resolution, 2048);
        assert_eq!(key.grid_size, 3);
    }

    #[test]
    fn test_parse_rejects_non_matching_names() {
        assert_eq!(ConfigKey::parse("notes.txt"), None);
        assert_eq!(ConfigKey::parse("summary.csv"), None);
        assert_eq!(ConfigKey::parse("location_one_only.csv"), None);
    }

    #[test]
    fn test_total_resolution() {
        let key = ConfigKey::parse("location_2_512_5.csv").unwrap();
        assert!((key.total_resolution() - 1536.0).abs() < f64::EPSILON);
    }

    fn reduced(tag: &str, res: u32, grid: u32, pairs: &[(MetricKind, f64)]) -> ReducedResult {
        ReducedResult {
            key: ConfigKey {
                tag: Some(tag.to_string()),
                chunk_resolution: res,
                grid_size: grid,
            },
            averages: pairs.iter().copied().collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_resolution_series_groups_by_chunk_resolution() {
        let results = vec![
            reduced("location_1", 512, 1, &[(MetricKind::FrameTimeMs, 16.0)]),
            reduced("location_1", 512, 3, &[(MetricKind::FrameTimeMs, 20.0)]),
            reduced("location_1", 1024, 1, &[(MetricKind::FrameTimeMs, 30.0)]),
        ];
        let series = resolution_series(&results, SeriesMetric::Metric(MetricKind::FrameTimeMs));
        assert_eq!(series.len(), 2);
        assert_eq!(series["Chunk Res: 512"].len(), 2);
        assert_eq!(series["Chunk Res: 1024"].len(), 1);
    }

    #[test]
    fn test_composite_memory_omits_incomplete_points() {
        let complete = reduced(
            "location_1",
            512,
            1,
            &[
                (MetricKind::FarValuesMemoryMb, 1.0),
                (MetricKind::OctreeMemoryMb, 2.0),
                (MetricKind::StagingMemoryMb, 3.0),
                (MetricKind::GridMemoryMb, 4.0),
            ],
        );
        let missing_grid = reduced(
            "location_1",
            512,
            3,
            &[
                (MetricKind::FarValuesMemoryMb, 1.0),
                (MetricKind::OctreeMemoryMb, 2.0),
                (MetricKind::StagingMemoryMb, 3.0),
            ],
        );
        let series = resolution_series(&[complete, missing_grid], SeriesMetric::TotalMemory);
        let points = &series["Chunk Res: 512"];
        assert_eq!(points.len(), 1);
        assert!((points[0].y - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_time_series_x_is_elapsed_seconds() {
        let mut rows = BTreeMap::new();
        let mut row = Row::default();
        row.set(MetricKind::RaySteps, 12.0);
        rows.insert(TimeKey::from_seconds(1.5), row);
        let record = LoadedRecord {
            key: ConfigKey {
                tag: Some("path_1".to_string()),
                chunk_resolution: 1024,
                grid_size: 5,
            },
            rows,
        };
        let series = time_series(&[record], SeriesMetric::Metric(MetricKind::RaySteps));
        let points = &series["Scene res: 3072"];
        assert_eq!(points.len(), 1);
        assert!((points[0].x - 1.5).abs() < f64::EPSILON);
    }
}
