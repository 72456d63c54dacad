//! Pipeline tests: classification through alignment, record round-trip,
//! steady-state reduction, and the foreign baseline path.

use std::collections::BTreeMap;

use voxel_bench::align::{TimeAligner, TimeKey};
use voxel_bench::classify::{LineClassifier, LineEvent};
use voxel_bench::record::{self, MetricKind, Row, RunConfig, RunRecord};
use voxel_bench::reduce::{averages_or_zero, reduce_foreign_log, SteadyStateReducer};

fn config() -> RunConfig {
    RunConfig {
        chunk_resolution: 512,
        grid_size: 5,
        grid_height: Some(5),
        scene: 0,
    }
}

/// Feed native log lines through classifier + aligner into rows, the way
/// the recorder does while streaming.
fn ingest_lines(lines: &[&str]) -> BTreeMap<TimeKey, Row> {
    let classifier = LineClassifier::new();
    let mut aligner = TimeAligner::new();
    let mut rows: BTreeMap<TimeKey, Row> = BTreeMap::new();

    for line in lines {
        for event in classifier.classify(line) {
            match event {
                LineEvent::FrameTiming {
                    timestamp,
                    fps,
                    mspf,
                } => {
                    let row = rows.entry(aligner.align(timestamp)).or_default();
                    row.set(MetricKind::Fps, fps);
                    row.set(MetricKind::FrameTimeMs, mspf);
                }
                LineEvent::RaySteps { timestamp, steps } => {
                    rows.entry(aligner.align(timestamp))
                        .or_default()
                        .set(MetricKind::RaySteps, steps);
                }
                LineEvent::MemoryUsage {
                    timestamp,
                    buffer,
                    megabytes,
                } => {
                    rows.entry(aligner.align(timestamp))
                        .or_default()
                        .set(buffer.metric_kind(), megabytes);
                }
                _ => {}
            }
        }
    }
    rows
}

// =============================================================================
// Classification + alignment
// =============================================================================

#[test]
fn test_interleaved_metrics_merge_under_one_key() {
    let rows = ingest_lines(&[
        "[00:00:01.000] FPS: 60.0, msPf: 16.6",
        "[00:00:01.000] Octree Nodes Buffer Memory used: 50.0 MB",
    ]);
    assert_eq!(rows.len(), 1);
    let row = rows.values().next().unwrap();
    assert_eq!(row.get(MetricKind::Fps), Some(60.0));
    assert_eq!(row.get(MetricKind::FrameTimeMs), Some(16.6));
    assert_eq!(row.get(MetricKind::OctreeMemoryMb), Some(50.0));
}

#[test]
fn test_unrecognized_lines_contribute_nothing() {
    let rows = ingest_lines(&[
        "initializing renderer",
        "[00:00:01.000] swapchain ready",
        "[00:00:01.000] FPS: 60.0, msPf: 16.6",
        "shutting down",
    ]);
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_epoch_is_first_timestamp_not_smallest() {
    let rows = ingest_lines(&[
        "[00:00:05.000] FPS: 60.0, msPf: 16.6",
        "[00:00:06.500] FPS: 30.0, msPf: 33.3",
    ]);
    let keys: Vec<TimeKey> = rows.keys().copied().collect();
    assert_eq!(
        keys,
        vec![TimeKey::from_seconds(0.0), TimeKey::from_seconds(1.5)]
    );
}

// =============================================================================
// End-to-end reduction scenario
// =============================================================================

#[test]
fn test_three_line_log_reduces_to_expected_averages() {
    let rows = ingest_lines(&[
        "[00:00:01.000] FPS: 60, msPf: 16.6",
        "[00:00:01.000] Octree Nodes Buffer Memory used: 50.0 MB",
        "[00:00:02.000] FPS: 30, msPf: 33.3",
    ]);
    let averages = SteadyStateReducer::new(0.0).reduce_rows(&rows);

    assert!((averages[&MetricKind::Fps] - 45.0).abs() < 1e-9);
    assert!((averages[&MetricKind::FrameTimeMs] - 24.95).abs() < 1e-9);
    // Octree memory is present in one row only; its average covers just
    // that row.
    assert!((averages[&MetricKind::OctreeMemoryMb] - 50.0).abs() < 1e-9);
}

#[test]
fn test_warmup_excludes_early_rows() {
    let mut rows = BTreeMap::new();
    for (sec, fps) in [(1.0, 10.0), (3.0, 20.0), (5.0, 40.0)] {
        let mut row = Row::default();
        row.set(MetricKind::Fps, fps);
        rows.insert(TimeKey::from_seconds(sec), row);
    }
    let averages = SteadyStateReducer::new(2.0).reduce_rows(&rows);
    assert!((averages[&MetricKind::Fps] - 30.0).abs() < 1e-9);
}

#[test]
fn test_missing_metric_reads_zero_through_accessor() {
    let averages = SteadyStateReducer::new(0.0).reduce_rows(&BTreeMap::new());
    assert_eq!(averages_or_zero(&averages, MetricKind::GridMemoryMb), 0.0);
}

// =============================================================================
// Record file round-trip
// =============================================================================

#[test]
fn test_sparse_round_trip_preserves_populated_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("location_1_512_5.csv");

    let mut rows = BTreeMap::new();
    let mut first = Row::default();
    first.set(MetricKind::Fps, 60.0);
    first.set(MetricKind::FrameTimeMs, 16.6);
    rows.insert(TimeKey::from_seconds(0.0), first);
    let mut second = Row::default();
    second.set(MetricKind::OctreeMemoryMb, 42.5);
    rows.insert(TimeKey::from_seconds(1.5), second);

    RunRecord::new(config(), rows.clone()).write_csv(&path).unwrap();
    let read_back = record::read_rows(&path).unwrap();

    assert_eq!(read_back, rows);
    // Absent fields read back as absent, never zero.
    let second = &read_back[&TimeKey::from_seconds(1.5)];
    assert_eq!(second.get(MetricKind::Fps), None);
}

#[test]
fn test_read_tolerates_unknown_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("511_1.csv");
    std::fs::write(
        &path,
        "elapsed_seconds,fps,frame_id\n0.0,60,1\n1.0,30,2\n",
    )
    .unwrap();

    let rows = record::read_rows(&path).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows[&TimeKey::from_seconds(0.0)].get(MetricKind::Fps),
        Some(60.0)
    );
}

#[test]
fn test_read_rejects_header_without_elapsed_seconds() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("512_1.csv");
    std::fs::write(&path, "fps,mspf\n60,16.6\n").unwrap();
    assert!(record::read_rows(&path).is_err());
}

#[test]
fn test_rows_with_unparsable_elapsed_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("512_1.csv");
    std::fs::write(
        &path,
        "elapsed_seconds,fps\nnot-a-number,60\n2.0,30\n",
    )
    .unwrap();
    let rows = record::read_rows(&path).unwrap();
    assert_eq!(rows.len(), 1);
}

// =============================================================================
// Foreign baseline path
// =============================================================================

#[test]
fn test_foreign_log_reduces_per_sample_reciprocals() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("2048.txt");
    std::fs::write(
        &path,
        "INFO: 100 FPS\nINFO: 50 FPS\nheap 2097152 BYTES\nheap 4194304 BYTES\n",
    )
    .unwrap();

    let averages = reduce_foreign_log(&path).unwrap();
    // mean(1000/100, 1000/50) = mean(10, 20) = 15, not 1000/mean(100, 50).
    assert!((averages.mspf - 15.0).abs() < 1e-9);
    assert!((averages.total_memory_mb - 3.0).abs() < 1e-9);
}

#[test]
fn test_foreign_log_without_matches_reduces_to_zeros() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("512.txt");
    std::fs::write(&path, "nothing recognizable here\n").unwrap();
    let averages = reduce_foreign_log(&path).unwrap();
    assert_eq!(averages.mspf, 0.0);
    assert_eq!(averages.total_memory_mb, 0.0);
}
