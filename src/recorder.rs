//! Run recorder
//!
//! Owns one live benchmark run end-to-end: the synchronous chunk
//! precompute pass, the streaming pass that feeds combined stdout/stderr
//! through the classifier and aligner line by line, and finalization that
//! derives the grid memory column and persists the record file.
//!
//! One recorder instance per run, no shared state between runs: each owns
//! its own process handle, epoch anchor, and output path, so multiple
//! configurations can only interleave by running recorders sequentially
//! (or fully independent instances).

use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::align::{TimeAligner, TimeKey};
use crate::classify::{LineClassifier, LineEvent, RunScalar};
use crate::record::{MetricKind, Row, RunConfig, RunRecord};
use crate::{Error, Result};

/// Bytes the GPU stores per uniform-grid position.
pub const GRID_CELL_BYTES: f64 = 8.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Lifecycle of one recorded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Recorder constructed, nothing executed yet.
    NotStarted,
    /// Precompute pass running.
    ChunkGenerating,
    /// Live pass running; output is being consumed.
    Streaming,
    /// Output closed; deriving fields and writing the record file.
    Finalizing,
    /// Record file written.
    Done,
    /// Aborted before any record could be written.
    Failed,
}

/// Cooperative cancellation flag, shared between a recorder and whatever
/// wants to interrupt it (typically a SIGINT handler).
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an untripped flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the flag. The recorder notices at the next line boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether the flag has been tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Records one benchmark run under one configuration.
pub struct RunRecorder {
    program: PathBuf,
    working_dir: PathBuf,
    config: RunConfig,
    duration: Duration,
    grace: Duration,
    cancel: CancelFlag,
    classifier: LineClassifier,
    aligner: TimeAligner,
    rows: BTreeMap<TimeKey, Row>,
    grid_height: Option<u32>,
    grid_size: Option<u32>,
    state: RunState,
}

impl RunRecorder {
    /// Create a recorder for one configuration.
    ///
    /// Defaults: 65 s streaming budget, 5 s termination grace period.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>, config: RunConfig) -> Self {
        Self {
            program: program.into(),
            working_dir: working_dir.into(),
            config,
            duration: Duration::from_secs(65),
            grace: Duration::from_secs(5),
            cancel: CancelFlag::new(),
            classifier: LineClassifier::new(),
            aligner: TimeAligner::new(),
            rows: BTreeMap::new(),
            grid_height: None,
            grid_size: None,
            state: RunState::NotStarted,
        }
    }

    /// Set the streaming wall-clock budget.
    #[must_use]
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Set the grace period between terminate and kill.
    #[must_use]
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Attach a cancellation flag.
    #[must_use]
    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> RunState {
        self.state
    }

    /// Drive the whole run and write the record file to `output`.
    ///
    /// The record writer runs whenever streaming started, including on
    /// cancellation — an interrupted run still persists the rows it
    /// collected, then reports [`Error::Interrupted`].
    ///
    /// # Errors
    /// [`Error::ChunkGeneration`] if the precompute pass exits non-zero
    /// (nothing is written), [`Error::Spawn`] if the binary cannot be
    /// started, [`Error::Interrupted`] after a cancelled-but-finalized run,
    /// or an IO error from the record writer.
    pub fn execute(&mut self, output: &Path) -> Result<RunRecord> {
        info!(
            scene = self.config.scene,
            res = self.config.chunk_resolution,
            grid = self.config.grid_size,
            "starting run"
        );

        self.state = RunState::ChunkGenerating;
        if let Err(err) = self.generate_chunks() {
            self.state = RunState::Failed;
            return Err(err);
        }

        self.state = RunState::Streaming;
        let interrupted = match self.stream() {
            Ok(interrupted) => interrupted,
            Err(err) => {
                self.state = RunState::Failed;
                return Err(err);
            }
        };

        self.state = RunState::Finalizing;
        self.derive_grid_memory();
        let record = RunRecord::new(self.config, std::mem::take(&mut self.rows));
        record.write_csv(output)?;
        info!(rows = record.rows().len(), path = %output.display(), "record written");

        self.state = RunState::Done;
        if interrupted {
            return Err(Error::Interrupted);
        }
        Ok(record)
    }

    /// Synchronous precompute pass; exit code 0 required.
    fn generate_chunks(&self) -> Result<()> {
        debug!("generating chunks");
        let status = Command::new(&self.program)
            .arg("--chunkgen")
            .args(self.config.to_args())
            .current_dir(&self.working_dir)
            .status()
            .map_err(|source| Error::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(Error::ChunkGeneration {
                code: status.code(),
            });
        }
        Ok(())
    }

    /// Live pass: consume combined stdout/stderr line by line until the
    /// process closes its output, the budget elapses, or cancellation.
    /// Returns whether the run was cancelled.
    fn stream(&mut self) -> Result<bool> {
        let (reader, writer) = io::pipe()?;
        let stderr_writer = writer.try_clone()?;

        let mut command = Command::new(&self.program);
        command
            .args(self.config.to_args())
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer);
        let mut child = command.spawn().map_err(|source| Error::Spawn {
            program: self.program.clone(),
            source,
        })?;
        // The command object still holds the parent's copies of the pipe
        // write end; drop it so EOF arrives when the child exits.
        drop(command);

        let started = Instant::now();
        let mut interrupted = false;
        let mut over_budget = false;

        for line in BufReader::new(reader).lines() {
            let Ok(line) = line else { break };
            self.ingest(line.trim());

            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            if started.elapsed() > self.duration {
                over_budget = true;
                break;
            }
        }

        if interrupted || over_budget {
            self.shutdown(&mut child);
        } else {
            let _ = child.wait();
        }
        Ok(interrupted)
    }

    /// Merge every event a line carries into the row map.
    fn ingest(&mut self, line: &str) {
        for event in self.classifier.classify(line) {
            match event {
                LineEvent::FrameTiming {
                    timestamp,
                    fps,
                    mspf,
                } => {
                    let key = self.aligner.align(timestamp);
                    let row = self.rows.entry(key).or_default();
                    row.set(MetricKind::Fps, fps);
                    row.set(MetricKind::FrameTimeMs, mspf);
                }
                LineEvent::RaySteps { timestamp, steps } => {
                    let key = self.aligner.align(timestamp);
                    self.rows
                        .entry(key)
                        .or_default()
                        .set(MetricKind::RaySteps, steps);
                }
                LineEvent::MemoryUsage {
                    timestamp,
                    buffer,
                    megabytes,
                } => {
                    let key = self.aligner.align(timestamp);
                    self.rows
                        .entry(key)
                        .or_default()
                        .set(buffer.metric_kind(), megabytes);
                }
                LineEvent::Scalar(RunScalar::GridHeight(height)) => {
                    self.grid_height = Some(height);
                }
                LineEvent::Scalar(RunScalar::GridSize(size)) => {
                    self.grid_size = Some(size);
                }
                // Baseline-only line forms; never produced by live runs.
                LineEvent::ForeignFps(_) | LineEvent::ForeignBytes(_) => {}
            }
        }
    }

    /// Grid memory is a run-level derivation, not a streamed metric: the
    /// last observed grid scalars apply to every row. When the scalars
    /// never appeared the column stays blank (unknown, not zero).
    fn derive_grid_memory(&mut self) {
        let (Some(height), Some(size)) = (self.grid_height, self.grid_size) else {
            if !self.rows.is_empty() {
                warn!("grid scalars never observed; grid_memory left blank");
            }
            return;
        };
        let megabytes =
            f64::from(height) * f64::from(size) * f64::from(size) * GRID_CELL_BYTES / BYTES_PER_MB;
        for row in self.rows.values_mut() {
            row.set(MetricKind::GridMemoryMb, megabytes);
        }
    }

    /// Ask the child to terminate; escalate to kill after the grace
    /// period. Never blocks indefinitely.
    fn shutdown(&self, child: &mut Child) {
        request_terminate(child);
        let deadline = Instant::now() + self.grace;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(?status, "benchmark exited after terminate");
                    return;
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        break;
                    }
                    thread::sleep(Duration::from_millis(100));
                }
                Err(_) => break,
            }
        }
        warn!("grace period elapsed; killing benchmark process");
        let _ = child.kill();
        let _ = child.wait();
    }
}

#[cfg(unix)]
fn request_terminate(child: &mut Child) {
    // SAFETY: signalling a child pid this process owns and has not reaped.
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn request_terminate(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_starts_not_started() {
        let config = RunConfig {
            chunk_resolution: 512,
            grid_size: 1,
            grid_height: Some(5),
            scene: 0,
        };
        let recorder = RunRecorder::new("/bin/true", ".", config);
        assert_eq!(recorder.state(), RunState::NotStarted);
    }

    #[test]
    fn test_cancel_flag_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_ingest_merges_interleaved_metrics_on_one_key() {
        let config = RunConfig {
            chunk_resolution: 512,
            grid_size: 1,
            grid_height: Some(5),
            scene: 0,
        };
        let mut recorder = RunRecorder::new("unused", ".", config);
        recorder.ingest("[00:00:01.000] FPS: 60.0, msPf: 16.6");
        recorder.ingest("[00:00:01.000] Octree Nodes Buffer Memory used: 50.0 MB");
        assert_eq!(recorder.rows.len(), 1);
        let row = recorder.rows.values().next().unwrap();
        assert_eq!(row.get(MetricKind::Fps), Some(60.0));
        assert_eq!(row.get(MetricKind::OctreeMemoryMb), Some(50.0));
    }

    #[test]
    fn test_grid_memory_derivation() {
        let config = RunConfig {
            chunk_resolution: 512,
            grid_size: 3,
            grid_height: Some(5),
            scene: 0,
        };
        let mut recorder = RunRecorder::new("unused", ".", config);
        recorder.ingest("[00:00:01.000] FPS: 60.0, msPf: 16.6");
        recorder.ingest("Grid height: 5");
        recorder.ingest("Grid size: 3");
        recorder.derive_grid_memory();
        let row = recorder.rows.values().next().unwrap();
        let expected = 5.0 * 9.0 * 8.0 / (1024.0 * 1024.0);
        let got = row.get(MetricKind::GridMemoryMb).unwrap();
        assert!((got - expected).abs() < 1e-12);
    }

    #[test]
    fn test_grid_memory_blank_without_scalars() {
        let config = RunConfig {
            chunk_resolution: 512,
            grid_size: 3,
            grid_height: None,
            scene: 0,
        };
        let mut recorder = RunRecorder::new("unused", ".", config);
        recorder.ingest("[00:00:01.000] FPS: 60.0, msPf: 16.6");
        recorder.derive_grid_memory();
        let row = recorder.rows.values().next().unwrap();
        assert_eq!(row.get(MetricKind::GridMemoryMb), None);
    }
}
