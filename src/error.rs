//! Error types for voxel-bench
//!
//! Malformed log lines are deliberately NOT errors: the benchmark's output
//! format is unspecified and the classifier ignores what it does not
//! recognize. Errors here are the conditions that abort a run or make a
//! result file unusable.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// voxel-bench error types
#[derive(Error, Debug)]
pub enum Error {
    /// Chunk precompute pass exited non-zero; the run is aborted and no
    /// record file is written.
    #[error("chunk generation failed with exit code {code:?}\nNo record was written for this configuration")]
    ChunkGeneration {
        /// Exit code of the precompute process, if one was reported
        code: Option<i32>,
    },

    /// The benchmark binary could not be spawned
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program path as invoked
        program: PathBuf,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// The run was cancelled from outside (e.g. Ctrl-C). The record file
    /// for the portion that streamed has already been written.
    #[error("run interrupted; partial record was finalized")]
    Interrupted,

    /// A record file's header or row shape is unusable
    #[error("record format error in {path}: {message}")]
    RecordFormat {
        /// Offending file
        path: PathBuf,
        /// What was wrong with it
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Chart artifact serialization error
    #[error("chart serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
