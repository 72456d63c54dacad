//! # voxel-bench: benchmark driver and telemetry aggregation
//!
//! voxel-bench drives the external voxel-renderer benchmark binary through
//! parameterized runs, ingests its live unstructured log output,
//! reconstructs aligned time-series of performance and memory metrics, and
//! aggregates many runs into comparable series for charting.
//!
//! ## Pipeline
//!
//! ```text
//! RunRecorder ──(one CSV per run)──> SteadyStateReducer ──> aggregate ──> chart
//!      │
//!      └─ LineClassifier + TimeAligner merge per-line metrics into rows
//! ```
//!
//! The benchmark binary, the plotting backend, and the on-disk CSV layout
//! are external collaborators: this crate drives the first, feeds the
//! second, and treats the third as an opaque sequential record store.
//!
//! ## Example
//!
//! ```rust
//! use voxel_bench::classify::{LineClassifier, LineEvent};
//!
//! let classifier = LineClassifier::new();
//! let events = classifier.classify("[00:00:01.000] FPS: 60.0, msPf: 16.6");
//! assert!(matches!(events[0], LineEvent::FrameTiming { .. }));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod aggregate;
pub mod align;
pub mod chart;
pub mod classify;
pub mod error;
pub mod record;
pub mod recorder;
pub mod reduce;
pub mod suite;

pub use error::{Error, Result};
