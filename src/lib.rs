//! Stereo depth batch runner.
//!
//! Pairs frames from two camera streams by the timestamp prefix of their
//! filenames and runs a multi-view depth model on each pair, exporting one
//! `pair_<timestamp>` directory per pair.
//!
//! # Module Structure
//!
//! - `pairs`: timestamp matching across the two stream directories
//! - `pipeline`: batch run, directory checks, per-pair processing
//! - `depth`: model seam (`DepthBackend`, `ModelLoader`) and shipped backends
//! - `export`: npz / ply / glb writers
//! - `config`: file + environment configuration

pub mod config;
pub mod depth;
pub mod export;
pub mod pairs;
pub mod pipeline;

pub use config::PipelineConfig;
pub use depth::{
    BackendLoader, DepthBackend, DepthMap, Device, InferenceRequest, ModelLoader, ModelSpec,
    Prediction, StubBackend,
};
pub use export::{export_prediction, ExportFormat};
pub use pairs::{find_stereo_pairs, timestamp_from_filename, StereoPair};
pub use pipeline::{
    list_pairs, process_pairs, run, PairProgress, RunOptions, RunSummary, SilentProgress,
};
