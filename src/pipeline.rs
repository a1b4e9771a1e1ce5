//! Stereo pair processing.
//!
//! `run` is the whole batch: check both stream directories, match pairs,
//! load the model once and run it on every pair in timestamp order. The
//! first failing pair aborts the batch.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::{PipelineConfig, StreamSettings};
use crate::depth::{DepthBackend, InferenceRequest, ModelLoader, ModelSpec};
use crate::export::ExportFormat;
use crate::pairs::{find_stereo_pairs_with_suffix, StereoPair};

/// Progress hooks for a batch run. Every method defaults to a no-op.
pub trait PairProgress {
    /// Pair matching finished with `count` pairs.
    fn pairs_found(&mut self, _count: usize) {}
    /// The model is loaded and `total` pairs are about to run.
    fn begin(&mut self, _total: usize) {}
    fn pair_done(&mut self, _pair: &StereoPair) {}
    fn finish(&mut self) {}
}

/// Progress sink that reports nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentProgress;

impl PairProgress for SilentProgress {}

/// Inputs of one batch run.
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub data_dir: PathBuf,
    /// Defaults to `<data_dir>/<output_subdir>` when unset.
    pub output_dir: Option<PathBuf>,
    pub output_subdir: String,
    pub streams: StreamSettings,
    pub model: ModelSpec,
    pub export_format: ExportFormat,
}

impl RunOptions {
    pub fn from_config(data_dir: impl Into<PathBuf>, cfg: &PipelineConfig) -> Self {
        Self {
            data_dir: data_dir.into(),
            output_dir: None,
            output_subdir: cfg.output_subdir.clone(),
            streams: cfg.streams.clone(),
            model: ModelSpec {
                model_id: cfg.model.id.clone(),
                device: cfg.model.device,
            },
            export_format: cfg.export_format,
        }
    }

    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join(&self.output_subdir))
    }
}

/// Outcome of a completed batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub pairs_found: usize,
    pub pairs_processed: usize,
    pub output_dir: PathBuf,
}

/// Resolve both stream directories, failing with `NotFound` if either is
/// missing or is not a directory.
pub fn resolve_stream_dirs(data_dir: &Path, streams: &StreamSettings) -> Result<(PathBuf, PathBuf)> {
    let left = data_dir.join(&streams.left);
    let right = data_dir.join(&streams.right);
    for (label, dir) in [("Stream 1", &left), ("Stream 2", &right)] {
        if !dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} directory not found: {}", label, dir.display()),
            )
            .into());
        }
    }
    Ok((left, right))
}

/// Match pairs without loading a model.
pub fn list_pairs(options: &RunOptions) -> Result<Vec<StereoPair>> {
    let (left, right) = resolve_stream_dirs(&options.data_dir, &options.streams)?;
    find_stereo_pairs_with_suffix(&left, &right, &options.streams.image_suffix)
}

/// Run the full batch.
pub fn run(
    options: &RunOptions,
    loader: &dyn ModelLoader,
    progress: &mut dyn PairProgress,
) -> Result<RunSummary> {
    let pairs = list_pairs(options)?;
    log::info!(
        "found {} stereo pairs in {}",
        pairs.len(),
        options.data_dir.display()
    );
    progress.pairs_found(pairs.len());

    let output_dir = options.resolved_output_dir();
    if pairs.is_empty() {
        return Ok(RunSummary {
            pairs_found: 0,
            pairs_processed: 0,
            output_dir,
        });
    }

    log::info!(
        "loading model {} on {}",
        options.model.model_id,
        options.model.device
    );
    let mut backend = loader
        .load(&options.model)
        .with_context(|| format!("failed to load model {}", options.model.model_id))?;

    let processed = process_pairs(
        &pairs,
        &output_dir,
        backend.as_mut(),
        options.export_format,
        progress,
    )?;
    Ok(RunSummary {
        pairs_found: pairs.len(),
        pairs_processed: processed,
        output_dir,
    })
}

/// Run `backend` on each pair in order, exporting into `output_dir/pair_<timestamp>`.
///
/// Stops at the first failure.
pub fn process_pairs(
    pairs: &[StereoPair],
    output_dir: &Path,
    backend: &mut dyn DepthBackend,
    export_format: ExportFormat,
    progress: &mut dyn PairProgress,
) -> Result<usize> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;

    progress.begin(pairs.len());
    for pair in pairs {
        let export_dir = output_dir.join(pair.output_dir_name());
        let images = pair.images();
        let request = InferenceRequest {
            images: &images,
            export_dir: &export_dir,
            export_format,
        };
        backend
            .inference(&request)
            .with_context(|| format!("inference failed for {}", pair.output_dir_name()))?;
        log::debug!("{} -> {}", pair.timestamp, export_dir.display());
        progress.pair_done(pair);
    }
    progress.finish();
    log::info!(
        "processed {} pairs with {} backend into {}",
        pairs.len(),
        backend.name(),
        output_dir.display()
    );
    Ok(pairs.len())
}
