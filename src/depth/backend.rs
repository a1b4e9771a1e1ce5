use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::depth::prediction::Prediction;
use crate::export::{export_prediction, ExportFormat};

/// Compute device requested for inference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Device {
    Cpu,
    #[default]
    Cuda,
    CudaIndex(u32),
    Mps,
}

impl Device {
    pub fn is_cpu(self) -> bool {
        matches!(self, Device::Cpu)
    }
}

impl FromStr for Device {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let value = value.trim().to_ascii_lowercase();
        match value.as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda),
            "mps" => Ok(Device::Mps),
            other => match other.strip_prefix("cuda:") {
                Some(index) => index
                    .parse()
                    .map(Device::CudaIndex)
                    .map_err(|_| anyhow!("invalid cuda device index in '{}'", other)),
                None => Err(anyhow!(
                    "unknown device '{}' (expected cpu, cuda, cuda:<index> or mps)",
                    other
                )),
            },
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda => f.write_str("cuda"),
            Device::CudaIndex(index) => write!(f, "cuda:{}", index),
            Device::Mps => f.write_str("mps"),
        }
    }
}

/// Identifies the model to load and where to run it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelSpec {
    pub model_id: String,
    pub device: Device,
}

/// One multi-view inference call plus where to export its result.
#[derive(Clone, Copy, Debug)]
pub struct InferenceRequest<'a> {
    pub images: &'a [PathBuf],
    pub export_dir: &'a Path,
    pub export_format: ExportFormat,
}

/// Depth model backend.
///
/// A backend is loaded once and then called sequentially, one forward pass
/// per image group. Implementations only need `predict`; `inference` adds
/// validation and export on top.
pub trait DepthBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run the model on a group of views, returning one depth map, extrinsic
    /// and intrinsic matrix per view in input order.
    fn predict(&mut self, images: &[PathBuf]) -> Result<Prediction>;

    /// Predict and persist the result under `request.export_dir`.
    fn inference(&mut self, request: &InferenceRequest<'_>) -> Result<Prediction> {
        let prediction = self.predict(request.images)?;
        prediction
            .validate(request.images.len())
            .with_context(|| format!("{} backend returned a malformed prediction", self.name()))?;
        export_prediction(&prediction, request.export_dir, request.export_format)?;
        Ok(prediction)
    }
}

/// Builds a backend from a model specification.
pub trait ModelLoader {
    fn load(&self, spec: &ModelSpec) -> Result<Box<dyn DepthBackend>>;
}
