use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

use crate::depth::backend::{DepthBackend, ModelLoader, ModelSpec};
use crate::depth::backends::StubBackend;

/// Model file looked up inside a model directory.
pub const MODEL_FILE_NAME: &str = "model.onnx";
const STUB_SCHEME: &str = "stub://";

/// Default loader: `stub://` ids build the synthetic backend, anything else
/// is resolved to a local ONNX file and run with tract.
///
/// Model ids are never fetched from the network. A hub-style id such as
/// `depth-anything/DA3NESTED-GIANT-LARGE-1.1` is looked up below `model_root`.
#[derive(Clone, Debug)]
pub struct BackendLoader {
    model_root: PathBuf,
    input_width: u32,
    input_height: u32,
}

impl BackendLoader {
    pub fn new(model_root: impl Into<PathBuf>, input_width: u32, input_height: u32) -> Self {
        Self {
            model_root: model_root.into(),
            input_width,
            input_height,
        }
    }

    /// Resolve a model id to an ONNX file on disk.
    pub fn resolve_model_path(&self, model_id: &str) -> Result<PathBuf> {
        let candidates = [PathBuf::from(model_id), self.model_root.join(model_id)];
        for candidate in &candidates {
            if candidate.is_file() {
                return Ok(candidate.clone());
            }
            let nested = candidate.join(MODEL_FILE_NAME);
            if candidate.is_dir() && nested.is_file() {
                return Ok(nested);
            }
        }
        Err(anyhow!(
            "model '{}' not found (looked for {} and {} under {})",
            model_id,
            model_id,
            MODEL_FILE_NAME,
            self.model_root.display()
        ))
    }

    fn load_stub(&self, spec: &ModelSpec) -> Result<Box<dyn DepthBackend>> {
        let size = &spec.model_id[STUB_SCHEME.len()..];
        let backend = match size.split_once('x') {
            Some((w, h)) => {
                let width = w
                    .parse()
                    .map_err(|_| anyhow!("invalid stub width in '{}'", spec.model_id))?;
                let height = h
                    .parse()
                    .map_err(|_| anyhow!("invalid stub height in '{}'", spec.model_id))?;
                StubBackend::with_size(width, height)?
            }
            None => StubBackend::new(),
        };
        log::info!("loaded stub depth backend ({})", spec.model_id);
        Ok(Box::new(backend))
    }

    #[cfg(feature = "backend-tract")]
    fn load_onnx(&self, spec: &ModelSpec, path: &Path) -> Result<Box<dyn DepthBackend>> {
        let backend = crate::depth::backends::TractBackend::load(
            path,
            spec.device,
            self.input_width,
            self.input_height,
        )?;
        log::info!(
            "loaded ONNX depth model {} ({}x{} input)",
            path.display(),
            self.input_width,
            self.input_height
        );
        Ok(Box::new(backend))
    }

    #[cfg(not(feature = "backend-tract"))]
    fn load_onnx(&self, _spec: &ModelSpec, path: &Path) -> Result<Box<dyn DepthBackend>> {
        Err(anyhow!(
            "loading {} requires the backend-tract feature",
            path.display()
        ))
    }
}

impl ModelLoader for BackendLoader {
    fn load(&self, spec: &ModelSpec) -> Result<Box<dyn DepthBackend>> {
        if spec.model_id.starts_with(STUB_SCHEME) {
            return self.load_stub(spec);
        }
        let path = self.resolve_model_path(&spec.model_id)?;
        log::debug!(
            "loading {} on {} with {}x{} input",
            path.display(),
            spec.device,
            self.input_width,
            self.input_height
        );
        self.load_onnx(spec, &path)
    }
}
