use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};

use crate::depth::backend::DepthBackend;
use crate::depth::prediction::{
    default_intrinsics, DepthMap, Prediction, IDENTITY_EXTRINSICS,
};

const DEFAULT_SIZE: u32 = 8;
/// Translation of each successive view along x, in the same units as depth.
const STUB_BASELINE: f32 = 0.12;

/// Stub backend for testing. Derives a deterministic depth map from a hash of
/// each image file; images are never decoded.
pub struct StubBackend {
    width: u32,
    height: u32,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            width: DEFAULT_SIZE,
            height: DEFAULT_SIZE,
        }
    }

    pub fn with_size(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("stub depth size must be non-zero"));
        }
        if width.checked_mul(height).is_none() {
            return Err(anyhow!(
                "stub depth size {}x{} overflows the pixel count",
                width,
                height
            ));
        }
        Ok(Self { width, height })
    }

    fn depth_for(&self, digest: &[u8; 32]) -> Result<DepthMap> {
        // Near plane in [1, 2) picked by the digest; depth grows down the rows.
        let near = 1.0 + digest[0] as f32 / 256.0;
        let mut values = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let jitter = digest[((x + y) % 32) as usize] as f32 / 2560.0;
                values.push(near + y as f32 * 0.1 + jitter);
            }
        }
        DepthMap::new(self.width, self.height, values)
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn predict(&mut self, images: &[PathBuf]) -> Result<Prediction> {
        let mut prediction = Prediction {
            depth: Vec::with_capacity(images.len()),
            extrinsics: Vec::with_capacity(images.len()),
            intrinsics: Vec::with_capacity(images.len()),
        };
        for (view, path) in images.iter().enumerate() {
            let bytes = fs::read(path)
                .with_context(|| format!("failed to read image {}", path.display()))?;
            let digest: [u8; 32] = Sha256::digest(&bytes).into();
            prediction.depth.push(self.depth_for(&digest)?);

            let mut extrinsics = IDENTITY_EXTRINSICS;
            extrinsics[0][3] = -STUB_BASELINE * view as f32;
            prediction.extrinsics.push(extrinsics);
            prediction
                .intrinsics
                .push(default_intrinsics(self.width, self.height));
        }
        Ok(prediction)
    }
}
