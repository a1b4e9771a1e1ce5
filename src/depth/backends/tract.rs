#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use tract_onnx::prelude::*;

use crate::depth::backend::{DepthBackend, Device};
use crate::depth::prediction::{
    default_intrinsics, DepthMap, Extrinsics, Intrinsics, Prediction, IDENTITY_EXTRINSICS,
};

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
/// Views per forward pass; the graph is specialised for stereo pairs.
const VIEWS: usize = 2;

/// Tract-based backend for ONNX depth models.
///
/// The graph takes `[2, 3, H, W]` normalized RGB and returns depth as its first
/// output. When the graph also returns camera extrinsics (`[2, 3, 4]`) and
/// intrinsics (`[2, 3, 3]`) they are used as-is; otherwise the first view is
/// the world frame and a default pinhole is assumed.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load<P: AsRef<Path>>(model_path: P, device: Device, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        if !device.is_cpu() {
            log::warn!(
                "tract backend runs on the CPU; ignoring requested device {}",
                device
            );
        }
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(VIEWS, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
        })
    }

    fn build_input(&self, images: &[PathBuf]) -> Result<Tensor> {
        let width = self.width as usize;
        let height = self.height as usize;
        let mut planes = Vec::with_capacity(images.len());
        for path in images {
            let rgb = image::open(path)
                .with_context(|| format!("failed to decode image {}", path.display()))?
                .to_rgb8();
            let resized =
                image::imageops::resize(&rgb, self.width, self.height, FilterType::Triangle);
            planes.push(resized.into_raw());
        }

        let input = tract_ndarray::Array4::from_shape_fn(
            (images.len(), 3, height, width),
            |(view, channel, y, x)| {
                let raw = planes[view][(y * width + x) * 3 + channel] as f32 / 255.0;
                (raw - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel]
            },
        );
        Ok(input.into_tensor())
    }

    fn extract_depth(&self, output: &Tensor) -> Result<Vec<DepthMap>> {
        let view = output
            .to_array_view::<f32>()
            .context("depth output tensor was not f32")?;
        let shape = view.shape();
        if shape.len() < 2 {
            return Err(anyhow!("depth output has rank {}, expected >= 2", shape.len()));
        }
        let out_h = shape[shape.len() - 2];
        let out_w = shape[shape.len() - 1];
        let plane = out_h * out_w;
        let values: Vec<f32> = view.iter().copied().collect();
        if plane == 0 || values.len() != plane * VIEWS {
            return Err(anyhow!(
                "depth output shape {:?} does not hold {} views",
                shape,
                VIEWS
            ));
        }
        values
            .chunks_exact(plane)
            .map(|chunk| DepthMap::new(out_w as u32, out_h as u32, chunk.to_vec()))
            .collect()
    }
}

fn extract_matrices<const R: usize, const C: usize>(
    output: Option<&Tensor>,
) -> Result<Option<Vec<[[f32; C]; R]>>> {
    let Some(output) = output else {
        return Ok(None);
    };
    let values: Vec<f32> = output
        .to_array_view::<f32>()
        .context("camera output tensor was not f32")?
        .iter()
        .copied()
        .collect();
    if values.len() != VIEWS * R * C {
        return Err(anyhow!(
            "camera output holds {} values, expected {}",
            values.len(),
            VIEWS * R * C
        ));
    }
    let matrices = values
        .chunks_exact(R * C)
        .map(|chunk| {
            let mut m = [[0.0f32; C]; R];
            for (idx, value) in chunk.iter().enumerate() {
                m[idx / C][idx % C] = *value;
            }
            m
        })
        .collect();
    Ok(Some(matrices))
}

impl DepthBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn predict(&mut self, images: &[PathBuf]) -> Result<Prediction> {
        if images.len() != VIEWS {
            return Err(anyhow!(
                "tract backend expects {} views per call, received {}",
                VIEWS,
                images.len()
            ));
        }
        let input = self.build_input(images)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let depth_output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let depth = self.extract_depth(depth_output)?;

        let extrinsics: Vec<Extrinsics> = extract_matrices::<3, 4>(outputs.get(1).map(|t| &**t))?
            .unwrap_or_else(|| vec![IDENTITY_EXTRINSICS; VIEWS]);
        let intrinsics: Vec<Intrinsics> = match extract_matrices::<3, 3>(
            outputs.get(2).map(|t| &**t),
        )? {
            Some(intrinsics) => intrinsics,
            None => depth
                .iter()
                .map(|map| default_intrinsics(map.width, map.height))
                .collect(),
        };

        Ok(Prediction {
            depth,
            extrinsics,
            intrinsics,
        })
    }
}
