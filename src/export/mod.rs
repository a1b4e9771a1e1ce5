//! Prediction export.
//!
//! Each pair's prediction is written into its own directory. The file layout
//! depends on the chosen format:
//! - `npz`: `results.npz` with `depth`, `extrinsics` and `intrinsics` arrays
//! - `ply`: `points.ply`, an ASCII point cloud in world coordinates
//! - `glb`: `scene.glb`, a binary glTF holding the same point cloud
//! - `gs_video`: requires a Gaussian splatting head, not provided by the
//!   shipped backends

mod glb;
mod npz;
mod ply;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;

use crate::depth::Prediction;

pub use glb::write_glb;
pub use npz::{encode_npy, write_npz};
pub use ply::write_ply;

pub const NPZ_FILE_NAME: &str = "results.npz";
pub const PLY_FILE_NAME: &str = "points.ply";
pub const GLB_FILE_NAME: &str = "scene.glb";

/// Export format for per-pair artifacts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Archive of numpy arrays.
    #[default]
    #[value(name = "npz")]
    Npz,
    /// Binary glTF point cloud.
    #[value(name = "glb")]
    Glb,
    /// ASCII PLY point cloud.
    #[value(name = "ply")]
    Ply,
    /// Video of rendered Gaussian splats.
    #[value(name = "gs_video")]
    GsVideo,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Npz => "npz",
            ExportFormat::Glb => "glb",
            ExportFormat::Ply => "ply",
            ExportFormat::GsVideo => "gs_video",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "npz" => Ok(ExportFormat::Npz),
            "glb" => Ok(ExportFormat::Glb),
            "ply" => Ok(ExportFormat::Ply),
            "gs_video" => Ok(ExportFormat::GsVideo),
            other => Err(anyhow!(
                "unknown export format '{}' (expected npz, glb, ply or gs_video)",
                other
            )),
        }
    }
}

/// Write `prediction` into `dir` (created if absent) and return the artifact path.
pub fn export_prediction(
    prediction: &Prediction,
    dir: &Path,
    format: ExportFormat,
) -> Result<PathBuf> {
    let (file_name, write): (&str, fn(&Prediction, &Path) -> Result<()>) = match format {
        ExportFormat::Npz => (NPZ_FILE_NAME, write_npz),
        ExportFormat::Ply => (PLY_FILE_NAME, |p, path| write_ply(&p.world_points()?, path)),
        ExportFormat::Glb => (GLB_FILE_NAME, |p, path| write_glb(&p.world_points()?, path)),
        ExportFormat::GsVideo => {
            return Err(anyhow!(
                "export format gs_video needs a backend with a Gaussian splatting head"
            ))
        }
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;

    let path = dir.join(file_name);
    write(prediction, &path)?;
    log::debug!("exported {} to {}", format, path.display());
    Ok(path)
}
