use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::depth::Device;
use crate::export::ExportFormat;
use crate::pairs::IMAGE_SUFFIX;

const DEFAULT_LEFT_STREAM: &str = "stream_1201-1";
const DEFAULT_RIGHT_STREAM: &str = "stream_1201-2";
const DEFAULT_OUTPUT_SUBDIR: &str = "depth_output";
pub const DEFAULT_MODEL_ID: &str = "depth-anything/DA3NESTED-GIANT-LARGE-1.1";
const DEFAULT_MODEL_ROOT: &str = "models";
const DEFAULT_INPUT_SIZE: u32 = 504;
/// ViT patch size; model input sides must be a multiple of it.
const PATCH_SIZE: u32 = 14;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    streams: Option<StreamConfigFile>,
    output_subdir: Option<String>,
    export_format: Option<String>,
    model: Option<ModelConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    left: Option<String>,
    right: Option<String>,
    image_suffix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    id: Option<String>,
    root: Option<PathBuf>,
    device: Option<String>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub streams: StreamSettings,
    pub output_subdir: String,
    pub export_format: ExportFormat,
    pub model: ModelSettings,
}

/// Names of the two stream directories below the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub left: String,
    pub right: String,
    pub image_suffix: String,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub id: String,
    pub root: PathBuf,
    pub device: Device,
    pub input_width: u32,
    pub input_height: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            left: DEFAULT_LEFT_STREAM.to_string(),
            right: DEFAULT_RIGHT_STREAM.to_string(),
            image_suffix: IMAGE_SUFFIX.to_string(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            streams: StreamSettings::default(),
            output_subdir: DEFAULT_OUTPUT_SUBDIR.to_string(),
            export_format: ExportFormat::default(),
            model: ModelSettings {
                id: DEFAULT_MODEL_ID.to_string(),
                root: PathBuf::from(DEFAULT_MODEL_ROOT),
                device: Device::default(),
                input_width: DEFAULT_INPUT_SIZE,
                input_height: DEFAULT_INPUT_SIZE,
            },
        }
    }
}

impl PipelineConfig {
    /// Load defaults, the optional `STEREO_DEPTH_CONFIG` JSON file and
    /// `STEREO_DEPTH_*` environment overrides, in that order.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("STEREO_DEPTH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let streams = file.streams.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let export_format = match file.export_format {
            Some(format) => format.parse()?,
            None => defaults.export_format,
        };
        let device = match model.device {
            Some(device) => device.parse()?,
            None => defaults.model.device,
        };
        Ok(Self {
            streams: StreamSettings {
                left: streams.left.unwrap_or(defaults.streams.left),
                right: streams.right.unwrap_or(defaults.streams.right),
                image_suffix: streams
                    .image_suffix
                    .unwrap_or(defaults.streams.image_suffix),
            },
            output_subdir: file.output_subdir.unwrap_or(defaults.output_subdir),
            export_format,
            model: ModelSettings {
                id: model.id.unwrap_or(defaults.model.id),
                root: model.root.unwrap_or(defaults.model.root),
                device,
                input_width: model.input_width.unwrap_or(defaults.model.input_width),
                input_height: model.input_height.unwrap_or(defaults.model.input_height),
            },
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(id) = std::env::var("STEREO_DEPTH_MODEL_ID") {
            if !id.trim().is_empty() {
                self.model.id = id;
            }
        }
        if let Ok(root) = std::env::var("STEREO_DEPTH_MODEL_ROOT") {
            if !root.trim().is_empty() {
                self.model.root = PathBuf::from(root);
            }
        }
        if let Ok(device) = std::env::var("STEREO_DEPTH_DEVICE") {
            if !device.trim().is_empty() {
                self.model.device = device
                    .parse()
                    .map_err(|e| anyhow!("STEREO_DEPTH_DEVICE: {}", e))?;
            }
        }
        if let Ok(format) = std::env::var("STEREO_DEPTH_EXPORT_FORMAT") {
            if !format.trim().is_empty() {
                self.export_format = format
                    .parse()
                    .map_err(|e| anyhow!("STEREO_DEPTH_EXPORT_FORMAT: {}", e))?;
            }
        }
        if let Ok(streams) = std::env::var("STEREO_DEPTH_STREAMS") {
            let parsed = split_csv(&streams);
            match parsed.as_slice() {
                [] => {}
                [left, right] => {
                    self.streams.left = left.clone();
                    self.streams.right = right.clone();
                }
                _ => {
                    return Err(anyhow!(
                        "STEREO_DEPTH_STREAMS must name exactly two directories"
                    ))
                }
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.streams.left.trim().is_empty() || self.streams.right.trim().is_empty() {
            return Err(anyhow!("stream directory names must not be empty"));
        }
        if self.streams.left == self.streams.right {
            return Err(anyhow!(
                "left and right streams must differ (both are {})",
                self.streams.left
            ));
        }
        if self.streams.image_suffix.is_empty() {
            return Err(anyhow!("image suffix must not be empty"));
        }
        if self.output_subdir.trim().is_empty() {
            return Err(anyhow!("output subdirectory must not be empty"));
        }
        for (side, value) in [
            ("input_width", self.model.input_width),
            ("input_height", self.model.input_height),
        ] {
            if value == 0 || value % PATCH_SIZE != 0 {
                return Err(anyhow!(
                    "model {} must be a positive multiple of {} (got {})",
                    side,
                    PATCH_SIZE,
                    value
                ));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
