//! process_stereo_pairs - run a depth model on timestamp-matched stereo frames
//!
//! Reads `<DATA_DIR>/<left stream>` and `<DATA_DIR>/<right stream>`, pairs
//! `<timestamp>_undistorted.jpg` frames present in both, and writes one
//! `pair_<timestamp>` export directory per pair.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use stereo_depth::{
    list_pairs, run, BackendLoader, DepthBackend, Device, ExportFormat, ModelLoader, ModelSpec,
    PipelineConfig, RunOptions,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about = "Process stereo image pairs with a depth estimation model")]
struct Args {
    /// Directory containing the two stream folders.
    data_dir: PathBuf,
    /// Output directory (default: DATA_DIR/depth_output).
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Model to use: a model directory, an ONNX file, an id below the model root, or stub://.
    #[arg(long, value_name = "MODEL")]
    model_dir: Option<String>,
    /// Output format.
    #[arg(long, value_enum)]
    export_format: Option<ExportFormat>,
    /// Device to use (cuda, cuda:<index>, mps or cpu).
    #[arg(long)]
    device: Option<Device>,
    /// List matched pairs as JSON and exit without loading a model.
    #[arg(long)]
    dry_run: bool,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

/// Shows model loading as a UI stage.
struct StagedLoader<'a> {
    inner: BackendLoader,
    ui: &'a ui::Ui,
}

impl ModelLoader for StagedLoader<'_> {
    fn load(&self, spec: &ModelSpec) -> Result<Box<dyn DepthBackend>> {
        let _stage = self
            .ui
            .stage(&format!("Load model {} ({})", spec.model_id, spec.device));
        self.inner.load(spec)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let cfg = PipelineConfig::load()?;
    let mut options = RunOptions::from_config(&args.data_dir, &cfg);
    options.output_dir = args.output_dir;
    if let Some(model_id) = args.model_dir {
        options.model.model_id = model_id;
    }
    if let Some(device) = args.device {
        options.model.device = device;
    }
    if let Some(format) = args.export_format {
        options.export_format = format;
    }

    if args.dry_run {
        let pairs = {
            let _stage = ui.stage("Match stereo pairs");
            list_pairs(&options)?
        };
        println!("{}", serde_json::to_string_pretty(&pairs)?);
        return Ok(());
    }

    let loader = StagedLoader {
        inner: BackendLoader::new(
            &cfg.model.root,
            cfg.model.input_width,
            cfg.model.input_height,
        ),
        ui: &ui,
    };
    let mut reporter = ui.pairs();
    let summary = run(&options, &loader, &mut reporter)?;
    if summary.pairs_processed > 0 {
        println!(
            "wrote {} pair exports to {}",
            summary.pairs_processed,
            summary.output_dir.display()
        );
    }
    Ok(())
}
