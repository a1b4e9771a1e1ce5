use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tempfile::TempDir;

use stereo_depth::config::StreamSettings;
use stereo_depth::depth::{default_intrinsics, IDENTITY_EXTRINSICS};
use stereo_depth::{
    run, BackendLoader, DepthBackend, DepthMap, Device, ExportFormat, InferenceRequest,
    ModelLoader, ModelSpec, PairProgress, Prediction, RunOptions, SilentProgress, StereoPair,
};

#[derive(Clone, Debug)]
struct Call {
    images: Vec<PathBuf>,
    export_dir: PathBuf,
    format: ExportFormat,
}

#[derive(Default)]
struct Recorder {
    loads: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

/// Records every inference request and optionally fails on one pair.
struct RecordingBackend {
    recorder: Arc<Recorder>,
    fail_on: Option<String>,
}

impl DepthBackend for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn predict(&mut self, images: &[PathBuf]) -> Result<Prediction> {
        Ok(Prediction {
            depth: images
                .iter()
                .map(|_| DepthMap::new(1, 1, vec![1.0]))
                .collect::<Result<_>>()?,
            extrinsics: vec![IDENTITY_EXTRINSICS; images.len()],
            intrinsics: vec![default_intrinsics(1, 1); images.len()],
        })
    }

    fn inference(&mut self, request: &InferenceRequest<'_>) -> Result<Prediction> {
        self.recorder.calls.lock().unwrap().push(Call {
            images: request.images.to_vec(),
            export_dir: request.export_dir.to_path_buf(),
            format: request.export_format,
        });
        if let Some(fail_on) = &self.fail_on {
            if request.export_dir.ends_with(fail_on) {
                return Err(anyhow!("simulated model failure"));
            }
        }
        self.predict(request.images)
    }
}

struct CountingLoader {
    recorder: Arc<Recorder>,
    fail_on: Option<String>,
}

impl CountingLoader {
    fn new() -> Self {
        Self {
            recorder: Arc::new(Recorder::default()),
            fail_on: None,
        }
    }

    fn loads(&self) -> usize {
        self.recorder.loads.load(Ordering::SeqCst)
    }

    fn calls(&self) -> Vec<Call> {
        self.recorder.calls.lock().unwrap().clone()
    }
}

impl ModelLoader for CountingLoader {
    fn load(&self, _spec: &ModelSpec) -> Result<Box<dyn DepthBackend>> {
        self.recorder.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingBackend {
            recorder: Arc::clone(&self.recorder),
            fail_on: self.fail_on.clone(),
        }))
    }
}

#[derive(Default)]
struct CollectingProgress {
    found: Option<usize>,
    total: Option<usize>,
    done: Vec<String>,
    finished: bool,
}

impl PairProgress for CollectingProgress {
    fn pairs_found(&mut self, count: usize) {
        self.found = Some(count);
    }
    fn begin(&mut self, total: usize) {
        self.total = Some(total);
    }
    fn pair_done(&mut self, pair: &StereoPair) {
        self.done.push(pair.timestamp.clone());
    }
    fn finish(&mut self) {
        self.finished = true;
    }
}

fn data_dir(left: &[&str], right: &[&str]) -> Result<TempDir> {
    let dir = tempfile::tempdir()?;
    let streams = StreamSettings::default();
    for (stream, stamps) in [(&streams.left, left), (&streams.right, right)] {
        let stream_dir = dir.path().join(stream);
        fs::create_dir_all(&stream_dir)?;
        for stamp in stamps {
            fs::write(
                stream_dir.join(format!("{stamp}_undistorted.jpg")),
                format!("{stream}/{stamp}"),
            )?;
        }
    }
    Ok(dir)
}

fn options(data: &Path, model_id: &str, format: ExportFormat) -> RunOptions {
    RunOptions {
        data_dir: data.to_path_buf(),
        output_dir: None,
        output_subdir: "depth_output".to_string(),
        streams: StreamSettings::default(),
        model: ModelSpec {
            model_id: model_id.to_string(),
            device: Device::Cpu,
        },
        export_format: format,
    }
}

#[test]
fn loads_once_and_infers_once_per_pair() -> Result<()> {
    let data = data_dir(&["300", "100", "200", "999"], &["200", "100", "300"])?;
    let loader = CountingLoader::new();
    let mut progress = CollectingProgress::default();

    let summary = run(
        &options(data.path(), "mock", ExportFormat::Npz),
        &loader,
        &mut progress,
    )?;

    assert_eq!(summary.pairs_found, 3);
    assert_eq!(summary.pairs_processed, 3);
    assert_eq!(loader.loads(), 1);

    let calls = loader.calls();
    assert_eq!(calls.len(), 3);
    let output = data.path().join("depth_output");
    let streams = StreamSettings::default();
    for (call, stamp) in calls.iter().zip(["100", "200", "300"]) {
        assert_eq!(call.images.len(), 2);
        assert_eq!(
            call.images[0],
            data.path()
                .join(&streams.left)
                .join(format!("{stamp}_undistorted.jpg"))
        );
        assert_eq!(
            call.images[1],
            data.path()
                .join(&streams.right)
                .join(format!("{stamp}_undistorted.jpg"))
        );
        assert_eq!(call.export_dir, output.join(format!("pair_{stamp}")));
        assert_eq!(call.format, ExportFormat::Npz);
    }

    assert_eq!(progress.found, Some(3));
    assert_eq!(progress.total, Some(3));
    assert_eq!(progress.done, vec!["100", "200", "300"]);
    assert!(progress.finished);
    Ok(())
}

#[test]
fn per_pair_directory_is_named_from_timestamp() -> Result<()> {
    let data = data_dir(&["44335766666666"], &["44335766666666"])?;
    let loader = CountingLoader::new();

    run(
        &options(data.path(), "mock", ExportFormat::Ply),
        &loader,
        &mut SilentProgress,
    )?;

    let calls = loader.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].export_dir,
        data.path().join("depth_output").join("pair_44335766666666")
    );
    Ok(())
}

#[test]
fn no_pairs_skips_model_and_output() -> Result<()> {
    let data = data_dir(&["1", "2"], &["3"])?;
    let loader = CountingLoader::new();
    let mut progress = CollectingProgress::default();

    let summary = run(
        &options(data.path(), "mock", ExportFormat::Npz),
        &loader,
        &mut progress,
    )?;

    assert_eq!(summary.pairs_found, 0);
    assert_eq!(summary.pairs_processed, 0);
    assert_eq!(loader.loads(), 0);
    assert!(loader.calls().is_empty());
    assert!(!data.path().join("depth_output").exists());
    assert_eq!(progress.found, Some(0));
    assert_eq!(progress.total, None);
    Ok(())
}

#[test]
fn missing_first_stream_fails_before_loading() -> Result<()> {
    let data = tempfile::tempdir()?;
    fs::create_dir(data.path().join(StreamSettings::default().right))?;
    let loader = CountingLoader::new();

    let err = run(
        &options(data.path(), "mock", ExportFormat::Npz),
        &loader,
        &mut SilentProgress,
    )
    .unwrap_err();

    let io_err = err
        .downcast_ref::<io::Error>()
        .expect("directory check reports an io error");
    assert_eq!(io_err.kind(), io::ErrorKind::NotFound);
    assert!(err.to_string().starts_with("Stream 1 directory not found"));
    assert_eq!(loader.loads(), 0);
    Ok(())
}

#[test]
fn failing_pair_aborts_remaining_batch() -> Result<()> {
    let data = data_dir(&["1", "2", "3"], &["1", "2", "3"])?;
    let mut loader = CountingLoader::new();
    loader.fail_on = Some("pair_2".to_string());
    let mut progress = CollectingProgress::default();

    let err = run(
        &options(data.path(), "mock", ExportFormat::Npz),
        &loader,
        &mut progress,
    )
    .unwrap_err();

    assert!(format!("{err:#}").contains("inference failed for pair_2"));
    assert_eq!(loader.calls().len(), 2);
    assert_eq!(progress.done, vec!["1"]);
    assert!(!progress.finished);
    Ok(())
}

#[test]
fn stub_backend_writes_exports_per_pair() -> Result<()> {
    let data = data_dir(&["10", "2"], &["2", "10"])?;
    let out = tempfile::tempdir()?;
    let mut opts = options(data.path(), "stub://4x4", ExportFormat::Npz);
    opts.output_dir = Some(out.path().join("exports"));
    let loader = BackendLoader::new(out.path(), 504, 504);

    let summary = run(&opts, &loader, &mut SilentProgress)?;

    assert_eq!(summary.pairs_processed, 2);
    for stamp in ["10", "2"] {
        let artifact = out
            .path()
            .join("exports")
            .join(format!("pair_{stamp}"))
            .join("results.npz");
        assert!(artifact.is_file(), "missing {}", artifact.display());
    }
    Ok(())
}

#[test]
fn gs_video_with_stub_fails_fast() -> Result<()> {
    let data = data_dir(&["1", "2"], &["1", "2"])?;
    let loader = BackendLoader::new(data.path(), 504, 504);

    let result = run(
        &options(data.path(), "stub://", ExportFormat::GsVideo),
        &loader,
        &mut SilentProgress,
    );

    assert!(result.is_err());
    let output = data.path().join("depth_output");
    assert!(output.is_dir());
    assert!(!output.join("pair_1").exists());
    assert!(!output.join("pair_2").exists());
    Ok(())
}
