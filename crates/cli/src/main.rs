use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde::Serialize;

use facescan_core::detection::infrastructure::model_resolver::{
    ModelResolver, ModelSpec, ProgressFn, FACE_DETECTION_MODEL, FACE_EMBEDDING_MODEL,
};
use facescan_core::detection::infrastructure::onnx_arcface_extractor::OnnxArcFaceExtractor;
use facescan_core::detection::infrastructure::onnx_yolo_detector::{
    OnnxYoloDetector, DEFAULT_CONFIDENCE,
};
use facescan_core::identity::domain::embedding::DEFAULT_SIMILARITY_THRESHOLD;
use facescan_core::identity::domain::face_observation::ObservationSummary;
use facescan_core::identity::domain::face_session::FaceSession;
use facescan_core::identity::domain::observation_store::ObservationId;
use facescan_core::pipeline::detection_logger::LogDetectionLogger;
use facescan_core::pipeline::detection_pipeline::{DetectionPipeline, DetectionRequest};
use facescan_core::pipeline::detection_report::FramePosition;
use facescan_core::pipeline::infrastructure::background_detector::BackgroundDetector;
use facescan_core::pipeline::pipeline_config::PipelineConfig;
use facescan_core::sampling::domain::processing_budget::ProcessingBudget;
use facescan_core::shared::constants::{
    DEFAULT_MAX_DURATION_MS, DEFAULT_MAX_IMAGES, DEFAULT_MIN_FACE_CONFIDENCE, GIF_EXTENSIONS,
    IMAGE_EXTENSIONS,
};
use facescan_core::shared::media_source::MediaSource;
use facescan_core::video::domain::image_writer::ImageWriter;
use facescan_core::video::infrastructure::ffmpeg_frame_decoder::FfmpegFrameDecoder;
use facescan_core::video::infrastructure::gif_frame_reader::GifFrameReader;
use facescan_core::video::infrastructure::image_file_reader::ImageFileReader;
use facescan_core::video::infrastructure::image_file_writer::ImageFileWriter;

const THUMBNAIL_SIZE: u32 = 128;

/// Collect the distinct faces in images, bursts, GIFs and videos.
#[derive(Parser)]
#[command(name = "facescan")]
struct Cli {
    /// Input files. With `--kind burst` all inputs form one burst.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// How to treat the inputs; `auto` decides by file extension.
    #[arg(long, value_enum, default_value_t = SourceKind::Auto)]
    kind: SourceKind,

    /// Where video sampling starts, in milliseconds.
    #[arg(long, default_value_t = 0)]
    start_offset_ms: u64,

    /// Wall-clock budget for sampling one video, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_MAX_DURATION_MS)]
    max_duration_ms: u64,

    /// Frames examined from a burst or GIF.
    #[arg(long, default_value_t = DEFAULT_MAX_IMAGES)]
    max_images: usize,

    /// Cosine distance at or below which two faces are the same person.
    #[arg(long, default_value_t = DEFAULT_SIMILARITY_THRESHOLD)]
    similarity_threshold: f32,

    /// Faces below this detector confidence are dropped.
    #[arg(long, default_value_t = DEFAULT_MIN_FACE_CONFIDENCE)]
    min_confidence: f32,

    /// Raw detector confidence threshold (0.0-1.0).
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    confidence: f32,

    /// Save one thumbnail per distinct face to this directory.
    #[arg(long)]
    thumbnails: Option<PathBuf>,

    /// Directory holding model files; checked after the cache, before
    /// downloading.
    #[arg(long)]
    models_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    Auto,
    Image,
    Video,
    Burst,
    Gif,
}

#[derive(Serialize)]
struct IdentityOutput {
    #[serde(flatten)]
    summary: ObservationSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<PathBuf>,
}

#[derive(Serialize)]
struct FrameOutput {
    position: FramePosition,
    identities: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct MediaOutput {
    input: String,
    kind: &'static str,
    frames: Vec<FrameOutput>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    skipped_timestamps_ms: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct ScanOutput {
    identities: Vec<IdentityOutput>,
    media: Vec<MediaOutput>,
}

/// Frames of one media item with faces still pointing at session handles.
struct PendingFrame {
    position: FramePosition,
    faces: Vec<ObservationId>,
    error: Option<String>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = PipelineConfig {
        similarity_threshold: cli.similarity_threshold,
        max_images: cli.max_images,
        min_face_confidence: cli.min_confidence,
        ..PipelineConfig::default()
    };
    let budget = ProcessingBudget::from_millis(cli.start_offset_ms, cli.max_duration_ms);
    let detector = BackgroundDetector::new(Arc::new(build_pipeline(&cli, config)?));

    let mut session = FaceSession::new(cli.similarity_threshold);
    let mut scanned = Vec::new();
    for (label, source) in collect_sources(&cli)? {
        let kind = source.kind();
        let request = DetectionRequest::new(source)
            .with_budget(budget)
            .with_prior(session.prior());

        let (tx, rx) = crossbeam_channel::bounded(1);
        detector.submit(request, move |result| {
            let _ = tx.send(result);
        })?;
        let result = rx.recv()?;

        match result {
            Ok(report) => {
                let summary = report.summaries();
                let skipped = report.skipped_timestamps_ms.clone();
                let handles = session.record(label.clone(), &report);
                let frames = summary
                    .frames
                    .into_iter()
                    .map(|frame| PendingFrame {
                        position: frame.position,
                        faces: frame.identities.iter().map(|&i| handles[i]).collect(),
                        error: frame.error,
                    })
                    .collect();
                scanned.push((label, kind, Ok((frames, skipped))));
            }
            Err(e) => {
                log::error!("{label}: {e}");
                scanned.push((label, kind, Err(e.to_string())));
            }
        }
    }

    let thumbnails = match &cli.thumbnails {
        Some(dir) => write_thumbnails(&session, dir)?,
        None => Vec::new(),
    };
    let output = ScanOutput {
        identities: session
            .identities()
            .into_iter()
            .enumerate()
            .map(|(i, face)| IdentityOutput {
                summary: face.summary(),
                thumbnail: thumbnails.get(i).cloned(),
            })
            .collect(),
        media: scanned
            .into_iter()
            .map(|(input, kind, outcome)| media_output(&session, input, kind, outcome))
            .collect(),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    log::info!(
        "{} distinct face(s) across {} input(s)",
        output.identities.len(),
        output.media.len()
    );
    Ok(())
}

fn build_pipeline(
    cli: &Cli,
    config: PipelineConfig,
) -> Result<DetectionPipeline, Box<dyn std::error::Error>> {
    let mut resolver = ModelResolver::with_default_cache()?;
    if let Some(dir) = &cli.models_dir {
        resolver = resolver.with_bundled_dir(dir);
    }
    let detector_path = resolve_model(&resolver, &FACE_DETECTION_MODEL)?;
    let embedder_path = resolve_model(&resolver, &FACE_EMBEDDING_MODEL)?;

    let pipeline = DetectionPipeline::new(
        Box::new(OnnxYoloDetector::new(&detector_path, cli.confidence)?),
        Box::new(OnnxArcFaceExtractor::new(&embedder_path)?),
        Box::new(FfmpegFrameDecoder::new()),
        Box::new(GifFrameReader::new()),
        config,
    )?;
    Ok(pipeline.with_logger(Box::new(LogDetectionLogger::new())))
}

fn resolve_model(
    resolver: &ModelResolver,
    spec: &ModelSpec,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {}", spec.name);
    let path = resolver.resolve(spec, Some(download_progress(spec.name)))?;
    Ok(path)
}

fn collect_sources(cli: &Cli) -> Result<Vec<(String, MediaSource)>, Box<dyn std::error::Error>> {
    let reader = ImageFileReader::new();
    if cli.kind == SourceKind::Burst {
        let frames = cli
            .inputs
            .iter()
            .enumerate()
            .map(|(i, path)| Ok(reader.read(path)?.with_index(i)))
            .collect::<Result<Vec<_>, Box<dyn std::error::Error>>>()?;
        let label = format!("burst of {} image(s)", frames.len());
        return Ok(vec![(label, MediaSource::LivePhotoBurst(frames))]);
    }

    let mut sources = Vec::with_capacity(cli.inputs.len());
    for path in &cli.inputs {
        let source = match resolve_kind(cli.kind, path) {
            SourceKind::Image => MediaSource::StillImage(reader.read(path)?),
            SourceKind::Gif => MediaSource::AnimatedGif(path.clone()),
            _ => MediaSource::VideoFile(path.clone()),
        };
        sources.push((path.display().to_string(), source));
    }
    Ok(sources)
}

fn resolve_kind(requested: SourceKind, path: &Path) -> SourceKind {
    if requested != SourceKind::Auto {
        return requested;
    }
    if has_extension(path, GIF_EXTENSIONS) {
        SourceKind::Gif
    } else if has_extension(path, IMAGE_EXTENSIONS) {
        SourceKind::Image
    } else {
        SourceKind::Video
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn media_output(
    session: &FaceSession,
    input: String,
    kind: &'static str,
    outcome: Result<(Vec<PendingFrame>, Vec<f64>), String>,
) -> MediaOutput {
    let identity_index = |handle: ObservationId| {
        let target = session.resolve(handle);
        session.identity_ids().iter().position(|&id| id == target)
    };
    match outcome {
        Ok((frames, skipped_timestamps_ms)) => MediaOutput {
            input,
            kind,
            frames: frames
                .into_iter()
                .map(|frame| FrameOutput {
                    position: frame.position,
                    identities: frame.faces.into_iter().filter_map(identity_index).collect(),
                    error: frame.error,
                })
                .collect(),
            skipped_timestamps_ms,
            error: None,
        },
        Err(error) => MediaOutput {
            input,
            kind,
            frames: Vec::new(),
            skipped_timestamps_ms: Vec::new(),
            error: Some(error),
        },
    }
}

fn write_thumbnails(
    session: &FaceSession,
    dir: &Path,
) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let writer = ImageFileWriter::new();
    let mut paths = Vec::new();
    for (i, face) in session.identities().into_iter().enumerate() {
        let path = dir.join(format!("face_{i:03}.png"));
        writer.write(&path, &face.thumbnail, Some((THUMBNAIL_SIZE, THUMBNAIL_SIZE)))?;
        paths.push(path);
    }
    log::info!("Saved {} thumbnail(s) to {}", paths.len(), dir.display());
    Ok(paths)
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    for input in &cli.inputs {
        if !input.exists() {
            return Err(format!("Input file not found: {}", input.display()).into());
        }
    }
    if let Some(dir) = &cli.models_dir {
        if !dir.is_dir() {
            return Err(format!("Models directory not found: {}", dir.display()).into());
        }
    }
    if cli.max_duration_ms == 0 {
        return Err("Max duration must be positive".into());
    }
    if cli.max_images == 0 {
        return Err("Max images must be at least 1".into());
    }
    if !(0.0..=2.0).contains(&cli.similarity_threshold) {
        return Err(format!(
            "Similarity threshold must be between 0.0 and 2.0, got {}",
            cli.similarity_threshold
        )
        .into());
    }
    if !(0.0..=1.0).contains(&cli.min_confidence) {
        return Err(format!(
            "Min confidence must be between 0.0 and 1.0, got {}",
            cli.min_confidence
        )
        .into());
    }
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    Ok(())
}

fn download_progress(model: &'static str) -> ProgressFn {
    Box::new(move |downloaded, total| {
        if total > 0 {
            let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
            eprint!("\rDownloading {model}... {pct}%");
        } else {
            eprint!("\rDownloading {model}... {downloaded} bytes");
        }
        if total > 0 && downloaded >= total {
            eprintln!();
        }
    })
}
