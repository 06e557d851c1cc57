use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;

use emotion_stream_core::classification::infrastructure::onnx_emotion_classifier::OnnxEmotionClassifier;
use emotion_stream_core::detection::domain::face_aligner::{FaceAligner, DEFAULT_PADDING};
use emotion_stream_core::detection::infrastructure::onnx_yolo_locator::OnnxYoloLocator;
use emotion_stream_core::pipeline::classify_image_use_case::ClassifyImageUseCase;
use emotion_stream_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use emotion_stream_core::pipeline::realtime_stream_use_case::{
    RealtimeStreamUseCase, StreamOptions,
};
use emotion_stream_core::pipeline::stream_config::StreamConfig;
use emotion_stream_core::pipeline::stream_error::StreamError;
use emotion_stream_core::shared::constants::{CAMERA_WARMUP_FRAMES, YOLO_MODEL_NAME, YOLO_MODEL_URL};
use emotion_stream_core::shared::model_resolver;
use emotion_stream_core::video::domain::display_surface::DisplaySurface;
use emotion_stream_core::video::domain::frame_source::FrameSource;
use emotion_stream_core::video::domain::image_writer::ImageWriter;
use emotion_stream_core::video::infrastructure::ffmpeg_frame_source::FfmpegFrameSource;
use emotion_stream_core::video::infrastructure::ffmpeg_recording_surface::FfmpegRecordingSurface;
use emotion_stream_core::video::infrastructure::headless_surface::HeadlessSurface;
use emotion_stream_core::video::infrastructure::image_file_source::{is_image_path, ImageFileSource};
use emotion_stream_core::video::infrastructure::image_file_writer::ImageFileWriter;
use emotion_stream_core::video::infrastructure::stdin_key_poller::StdinKeyPoller;

const PROGRESS_THROTTLE_FRAMES: usize = 100;

/// Live facial emotion classification for cameras, videos and images.
///
/// Type `q` or `esc` and press enter to stop a live stream.
#[derive(Parser, Debug)]
#[command(name = "emotion-stream")]
struct Cli {
    /// JSON settings file; flags given here override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera device (e.g. /dev/video0 or 0), video file, image or URL.
    #[arg(long)]
    source: Option<String>,

    /// Emotion classification model (ONNX).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Face locator model (ONNX). Downloaded to the cache when omitted.
    #[arg(long)]
    locator_model: Option<PathBuf>,

    /// Classification workers allowed at once (0 = unbounded; default: one
    /// per face slot).
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Faces classified per frame; later detections are ignored.
    #[arg(long)]
    max_faces: Option<usize>,

    /// Display resolution as WIDTHxHEIGHT (0x0 keeps the source size).
    #[arg(long, value_parser = parse_resolution)]
    display: Option<(u32, u32)>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Side length of the aligned face crop.
    #[arg(long)]
    crop_size: Option<u32>,

    /// Exit-key poll timeout in milliseconds.
    #[arg(long)]
    key_poll_ms: Option<u64>,

    /// Write the annotated stream to this video file.
    #[arg(long)]
    record: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<usize>,

    /// Classify the first face of a single frame and exit.
    #[arg(long)]
    single: bool,

    /// Save the aligned face crop (single-shot mode).
    #[arg(long, requires = "single")]
    save_crop: Option<PathBuf>,

    /// Camera frames discarded before the single shot.
    #[arg(long, default_value_t = CAMERA_WARMUP_FRAMES)]
    warmup_frames: usize,

    /// Do not read exit keys from stdin.
    #[arg(long)]
    no_keys: bool,
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
    let config = resolve_config(&cli)?;
    config.validate()?;

    let locator = build_locator(&config)?;
    let classifier_path = config
        .classifier_model
        .as_deref()
        .ok_or_else(|| StreamError::Configuration("classifier_model is required".into()))?;
    let classifier = Arc::new(
        OnnxEmotionClassifier::new(classifier_path, config.classifier_sessions())
            .map_err(StreamError::from)?,
    );

    if cli.single {
        run_single(&cli, &config, locator, classifier)
    } else {
        run_stream(&cli, &config, locator, classifier)
    }
}

fn run_stream(
    cli: &Cli,
    config: &StreamConfig,
    locator: OnnxYoloLocator,
    classifier: Arc<OnnxEmotionClassifier>,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = open_source(&config.source, config.display_size())?;
    let keys = (!cli.no_keys).then(StdinKeyPoller::spawn);
    let surface: Box<dyn DisplaySurface> = match &config.record {
        Some(path) => Box::new(FfmpegRecordingSurface::new(path, keys)),
        None => Box::new(HeadlessSurface::new(keys)),
    };

    let options = StreamOptions {
        max_faces: config.max_faces,
        limit: config.concurrency_limit(),
        key_poll_timeout: config.key_poll_timeout(),
        max_frames: cli.max_frames,
    };
    let mut use_case = RealtimeStreamUseCase::new(
        source,
        Box::new(locator),
        classifier,
        surface,
        Box::new(StdoutPipelineLogger::new(PROGRESS_THROTTLE_FRAMES)),
        options,
    );

    let summary = use_case.execute()?;
    log::info!(
        "Stopped ({:?}) after {} frames: {} dispatched ({} bootstrap), {} refused",
        summary.reason,
        summary.frames,
        summary.dispatched,
        summary.bootstrapped,
        summary.refused
    );
    Ok(())
}

fn run_single(
    cli: &Cli,
    config: &StreamConfig,
    locator: OnnxYoloLocator,
    classifier: Arc<OnnxEmotionClassifier>,
) -> Result<(), Box<dyn std::error::Error>> {
    let still = is_image_path(Path::new(&config.source));
    let source = open_source(&config.source, None)?;
    let warmup = if still { 0 } else { cli.warmup_frames };
    let crop_output = cli
        .save_crop
        .clone()
        .map(|path| (Box::new(ImageFileWriter::new()) as Box<dyn ImageWriter>, path));

    let mut use_case =
        ClassifyImageUseCase::new(source, Box::new(locator), classifier, crop_output, warmup);
    match use_case.execute()? {
        Some(shot) => {
            for line in &shot.lines {
                println!("{line}");
            }
        }
        None => println!("No face found"),
    }
    Ok(())
}

/// Starts from the config file (or defaults) and applies flag overrides.
fn resolve_config(cli: &Cli) -> Result<StreamConfig, StreamError> {
    let base = match &cli.config {
        Some(path) => StreamConfig::load(path)?,
        None => StreamConfig::default(),
    };
    Ok(merge(cli, base))
}

fn merge(cli: &Cli, mut config: StreamConfig) -> StreamConfig {
    if let Some(source) = &cli.source {
        config.source = source.clone();
    }
    if let Some(model) = &cli.model {
        config.classifier_model = Some(model.clone());
    }
    if let Some(model) = &cli.locator_model {
        config.locator_model = Some(model.clone());
    }
    if let Some(n) = cli.max_concurrent {
        config.max_concurrent = n;
    }
    if let Some(n) = cli.max_faces {
        config.max_faces = n;
    }
    if let Some((w, h)) = cli.display {
        config.display_width = w;
        config.display_height = h;
    }
    if let Some(c) = cli.confidence {
        config.confidence = c;
    }
    if let Some(size) = cli.crop_size {
        config.crop_size = size;
    }
    if let Some(ms) = cli.key_poll_ms {
        config.key_poll_ms = ms;
    }
    if let Some(path) = &cli.record {
        config.record = Some(path.clone());
    }
    config
}

fn open_source(
    source: &str,
    display_size: Option<(u32, u32)>,
) -> Result<Box<dyn FrameSource>, StreamError> {
    let opened: Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> =
        if is_image_path(Path::new(source)) {
            ImageFileSource::open(Path::new(source)).map(|s| Box::new(s) as Box<dyn FrameSource>)
        } else {
            FfmpegFrameSource::open(source, display_size).map(|s| Box::new(s) as Box<dyn FrameSource>)
        };
    opened.map_err(|e| StreamError::Configuration(format!("cannot open source {source}: {e}")))
}

fn build_locator(config: &StreamConfig) -> Result<OnnxYoloLocator, StreamError> {
    if config.locator_model.is_none() {
        log::info!("Resolving model: {YOLO_MODEL_NAME}");
    }
    let model_path = model_resolver::resolve(
        config.locator_model.as_deref(),
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        Some(Box::new(download_progress)),
    )?;

    let aligner = FaceAligner::new(config.crop_size, DEFAULT_PADDING);
    Ok(OnnxYoloLocator::new(&model_path, aligner, config.confidence)?)
}

fn parse_resolution(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<u32>()
            .map_err(|e| format!("invalid dimension {v:?}: {e}"))
    };
    Ok((parse(w)?, parse(h)?))
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
