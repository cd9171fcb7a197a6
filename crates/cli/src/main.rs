mod display;

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{Parser, ValueEnum};
use crossbeam_channel::Sender;

use facescope_core::detection::domain::detection_params::{DetectionParams, ParamsUpdate};
use facescope_core::detection::domain::detector::Detector;
use facescope_core::detection::infrastructure::model_resolver;
use facescope_core::detection::infrastructure::onnx_blazeface_classifier::OnnxBlazefaceClassifier;
use facescope_core::pipeline::control::{parse_control_line, ControlCommand};
use facescope_core::pipeline::frame_sink::{FrameSink, ImageFileSink, ImageTarget};
use facescope_core::pipeline::frame_source::{FrameSource, SourceKind};
use facescope_core::pipeline::pipeline_controller::PipelineController;
use facescope_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use facescope_core::realtime::session_worker::spawn_session;
use facescope_core::realtime::single_image::{detect_image, ImagePayload};
use facescope_core::shared::config::AppConfig;
use facescope_core::shared::constants::{IMAGE_EXTENSIONS, SCREENSHOT_PREFIX, WEBCAM_CAPTURE_SIZE};
use facescope_core::video::infrastructure::ffmpeg_reader::FfmpegReader;
use facescope_core::video::infrastructure::ffmpeg_writer::FfmpegWriter;
use facescope_core::video::infrastructure::image_file_reader::ImageFileReader;
use facescope_core::video::infrastructure::image_file_writer::ImageFileWriter;
use facescope_core::video::infrastructure::webcam_reader::{device_path, WebcamReader};

use display::WindowSurface;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SourceArg {
    /// Live camera.
    Webcam,
    /// Single still image.
    Image,
    /// Video file.
    Video,
    /// JSON-lines realtime session on stdin/stdout.
    Stream,
}

/// Face detection for webcams, videos and images.
#[derive(Parser, Debug)]
#[command(name = "facescope")]
struct Cli {
    /// What to read frames from.
    #[arg(long, value_enum, default_value = "webcam")]
    source: SourceArg,

    /// Input file for image and video sources.
    #[arg(long)]
    path: Option<PathBuf>,

    /// Camera index.
    #[arg(long, default_value = "0")]
    camera: u32,

    /// Capture device path, overriding --camera.
    #[arg(long)]
    device: Option<PathBuf>,

    /// Write the annotated result to the output directory.
    #[arg(long)]
    save: bool,

    /// Output directory (default from config, "output").
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Detection pyramid step, must be > 1.0.
    #[arg(long)]
    scale_factor: Option<f64>,

    /// Neighbouring candidates required to keep a detection.
    #[arg(long)]
    min_neighbors: Option<i32>,

    /// Smallest face reported, in pixels.
    #[arg(long, num_args = 2, value_names = ["W", "H"])]
    min_size: Option<Vec<i32>>,

    /// Largest face reported, in pixels.
    #[arg(long, num_args = 2, value_names = ["W", "H"])]
    max_size: Option<Vec<i32>>,

    /// Classifier score threshold (0.0-1.0).
    #[arg(long, default_value = "0.5")]
    confidence: f32,

    /// Shrink frames by this factor before detection (0.0-1.0].
    #[arg(long)]
    resize: Option<f64>,

    /// JSON config file (default: <config dir>/facescope/config.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// ONNX face model (default: cached model).
    #[arg(long)]
    model: Option<PathBuf>,

    /// Run without a window.
    #[arg(long)]
    no_display: bool,

    /// Push annotated frames to stdout as JSON lines.
    #[arg(long)]
    feed: bool,

    /// Image source only: print the detection result as JSON and exit.
    #[arg(long)]
    json: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    apply_overrides(&cli, &mut config)?;
    let detector = build_detector(&cli, &config)?;

    match cli.source {
        SourceArg::Stream => run_stream(detector, config.detection),
        SourceArg::Image if cli.json => run_image_json(&cli, &detector, &config),
        _ => run_pipeline(&cli, detector, &config),
    }
}

fn run_pipeline(
    cli: &Cli,
    detector: Detector,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = open_source(cli)?;
    let kind = source.kind();
    let output_dir = config.output.dir.clone();

    let screenshots = ImageFileSink::new(
        Box::new(ImageFileWriter::new().with_jpeg_quality(config.output.jpeg_quality)),
        ImageTarget::sequence(&output_dir, SCREENSHOT_PREFIX, &config.output.image_format),
    );

    let mut controller = PipelineController::new(source, detector, config.detection)
        .with_screenshots(screenshots)
        .with_commands(spawn_stdin_commands())
        .with_logger(Box::new(StdoutPipelineLogger::default()))
        .with_fallback_delay(config.fallback_delay())
        .with_linger(kind == SourceKind::Image && !cli.no_display);

    if !cli.no_display {
        let surface = WindowSurface::new(&format!("facescope - {kind:?}"));
        controller = controller.with_sink(FrameSink::Display(Box::new(surface)));
    }
    if cli.feed {
        controller = controller.with_sink(FrameSink::socket_push(spawn_stdout_writer()));
    }
    if cli.save {
        let sink = output_sink(kind, controller.source(), config)?;
        controller = controller.with_sink(sink);
    }

    print_controls(kind, cli.no_display);
    controller.run()?;
    Ok(())
}

fn open_source(cli: &Cli) -> Result<FrameSource, Box<dyn std::error::Error>> {
    let source = match cli.source {
        SourceArg::Webcam => {
            let device = cli
                .device
                .clone()
                .unwrap_or_else(|| device_path(cli.camera));
            let (w, h) = WEBCAM_CAPTURE_SIZE;
            let reader = WebcamReader::new().with_capture_size(w, h);
            FrameSource::webcam(Box::new(reader), &device)?
        }
        SourceArg::Image => {
            FrameSource::image(Box::new(ImageFileReader::new()), required_path(cli)?)?
        }
        SourceArg::Video => FrameSource::video(Box::new(FfmpegReader::new()), required_path(cli)?)?,
        SourceArg::Stream => return Err("stream mode has no frame source".into()),
    };
    Ok(source)
}

fn output_sink(
    kind: SourceKind,
    source: &FrameSource,
    config: &AppConfig,
) -> Result<FrameSink, Box<dyn std::error::Error>> {
    let dir = &config.output.dir;
    let input = source.source_path().map(PathBuf::as_path);
    let sink = match kind {
        SourceKind::Webcam => {
            let secs = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
            FrameSink::video_file(
                Box::new(FfmpegWriter::new()),
                dir.join(format!("webcam_output_{secs}.avi")),
                Some(config.playback.webcam_record_fps),
            )
        }
        SourceKind::Video => FrameSink::video_file(
            Box::new(FfmpegWriter::new()),
            dir.join(format!("{}_detected.avi", file_stem(input))),
            source.native_frame_rate(),
        ),
        SourceKind::Image => {
            let ext = input
                .and_then(|p| p.extension())
                .and_then(|e| e.to_str())
                .unwrap_or("jpg");
            FrameSink::image_file(
                Box::new(ImageFileWriter::new().with_jpeg_quality(config.output.jpeg_quality)),
                ImageTarget::Fixed(dir.join(format!("{}_detected.{ext}", file_stem(input)))),
            )
        }
    };
    Ok(sink)
}

fn run_image_json(
    cli: &Cli,
    detector: &Detector,
    config: &AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = required_path(cli)?;
    let bytes = std::fs::read(path)
        .map_err(|e| format!("Could not read image {}: {e}", path.display()))?;
    let result = detect_image(
        detector,
        ImagePayload::Bytes(&bytes),
        &ParamsUpdate::default(),
        &config.detection,
    )?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

/// One realtime session over stdio: each stdin line is a message, each
/// response is written to stdout as one line.
fn run_stream(
    detector: Detector,
    params: DetectionParams,
) -> Result<(), Box<dyn std::error::Error>> {
    let handle = spawn_session(detector, params);
    let responses = handle.outbound.clone();
    let printer = std::thread::spawn(move || {
        let stdout = std::io::stdout();
        for line in responses.iter() {
            let mut out = stdout.lock();
            if writeln!(out, "{line}").and_then(|_| out.flush()).is_err() {
                break;
            }
        }
    });

    log::info!("Realtime session {} reading from stdin", handle.id);
    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if handle.inbound.send(line).is_err() {
            break;
        }
    }

    let handled = handle.disconnect();
    printer.join().map_err(|_| "response writer panicked")?;
    log::info!("Session closed after {handled} messages");
    Ok(())
}

/// Reads control lines (`q`, `p`, `s`, JSON params) from stdin.
fn spawn_stdin_commands() -> crossbeam_channel::Receiver<ControlCommand> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match parse_control_line(&line) {
                Ok(Some(command)) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => log::warn!("{e}"),
            }
        }
    });
    rx
}

fn spawn_stdout_writer() -> Sender<String> {
    let (tx, rx) = crossbeam_channel::unbounded::<String>();
    std::thread::spawn(move || {
        let stdout = std::io::stdout();
        for line in rx.iter() {
            let mut out = stdout.lock();
            if writeln!(out, "{line}").is_err() {
                break;
            }
        }
    });
    tx
}

fn build_detector(cli: &Cli, config: &AppConfig) -> Result<Detector, Box<dyn std::error::Error>> {
    let explicit = cli.model.as_deref().or(config.model_path.as_deref());
    let model_path = model_resolver::resolve(
        explicit,
        config.model_url.as_deref(),
        Some(Box::new(download_progress)),
    )?;
    log::info!("Using model {}", model_path.display());

    let classifier = OnnxBlazefaceClassifier::new(&model_path)?.with_confidence(cli.confidence);
    Ok(Detector::new(Arc::new(classifier))
        .with_style(config.overlay.clone())
        .with_resize_factor(config.playback.resize_factor))
}

/// Folds command-line flags over the loaded config.
fn apply_overrides(cli: &Cli, config: &mut AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let update = ParamsUpdate {
        scale_factor: cli.scale_factor,
        min_neighbors: cli.min_neighbors,
        min_size: cli.min_size.as_deref().map(pair),
        max_size: cli.max_size.as_deref().map(|v| Some(pair(v))),
    };
    config.detection.update(&update)?;
    if let Some(dir) = &cli.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(factor) = cli.resize {
        config.playback.resize_factor = factor;
    }
    config.validate()?;
    Ok(())
}

fn pair(values: &[i32]) -> (i32, i32) {
    match values {
        [w, h, ..] => (*w, *h),
        [w] => (*w, *w),
        [] => (0, 0),
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.source {
        SourceArg::Image | SourceArg::Video => {
            let path = required_path(cli)?;
            if !path.exists() {
                return Err(format!("Input file not found: {}", path.display()).into());
            }
            if cli.source == SourceArg::Image && !is_image(path) {
                return Err(format!(
                    "Unsupported image type: {} (expected one of {})",
                    path.display(),
                    IMAGE_EXTENSIONS.join(", ")
                )
                .into());
            }
        }
        SourceArg::Webcam | SourceArg::Stream => {}
    }
    if cli.json && cli.source != SourceArg::Image {
        return Err("--json is only supported with --source image".into());
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

fn required_path(cli: &Cli) -> Result<&Path, Box<dyn std::error::Error>> {
    cli.path
        .as_deref()
        .ok_or_else(|| format!("--path is required for --source {:?}", cli.source).into())
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn file_stem(path: Option<&Path>) -> String {
    path.and_then(|p| p.file_stem())
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}

fn print_controls(kind: SourceKind, no_display: bool) {
    let keys = match kind {
        SourceKind::Webcam => "q quit, p pause, s screenshot",
        SourceKind::Video => "q quit, p pause/resume, s screenshot",
        SourceKind::Image => "q quit, s save",
    };
    if no_display {
        log::info!("Controls on stdin: {keys}, or a JSON parameter object");
    } else {
        log::info!("Controls: {keys}");
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("facescope").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_to_webcam() {
        let cli = parse(&[]);
        assert_eq!(cli.source, SourceArg::Webcam);
        assert_eq!(cli.camera, 0);
        assert!(!cli.save);
    }

    #[test]
    fn test_size_pairs_parse() {
        let cli = parse(&["--source", "video", "--path", "a.mp4", "--min-size", "40", "50"]);
        assert_eq!(cli.min_size, Some(vec![40, 50]));
        assert_eq!(pair(cli.min_size.as_deref().unwrap()), (40, 50));
    }

    #[test]
    fn test_overrides_fold_into_config() {
        let cli = parse(&[
            "--scale-factor",
            "1.25",
            "--max-size",
            "300",
            "300",
            "--output-dir",
            "/tmp/out",
        ]);
        let mut config = AppConfig::default();
        apply_overrides(&cli, &mut config).unwrap();
        assert_eq!(config.detection.scale_factor(), 1.25);
        assert_eq!(config.detection.min_neighbors(), 5);
        assert_eq!(config.detection.max_size(), Some((300, 300)));
        assert_eq!(config.output.dir, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = parse(&["--scale-factor", "1.0"]);
        let mut config = AppConfig::default();
        assert!(apply_overrides(&cli, &mut config).is_err());
        assert_eq!(config.detection, DetectionParams::default());
    }

    #[test]
    fn test_image_source_requires_path() {
        let cli = parse(&["--source", "image"]);
        assert!(validate(&cli).is_err());
    }

    #[test]
    fn test_json_requires_image_source() {
        let cli = parse(&["--source", "stream", "--json"]);
        assert!(validate(&cli).is_err());
    }

    #[test]
    fn test_file_stem_fallback() {
        assert_eq!(file_stem(Some(Path::new("/a/clip.mp4"))), "clip");
        assert_eq!(file_stem(None), "output");
    }
}
