mod settings;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;

use facegate_core::detection::domain::face_detector::InputSize;
use facegate_core::detection::domain::model_location::ModelLocation;
use facegate_core::detection::infrastructure::onnx_model_loader::OnnxModelLoader;
use facegate_core::input::image_file_reader::{is_image, read_frame};
use facegate_core::session::config::SessionConfig;
use facegate_core::session::error::DetectError;
use facegate_core::session::face_detector_session::FaceDetectorSession;
use facegate_core::shared::frame::Frame;
use facegate_core::FaceDetection;

use settings::{ModelSetting, Settings};

/// Exit code when at least one input had no acceptable face.
const EXIT_REJECTED: i32 = 2;

/// Single-face detection with a dead-zone check on the frame edges.
#[derive(Parser, Debug)]
#[command(name = "facegate")]
struct Cli {
    /// Input image files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Share of the frame width rejected on each side, in [0, 0.5).
    #[arg(long)]
    dead_zone: Option<f64>,

    /// Face detection score threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Network input size: xs, sm, md, lg or a multiple of 32.
    #[arg(long)]
    input_size: Option<String>,

    /// Model file.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Directory holding tiny_face_detector_model.onnx.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Asset root serving js/faceapi_model/.
    #[arg(long)]
    asset_root: Option<PathBuf>,

    /// Download the model from this URL into the user cache.
    #[arg(long)]
    model_url: Option<String>,

    /// JSON settings file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print one JSON object per input.
    #[arg(long)]
    json: bool,

    /// Do not preload the model; load it on the first detection.
    #[arg(long)]
    lazy: bool,
}

/// Session configuration plus per-call settings, after merging file and flags.
#[derive(Debug, PartialEq)]
struct RunOptions {
    config: SessionConfig,
    dead_zone_ratio: f64,
}

#[derive(Serialize)]
struct BoxReport {
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

#[derive(Serialize)]
struct DetectionReport {
    input: String,
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounding_box: Option<BoxReport>,
    image_width: u32,
    image_height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn main() {
    env_logger::init();

    match run() {
        Ok(true) => {}
        Ok(false) => process::exit(EXIT_REJECTED),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// Returns whether every input had an accepted face.
fn run() -> Result<bool, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let options = merge_options(&cli, settings)?;
    let session = build_session(options.config)?;

    let mut all_accepted = true;
    for (index, input) in cli.inputs.iter().enumerate() {
        let frame = read_frame(input)?.with_index(index);
        let accepted = detect_one(&session, input, &frame, options.dead_zone_ratio, cli.json)?;
        all_accepted &= accepted;
    }
    Ok(all_accepted)
}

fn build_session(config: SessionConfig) -> Result<FaceDetectorSession, Box<dyn std::error::Error>> {
    log::info!("Face detection model: {}", config.model);
    let loader = OnnxModelLoader::new(config.model.clone()).with_progress(Box::new(download_progress));
    Ok(FaceDetectorSession::with_loader(config, Arc::new(loader))?)
}

fn detect_one(
    session: &FaceDetectorSession,
    input: &Path,
    frame: &Frame,
    dead_zone_ratio: f64,
    json: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let report = match session.detect_single_face(frame, dead_zone_ratio) {
        Ok(face) => accepted_report(input, &face),
        Err(e) if e.is_rejection() => rejected_report(input, frame, &e),
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report.accepted)
}

fn accepted_report(input: &Path, face: &FaceDetection) -> DetectionReport {
    let b = &face.bounding_box;
    DetectionReport {
        input: input.display().to_string(),
        accepted: true,
        bounding_box: Some(BoxReport {
            left: b.left,
            top: b.top,
            right: b.right,
            bottom: b.bottom,
        }),
        image_width: face.image_width,
        image_height: face.image_height,
        score: Some(face.score),
        reason: None,
        message: None,
    }
}

fn rejected_report(input: &Path, frame: &Frame, err: &DetectError) -> DetectionReport {
    let score = match err {
        DetectError::FaceOutOfBounds { score, .. } => Some(*score),
        _ => None,
    };
    DetectionReport {
        input: input.display().to_string(),
        accepted: false,
        bounding_box: None,
        image_width: frame.width(),
        image_height: frame.height(),
        score,
        reason: Some(err.to_string()),
        message: Some(err.user_message()),
    }
}

fn print_report(report: &DetectionReport) {
    match (&report.bounding_box, report.score) {
        (Some(b), Some(score)) if report.accepted => println!(
            "{}: face at [{:.1}, {:.1}, {:.1}, {:.1}] score {:.3}",
            report.input, b.left, b.top, b.right, b.bottom, score
        ),
        _ => println!(
            "{}: {} ({})",
            report.input,
            report.message.as_deref().unwrap_or_default(),
            report.reason.as_deref().unwrap_or_default()
        ),
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    for input in &cli.inputs {
        if !input.exists() {
            return Err(format!("Input file not found: {}", input.display()).into());
        }
        if !is_image(input) {
            log::warn!("{} does not look like an image file", input.display());
        }
    }
    let model_flags = [
        cli.model.is_some(),
        cli.model_dir.is_some(),
        cli.asset_root.is_some(),
        cli.model_url.is_some(),
    ];
    if model_flags.iter().filter(|set| **set).count() > 1 {
        return Err("--model, --model-dir, --asset-root and --model-url are mutually exclusive".into());
    }
    if let Some(c) = cli.confidence {
        if !(0.0..=1.0).contains(&c) {
            return Err(format!("Confidence must be between 0.0 and 1.0, got {c}").into());
        }
    }
    if let Some(r) = cli.dead_zone {
        if !(0.0..0.5).contains(&r) {
            return Err(format!("Dead zone must be in [0, 0.5), got {r}").into());
        }
    }
    Ok(())
}

fn merge_options(cli: &Cli, settings: Settings) -> Result<RunOptions, Box<dyn std::error::Error>> {
    let input_size: InputSize = cli
        .input_size
        .as_deref()
        .unwrap_or(&settings.input_size)
        .parse()?;

    let model = if let Some(path) = &cli.model {
        ModelLocation::File(path.clone())
    } else if let Some(dir) = &cli.model_dir {
        ModelLocation::Directory(dir.clone())
    } else if let Some(root) = &cli.asset_root {
        ModelLocation::from_asset_root(root)
    } else if let Some(url) = &cli.model_url {
        ModelLocation::Remote { url: url.clone() }
    } else {
        model_location(settings.model)
    };

    let config = SessionConfig::new(model)
        .immediate(settings.immediate && !cli.lazy)
        .score_threshold(cli.confidence.unwrap_or(settings.score_threshold))
        .input_size(input_size);
    config.validate()?;

    Ok(RunOptions {
        config,
        dead_zone_ratio: cli.dead_zone.unwrap_or(settings.dead_zone_ratio),
    })
}

fn model_location(setting: ModelSetting) -> ModelLocation {
    match setting {
        ModelSetting::Default => ModelLocation::default(),
        ModelSetting::File(path) => ModelLocation::File(path),
        ModelSetting::Directory(dir) => ModelLocation::Directory(dir),
        ModelSetting::AssetRoot(root) => ModelLocation::from_asset_root(root),
        ModelSetting::Url(url) => ModelLocation::Remote { url },
    }
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
