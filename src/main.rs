use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use drowsiness_monitor::alert::{AlertDispatcher, WavPlayer};
use drowsiness_monitor::camera::OpenCvCamera;
use drowsiness_monitor::config::Config;
use drowsiness_monitor::drowsiness::DrowsinessTracker;
use drowsiness_monitor::face::{FaceMeshDetector, FACE_MESH_POINT_COUNT};
use drowsiness_monitor::monitor::FrameLoop;
use drowsiness_monitor::render::MinifbRenderer;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Webcam drowsiness monitor: alerts on prolonged eye closure and yawning
#[derive(Parser, Debug)]
#[command(author, version = env!("GIT_VERSION"), about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Camera index (overrides [camera] index)
    #[arg(long)]
    camera: Option<i32>,

    /// Face mesh ONNX model (overrides [detector] model_path)
    #[arg(short, long)]
    model: Option<String>,

    /// Alert sound WAV file (overrides [alert] sound_path)
    #[arg(short, long)]
    sound: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    info!("Drowsiness monitor {}", env!("GIT_VERSION"));

    let mut config = Config::load_or_default(&args.config)?;
    if let Some(index) = args.camera {
        config.camera.index = index;
    }
    if let Some(model) = args.model {
        config.detector.model_path = model;
    }
    if let Some(sound) = args.sound {
        config.alert.sound_path = sound;
    }
    config.validate().context("Invalid configuration")?;
    config
        .landmarks
        .validate(FACE_MESH_POINT_COUNT)
        .context("Invalid landmark layout")?;

    info!(
        "Thresholds: EAR < {} for {} frames, MAR > {} for {} frames",
        config.drowsiness.eye_closed_threshold,
        config.drowsiness.eye_closed_debounce_frames,
        config.drowsiness.yawn_ratio_threshold,
        config.drowsiness.yawn_debounce_frames
    );

    // 検出器
    info!("Loading model from {}...", config.detector.model_path);
    let detector = FaceMeshDetector::new(&config.detector)?;

    // カメラ
    let camera = OpenCvCamera::from_config(&config.camera)?;
    let (width, height) = camera.resolution();

    // ウィンドウ
    let renderer = MinifbRenderer::new(&config.display.title, width as usize, height as usize)?
        .with_landmarks(config.display.show_landmarks);

    // アラート
    if !PathBuf::from(&config.alert.sound_path).exists() {
        warn!(
            "Alert sound {} not found; alerts will be silent",
            config.alert.sound_path
        );
    }
    let player = WavPlayer::new(
        &config.alert.sound_path,
        Duration::from_millis(config.alert.playback_grace_ms),
    );
    let dispatcher = AlertDispatcher::spawn(Box::new(player))?;

    info!("Press 'q' in the window to quit");

    let summary = FrameLoop::new(
        camera,
        detector,
        renderer,
        DrowsinessTracker::from_config(&config.drowsiness),
        dispatcher,
        config.landmarks.clone(),
    )
    .run();

    for (frame, event) in &summary.events {
        info!("  frame {:>6}: {}", frame, event.label());
    }
    info!(
        "Done: {} frames, {} alert(s), stopped by {:?}",
        summary.frames,
        summary.events.len(),
        summary.stop_reason
    );

    Ok(())
}
