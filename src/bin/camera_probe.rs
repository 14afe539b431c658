use anyhow::Result;
use clap::Parser;
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, VideoCaptureAPIs};
use tracing::{debug, warn};

/// List usable camera indices and their properties
#[derive(Parser, Debug)]
#[command(author, version = env!("GIT_VERSION"), about, long_about = None)]
struct Args {
    /// Highest index to try (exclusive)
    #[arg(short, long, default_value = "5")]
    max_index: i32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== カメラプローブ ===");

    let mut found = 0;
    for index in 0..args.max_index {
        let mut cap = match VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32) {
            Ok(c) => c,
            Err(e) => {
                debug!("index {}: open error: {}", index, e);
                continue;
            }
        };
        if !cap.is_opened().unwrap_or(false) {
            debug!("index {}: not available", index);
            continue;
        }

        let w = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0);
        let h = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0);
        let fps = cap.get(videoio::CAP_PROP_FPS).unwrap_or(0.0);
        let backend = cap.get_backend_name().unwrap_or_default();

        // 実際に1フレーム読めるか
        let mut frame = Mat::default();
        let readable = matches!(cap.read(&mut frame), Ok(true)) && !frame.empty();
        if !readable {
            warn!("index {}: opened but no frame", index);
        }

        println!(
            "index {}: {}x{} fps={} backend={} frame={}",
            index,
            w,
            h,
            fps,
            backend,
            if readable { "ok" } else { "EMPTY" }
        );
        found += 1;
    }

    if found == 0 {
        println!("カメラが見つかりません");
    }
    Ok(())
}
