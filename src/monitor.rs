//! Per-frame driver: capture, detect, measure, debounce, alert, display.

use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::alert::AlertDispatcher;
use crate::camera::FrameSource;
use crate::drowsiness::{DetectionEvent, DrowsinessTracker};
use crate::face::{FaceDetector, FaceMesh, LandmarkLayout};
use crate::metrics::FaceMetrics;
use crate::render::{FaceOverlay, FrameDisplay, FrameOverlay};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// フレームが読めなかった
    CaptureFailed,
    /// 'q' キー
    StopKey,
    /// ウィンドウが閉じられた
    WindowClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped(StopReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopSummary {
    /// 読み込めたフレーム数
    pub frames: u64,
    pub stop_reason: StopReason,
    /// (フレーム番号, イベント)。フレーム番号は1始まり。
    pub events: Vec<(u64, DetectionEvent)>,
}

/// FPS計測
struct FpsCounter {
    frames: u32,
    since: Instant,
    current: Option<f32>,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            frames: 0,
            since: Instant::now(),
            current: None,
        }
    }

    fn tick(&mut self) -> Option<f32> {
        self.frames += 1;
        let elapsed = self.since.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frames as f32 / elapsed;
            info!("FPS: {:.1}", fps);
            self.current = Some(fps);
            self.frames = 0;
            self.since = Instant::now();
        }
        self.current
    }
}

/// Owns the camera and the window until the loop stops; both are dropped
/// exactly once on the transition to `Stopped`.
pub struct FrameLoop<S, D, W>
where
    S: FrameSource,
    D: FaceDetector<S::Frame>,
    W: FrameDisplay<S::Frame>,
{
    source: Option<S>,
    detector: D,
    display: Option<W>,
    tracker: DrowsinessTracker,
    dispatcher: AlertDispatcher,
    layout: LandmarkLayout,
    state: LoopState,
    frames: u64,
    events: Vec<(u64, DetectionEvent)>,
    active_event: Option<DetectionEvent>,
    fps: FpsCounter,
}

impl<S, D, W> FrameLoop<S, D, W>
where
    S: FrameSource,
    D: FaceDetector<S::Frame>,
    W: FrameDisplay<S::Frame>,
{
    pub fn new(
        source: S,
        detector: D,
        display: W,
        tracker: DrowsinessTracker,
        dispatcher: AlertDispatcher,
        layout: LandmarkLayout,
    ) -> Self {
        Self {
            source: Some(source),
            detector,
            display: Some(display),
            tracker,
            dispatcher,
            layout,
            state: LoopState::Running,
            frames: 0,
            events: Vec::new(),
            active_event: None,
            fps: FpsCounter::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn tracker(&self) -> &DrowsinessTracker {
        &self.tracker
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// 発火済みイベント
    pub fn events(&self) -> &[(u64, DetectionEvent)] {
        &self.events
    }

    pub fn alerts_in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Runs until stopped.
    pub fn run(mut self) -> LoopSummary {
        info!("Monitoring started");
        let stop_reason = loop {
            if let LoopState::Stopped(reason) = self.step() {
                break reason;
            }
        };
        info!(
            "Monitoring stopped: {:?} after {} frames, {} alert(s)",
            stop_reason,
            self.frames,
            self.events.len()
        );
        LoopSummary {
            frames: self.frames,
            stop_reason,
            events: self.events,
        }
    }

    /// One iteration. A stopped loop stays stopped.
    pub fn step(&mut self) -> LoopState {
        if matches!(self.state, LoopState::Stopped(_)) {
            return self.state;
        }

        self.collect_finished_alerts();

        let frame = match self.source.as_mut().map(|s| s.read_frame()) {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                error!("Frame capture failed: {:#}", e);
                return self.stop(StopReason::CaptureFailed);
            }
            None => return self.stop(StopReason::CaptureFailed),
        };
        self.frames += 1;

        let faces = match self.detector.detect(&frame) {
            Ok(faces) => faces,
            Err(e) => {
                // 検出失敗は顔なしと同じ扱い
                warn!("Face detection failed: {:#}", e);
                Vec::new()
            }
        };

        let overlays = self.process_faces(&faces);

        let overlay = FrameOverlay {
            faces: overlays,
            state: self.tracker.state(),
            active_event: self.active_event,
            fps: self.fps.tick(),
        };

        let Some(display) = self.display.as_mut() else {
            return self.stop(StopReason::WindowClosed);
        };
        if let Err(e) = display.show(&frame, &overlay) {
            warn!("Display update failed: {:#}", e);
        }

        if display.stop_requested() {
            info!("Stop key pressed");
            self.tracker.reset();
            self.active_event = None;
            return self.stop(StopReason::StopKey);
        }
        if !display.is_open() {
            return self.stop(StopReason::WindowClosed);
        }

        self.state
    }

    /// 顔ごとに指標を計算してトラッカーを更新
    fn process_faces(&mut self, faces: &[FaceMesh]) -> Vec<FaceOverlay> {
        let mut overlays = Vec::with_capacity(faces.len());

        for mesh in faces {
            let Some(metrics) = FaceMetrics::from_mesh(mesh, &self.layout) else {
                warn!(
                    "Face mesh has {} points, layout needs more; skipped",
                    mesh.points.len()
                );
                continue;
            };
            debug!(
                "frame {} EAR R {:.3} L {:.3} MAR {:.1}",
                self.frames, metrics.right_ear, metrics.left_ear, metrics.mar
            );

            if let Some(event) = self.tracker.update_metrics(&metrics) {
                self.raise(event);
            }
            overlays.push(FaceOverlay::new(mesh, &self.layout, metrics));
        }

        overlays
    }

    fn raise(&mut self, event: DetectionEvent) {
        warn!("{} detected at frame {}", event.label(), self.frames);
        self.events.push((self.frames, event));
        self.active_event = Some(event);

        if let Err(e) = self.dispatcher.dispatch(event) {
            // 完了通知が来ないので、ここで解除しておく
            error!("Failed to dispatch alert: {:#}", e);
            self.tracker.disarm();
            self.active_event = None;
        }
    }

    fn collect_finished_alerts(&mut self) {
        for done in self.dispatcher.poll_finished() {
            debug!("Alert finished: {:?} (played: {})", done.event, done.played);
            if self.tracker.disarm() {
                info!("Alert cleared, detection resumed");
            }
            self.active_event = None;
        }
    }

    fn stop(&mut self, reason: StopReason) -> LoopState {
        self.state = LoopState::Stopped(reason);
        // カメラとウィンドウを解放
        self.source = None;
        self.display = None;
        self.detector.reset();
        self.state
    }
}
