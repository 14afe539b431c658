use anyhow::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use drowsiness_monitor::alert::{AlertDispatcher, AlertPlayer, PlaybackError};
use drowsiness_monitor::camera::FrameSource;
use drowsiness_monitor::drowsiness::{DetectionEvent, DrowsinessTracker, Thresholds};
use drowsiness_monitor::face::{
    FaceDetector, FaceMesh, Landmark, LandmarkLayout, FACE_MESH_POINT_COUNT, LEFT_EYE, MOUTH,
    RIGHT_EYE,
};
use drowsiness_monitor::monitor::{FrameLoop, LoopState, StopReason};
use drowsiness_monitor::render::{FrameDisplay, FrameOverlay};

const WAIT: Duration = Duration::from_secs(5);

/// EAR (両目) と MAR (%) が指定値になる顔
fn mesh(ear: f32, mar: f32) -> FaceMesh {
    let mut points = vec![Landmark::new(0.5, 0.5, 0.0); FACE_MESH_POINT_COUNT];
    let h = ear / 2.0;
    for [p1, p2, p3, p4, p5, p6] in [RIGHT_EYE, LEFT_EYE] {
        points[p1] = Landmark::new(0.0, 0.0, 0.0);
        points[p4] = Landmark::new(1.0, 0.0, 0.0);
        points[p2] = Landmark::new(0.33, h, 0.0);
        points[p6] = Landmark::new(0.33, -h, 0.0);
        points[p3] = Landmark::new(0.66, h, 0.0);
        points[p5] = Landmark::new(0.66, -h, 0.0);
    }
    let d = mar / 200.0;
    let [m1, m2, m3, m4, m5, m6, m7, m8] = MOUTH;
    points[m1] = Landmark::new(0.0, 0.0, 0.0);
    points[m5] = Landmark::new(1.0, 0.0, 0.0);
    for (top, bottom, x) in [(m2, m8, 0.25), (m3, m7, 0.5), (m4, m6, 0.75)] {
        points[top] = Landmark::new(x, d, 0.0);
        points[bottom] = Landmark::new(x, -d, 0.0);
    }
    FaceMesh::new(points, 1.0)
}

/// `count` 枚返した後に読み込み失敗。破棄されたら `released` を立てる。
struct ScriptedCamera {
    remaining: usize,
    next: usize,
    released: Arc<AtomicBool>,
}

impl FrameSource for ScriptedCamera {
    type Frame = usize;

    fn read_frame(&mut self) -> Result<usize> {
        if self.remaining == 0 {
            anyhow::bail!("camera disconnected");
        }
        self.remaining -= 1;
        self.next += 1;
        Ok(self.next)
    }
}

impl Drop for ScriptedCamera {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// フレーム番号 (1始まり) から顔を決める
struct FnDetector<F: FnMut(usize) -> Vec<FaceMesh>>(F);

impl<F: FnMut(usize) -> Vec<FaceMesh>> FaceDetector<usize> for FnDetector<F> {
    fn detect(&mut self, frame: &usize) -> Result<Vec<FaceMesh>> {
        Ok((self.0)(*frame))
    }
}

struct HeadlessDisplay {
    shown: usize,
    stop_at: Option<usize>,
    close_at: Option<usize>,
    released: Arc<AtomicBool>,
}

impl HeadlessDisplay {
    fn new(released: Arc<AtomicBool>) -> Self {
        Self {
            shown: 0,
            stop_at: None,
            close_at: None,
            released,
        }
    }
}

impl FrameDisplay<usize> for HeadlessDisplay {
    fn show(&mut self, _frame: &usize, _overlay: &FrameOverlay) -> Result<()> {
        self.shown += 1;
        Ok(())
    }

    fn stop_requested(&self) -> bool {
        self.stop_at == Some(self.shown)
    }

    fn is_open(&self) -> bool {
        self.close_at != Some(self.shown)
    }
}

impl Drop for HeadlessDisplay {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// 再生回数を数え、再生ごとに通知する
struct RecordingPlayer {
    plays: Arc<AtomicUsize>,
    played: Sender<()>,
}

impl AlertPlayer for RecordingPlayer {
    fn play(&mut self) -> Result<(), PlaybackError> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        let _ = self.played.send(());
        Ok(())
    }
}

/// 再生開始を通知し、`release` が来るまで戻らない
struct BlockingPlayer {
    started: Sender<()>,
    release: Receiver<()>,
}

impl AlertPlayer for BlockingPlayer {
    fn play(&mut self) -> Result<(), PlaybackError> {
        let _ = self.started.send(());
        let _ = self.release.recv();
        Ok(())
    }
}

struct Harness {
    camera_released: Arc<AtomicBool>,
    display_released: Arc<AtomicBool>,
    plays: Arc<AtomicUsize>,
    played: Receiver<()>,
}

fn build<F>(
    frames: usize,
    detect: F,
    configure: impl FnOnce(&mut HeadlessDisplay),
) -> (FrameLoop<ScriptedCamera, FnDetector<F>, HeadlessDisplay>, Harness)
where
    F: FnMut(usize) -> Vec<FaceMesh>,
{
    let plays = Arc::new(AtomicUsize::new(0));
    let (played_tx, played_rx) = mpsc::channel();
    let player = RecordingPlayer {
        plays: plays.clone(),
        played: played_tx,
    };

    let (frame_loop, camera_released, display_released) =
        build_with_player(frames, detect, configure, Box::new(player));

    (
        frame_loop,
        Harness {
            camera_released,
            display_released,
            plays,
            played: played_rx,
        },
    )
}

fn build_with_player<F>(
    frames: usize,
    detect: F,
    configure: impl FnOnce(&mut HeadlessDisplay),
    player: Box<dyn AlertPlayer>,
) -> (
    FrameLoop<ScriptedCamera, FnDetector<F>, HeadlessDisplay>,
    Arc<AtomicBool>,
    Arc<AtomicBool>,
)
where
    F: FnMut(usize) -> Vec<FaceMesh>,
{
    let camera_released = Arc::new(AtomicBool::new(false));
    let display_released = Arc::new(AtomicBool::new(false));

    let mut display = HeadlessDisplay::new(display_released.clone());
    configure(&mut display);

    let frame_loop = FrameLoop::new(
        ScriptedCamera {
            remaining: frames,
            next: 0,
            released: camera_released.clone(),
        },
        FnDetector(detect),
        display,
        DrowsinessTracker::new(Thresholds::default()),
        AlertDispatcher::spawn(player).unwrap(),
        LandmarkLayout::default(),
    );

    (frame_loop, camera_released, display_released)
}

#[test]
fn test_sustained_eye_closure_plays_one_alert() {
    let (frame_loop, harness) = build(48, |_| vec![mesh(0.1, 5.0)], |_| {});

    let summary = frame_loop.run();

    assert_eq!(summary.frames, 48);
    assert_eq!(summary.stop_reason, StopReason::CaptureFailed);
    assert_eq!(summary.events, vec![(48, DetectionEvent::EyesClosed)]);

    harness.played.recv_timeout(WAIT).unwrap();
    assert!(harness.played.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(harness.plays.load(Ordering::SeqCst), 1);
}

#[test]
fn test_47_closed_frames_do_not_alert() {
    let (frame_loop, harness) = build(47, |_| vec![mesh(0.1, 5.0)], |_| {});

    let summary = frame_loop.run();

    assert!(summary.events.is_empty());
    assert!(harness.played.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn test_interrupted_yawns_never_alert() {
    // 5フレームごとに口の開閉が入れ替わる
    let (frame_loop, harness) = build(
        60,
        |n| {
            let wide = ((n - 1) / 5) % 2 == 0;
            vec![mesh(0.3, if wide { 50.0 } else { 5.0 })]
        },
        |_| {},
    );

    let summary = frame_loop.run();

    assert_eq!(summary.frames, 60);
    assert!(summary.events.is_empty());
    assert_eq!(harness.plays.load(Ordering::SeqCst), 0);
}

#[test]
fn test_sustained_yawn_alerts_at_tenth_frame() {
    let (frame_loop, harness) = build(10, |_| vec![mesh(0.3, 50.0)], |_| {});

    let summary = frame_loop.run();

    assert_eq!(summary.events, vec![(10, DetectionEvent::Yawning)]);
    harness.played.recv_timeout(WAIT).unwrap();
}

#[test]
fn test_capture_failure_on_first_frame_releases_camera() {
    let (mut frame_loop, harness) = build(0, |_| vec![mesh(0.1, 50.0)], |_| {});

    assert_eq!(
        frame_loop.step(),
        LoopState::Stopped(StopReason::CaptureFailed)
    );
    // ループがまだ生きていても解放済み
    assert!(harness.camera_released.load(Ordering::SeqCst));
    assert!(harness.display_released.load(Ordering::SeqCst));
    assert_eq!(frame_loop.frames(), 0);
    assert!(frame_loop.events().is_empty());
    assert_eq!(frame_loop.alerts_in_flight(), 0);
    assert_eq!(harness.plays.load(Ordering::SeqCst), 0);
}

#[test]
fn test_stop_key_stops_and_releases() {
    let (mut frame_loop, harness) = build(
        100,
        |_| vec![mesh(0.1, 5.0)],
        |display| display.stop_at = Some(5),
    );

    for _ in 0..4 {
        assert_eq!(frame_loop.step(), LoopState::Running);
    }
    assert!(!harness.camera_released.load(Ordering::SeqCst));

    assert_eq!(frame_loop.step(), LoopState::Stopped(StopReason::StopKey));
    assert!(harness.camera_released.load(Ordering::SeqCst));
    assert!(harness.display_released.load(Ordering::SeqCst));
    assert_eq!(frame_loop.tracker().state().eye_closed_frames, 0);
    assert_eq!(frame_loop.frames(), 5);
}

#[test]
fn test_window_close_stops_loop() {
    let (frame_loop, _harness) = build(100, |_| Vec::new(), |display| display.close_at = Some(3));

    let summary = frame_loop.run();

    assert_eq!(summary.stop_reason, StopReason::WindowClosed);
    assert_eq!(summary.frames, 3);
}

#[test]
fn test_face_lost_mid_closure_delays_alert() {
    // 顔が消えたフレームはカウンタを進めも戻しもしない
    let (frame_loop, _harness) = build(
        52,
        |n| {
            if (20..24).contains(&n) {
                Vec::new()
            } else {
                vec![mesh(0.1, 5.0)]
            }
        },
        |_| {},
    );

    let summary = frame_loop.run();

    assert_eq!(summary.events, vec![(52, DetectionEvent::EyesClosed)]);
}

#[test]
fn test_alert_stays_armed_until_playback_finishes() {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let player = BlockingPlayer {
        started: started_tx,
        release: release_rx,
    };
    let (mut frame_loop, _, _) =
        build_with_player(200, |_| vec![mesh(0.1, 5.0)], |_| {}, Box::new(player));

    for _ in 0..48 {
        frame_loop.step();
    }
    assert_eq!(frame_loop.events(), &[(48u64, DetectionEvent::EyesClosed)]);
    started_rx.recv_timeout(WAIT).unwrap();

    // 再生中は目を閉じ続けても再発火しない
    for _ in 0..60 {
        assert_eq!(frame_loop.step(), LoopState::Running);
    }
    assert_eq!(frame_loop.events().len(), 1);
    assert!(frame_loop.tracker().is_armed());
    assert_eq!(frame_loop.alerts_in_flight(), 1);

    // 再生完了 -> 次のフレームで解除され、すぐに1回だけ再発火
    release_tx.send(()).unwrap();
    std::thread::sleep(Duration::from_millis(300));
    frame_loop.step();
    assert_eq!(
        frame_loop.events(),
        &[(48u64, DetectionEvent::EyesClosed), (109u64, DetectionEvent::EyesClosed)]
    );
    assert!(frame_loop.tracker().is_armed());

    frame_loop.step();
    assert_eq!(frame_loop.events().len(), 2);

    let _ = release_tx.send(());
}
