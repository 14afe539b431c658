use crate::drowsiness::{DetectionEvent, DetectionState};
use crate::face::{FaceMesh, Landmark, LandmarkLayout};
use crate::metrics::FaceMetrics;

/// 目のランドマークの色 (RGB)
pub const EYE_COLOR: u32 = 0x00FF00; // 緑

/// 口のランドマークの色 (RGB)
pub const MOUTH_COLOR: u32 = 0x00FFFF; // シアン

/// 通常テキストの色 (BGR, put_text用)
pub const TEXT_COLOR: (f64, f64, f64) = (255.0, 255.0, 255.0);

/// アラート表示の色 (BGR, put_text用)
pub const ALERT_TEXT_COLOR: (f64, f64, f64) = (0.0, 0.0, 255.0);

/// 1つの顔の描画情報
#[derive(Debug, Clone)]
pub struct FaceOverlay {
    pub metrics: FaceMetrics,
    pub eyes: Vec<Landmark>,
    pub mouth: Vec<Landmark>,
}

impl FaceOverlay {
    pub fn new(mesh: &FaceMesh, layout: &LandmarkLayout, metrics: FaceMetrics) -> Self {
        let pick = |indices: &[usize]| -> Vec<Landmark> {
            indices.iter().filter_map(|&i| mesh.get(i).copied()).collect()
        };
        let mut eyes = pick(&layout.right_eye);
        eyes.extend(pick(&layout.left_eye));
        Self {
            metrics,
            eyes,
            mouth: pick(&layout.mouth),
        }
    }
}

/// 1フレーム分の描画情報
#[derive(Debug, Clone, Default)]
pub struct FrameOverlay {
    pub faces: Vec<FaceOverlay>,
    pub state: DetectionState,
    /// armed 中のイベント
    pub active_event: Option<DetectionEvent>,
    pub fps: Option<f32>,
}

impl FrameOverlay {
    /// 画面左上に出すテキスト行
    pub fn status_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match self.faces.first() {
            Some(face) => {
                let m = &face.metrics;
                lines.push(format!("EAR R {:.2}  L {:.2}", m.right_ear, m.left_ear));
                lines.push(format!("MAR {:.1}", m.mar));
            }
            None => lines.push("No face".to_string()),
        }
        lines.push(format!(
            "closed {}  yawn {}",
            self.state.eye_closed_frames, self.state.yawn_frames
        ));
        if let Some(fps) = self.fps {
            lines.push(format!("FPS {:.1}", fps));
        }
        lines
    }

    /// アラート中の見出し
    pub fn banner(&self) -> Option<String> {
        if !self.state.alert_armed {
            return None;
        }
        Some(match self.active_event {
            Some(event) => format!("ALERT: {}", event.label()),
            None => "ALERT".to_string(),
        })
    }
}
