use anyhow::{Context, Result};
use opencv::{core::Mat, prelude::*};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::crop::BBox;
use super::preprocess::preprocess_for_face_detection;
use crate::config::DetectorConfig;

/// 1アンカーあたりの回帰値 (cx, cy, w, h + キーポイント6点)
const BOX_VALUES: usize = 16;

/// short range モデルのアンカー構成: (stride, アンカー数/セル)
const ANCHOR_LAYERS: [(usize, usize); 2] = [(8, 2), (16, 6)];

/// logit のクリップ幅
const SCORE_CLIP: f32 = 100.0;

/// アンカー中心（正規化座標）。サイズは固定で 1.0。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x: f32,
    pub y: f32,
}

/// 入力サイズからSSDアンカーを生成
pub fn generate_anchors(input_size: usize) -> Vec<Anchor> {
    let mut anchors = Vec::new();
    for (stride, per_cell) in ANCHOR_LAYERS {
        let grid = input_size.div_ceil(stride);
        for y in 0..grid {
            for x in 0..grid {
                let anchor = Anchor {
                    x: (x as f32 + 0.5) / grid as f32,
                    y: (y as f32 + 0.5) / grid as f32,
                };
                anchors.extend(std::iter::repeat(anchor).take(per_cell));
            }
        }
    }
    anchors
}

/// 検出された顔（正規化座標の中心とサイズ）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub cx: f32,
    pub cy: f32,
    pub width: f32,
    pub height: f32,
    pub score: f32,
}

impl FaceBox {
    pub fn to_bbox(&self, frame_w: u32, frame_h: u32) -> BBox {
        let fw = frame_w as f32;
        let fh = frame_h as f32;
        BBox {
            x: (self.cx - self.width / 2.0) * fw,
            y: (self.cy - self.height / 2.0) * fh,
            width: self.width * fw,
            height: self.height * fh,
        }
    }
}

/// 回帰出力とスコア出力から、閾値以上で最もスコアの高い顔を選ぶ
pub fn decode_best_face(
    boxes: &[f32],
    scores: &[f32],
    anchors: &[Anchor],
    input_size: f32,
    threshold: f32,
) -> Result<Option<FaceBox>> {
    if boxes.len() < anchors.len() * BOX_VALUES || scores.len() < anchors.len() {
        anyhow::bail!(
            "Face detection output too small: {} boxes / {} scores for {} anchors",
            boxes.len(),
            scores.len(),
            anchors.len()
        );
    }

    let mut best: Option<(usize, f32)> = None;
    for (i, &logit) in scores[..anchors.len()].iter().enumerate() {
        let score = sigmoid(logit.clamp(-SCORE_CLIP, SCORE_CLIP));
        if score >= threshold && best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
    }

    let Some((i, score)) = best else {
        return Ok(None);
    };

    let raw = &boxes[i * BOX_VALUES..i * BOX_VALUES + 4];
    let anchor = anchors[i];
    let width = raw[2] / input_size;
    let height = raw[3] / input_size;
    if !(width > 0.0 && height > 0.0) {
        return Ok(None);
    }

    Ok(Some(FaceBox {
        cx: anchor.x + raw[0] / input_size,
        cy: anchor.y + raw[1] / input_size,
        width,
        height,
        score,
    }))
}

pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// BlazeFace による顔検出。face mesh に渡す最初のROIを作る。
pub struct BlazeFaceDetector {
    session: Session,
    anchors: Vec<Anchor>,
    input_size: i32,
    input_name: String,
    boxes_output: String,
    scores_output: String,
    threshold: f32,
}

impl BlazeFaceDetector {
    /// ONNXモデルを読み込んで初期化
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.face_model_path)
            .with_context(|| format!("Failed to load face detection model: {}", config.face_model_path))?;

        let anchors = generate_anchors(config.face_input_size as usize);
        info!(
            "Face detection model loaded: {} ({} anchors)",
            config.face_model_path,
            anchors.len()
        );

        Ok(Self {
            session,
            anchors,
            input_size: config.face_input_size,
            input_name: config.face_input_name.clone(),
            boxes_output: config.face_boxes_output.clone(),
            scores_output: config.face_scores_output.clone(),
            threshold: config.min_detection_confidence,
        })
    }

    /// フレームから最もスコアの高い顔のBBox（ピクセル座標）を返す
    pub fn detect(&mut self, frame: &Mat) -> Result<Option<BBox>> {
        let frame_w = frame.cols().max(1) as u32;
        let frame_h = frame.rows().max(1) as u32;
        let input = preprocess_for_face_detection(frame, self.input_size)?;

        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .context("Face detection inference failed")?;

        let boxes: ndarray::ArrayViewD<f32> = outputs[self.boxes_output.as_str()]
            .try_extract_array()
            .context("Failed to extract face box tensor")?;
        let scores: ndarray::ArrayViewD<f32> = outputs[self.scores_output.as_str()]
            .try_extract_array()
            .context("Failed to extract face score tensor")?;

        let boxes: Vec<f32> = boxes.iter().copied().collect();
        let scores: Vec<f32> = scores.iter().copied().collect();

        let face = decode_best_face(
            &boxes,
            &scores,
            &self.anchors,
            self.input_size as f32,
            self.threshold,
        )?;
        if let Some(f) = &face {
            debug!("Face found: score {:.3} at ({:.2}, {:.2})", f.score, f.cx, f.cy);
        }
        Ok(face.map(|f| f.to_bbox(frame_w, frame_h)))
    }
}
