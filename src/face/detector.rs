use anyhow::{Context, Result};
use ndarray::Array4;
use opencv::{core::Mat, prelude::*};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, info};

use super::blazeface::{sigmoid, BlazeFaceDetector};
use super::crop::{bbox_from_landmarks, crop_frame, remap_landmarks, roi_from_bbox, CropRegion};
use super::landmark::{FaceMesh, Landmark, FACE_MESH_POINT_COUNT};
use super::preprocess::preprocess_for_face_mesh;
use super::FaceDetector;
use crate::config::DetectorConfig;

/// MediaPipe face mesh (ONNX) によるランドマーク検出器
///
/// 2段構成:
/// - 追跡中でなければ BlazeFace で顔を探し、そのBBoxからROIを作って推論する（detection）
/// - 前フレームで顔が見つかっていればそのROIをクロップして推論する（tracking）
///
/// trackingのスコアが閾値未満ならROIを捨ててdetectionからやり直す。
pub struct FaceMeshDetector {
    session: Session,
    face_finder: BlazeFaceDetector,
    config: DetectorConfig,
    roi: Option<CropRegion>,
}

impl FaceMeshDetector {
    /// ONNXモデルを読み込んで初期化
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.model_path)
            .with_context(|| format!("Failed to load face mesh model: {}", config.model_path))?;

        info!("Face mesh model loaded: {}", config.model_path);

        let face_finder = BlazeFaceDetector::new(config)?;

        Ok(Self {
            session,
            face_finder,
            config: config.clone(),
            roi: None,
        })
    }

    fn infer(&mut self, input: Array4<f32>) -> Result<(Vec<f32>, f32)> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![self.config.input_name.as_str() => input_tensor])
            .context("Face mesh inference failed")?;

        let landmarks: ndarray::ArrayViewD<f32> = outputs[self.config.landmarks_output.as_str()]
            .try_extract_array()
            .context("Failed to extract landmark tensor")?;
        let raw: Vec<f32> = landmarks.iter().copied().collect();

        let score: ndarray::ArrayViewD<f32> = outputs[self.config.score_output.as_str()]
            .try_extract_array()
            .context("Failed to extract face score tensor")?;
        let logit = score.iter().next().copied().unwrap_or(f32::NEG_INFINITY);

        Ok((raw, logit))
    }

    /// 指定領域で1回推論し、閾値以上ならフレーム座標のメッシュを返す
    fn detect_in(&mut self, frame: &Mat, region: CropRegion, threshold: f32) -> Result<Option<FaceMesh>> {
        let input = if region.is_full() {
            preprocess_for_face_mesh(frame, self.config.input_size)?
        } else {
            let cropped = crop_frame(frame, &region)?;
            preprocess_for_face_mesh(&cropped, self.config.input_size)?
        };

        let (raw, logit) = self.infer(input)?;
        let (points, score) = decode_face_mesh(&raw, logit, self.config.input_size)?;
        if score < threshold {
            debug!("Face score {:.3} below threshold {:.2}", score, threshold);
            return Ok(None);
        }

        let points = if region.is_full() {
            points
        } else {
            remap_landmarks(&points, &region)
        };
        Ok(Some(FaceMesh::new(points, score)))
    }
}

impl FaceDetector<Mat> for FaceMeshDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<FaceMesh>> {
        let mut mesh = None;

        if let Some(roi) = self.roi.take() {
            mesh = match self.detect_in(frame, roi, self.config.min_tracking_confidence) {
                Ok(found) => found,
                Err(e) => {
                    debug!("Tracking inference failed: {:#}", e);
                    None
                }
            };
            if mesh.is_none() {
                debug!("Tracking lost, falling back to face detection");
            }
        }

        let frame_w = frame.cols().max(1) as u32;
        let frame_h = frame.rows().max(1) as u32;

        if mesh.is_none() {
            // 顔検出 -> ROI -> face mesh
            if let Some(bbox) = self.face_finder.detect(frame)? {
                let region = roi_from_bbox(&bbox, frame_w, frame_h);
                mesh = self.detect_in(frame, region, self.config.min_detection_confidence)?;
            }
        }

        self.roi = mesh
            .as_ref()
            .and_then(|m| bbox_from_landmarks(m, frame_w, frame_h))
            .map(|bbox| roi_from_bbox(&bbox, frame_w, frame_h));

        Ok(mesh.into_iter().collect())
    }

    fn reset(&mut self) {
        self.roi = None;
    }
}

/// 出力テンソルをデコード
///
/// raw: 468 * 3 の (x, y, z)（入力画像のピクセル座標）
/// logit: 顔の存在スコア（sigmoid前）
pub fn decode_face_mesh(raw: &[f32], logit: f32, input_size: i32) -> Result<(Vec<Landmark>, f32)> {
    let expected = FACE_MESH_POINT_COUNT * 3;
    if raw.len() < expected {
        anyhow::bail!(
            "Landmark tensor too small: {} values, expected {}",
            raw.len(),
            expected
        );
    }

    let scale = 1.0 / input_size as f32;
    let points = raw[..expected]
        .chunks_exact(3)
        .map(|c| Landmark::new(c[0] * scale, c[1] * scale, c[2] * scale))
        .collect();

    Ok((points, sigmoid(logit)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.99);
        assert!(sigmoid(-10.0) < 0.01);
        assert_eq!(sigmoid(f32::NEG_INFINITY), 0.0);
    }

    #[test]
    fn test_decode_face_mesh() {
        let mut raw = vec![0.0f32; FACE_MESH_POINT_COUNT * 3];
        raw[0] = 96.0;
        raw[1] = 48.0;
        raw[2] = 19.2;
        let (points, score) = decode_face_mesh(&raw, 0.0, 192).unwrap();
        assert_eq!(points.len(), FACE_MESH_POINT_COUNT);
        assert!((points[0].x - 0.5).abs() < 1e-6);
        assert!((points[0].y - 0.25).abs() < 1e-6);
        assert!((points[0].z - 0.1).abs() < 1e-6);
        assert!((score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_decode_face_mesh_too_small() {
        let raw = vec![0.0f32; 100];
        assert!(decode_face_mesh(&raw, 1.0, 192).is_err());
    }
}
