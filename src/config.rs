use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::face::{LandmarkLayout, FACE_DETECTION_INPUT_SIZE, FACE_MESH_INPUT_SIZE};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub drowsiness: DrowsinessConfig,
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub landmarks: LandmarkLayout,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// カメラindex（デフォルトカメラ: 0）
    #[serde(default)]
    pub index: i32,
    /// 要求解像度（未指定ならデバイスのまま）
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub fps: Option<u32>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: None,
            height: None,
            fps: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// face mesh ONNX モデルのパス
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// 入力サイズ（正方形）
    #[serde(default = "default_input_size")]
    pub input_size: i32,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    /// 468x3 のランドマーク出力
    #[serde(default = "default_landmarks_output")]
    pub landmarks_output: String,
    /// 顔の存在スコア出力（logit）
    #[serde(default = "default_score_output")]
    pub score_output: String,
    /// 顔検出 (BlazeFace short range) ONNX モデルのパス
    #[serde(default = "default_face_model_path")]
    pub face_model_path: String,
    #[serde(default = "default_face_input_size")]
    pub face_input_size: i32,
    #[serde(default = "default_face_input_name")]
    pub face_input_name: String,
    /// [1, anchors, 16] のボックス回帰出力
    #[serde(default = "default_face_boxes_output")]
    pub face_boxes_output: String,
    /// [1, anchors, 1] のスコア出力（logit）
    #[serde(default = "default_face_scores_output")]
    pub face_scores_output: String,
    /// 顔検出とface meshの初回スコアに使う
    #[serde(default = "default_confidence")]
    pub min_detection_confidence: f32,
    #[serde(default = "default_confidence")]
    pub min_tracking_confidence: f32,
}

fn default_model_path() -> String { "models/face_landmark.onnx".to_string() }
fn default_input_size() -> i32 { FACE_MESH_INPUT_SIZE }
fn default_input_name() -> String { "input_1".to_string() }
fn default_landmarks_output() -> String { "conv2d_21".to_string() }
fn default_score_output() -> String { "conv2d_31".to_string() }
fn default_face_model_path() -> String { "models/face_detection_short_range.onnx".to_string() }
fn default_face_input_size() -> i32 { FACE_DETECTION_INPUT_SIZE }
fn default_face_input_name() -> String { "input".to_string() }
fn default_face_boxes_output() -> String { "regressors".to_string() }
fn default_face_scores_output() -> String { "classificators".to_string() }
fn default_confidence() -> f32 { 0.5 }

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: default_model_path(),
            input_size: default_input_size(),
            input_name: default_input_name(),
            landmarks_output: default_landmarks_output(),
            score_output: default_score_output(),
            face_model_path: default_face_model_path(),
            face_input_size: default_face_input_size(),
            face_input_name: default_face_input_name(),
            face_boxes_output: default_face_boxes_output(),
            face_scores_output: default_face_scores_output(),
            min_detection_confidence: default_confidence(),
            min_tracking_confidence: default_confidence(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DrowsinessConfig {
    /// 両目のEARがこれ未満なら閉眼フレーム
    #[serde(default = "default_eye_closed_threshold")]
    pub eye_closed_threshold: f32,
    /// 閉眼アラートまでの連続フレーム数
    #[serde(default = "default_eye_closed_debounce_frames")]
    pub eye_closed_debounce_frames: u32,
    /// MAR（%）がこれを超えたらあくびフレーム
    #[serde(default = "default_yawn_ratio_threshold")]
    pub yawn_ratio_threshold: f32,
    /// あくびアラートまでの連続フレーム数
    #[serde(default = "default_yawn_debounce_frames")]
    pub yawn_debounce_frames: u32,
}

fn default_eye_closed_threshold() -> f32 { 0.2 }
fn default_eye_closed_debounce_frames() -> u32 { 48 }
fn default_yawn_ratio_threshold() -> f32 { 35.0 }
fn default_yawn_debounce_frames() -> u32 { 10 }

impl Default for DrowsinessConfig {
    fn default() -> Self {
        Self {
            eye_closed_threshold: default_eye_closed_threshold(),
            eye_closed_debounce_frames: default_eye_closed_debounce_frames(),
            yawn_ratio_threshold: default_yawn_ratio_threshold(),
            yawn_debounce_frames: default_yawn_debounce_frames(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    /// アラート音（WAV）
    #[serde(default = "default_sound_path")]
    pub sound_path: String,
    /// 再生完了待ちの猶予（クリップ長に加算）
    #[serde(default = "default_playback_grace_ms")]
    pub playback_grace_ms: u64,
}

fn default_sound_path() -> String { "alert.wav".to_string() }
fn default_playback_grace_ms() -> u64 { 2000 }

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            sound_path: default_sound_path(),
            playback_grace_ms: default_playback_grace_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_title")]
    pub title: String,
    /// 目・口のランドマークを描画する
    #[serde(default = "default_show_landmarks")]
    pub show_landmarks: bool,
}

fn default_title() -> String { "Yawning and Eye Closure Detection".to_string() }
fn default_show_landmarks() -> bool { true }

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            show_landmarks: default_show_landmarks(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("{name} must be within {range}, got {value}")]
    OutOfRange {
        name: &'static str,
        range: &'static str,
        value: f64,
    },
}

fn check_range(name: &'static str, range: &'static str, value: f64, ok: bool) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange { name, range, value })
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// ファイルが無ければデフォルト設定。あるのに読めない・壊れているならエラー。
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("Config file {} not found; using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.drowsiness;
        check_range(
            "drowsiness.eye_closed_threshold",
            "(0, 2]",
            d.eye_closed_threshold as f64,
            d.eye_closed_threshold > 0.0 && d.eye_closed_threshold <= 2.0,
        )?;
        check_range(
            "drowsiness.eye_closed_debounce_frames",
            ">= 1",
            d.eye_closed_debounce_frames as f64,
            d.eye_closed_debounce_frames >= 1,
        )?;
        check_range(
            "drowsiness.yawn_ratio_threshold",
            "> 0",
            d.yawn_ratio_threshold as f64,
            d.yawn_ratio_threshold > 0.0,
        )?;
        check_range(
            "drowsiness.yawn_debounce_frames",
            ">= 1",
            d.yawn_debounce_frames as f64,
            d.yawn_debounce_frames >= 1,
        )?;

        let det = &self.detector;
        check_range(
            "detector.min_detection_confidence",
            "[0, 1]",
            det.min_detection_confidence as f64,
            (0.0..=1.0).contains(&det.min_detection_confidence),
        )?;
        check_range(
            "detector.min_tracking_confidence",
            "[0, 1]",
            det.min_tracking_confidence as f64,
            (0.0..=1.0).contains(&det.min_tracking_confidence),
        )?;
        check_range(
            "detector.input_size",
            ">= 16",
            det.input_size as f64,
            det.input_size >= 16,
        )?;
        check_range(
            "detector.face_input_size",
            "multiple of 16",
            det.face_input_size as f64,
            det.face_input_size >= 16 && det.face_input_size % 16 == 0,
        )?;
        check_range(
            "camera.index",
            ">= 0",
            self.camera.index as f64,
            self.camera.index >= 0,
        )?;
        Ok(())
    }
}
