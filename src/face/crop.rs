use anyhow::Result;
use opencv::{
    core::{Mat, Rect},
    prelude::*,
};

use super::landmark::{FaceMesh, Landmark};

/// 前フレームのランドマークからROIを作るときの拡張率
pub const ROI_EXPAND: f32 = 1.5;

/// クロップ領域（正規化座標 0.0〜1.0）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CropRegion {
    pub fn full() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: 1.0,
            height: 1.0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.width >= 1.0 && self.height >= 1.0
    }

    /// ピクセル座標の矩形に変換（最低1px）
    pub fn to_rect(&self, frame_w: i32, frame_h: i32) -> Rect {
        let fw = frame_w as f32;
        let fh = frame_h as f32;
        let x = ((self.x * fw) as i32).clamp(0, (frame_w - 1).max(0));
        let y = ((self.y * fh) as i32).clamp(0, (frame_h - 1).max(0));
        let w = ((self.width * fw) as i32).clamp(1, (frame_w - x).max(1));
        let h = ((self.height * fh) as i32).clamp(1, (frame_h - y).max(1));
        Rect::new(x, y, w, h)
    }
}

/// BBox（ピクセル座標）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// ランドマークのmin/maxからBBoxを返す。幅か高さが0ならNone。
pub fn bbox_from_landmarks(mesh: &FaceMesh, frame_w: u32, frame_h: u32) -> Option<BBox> {
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;

    for lm in &mesh.points {
        let px = lm.x * frame_w as f32;
        let py = lm.y * frame_h as f32;
        min_x = min_x.min(px);
        min_y = min_y.min(py);
        max_x = max_x.max(px);
        max_y = max_y.max(py);
    }

    let width = max_x - min_x;
    let height = max_y - min_y;
    if !(width > 0.0 && height > 0.0) {
        return None;
    }

    Some(BBox {
        x: min_x,
        y: min_y,
        width,
        height,
    })
}

/// BBoxから次フレーム用のROIを計算
///
/// - 長辺に合わせて正方形にする（face mesh の入力は正方形）
/// - ROI_EXPAND 倍に拡張（中心を保持）
/// - フレーム境界にクリップ
pub fn roi_from_bbox(bbox: &BBox, frame_w: u32, frame_h: u32) -> CropRegion {
    let cx = bbox.x + bbox.width / 2.0;
    let cy = bbox.y + bbox.height / 2.0;
    let side = bbox.width.max(bbox.height) * ROI_EXPAND;

    let fw = frame_w as f32;
    let fh = frame_h as f32;
    let x = (cx - side / 2.0).max(0.0);
    let y = (cy - side / 2.0).max(0.0);
    let w = side.min(fw - x);
    let h = side.min(fh - y);

    CropRegion {
        x: x / fw,
        y: y / fh,
        width: w / fw,
        height: h / fh,
    }
}

/// ROIでフレームをクロップ
pub fn crop_frame(frame: &Mat, region: &CropRegion) -> Result<Mat> {
    let rect = region.to_rect(frame.cols(), frame.rows());
    let cropped = Mat::roi(frame, rect)?;
    Ok(cropped.try_clone()?)
}

/// クロップ画像内の正規化座標をフレーム全体の正規化座標に変換
pub fn remap_landmarks(points: &[Landmark], crop: &CropRegion) -> Vec<Landmark> {
    points
        .iter()
        .map(|lm| Landmark {
            x: crop.x + lm.x * crop.width,
            y: crop.y + lm.y * crop.height,
            z: lm.z * crop.width,
        })
        .collect()
}
