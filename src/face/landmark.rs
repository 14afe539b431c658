use std::collections::HashSet;

use serde::Deserialize;
use thiserror::Error;

/// MediaPipe face mesh の点数
pub const FACE_MESH_POINT_COUNT: usize = 468;

/// 目の点数 (p1..p6)
pub const EYE_POINT_COUNT: usize = 6;

/// 口の点数 (p1..p8)
pub const MOUTH_POINT_COUNT: usize = 8;

/// 右目: 外側の目尻, 上瞼 x2, 目頭, 下瞼 x2
pub const RIGHT_EYE: [usize; EYE_POINT_COUNT] = [33, 160, 158, 133, 153, 144];

/// 左目: 目頭, 上瞼 x2, 外側の目尻, 下瞼 x2
pub const LEFT_EYE: [usize; EYE_POINT_COUNT] = [362, 385, 387, 263, 373, 380];

/// 口: 左口角(内側), 上唇内側 x3 (左→右), 右口角(内側), 下唇内側 x3 (右→左)
pub const MOUTH: [usize; MOUTH_POINT_COUNT] = [78, 81, 13, 311, 308, 402, 14, 178];

/// 単一ランドマーク
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    /// 正規化されたX座標 (0.0〜1.0)
    pub x: f32,
    /// 正規化されたY座標 (0.0〜1.0)
    pub y: f32,
    /// 相対深度（顔の幅スケール）
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// 2D平面上の距離
    pub fn distance(&self, other: &Landmark) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// ピクセル座標に変換
    pub fn to_pixel(&self, width: u32, height: u32) -> (i32, i32) {
        let px = (self.x * width as f32) as i32;
        let py = (self.y * height as f32) as i32;
        (px, py)
    }
}

/// 1つの顔の全ランドマーク
#[derive(Debug, Clone)]
pub struct FaceMesh {
    pub points: Vec<Landmark>,
    /// 顔の存在スコア (0.0〜1.0)
    pub score: f32,
}

impl FaceMesh {
    pub fn new(points: Vec<Landmark>, score: f32) -> Self {
        Self { points, score }
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    /// インデックス表に従って固定長のランドマーク列を取り出す
    ///
    /// 点数が足りない場合はNone。
    pub fn select<const N: usize>(&self, indices: &[usize; N]) -> Option<[Landmark; N]> {
        let mut out = [Landmark::default(); N];
        for (slot, &index) in out.iter_mut().zip(indices.iter()) {
            *slot = *self.points.get(index)?;
        }
        Some(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("{set} landmark index {index} is outside the detector topology ({point_count} points)")]
    IndexOutOfRange {
        set: &'static str,
        index: usize,
        point_count: usize,
    },
    #[error("{set} landmark index {index} appears more than once")]
    DuplicateIndex { set: &'static str, index: usize },
}

/// 目・口のインデックス表
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LandmarkLayout {
    #[serde(default = "default_right_eye")]
    pub right_eye: [usize; EYE_POINT_COUNT],
    #[serde(default = "default_left_eye")]
    pub left_eye: [usize; EYE_POINT_COUNT],
    #[serde(default = "default_mouth")]
    pub mouth: [usize; MOUTH_POINT_COUNT],
}

fn default_right_eye() -> [usize; EYE_POINT_COUNT] { RIGHT_EYE }
fn default_left_eye() -> [usize; EYE_POINT_COUNT] { LEFT_EYE }
fn default_mouth() -> [usize; MOUTH_POINT_COUNT] { MOUTH }

impl Default for LandmarkLayout {
    fn default() -> Self {
        Self {
            right_eye: RIGHT_EYE,
            left_eye: LEFT_EYE,
            mouth: MOUTH,
        }
    }
}

impl LandmarkLayout {
    /// 起動時に一度だけ呼ぶ。範囲外・重複インデックスは設定エラー。
    pub fn validate(&self, point_count: usize) -> Result<(), LayoutError> {
        check_set("right eye", &self.right_eye, point_count)?;
        check_set("left eye", &self.left_eye, point_count)?;
        check_set("mouth", &self.mouth, point_count)?;
        Ok(())
    }
}

fn check_set(set: &'static str, indices: &[usize], point_count: usize) -> Result<(), LayoutError> {
    let mut seen = HashSet::with_capacity(indices.len());
    for &index in indices {
        if index >= point_count {
            return Err(LayoutError::IndexOutOfRange {
                set,
                index,
                point_count,
            });
        }
        if !seen.insert(index) {
            return Err(LayoutError::DuplicateIndex { set, index });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_is_valid() {
        assert_eq!(LandmarkLayout::default().validate(FACE_MESH_POINT_COUNT), Ok(()));
    }

    #[test]
    fn test_layout_index_out_of_range() {
        let mut layout = LandmarkLayout::default();
        layout.mouth[3] = 468;
        assert_eq!(
            layout.validate(FACE_MESH_POINT_COUNT),
            Err(LayoutError::IndexOutOfRange {
                set: "mouth",
                index: 468,
                point_count: FACE_MESH_POINT_COUNT,
            })
        );
    }

    #[test]
    fn test_layout_duplicate_index() {
        let mut layout = LandmarkLayout::default();
        // 元のリストにあった 163 の重複のようなケース
        layout.right_eye = [33, 160, 158, 133, 153, 133];
        assert_eq!(
            layout.validate(FACE_MESH_POINT_COUNT),
            Err(LayoutError::DuplicateIndex { set: "right eye", index: 133 })
        );
    }

    #[test]
    fn test_landmark_distance() {
        let a = Landmark::new(0.0, 0.0, 0.0);
        let b = Landmark::new(0.3, 0.4, 5.0);
        assert!((a.distance(&b) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_landmark_to_pixel() {
        let lm = Landmark::new(0.5, 0.25, 0.0);
        assert_eq!(lm.to_pixel(640, 480), (320, 120));
    }

    #[test]
    fn test_mesh_select() {
        let points = (0..10).map(|i| Landmark::new(i as f32, 0.0, 0.0)).collect();
        let mesh = FaceMesh::new(points, 1.0);
        let picked = mesh.select(&[3, 1, 7]).unwrap();
        assert_eq!(picked[0].x, 3.0);
        assert_eq!(picked[1].x, 1.0);
        assert_eq!(picked[2].x, 7.0);
        assert!(mesh.select(&[3, 10]).is_none());
    }
}
