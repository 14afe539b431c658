pub mod blazeface;
pub mod crop;
pub mod detector;
pub mod landmark;
pub mod preprocess;

use anyhow::Result;

pub use blazeface::BlazeFaceDetector;
pub use crop::{bbox_from_landmarks, remap_landmarks, roi_from_bbox, BBox, CropRegion};
pub use detector::FaceMeshDetector;
pub use landmark::{
    FaceMesh, Landmark, LandmarkLayout, LayoutError, EYE_POINT_COUNT, FACE_MESH_POINT_COUNT,
    LEFT_EYE, MOUTH, MOUTH_POINT_COUNT, RIGHT_EYE,
};
pub use preprocess::{
    preprocess_for_face_detection, preprocess_for_face_mesh, FACE_DETECTION_INPUT_SIZE,
    FACE_MESH_INPUT_SIZE,
};

/// 1枚の画像から0個以上の顔のランドマークを返す検出器
pub trait FaceDetector<F> {
    fn detect(&mut self, frame: &F) -> Result<Vec<FaceMesh>>;

    /// 追跡状態を破棄する
    fn reset(&mut self) {}
}
