//! Eye / mouth aspect ratios computed from ordered landmark sets.

use crate::face::{FaceMesh, Landmark, LandmarkLayout, EYE_POINT_COUNT, MOUTH_POINT_COUNT};

/// Returned when the horizontal reference width collapses.
pub const DEGENERATE_RATIO: f32 = 0.0;

const MIN_WIDTH: f32 = 1e-6;

/// EAR = (|p2-p6| + |p3-p5|) / (2 * |p1-p4|)
///
/// p1/p4 are the eye corners, p2/p3 the upper lid, p5/p6 the lower lid.
pub fn eye_aspect_ratio(points: &[Landmark; EYE_POINT_COUNT]) -> f32 {
    let [p1, p2, p3, p4, p5, p6] = points;
    let horizontal = p1.distance(p4);
    if horizontal < MIN_WIDTH {
        return DEGENERATE_RATIO;
    }
    let vertical = p2.distance(p6) + p3.distance(p5);
    finite_or_sentinel(vertical / (2.0 * horizontal))
}

/// MAR in percent: mean inner-lip gap over inner-corner width, times 100.
///
/// p1/p5 are the inner corners; (p2,p8), (p3,p7), (p4,p6) the vertical pairs.
pub fn mouth_aspect_ratio(points: &[Landmark; MOUTH_POINT_COUNT]) -> f32 {
    let [p1, p2, p3, p4, p5, p6, p7, p8] = points;
    let horizontal = p1.distance(p5);
    if horizontal < MIN_WIDTH {
        return DEGENERATE_RATIO;
    }
    let vertical = p2.distance(p8) + p3.distance(p7) + p4.distance(p6);
    finite_or_sentinel(100.0 * vertical / (3.0 * horizontal))
}

fn finite_or_sentinel(value: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        DEGENERATE_RATIO
    }
}

/// Per-face metrics for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceMetrics {
    pub right_ear: f32,
    pub left_ear: f32,
    pub mar: f32,
}

impl FaceMetrics {
    /// None if the mesh has fewer points than the layout references.
    pub fn from_mesh(mesh: &FaceMesh, layout: &LandmarkLayout) -> Option<Self> {
        let right = mesh.select(&layout.right_eye)?;
        let left = mesh.select(&layout.left_eye)?;
        let mouth = mesh.select(&layout.mouth)?;
        Some(Self {
            right_ear: eye_aspect_ratio(&right),
            left_ear: eye_aspect_ratio(&left),
            mar: mouth_aspect_ratio(&mouth),
        })
    }
}
