use anyhow::Result;
use ndarray::Array4;
use opencv::{
    core::{AlgorithmHint, Mat, Size, CV_32FC3},
    imgproc,
    prelude::*,
};

/// face mesh の入力サイズ
pub const FACE_MESH_INPUT_SIZE: i32 = 192;

/// 顔検出 (BlazeFace) の入力サイズ
pub const FACE_DETECTION_INPUT_SIZE: i32 = 128;

/// OpenCV Mat を face mesh 用の入力テンソルに変換
///
/// - BGR -> RGB
/// - input_size x input_size にリサイズ
/// - [1, input_size, input_size, 3] の f32 テンソルに変換 (0.0-1.0)
pub fn preprocess_for_face_mesh(frame: &Mat, input_size: i32) -> Result<Array4<f32>> {
    to_rgb_nhwc(frame, input_size, 1.0 / 255.0, 0.0)
}

/// 顔検出用。値域は -1.0〜1.0
pub fn preprocess_for_face_detection(frame: &Mat, input_size: i32) -> Result<Array4<f32>> {
    to_rgb_nhwc(frame, input_size, 2.0 / 255.0, -1.0)
}

/// RGB に変換・リサイズし、v * alpha + beta で NHWC テンソルにする
fn to_rgb_nhwc(frame: &Mat, input_size: i32, alpha: f64, beta: f64) -> Result<Array4<f32>> {
    // BGR -> RGB
    let mut rgb = Mat::default();
    imgproc::cvt_color(frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0, AlgorithmHint::ALGO_HINT_DEFAULT)?;

    let mut resized = Mat::default();
    imgproc::resize(
        &rgb,
        &mut resized,
        Size::new(input_size, input_size),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let mut float_mat = Mat::default();
    resized.convert_to(&mut float_mat, CV_32FC3, alpha, beta)?;

    let size = input_size as usize;
    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));

    for y in 0..input_size {
        for x in 0..input_size {
            let pixel = float_mat.at_2d::<opencv::core::Vec3f>(y, x)?;
            tensor[[0, y as usize, x as usize, 0]] = pixel[0];
            tensor[[0, y as usize, x as usize, 1]] = pixel[1];
            tensor[[0, y as usize, x as usize, 2]] = pixel[2];
        }
    }

    Ok(tensor)
}
