use anyhow::{Context, Result};
use minifb::{Key, KeyRepeat, Window, WindowOptions};
use opencv::core::{Mat, Point, Scalar, Size};
use opencv::imgproc;
use opencv::prelude::*;

use super::overlay::{FrameOverlay, ALERT_TEXT_COLOR, EYE_COLOR, MOUTH_COLOR, TEXT_COLOR};
use super::FrameDisplay;
use crate::face::Landmark;

/// 停止キー
pub const STOP_KEY: Key = Key::Q;

const LINE_HEIGHT: i32 = 26;

/// minifbを使用したレンダラー
pub struct MinifbRenderer {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    height: usize,
    show_landmarks: bool,
}

impl MinifbRenderer {
    /// ウィンドウを作成
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self> {
        let window = Window::new(
            title,
            width,
            height,
            WindowOptions {
                resize: false,
                ..WindowOptions::default()
            },
        )
        .context("Failed to create window")?;

        let buffer = vec![0u32; width * height];

        Ok(Self {
            window,
            buffer,
            width,
            height,
            show_landmarks: true,
        })
    }

    pub fn with_landmarks(mut self, show: bool) -> Self {
        self.show_landmarks = show;
        self
    }

    /// BGR Mat をバッファにコピー（サイズが違えばリサイズ）
    pub fn draw_frame(&mut self, frame: &Mat) -> Result<()> {
        let resized;
        let frame = if frame.cols() as usize != self.width || frame.rows() as usize != self.height {
            let mut out = Mat::default();
            imgproc::resize(
                frame,
                &mut out,
                Size::new(self.width as i32, self.height as i32),
                0.0,
                0.0,
                imgproc::INTER_LINEAR,
            )?;
            resized = out;
            &resized
        } else {
            frame
        };

        for y in 0..self.height {
            for x in 0..self.width {
                let pixel = frame.at_2d::<opencv::core::Vec3b>(y as i32, x as i32)?;
                // BGR -> RGB -> u32
                let r = pixel[2] as u32;
                let g = pixel[1] as u32;
                let b = pixel[0] as u32;
                self.buffer[y * self.width + x] = (r << 16) | (g << 8) | b;
            }
        }

        Ok(())
    }

    /// ランドマークを点で描画
    pub fn draw_landmarks(&mut self, points: &[Landmark], color: u32) {
        let w = self.width as u32;
        let h = self.height as u32;
        for lm in points {
            let (px, py) = lm.to_pixel(w, h);
            self.draw_circle(px, py, 2, color);
        }
    }

    /// バッファをウィンドウに表示
    pub fn update(&mut self) -> Result<()> {
        self.window
            .update_with_buffer(&self.buffer, self.width, self.height)?;
        Ok(())
    }

    /// 円を描画（塗りつぶし）
    fn draw_circle(&mut self, cx: i32, cy: i32, radius: i32, color: u32) {
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    self.set_pixel(cx + dx, cy + dy, color);
                }
            }
        }
    }

    /// ピクセルをセット（境界チェック付き）
    fn set_pixel(&mut self, x: i32, y: i32, color: u32) {
        if x >= 0 && x < self.width as i32 && y >= 0 && y < self.height as i32 {
            self.buffer[y as usize * self.width + x as usize] = color;
        }
    }
}

/// 縁取り付きテキスト
fn put_label(frame: &mut Mat, text: &str, origin: Point, scale: f64, color: (f64, f64, f64)) -> Result<()> {
    // 背景（黒）で視認性確保
    imgproc::put_text(
        frame,
        text,
        origin,
        imgproc::FONT_HERSHEY_SIMPLEX,
        scale,
        Scalar::new(0.0, 0.0, 0.0, 0.0),
        4,
        imgproc::LINE_8,
        false,
    )?;
    imgproc::put_text(
        frame,
        text,
        origin,
        imgproc::FONT_HERSHEY_SIMPLEX,
        scale,
        Scalar::new(color.0, color.1, color.2, 0.0),
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

impl FrameDisplay<Mat> for MinifbRenderer {
    fn show(&mut self, frame: &Mat, overlay: &FrameOverlay) -> Result<()> {
        let mut annotated = frame.try_clone()?;

        for (i, line) in overlay.status_lines().iter().enumerate() {
            let origin = Point::new(10, LINE_HEIGHT * (i as i32 + 1));
            put_label(&mut annotated, line, origin, 0.7, TEXT_COLOR)?;
        }
        if let Some(banner) = overlay.banner() {
            let origin = Point::new(10, annotated.rows() - 20);
            put_label(&mut annotated, &banner, origin, 1.0, ALERT_TEXT_COLOR)?;
        }

        self.draw_frame(&annotated)?;
        if self.show_landmarks {
            for face in &overlay.faces {
                self.draw_landmarks(&face.eyes, EYE_COLOR);
                self.draw_landmarks(&face.mouth, MOUTH_COLOR);
            }
        }
        self.update()
    }

    fn stop_requested(&self) -> bool {
        self.window.is_key_pressed(STOP_KEY, KeyRepeat::No)
    }

    fn is_open(&self) -> bool {
        self.window.is_open()
    }
}
