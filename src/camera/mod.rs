pub mod capture;

use anyhow::Result;

pub use capture::OpenCvCamera;

/// フレームの供給元。読めなければErr（ループ終了）。
pub trait FrameSource {
    type Frame;

    fn read_frame(&mut self) -> Result<Self::Frame>;
}
