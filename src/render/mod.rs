pub mod overlay;
pub mod window;

use anyhow::Result;

pub use overlay::{FaceOverlay, FrameOverlay};
pub use window::{MinifbRenderer, STOP_KEY};

/// フレームを表示し、停止キーを報告する表示先
pub trait FrameDisplay<F> {
    fn show(&mut self, frame: &F, overlay: &FrameOverlay) -> Result<()>;

    /// 前回の show 以降に停止キーが押されたか
    fn stop_requested(&self) -> bool;

    fn is_open(&self) -> bool;
}
