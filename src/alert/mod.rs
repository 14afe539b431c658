pub mod dispatcher;
pub mod player;
pub mod resampler;

pub use dispatcher::{AlertDispatcher, AlertFinished, AlertRequest};
pub use player::{AlertPlayer, PlaybackError, WavPlayer};
pub use resampler::resample_clip;
