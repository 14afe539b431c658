use rubato::{FftFixedIn, Resampler};
use tracing::debug;

use super::player::PlaybackError;

/// FftFixedIn に渡す1回あたりの入力フレーム数
const CHUNK_FRAMES: usize = 1024;

/// Converts a whole mono clip from `from_rate` to `to_rate`.
///
/// The clip is fed in fixed-size chunks (the tail zero-padded), the
/// resampler's output delay is trimmed from the front and the result is cut
/// to `len * to_rate / from_rate` samples.
pub fn resample_clip(input: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, PlaybackError> {
    if from_rate == to_rate || input.is_empty() {
        return Ok(input.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(PlaybackError::Resample(format!(
            "invalid rate {} Hz -> {} Hz",
            from_rate, to_rate
        )));
    }

    let mut resampler = FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        CHUNK_FRAMES,
        2, // sub_chunks
        1, // mono
    )
    .map_err(|e| PlaybackError::Resample(e.to_string()))?;

    let expected = (input.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let delay = resampler.output_delay();
    debug!(
        "Resampling alert clip: {} Hz -> {} Hz, {} -> {} samples (delay {})",
        from_rate,
        to_rate,
        input.len(),
        expected,
        delay
    );

    let mut chunk = vec![Vec::with_capacity(CHUNK_FRAMES)];
    let mut output_buffer = resampler.output_buffer_allocate(true);
    let mut output = Vec::with_capacity(expected + delay + output_buffer[0].len());
    let mut position = 0usize;

    while output.len() < expected + delay {
        let needed = resampler.input_frames_next();
        chunk[0].resize(needed, 0.0);
        chunk[0].fill(0.0);
        let available = input.len().saturating_sub(position).min(needed);
        if available > 0 {
            chunk[0][..available].copy_from_slice(&input[position..position + available]);
        }
        position += needed;

        let (_, produced) = resampler
            .process_into_buffer(&chunk, &mut output_buffer, None)
            .map_err(|e| PlaybackError::Resample(e.to_string()))?;
        output.extend_from_slice(&output_buffer[0][..produced]);
    }

    output.drain(..delay.min(output.len()));
    output.truncate(expected);
    Ok(output)
}
