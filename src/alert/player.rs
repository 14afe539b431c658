use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use thiserror::Error;
use tracing::{debug, error, info};

use super::resampler::resample_clip;

/// 最後のサンプルを渡してからデバイスのバッファが空になるまでの待ち
const DRAIN_MS: u64 = 150;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Alert sound not found: {0}")]
    Missing(PathBuf),
    #[error("Failed to decode alert sound: {0}")]
    Decode(String),
    #[error("No audio output device available")]
    NoOutputDevice,
    #[error("Audio device error: {0}")]
    Device(String),
    #[error("Unsupported output sample format: {0}")]
    UnsupportedFormat(String),
    #[error("Failed to resample alert sound: {0}")]
    Resample(String),
    #[error("Playback did not complete within {0:?}")]
    Timeout(Duration),
}

/// Blocking playback of the alert sound. Runs on the alert worker thread.
pub trait AlertPlayer: Send {
    fn play(&mut self) -> Result<(), PlaybackError>;
}

/// Decoded mono clip.
#[derive(Debug, Clone)]
struct Clip {
    samples: Vec<f32>,
    sample_rate: u32,
}

/// Plays a WAV file on the default output device.
///
/// The file is decoded on first use and cached, then resampled to the device
/// rate on each play; `play` returns once the last
/// sample has been handed to the device.
pub struct WavPlayer {
    path: PathBuf,
    grace: Duration,
    clip: Option<Clip>,
}

impl WavPlayer {
    pub fn new<P: AsRef<Path>>(path: P, grace: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            grace,
            clip: None,
        }
    }

    fn clip(&mut self) -> Result<&Clip, PlaybackError> {
        if self.clip.is_none() {
            let clip = load_clip(&self.path)?;
            info!(
                "Alert sound loaded: {} ({} samples @ {} Hz)",
                self.path.display(),
                clip.samples.len(),
                clip.sample_rate
            );
            self.clip = Some(clip);
        }
        self.clip
            .as_ref()
            .ok_or_else(|| PlaybackError::Decode("clip cache empty".to_string()))
    }
}

impl AlertPlayer for WavPlayer {
    fn play(&mut self) -> Result<(), PlaybackError> {
        let grace = self.grace;
        let clip = self.clip()?.clone();

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(PlaybackError::NoOutputDevice)?;
        let supported = device
            .default_output_config()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let rate = config.sample_rate.0;
        let channels = config.channels as usize;

        let samples = interleave(&resample_clip(&clip.samples, clip.sample_rate, rate)?, channels);
        let clip_len = Duration::from_secs_f64(samples.len() as f64 / (rate as f64 * channels.max(1) as f64));
        debug!(
            "Playing alert: {:.2}s, {} Hz, {} ch, {:?}",
            clip_len.as_secs_f64(),
            rate,
            channels,
            sample_format
        );

        let (done_tx, done_rx) = mpsc::channel();
        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, samples, done_tx)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, samples, done_tx)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, samples, done_tx)?,
            other => return Err(PlaybackError::UnsupportedFormat(format!("{:?}", other))),
        };
        stream
            .play()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        let timeout = clip_len + grace;
        done_rx
            .recv_timeout(timeout)
            .map_err(|_| PlaybackError::Timeout(timeout))?;
        thread::sleep(Duration::from_millis(DRAIN_MS));
        drop(stream);
        Ok(())
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    samples: Vec<f32>,
    done: mpsc::Sender<()>,
) -> Result<Stream, PlaybackError>
where
    T: SizedSample + FromSample<f32>,
{
    let mut position = 0usize;
    let mut notified = false;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for out in data.iter_mut() {
                    let s = samples.get(position).copied().unwrap_or(0.0);
                    *out = T::from_sample(s);
                    position += 1;
                }
                if !notified && position >= samples.len() {
                    notified = true;
                    let _ = done.send(());
                }
            },
            |err| error!("Audio output stream error: {}", err),
            None,
        )
        .map_err(|e| PlaybackError::Device(e.to_string()))
}

fn load_clip(path: &Path) -> Result<Clip, PlaybackError> {
    if !path.exists() {
        return Err(PlaybackError::Missing(path.to_path_buf()));
    }

    let reader = hound::WavReader::open(path).map_err(|e| PlaybackError::Decode(e.to_string()))?;
    let spec = reader.spec();
    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| PlaybackError::Decode(e.to_string()))?,
        hound::SampleFormat::Int => {
            let full_scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<_, _>>()
                .map_err(|e| PlaybackError::Decode(e.to_string()))?
        }
    };

    if spec.sample_rate == 0 {
        return Err(PlaybackError::Decode("sample rate is 0".to_string()));
    }

    Ok(Clip {
        samples: downmix(&interleaved, spec.channels as usize),
        sample_rate: spec.sample_rate,
    })
}

/// Interleaved multi-channel -> mono (channel average).
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Mono -> interleaved, same sample on every channel.
fn interleave(mono: &[f32], channels: usize) -> Vec<f32> {
    let channels = channels.max(1);
    let mut out = Vec::with_capacity(mono.len() * channels);
    for &s in mono {
        out.extend(std::iter::repeat(s).take(channels));
    }
    out
}
