//! # Audio Capture Module
//!
//! Real-time microphone capture using CPAL (Cross-Platform Audio Library).
//! Samples from the device callback are folded to mono, cut into fixed-size
//! frames and handed to the analysis thread over a crossbeam channel.
//!
//! ## Audio Configuration
//! - Format: 32-bit float
//! - Channels: mono preferred; otherwise the first channel is used
//! - Sample rate: closest supported rate to the requested one
//! - Frame: 4096 samples by default (~93ms at 44.1kHz)

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SupportedStreamConfigRange;
use crossbeam_channel::Sender;
use tracing::{error, info, warn};

/// Default number of samples per analysis frame.
pub const BUFFER_SIZE: usize = 4096;

/// Messages from the capture callback to the analysis thread.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// A full mono frame
    Frame(Vec<f32>),
    /// The stream failed; no more frames will arrive
    Lost(String),
}

/// Accumulates interleaved device buffers into fixed-size mono frames.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    channels: usize,
    buffer: Vec<f32>,
}

impl FrameAssembler {
    pub fn new(frame_size: usize, channels: usize) -> Self {
        Self {
            frame_size,
            channels: channels.max(1),
            buffer: Vec::with_capacity(frame_size * 2),
        }
    }

    /// Appends interleaved `data` and calls `emit` once per completed frame.
    pub fn push(&mut self, data: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        self.buffer.extend(data.iter().step_by(self.channels).copied());

        // While we have enough data for a full frame, hand it off.
        while self.buffer.len() >= self.frame_size {
            let frame = self.buffer[..self.frame_size].to_vec();
            self.buffer.drain(..self.frame_size);
            emit(frame);
        }
    }
}

/// Starts audio capture from the default input device.
///
/// # Arguments
/// * `sender` - Channel for frames and stream failures
/// * `target_rate` - Preferred sample rate in Hz
/// * `frame_size` - Samples per frame sent to the analysis thread
///
/// # Returns
/// * `Ok((stream, sample_rate))` - Running stream handle and the actual rate
/// * `Err(e)` - No device, no f32 input format, or the stream failed to start
pub fn start_audio_capture(
    sender: Sender<CaptureEvent>,
    target_rate: u32,
    frame_size: usize,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    info!("[audio] using input device: {}", device.name()?);

    let configs = device
        .supported_input_configs()
        .context("querying input configurations")?
        .collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, target_rate)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let rate = target_rate.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    );
    let config = supported_config.with_sample_rate(cpal::SampleRate(rate));
    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let config: cpal::StreamConfig = config.into();

    info!("[audio] sample rate: {sample_rate} Hz, channels: {channels}, frame: {frame_size}");
    if sample_rate != target_rate {
        warn!("[audio] requested {target_rate} Hz, device runs at {sample_rate} Hz");
    }

    let error_sender = sender.clone();
    let err_fn = move |err: cpal::StreamError| {
        error!("[audio] stream error: {err}");
        let _ = error_sender.try_send(CaptureEvent::Lost(err.to_string()));
    };

    let mut assembler = FrameAssembler::new(frame_size, channels);
    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            // Drop the frame if the analysis thread is behind.
            assembler.push(data, |frame| {
                let _ = sender.try_send(CaptureEvent::Frame(frame));
            });
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate))
}

/// Picks the f32 input configuration closest to what the tuner wants.
///
/// Mono beats multi-channel; among equals, the range nearest to
/// `target_rate` wins.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let min = c.min_sample_rate().0;
            let max = c.max_sample_rate().0;
            let distance = if (min..=max).contains(&target_rate) {
                0
            } else {
                target_rate.abs_diff(min).min(target_rate.abs_diff(max))
            };
            (c.channels(), distance)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembler_emits_full_frames() {
        let mut assembler = FrameAssembler::new(4, 1);
        let mut frames = Vec::new();

        assembler.push(&[1.0, 2.0, 3.0], |f| frames.push(f));
        assert!(frames.is_empty());
        assert_eq!(assembler.buffer.len(), 3);

        assembler.push(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0], |f| frames.push(f));
        assert_eq!(frames, vec![vec![1.0, 2.0, 3.0, 4.0], vec![5.0, 6.0, 7.0, 8.0]]);
        assert_eq!(assembler.buffer.len(), 1);
    }

    #[test]
    fn test_assembler_takes_first_channel() {
        let mut assembler = FrameAssembler::new(3, 2);
        let mut frames = Vec::new();
        assembler.push(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0], |f| frames.push(f));
        assert_eq!(frames, vec![vec![1.0, 2.0, 3.0]]);
    }

    #[test]
    fn test_assembler_zero_channels_is_mono() {
        let mut assembler = FrameAssembler::new(2, 0);
        let mut frames = Vec::new();
        assembler.push(&[0.5, 0.25], |f| frames.push(f));
        assert_eq!(frames, vec![vec![0.5, 0.25]]);
    }
}
