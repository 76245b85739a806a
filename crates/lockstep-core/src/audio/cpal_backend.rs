//! cpal audio backend
//!
//! Builds a single stereo output stream. The callback owns the engine
//! outright; no mutex sits between the device and the render path because
//! nothing else ever touches the engine after startup.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::backend::{AudioHandle, AudioSystemResult, CommandSender};
use super::config::{AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE};
use super::error::{AudioError, AudioResult};
use crate::engine::{command_channel, AnalysisTap, AudioEngine, TransportAtomics};

/// cpal-specific audio handle
///
/// Keeps the output stream alive. Drop this to stop audio.
pub struct CpalAudioHandle {
    _stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl CpalAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }
}

/// Start the audio system on the configured (or default) output device
pub fn start_audio_system(config: &AudioConfig) -> AudioResult<AudioSystemResult> {
    let device = find_output_device(config)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let (supported_config, buffer_size) = get_output_config(&device, config)?;
    let sample_rate = supported_config.sample_rate().0;

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    let latency_ms = (buffer_size as f32 / sample_rate as f32) * 1000.0;
    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        latency_ms
    );

    let (command_tx, command_rx) = command_channel();
    let transport = Arc::new(TransportAtomics::new());
    let analysis_tap = AnalysisTap::new();

    let mut engine = AudioEngine::new(
        sample_rate,
        command_rx,
        Arc::clone(&transport),
        analysis_tap.clone(),
    );

    let channels = stream_config.channels as usize;
    let mut scratch = vec![0.0f32; MAX_BUFFER_SIZE * 2];

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let n_frames = data.len() / channels;
                let needed = (n_frames * 2).min(scratch.len());
                engine.process(&mut scratch[..needed]);

                for (i, frame) in data.chunks_mut(channels).enumerate() {
                    let (left, right) = if i * 2 + 1 < needed {
                        (scratch[i * 2], scratch[i * 2 + 1])
                    } else {
                        (0.0, 0.0)
                    };
                    frame[0] = left;
                    if channels > 1 {
                        frame[1] = right;
                    }
                    for ch in frame.iter_mut().skip(2) {
                        *ch = 0.0;
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!("Audio stream started");

    let handle = CpalAudioHandle {
        _stream: stream,
        sample_rate,
        buffer_size,
    };

    Ok(AudioSystemResult {
        handle: AudioHandle::Cpal(handle),
        command_sender: CommandSender {
            producer: command_tx,
        },
        transport,
        analysis_tap,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}

/// Resolve the configured device, falling back to the host default
fn find_output_device(config: &AudioConfig) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();

    match &config.device {
        Some(id) => {
            let devices = host
                .output_devices()
                .map_err(|e| AudioError::NoDefaultDevice(e.to_string()))?;
            for device in devices {
                if device.name().map(|n| n == id.name).unwrap_or(false) {
                    return Ok(device);
                }
            }
            Err(AudioError::DeviceNotFound(id.name.clone()))
        }
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::NoDevices),
    }
}

/// Get the best output configuration for a device
///
/// Returns (SupportedStreamConfig, actual_buffer_size_in_frames)
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let target_sample_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);

    // Prefer f32, stereo, and the requested sample rate.
    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(|c| {
            target_sample_rate >= c.min_sample_rate().0
                && target_sample_rate <= c.max_sample_rate().0
        })
        .or_else(|| supported_configs.iter().find(|c| c.channels() >= 2))
        .or_else(|| supported_configs.first())
        .ok_or_else(|| {
            AudioError::ConfigError("No suitable output configuration found".to_string())
        })?;

    let sample_rate = if target_sample_rate >= best_config.min_sample_rate().0
        && target_sample_rate <= best_config.max_sample_rate().0
    {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz (tracks will be resampled)",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    let stream_config = best_config.clone().with_sample_rate(sample_rate);

    let buffer_size = match config.buffer_size {
        BufferSize::Default => DEFAULT_BUFFER_SIZE,
        BufferSize::Fixed(frames) => frames.clamp(64, MAX_BUFFER_SIZE as u32),
    };

    Ok((stream_config, buffer_size))
}
