//! Audio backend configuration

use serde::{Deserialize, Serialize};

/// Maximum buffer size to pre-allocate (covers typical configurations)
/// Common values: 64, 128, 256, 512, 1024, 2048, 4096 frames
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default buffer size when no preference is specified (frames)
/// 512 frames is a safe default that works on most systems
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Default sample rate for the audio system (48kHz)
/// Tracks are resampled to this rate at load time, so the render path
/// never needs rate conversion.
pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

/// Preferred buffer size for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the system choose the default buffer size
    #[default]
    Default,
    /// Request a specific buffer size in frames (may be adjusted by the system)
    Fixed(u32),
}

impl BufferSize {
    /// Get the buffer size in frames, or None for system default
    pub fn as_frames(&self) -> Option<u32> {
        match self {
            BufferSize::Default => None,
            BufferSize::Fixed(frames) => Some(*frames),
        }
    }
}

/// Audio device identifier
///
/// Includes both the device name and the host backend so devices from
/// different hosts can be told apart on systems with several backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "Alsa", "CoreAudio")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }
}

/// Configuration for the audio backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Output device (None = system default)
    pub device: Option<DeviceId>,

    /// Preferred buffer size
    #[serde(default)]
    pub buffer_size: BufferSize,

    /// Preferred sample rate (None = DEFAULT_SAMPLE_RATE)
    pub sample_rate: Option<u32>,
}

impl AudioConfig {
    /// Set the output device
    pub fn with_device(mut self, device: DeviceId) -> Self {
        self.device = Some(device);
        self
    }

    /// Set a fixed buffer size in frames
    pub fn with_buffer_frames(mut self, frames: u32) -> Self {
        self.buffer_size = BufferSize::Fixed(frames);
        self
    }

    /// Set the preferred sample rate
    pub fn with_sample_rate(mut self, rate: u32) -> Self {
        self.sample_rate = Some(rate);
        self
    }
}
