//! Unified audio backend interface
//!
//! Two backends share one lock-free architecture: the control side sends
//! commands over a ring buffer, the audio thread owns the `AudioEngine`
//! exclusively, and transport state flows back through relaxed atomics.
//! The cpal backend drives a real device; the offline backend drives the
//! same engine from a paced thread for headless and test use.

use std::sync::Arc;

use crate::engine::{AnalysisTap, EngineCommand, TransportAtomics};

use super::config::AudioConfig;
use super::error::AudioResult;

/// Result of starting the audio system
///
/// Contains every handle the control side needs.
pub struct AudioSystemResult {
    /// Handle keeping audio alive (drop to stop)
    pub handle: AudioHandle,
    /// Lock-free command sender for the control thread
    pub command_sender: CommandSender,
    /// Transport atomics for lock-free state reads
    pub transport: Arc<TransportAtomics>,
    /// Post-compressor tap for spectrum analysis
    pub analysis_tap: AnalysisTap,
    /// Sample rate of the audio system
    pub sample_rate: u32,
    /// Actual buffer size in frames
    pub buffer_size: u32,
    /// Audio latency in milliseconds (one-way, output only)
    pub latency_ms: f32,
}

/// Handle to the active audio system
///
/// Keeps the stream or driver thread alive. Drop this to stop audio.
pub enum AudioHandle {
    /// cpal-based device output
    Cpal(super::cpal_backend::CpalAudioHandle),
    /// Device-free paced driver
    Offline(super::offline::OfflineAudioHandle),
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        match self {
            AudioHandle::Cpal(h) => h.sample_rate(),
            AudioHandle::Offline(h) => h.sample_rate(),
        }
    }

    pub fn buffer_size(&self) -> u32 {
        match self {
            AudioHandle::Cpal(h) => h.buffer_size(),
            AudioHandle::Offline(h) => h.buffer_size(),
        }
    }

    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size() as f32 / self.sample_rate() as f32) * 1000.0
    }
}

/// Command sender for the control thread
///
/// Wraps the lock-free producer; every send is non-blocking.
pub struct CommandSender {
    pub(crate) producer: rtrb::Producer<EngineCommand>,
}

impl CommandSender {
    /// Queue a command for the audio thread
    ///
    /// Returns the command back if the queue is full.
    pub fn send(&mut self, cmd: EngineCommand) -> Result<(), EngineCommand> {
        self.producer.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }

    /// Check if the queue has space for more commands
    pub fn has_space(&self) -> bool {
        self.producer.slots() > 0
    }
}

/// Start the audio system on a real output device
pub fn start_audio_system(config: &AudioConfig) -> AudioResult<AudioSystemResult> {
    super::cpal_backend::start_audio_system(config)
}

/// Start the audio system without a device
///
/// A driver thread pulls blocks out of the engine at the pace a real
/// device would, so transport timing, feeds, and auto-stop all behave as
/// they do live. Used for headless operation and integration tests.
pub fn start_offline_system(sample_rate: u32, buffer_size: u32) -> AudioResult<AudioSystemResult> {
    super::offline::start_offline_system(sample_rate, buffer_size)
}
