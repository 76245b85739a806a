//! Audio output backends
//!
//! The system follows a lock-free design for real-time safety:
//!
//! - **Control thread**: sends commands via lock-free ringbuffer
//! - **Audio thread**: owns the AudioEngine exclusively, processes commands
//! - **Atomics**: control reads transport state via relaxed atomics
//!
//! Two backends exist: cpal for real devices, and an offline paced driver
//! for headless operation and tests.

mod backend;
mod config;
mod cpal_backend;
mod error;
mod offline;

pub use backend::{
    start_audio_system, start_offline_system, AudioHandle, AudioSystemResult, CommandSender,
};
pub use config::{
    AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE,
};
pub use error::{AudioError, AudioResult};
pub use offline::OfflineAudioHandle;
pub use cpal_backend::CpalAudioHandle;
