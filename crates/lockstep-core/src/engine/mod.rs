//! Real-time mixing engine
//!
//! Everything in this module runs on, or is shared with, the audio thread.
//! The engine is owned by the audio callback; the control side talks to it
//! through the command queue and observes it through the transport atomics
//! and the analysis tap.

pub mod analysis;
pub mod command;
pub mod compressor;
mod engine;
pub mod error;
pub mod graph;
pub mod node;
pub mod session;

pub use analysis::{Analyser, AnalysisTap, BIN_COUNT, FFT_SIZE};
pub use command::{command_channel, EngineCommand, COMMAND_QUEUE_CAPACITY};
pub use compressor::{Compressor, CompressorParam, CompressorParams};
pub use engine::AudioEngine;
pub use error::{InvalidParamError, InvalidStateError};
pub use graph::{GraphSpec, LaneSpec, MAX_BLOCK_FRAMES};
pub use session::{Session, TransportAtomics};
