//! Lockstep Core - Synchronized multi-track playback engine

pub mod audio;
pub mod engine;
pub mod loader;
pub mod player;
pub mod types;

pub use player::{ClockTick, Player, PlayerError, SpectrumFrame};
pub use types::*;
