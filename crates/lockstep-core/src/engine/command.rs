//! Control-to-audio command queue
//!
//! Commands travel over a wait-free SPSC ring buffer. The control side is
//! the producer, the audio thread drains the consumer at the top of every
//! render callback. Large payloads are boxed so a command stays small on
//! the queue.

use rtrb::{Consumer, Producer, RingBuffer};

use crate::engine::compressor::CompressorParams;
use crate::engine::graph::GraphSpec;

pub const COMMAND_QUEUE_CAPACITY: usize = 256;

pub enum EngineCommand {
    /// Replace the active session with a freshly built graph
    InstallSession {
        graph: Box<GraphSpec>,
        looping: bool,
    },
    /// Tear down the active session and return to Idle
    ClearSession,
    /// Start playback from an offset in frames
    Play { offset_frames: u64 },
    /// Stop playback, discard nodes, rewind to zero
    Stop,
    /// Toggle the loop flag captured by future playback nodes
    SetLoop(bool),
    /// Mute or unmute one track's gain stage
    SetTrackMuted { track_id: usize, muted: bool },
    /// Reprogram the master compressor
    SetCompressorParams(CompressorParams),
}

/// Create the SPSC command queue between control and audio threads
pub fn command_channel() -> (Producer<EngineCommand>, Consumer<EngineCommand>) {
    RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}
