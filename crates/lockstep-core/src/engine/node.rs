//! Playback and gain nodes
//!
//! A `PlaybackNode` is single-use: it is created when playback starts (or
//! restarts after a seek) and discarded when the transport leaves Playing.
//! Whether a node loops is fixed at creation, so toggling the loop flag
//! mid-flight never affects sources that are already running.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::{StereoBuffer, StereoSample};

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// A one-shot source reading frames out of an immutable track buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackNode {
    id: u64,
    /// Frame offset the node started from
    offset: u64,
    /// Loop flag captured at creation time
    looping: bool,
}

impl PlaybackNode {
    /// Create a fresh node starting at `offset` frames into the track
    pub fn new(offset: u64, looping: bool) -> Self {
        Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            offset,
            looping,
        }
    }

    /// Unique id: two nodes never compare equal even for the same offset
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    /// Render `out.len()` frames into `out`, reading from `buffer` at the
    /// session position and applying `gain`
    ///
    /// `position` counts frames since the transport entered Playing, so the
    /// absolute read index is `offset + position`. A non-looping node that
    /// has run past the end of its buffer writes silence; a looping node
    /// wraps modulo the buffer length.
    pub fn render(&self, buffer: &StereoBuffer, position: u64, gain: f32, out: &mut StereoBuffer) {
        let len = buffer.len() as u64;
        if len == 0 {
            out.fill_silence();
            return;
        }

        let start = self.offset + position;
        for (i, sample) in out.as_mut_slice().iter_mut().enumerate() {
            let idx = start + i as u64;
            *sample = if self.looping {
                buffer[(idx % len) as usize] * gain
            } else if idx < len {
                buffer[idx as usize] * gain
            } else {
                StereoSample::silence()
            };
        }
    }
}

/// Persistent per-track gain stage
///
/// Unlike playback nodes, gain nodes live for the whole session. Muting a
/// track drives its gain to zero without touching the node, so a mute
/// toggled while stopped is already in effect when playback next starts.
#[derive(Debug, Clone, Copy)]
pub struct GainNode {
    value: f32,
    muted: bool,
}

impl GainNode {
    pub fn new() -> Self {
        Self {
            value: 1.0,
            muted: false,
        }
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    /// Effective gain applied during rendering
    pub fn gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.value
        }
    }
}

impl Default for GainNode {
    fn default() -> Self {
        Self::new()
    }
}
