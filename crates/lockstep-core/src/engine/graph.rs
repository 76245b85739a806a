//! Session graph description and per-track lanes
//!
//! A `GraphSpec` is assembled on the control side from decoded tracks and
//! shipped to the audio thread in one command, so a session always becomes
//! audible atomically. All heap allocation happens here, before the graph
//! crosses the queue; the audio thread only ever moves the preallocated
//! pieces into place.

use std::sync::Arc;

use crate::engine::node::{GainNode, PlaybackNode};
use crate::loader::Track;
use crate::types::StereoBuffer;

/// Upper bound on frames per render block; lane scratch is preallocated to
/// this so rendering never allocates
pub const MAX_BLOCK_FRAMES: usize = 8192;

/// One track's slot in the graph, built control-side
pub struct LaneSpec {
    /// Track ordinal, stable for the session
    pub track_id: usize,
    /// Immutable decoded audio shared with the control side
    pub buffer: Arc<StereoBuffer>,
    /// Track length in frames at the engine rate
    pub frames: u64,
}

/// Complete description of a session's mix graph
pub struct GraphSpec {
    pub lanes: Vec<LaneSpec>,
    /// Session length in frames: the longest track wins
    pub duration_frames: u64,
}

impl GraphSpec {
    /// Build a spec from a loaded track list
    pub fn from_tracks(tracks: &[Track]) -> Self {
        let lanes: Vec<LaneSpec> = tracks
            .iter()
            .map(|t| LaneSpec {
                track_id: t.id,
                buffer: Arc::clone(&t.buffer),
                frames: t.buffer.len() as u64,
            })
            .collect();

        let duration_frames = lanes.iter().map(|l| l.frames).max().unwrap_or(0);

        Self {
            lanes,
            duration_frames,
        }
    }

    pub fn track_count(&self) -> usize {
        self.lanes.len()
    }
}

/// Audio-thread view of one track: buffer, gain stage, and the live node
pub struct Lane {
    pub track_id: usize,
    pub buffer: Arc<StereoBuffer>,
    pub gain: GainNode,
    /// Present only while the transport is Playing
    pub node: Option<PlaybackNode>,
    /// Per-lane render output, summed into the master bus
    pub scratch: StereoBuffer,
}

impl Lane {
    pub fn from_spec(spec: LaneSpec) -> Self {
        Self {
            track_id: spec.track_id,
            buffer: spec.buffer,
            gain: GainNode::new(),
            node: None,
            scratch: StereoBuffer::silence(MAX_BLOCK_FRAMES),
        }
    }

    /// Render `frames` frames into this lane's scratch
    ///
    /// Without a node the lane is silent. RT-safe: resizes scratch within
    /// its preallocated capacity only.
    pub fn render(&mut self, position: u64, frames: usize) {
        self.scratch.set_len_from_capacity(frames);
        match self.node {
            Some(node) => node.render(&self.buffer, position, self.gain.gain(), &mut self.scratch),
            None => self.scratch.fill_silence(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;
    use std::path::PathBuf;

    fn track(id: usize, frames: usize) -> Track {
        Track {
            id,
            source: PathBuf::from(format!("track-{id}.wav")),
            buffer: Arc::new(StereoBuffer::silence(frames)),
            duration_seconds: frames as f64 / 48_000.0,
            channels: 2,
            source_sample_rate: 48_000,
        }
    }

    #[test]
    fn test_duration_is_longest_track() {
        let spec = GraphSpec::from_tracks(&[track(0, 100), track(1, 300), track(2, 200)]);
        assert_eq!(spec.duration_frames, 300);
        assert_eq!(spec.track_count(), 3);
    }

    #[test]
    fn test_empty_spec_has_zero_duration() {
        let spec = GraphSpec::from_tracks(&[]);
        assert_eq!(spec.duration_frames, 0);
    }

    #[test]
    fn test_lane_without_node_renders_silence() {
        let mut lane = Lane::from_spec(LaneSpec {
            track_id: 0,
            buffer: Arc::new(StereoBuffer::silence(64)),
            frames: 64,
        });
        lane.render(0, 16);
        assert_eq!(lane.scratch.len(), 16);
        assert!(lane.scratch.iter().all(|s| *s == StereoSample::silence()));
    }
}
