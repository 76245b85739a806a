//! Session state owned by the audio thread
//!
//! The session tracks which playback nodes are live, how far the transport
//! has advanced, and the loop flag that future nodes will capture. The
//! control side observes it only through `TransportAtomics`.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use rayon::prelude::*;

use crate::engine::graph::{GraphSpec, Lane};
use crate::engine::node::PlaybackNode;
use crate::types::{StereoBuffer, TransportState};

/// Lock-free transport snapshot shared between audio and control threads
///
/// The audio thread is the sole writer; the control side only loads. All
/// accesses are `Relaxed`: readers just want a recent value, not ordering
/// against anything else.
pub struct TransportAtomics {
    state: AtomicU8,
    position_frames: AtomicU64,
}

impl TransportAtomics {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(TransportState::Idle.as_u8()),
            position_frames: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, state: TransportState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    pub fn position_frames(&self) -> u64 {
        self.position_frames.load(Ordering::Relaxed)
    }

    pub fn set_position_frames(&self, frames: u64) {
        self.position_frames.store(frames, Ordering::Relaxed);
    }

    pub fn position_seconds(&self, sample_rate: u32) -> f64 {
        self.position_frames() as f64 / sample_rate as f64
    }
}

impl Default for TransportAtomics {
    fn default() -> Self {
        Self::new()
    }
}

/// One installed mix graph plus its transport progress
pub struct Session {
    lanes: Vec<Lane>,
    duration_frames: u64,
    /// Frames rendered since the current node set started
    rendered: u64,
    /// Offset the current node set started at
    start_offset: u64,
    /// Loop flag captured by nodes created from now on
    looping: bool,
    /// Loop flag the currently running node set was created with
    active_looping: bool,
}

impl Session {
    pub fn install(spec: GraphSpec, looping: bool) -> Self {
        let duration_frames = spec.duration_frames;
        let lanes = spec.lanes.into_iter().map(Lane::from_spec).collect();
        Self {
            lanes,
            duration_frames,
            rendered: 0,
            start_offset: 0,
            looping,
            active_looping: looping,
        }
    }

    pub fn duration_frames(&self) -> u64 {
        self.duration_frames
    }

    pub fn track_count(&self) -> usize {
        self.lanes.len()
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    /// Start playback from `offset` frames
    ///
    /// Creates a fresh node per lane. Each node captures the loop flag as
    /// it stands right now; later toggles only affect the next start.
    pub fn start(&mut self, offset: u64) {
        self.start_offset = offset;
        self.rendered = 0;
        self.active_looping = self.looping;
        for lane in &mut self.lanes {
            lane.node = Some(PlaybackNode::new(offset, self.active_looping));
        }
    }

    /// Discard all live nodes and rewind the transport to zero
    pub fn halt(&mut self) {
        self.start_offset = 0;
        self.rendered = 0;
        for lane in &mut self.lanes {
            lane.node = None;
        }
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Mute or unmute one track's gain stage; returns false for an unknown id
    pub fn set_track_muted(&mut self, track_id: usize, muted: bool) -> bool {
        match self.lanes.iter_mut().find(|l| l.track_id == track_id) {
            Some(lane) => {
                lane.gain.set_muted(muted);
                true
            }
            None => false,
        }
    }

    pub fn track_muted(&self, track_id: usize) -> Option<bool> {
        self.lanes
            .iter()
            .find(|l| l.track_id == track_id)
            .map(|l| l.gain.muted())
    }

    /// Live node ids in lane order, while playing
    pub fn node_ids(&self) -> Vec<u64> {
        self.lanes
            .iter()
            .filter_map(|l| l.node.map(|n| n.id()))
            .collect()
    }

    /// Current playhead in frames, wrapped to the session length while
    /// looping
    pub fn position_frames(&self) -> u64 {
        let absolute = self.start_offset + self.rendered;
        if self.active_looping && self.duration_frames > 0 {
            absolute % self.duration_frames
        } else {
            absolute.min(self.duration_frames)
        }
    }

    /// Render one block into `out` and advance the transport
    ///
    /// Lanes render in parallel into their own scratch and are then summed
    /// sequentially. Returns false once a non-looping session has played
    /// past its full duration.
    pub fn render(&mut self, frames: usize, out: &mut StereoBuffer) -> bool {
        let position = self.rendered;

        self.lanes
            .par_iter_mut()
            .for_each(|lane| lane.render(position, frames));

        out.set_len_from_capacity(frames);
        out.fill_silence();
        for lane in &self.lanes {
            out.add_buffer(&lane.scratch);
        }

        self.rendered += frames as u64;

        self.active_looping || self.start_offset + self.rendered < self.duration_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::LaneSpec;
    use crate::types::StereoSample;
    use std::sync::Arc;

    fn spec(frame_counts: &[usize]) -> GraphSpec {
        let lanes = frame_counts
            .iter()
            .enumerate()
            .map(|(id, &frames)| {
                let mut buf = StereoBuffer::silence(frames);
                for s in buf.iter_mut() {
                    *s = StereoSample::mono(0.25);
                }
                LaneSpec {
                    track_id: id,
                    buffer: Arc::new(buf),
                    frames: frames as u64,
                }
            })
            .collect::<Vec<_>>();
        let duration_frames = lanes.iter().map(|l| l.frames).max().unwrap_or(0);
        GraphSpec {
            lanes,
            duration_frames,
        }
    }

    #[test]
    fn test_start_creates_one_node_per_lane() {
        let mut session = Session::install(spec(&[64, 64, 64]), false);
        assert!(session.node_ids().is_empty());
        session.start(0);
        assert_eq!(session.node_ids().len(), 3);
    }

    #[test]
    fn test_restart_creates_fresh_nodes() {
        let mut session = Session::install(spec(&[64]), false);
        session.start(0);
        let first = session.node_ids();
        session.halt();
        session.start(10);
        let second = session.node_ids();
        assert_ne!(first, second);
    }

    #[test]
    fn test_render_sums_unmuted_lanes() {
        let mut session = Session::install(spec(&[64, 64]), false);
        session.start(0);
        let mut out = StereoBuffer::silence(16);
        assert!(session.render(16, &mut out));
        assert!((out[0].left - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_muted_lane_is_silent_in_the_mix() {
        let mut session = Session::install(spec(&[64, 64]), false);
        assert!(session.set_track_muted(1, true));
        session.start(0);
        let mut out = StereoBuffer::silence(16);
        session.render(16, &mut out);
        assert!((out[0].left - 0.25).abs() < 1e-6);
        assert!(!session.set_track_muted(7, true));
    }

    #[test]
    fn test_mute_keeps_the_running_nodes() {
        let mut session = Session::install(spec(&[64, 64]), false);
        session.start(0);
        let before = session.node_ids();
        session.set_track_muted(0, true);
        session.set_track_muted(0, false);
        assert_eq!(session.node_ids(), before);
        assert_eq!(session.track_muted(0), Some(false));
    }

    #[test]
    fn test_non_looping_session_finishes_at_duration() {
        let mut session = Session::install(spec(&[32]), false);
        session.start(0);
        let mut out = StereoBuffer::silence(16);
        assert!(session.render(16, &mut out));
        assert!(!session.render(16, &mut out));
        assert_eq!(session.position_frames(), 32);
    }

    #[test]
    fn test_looping_session_wraps_position() {
        let mut session = Session::install(spec(&[32]), true);
        session.start(0);
        let mut out = StereoBuffer::silence(16);
        for _ in 0..3 {
            assert!(session.render(16, &mut out));
        }
        assert_eq!(session.position_frames(), 16);
    }

    #[test]
    fn test_seek_offset_shifts_reported_position() {
        let mut session = Session::install(spec(&[64]), false);
        session.start(24);
        let mut out = StereoBuffer::silence(16);
        session.render(16, &mut out);
        assert_eq!(session.position_frames(), 40);
    }

    #[test]
    fn test_loop_toggle_affects_next_start_only() {
        let mut session = Session::install(spec(&[32]), false);
        session.start(0);
        session.set_looping(true);
        // The running nodes captured looping=false, so the session still
        // finishes at its duration.
        let mut out = StereoBuffer::silence(32);
        assert!(!session.render(32, &mut out));
    }
}
