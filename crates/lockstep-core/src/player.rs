//! Control-side player surface
//!
//! A `Player` sits on the control thread and exposes the transport API:
//! load, play, stop, seek, per-track mute, loop, and compressor control.
//! It validates every call against the current transport state before
//! anything crosses the command queue, so the audio thread can apply
//! commands without ever rejecting one.
//!
//! While the transport is Playing the player runs two feed threads: a
//! clock feed publishing the playhead at 10 Hz and a spectrum feed
//! publishing analyser frames at ~33 Hz. Both stop themselves as soon as
//! the transport leaves Playing, whether by stop, seek restart, or a
//! session reaching its natural end.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender};
use thiserror::Error;

use crate::audio::{
    start_audio_system, start_offline_system, AudioConfig, AudioError, AudioSystemResult,
};
use crate::engine::{
    Analyser, CompressorParam, CompressorParams, EngineCommand, GraphSpec, InvalidParamError,
    InvalidStateError,
};
use crate::loader::{self, LoadError, Track};
use crate::types::TransportState;

/// Interval between clock feed ticks (10 Hz)
pub const CLOCK_FEED_INTERVAL: Duration = Duration::from_millis(100);
/// Interval between spectrum feed frames
pub const SPECTRUM_FEED_INTERVAL: Duration = Duration::from_millis(30);

/// Errors surfaced by the player API
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),

    #[error(transparent)]
    InvalidParam(#[from] InvalidParamError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Track id outside the loaded session
    #[error("Unknown track id: {0}")]
    UnknownTrack(usize),

    /// The command queue to the audio thread was full
    #[error("Audio command queue is full")]
    CommandQueueFull,
}

/// One clock feed tick: the playhead in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTick {
    pub seconds: f64,
}

/// One spectrum feed frame: byte-scaled frequency bins
#[derive(Debug, Clone)]
pub struct SpectrumFrame {
    pub bins: Vec<u8>,
}

/// A self-stopping feed thread
struct Feed {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Feed {
    fn spawn<F>(name: &str, body: F) -> Self
    where
        F: FnOnce(Arc<AtomicBool>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(thread_stop))
            .ok();
        Self { stop, thread }
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Synchronized multi-track transport
pub struct Player {
    system: AudioSystemResult,
    sources: Vec<PathBuf>,
    tracks: Vec<Track>,
    muted: Vec<bool>,
    looping: bool,
    compressor_params: CompressorParams,
    duration_seconds: f64,
    loading: bool,
    clock_tx: Sender<ClockTick>,
    clock_rx: Receiver<ClockTick>,
    spectrum_tx: Sender<SpectrumFrame>,
    spectrum_rx: Receiver<SpectrumFrame>,
    clock_feed: Option<Feed>,
    spectrum_feed: Option<Feed>,
}

impl Player {
    /// Create a player on a real output device
    ///
    /// `sources` is the ordered session track list; order drives track
    /// ordinals. Nothing is loaded yet: the first `play()` (or an
    /// explicit `load_all()`) performs the load.
    pub fn new(sources: Vec<PathBuf>, config: &AudioConfig) -> Result<Self, PlayerError> {
        let system = start_audio_system(config)?;
        Ok(Self::with_system(sources, system))
    }

    /// Create a player on the device-free backend
    pub fn new_offline(
        sources: Vec<PathBuf>,
        sample_rate: u32,
        buffer_size: u32,
    ) -> Result<Self, PlayerError> {
        let system = start_offline_system(sample_rate, buffer_size)?;
        Ok(Self::with_system(sources, system))
    }

    fn with_system(sources: Vec<PathBuf>, system: AudioSystemResult) -> Self {
        let (clock_tx, clock_rx) = unbounded();
        let (spectrum_tx, spectrum_rx) = unbounded();
        Self {
            system,
            sources,
            tracks: Vec::new(),
            muted: Vec::new(),
            looping: false,
            compressor_params: CompressorParams::default(),
            duration_seconds: 0.0,
            loading: false,
            clock_tx,
            clock_rx,
            spectrum_tx,
            spectrum_rx,
            clock_feed: None,
            spectrum_feed: None,
        }
    }

    /// Current transport state
    ///
    /// Loading is a control-side phase; everything else comes straight
    /// from the audio thread's atomics.
    pub fn state(&self) -> TransportState {
        if self.loading {
            TransportState::Loading
        } else {
            self.system.transport.state()
        }
    }

    /// Playhead in seconds
    pub fn position_seconds(&self) -> f64 {
        self.system.transport.position_seconds(self.system.sample_rate)
    }

    /// Session length in seconds (longest track)
    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    pub fn sample_rate(&self) -> u32 {
        self.system.sample_rate
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn compressor_params(&self) -> CompressorParams {
        self.compressor_params
    }

    /// Receiver for clock feed ticks
    pub fn clock_ticks(&self) -> Receiver<ClockTick> {
        self.clock_rx.clone()
    }

    /// Receiver for spectrum feed frames
    pub fn spectrum_frames(&self) -> Receiver<SpectrumFrame> {
        self.spectrum_rx.clone()
    }

    /// Load and decode the session sources, then install the mix graph
    ///
    /// Decoding runs concurrently across sources and fails as a whole if
    /// any source fails; on failure the previous session stays untouched
    /// and the call can be retried. Valid in any state except Playing.
    /// `play()` calls this automatically from Idle, so calling it
    /// yourself is only useful to front-load the decode cost.
    pub fn load_all(&mut self) -> Result<(), PlayerError> {
        let state = self.state();
        if state == TransportState::Playing || state == TransportState::Loading {
            return Err(InvalidStateError::new("load", state).into());
        }

        let sources = self.sources.clone();
        self.loading = true;
        let result = loader::load_all(&sources, self.system.sample_rate);
        self.loading = false;

        let tracks = result?;
        let graph = GraphSpec::from_tracks(&tracks);
        let duration_frames = graph.duration_frames;

        self.send(EngineCommand::InstallSession {
            graph: Box::new(graph),
            looping: self.looping,
        })?;
        self.wait_for_state(TransportState::Ready);

        self.muted = vec![false; tracks.len()];
        self.duration_seconds = duration_frames as f64 / self.system.sample_rate as f64;
        self.tracks = tracks;

        log::info!(
            "Session installed: {} tracks, {:.2}s",
            self.tracks.len(),
            self.duration_seconds
        );

        Ok(())
    }

    /// Start all tracks in lockstep from the beginning
    ///
    /// The very first call performs load and graph build; later calls
    /// reuse the installed graph and only recreate playback nodes.
    /// Valid from Idle, Ready, or Stopped.
    pub fn play(&mut self) -> Result<(), PlayerError> {
        match self.state() {
            TransportState::Idle => self.load_all()?,
            TransportState::Ready | TransportState::Stopped => {}
            state => return Err(InvalidStateError::new("play", state).into()),
        }

        self.send(EngineCommand::Play { offset_frames: 0 })?;
        self.wait_for_state(TransportState::Playing);
        self.start_feeds();
        Ok(())
    }

    /// Stop playback and rewind the clock to zero
    ///
    /// Valid only while Playing.
    pub fn stop(&mut self) -> Result<(), PlayerError> {
        let state = self.state();
        if state != TransportState::Playing {
            return Err(InvalidStateError::new("stop", state).into());
        }

        self.send(EngineCommand::Stop)?;
        self.wait_for_state(TransportState::Stopped);
        self.stop_feeds();
        Ok(())
    }

    /// Jump the playhead to `seconds`
    ///
    /// Implemented as an atomic restart: the running nodes are discarded
    /// and fresh ones start at the offset within one audio callback.
    /// Negative positions are rejected; positions past the session end
    /// are clamped to the duration. Valid only while Playing.
    pub fn seek(&mut self, seconds: f64) -> Result<(), PlayerError> {
        let state = self.state();
        if state != TransportState::Playing {
            return Err(InvalidStateError::new("seek", state).into());
        }
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(
                InvalidParamError::new("seek position", seconds as f32, 0.0, f32::MAX).into(),
            );
        }

        let duration_frames = (self.duration_seconds * self.system.sample_rate as f64) as u64;
        let offset_frames =
            ((seconds * self.system.sample_rate as f64) as u64).min(duration_frames);
        self.send(EngineCommand::Play { offset_frames })?;
        Ok(())
    }

    /// Toggle whether playback wraps at the session end
    ///
    /// Takes effect the next time playback starts; nodes already running
    /// keep the flag they were created with.
    pub fn set_looping(&mut self, looping: bool) -> Result<(), PlayerError> {
        self.looping = looping;
        if self.state() != TransportState::Idle {
            self.send(EngineCommand::SetLoop(looping))?;
        }
        Ok(())
    }

    /// Mute or unmute one track; allowed in any state
    pub fn set_track_muted(&mut self, track_id: usize, muted: bool) -> Result<(), PlayerError> {
        if track_id >= self.tracks.len() {
            return Err(PlayerError::UnknownTrack(track_id));
        }
        self.send(EngineCommand::SetTrackMuted { track_id, muted })?;
        self.muted[track_id] = muted;
        Ok(())
    }

    /// Flip one track's mute flag and return the new value
    pub fn toggle_track_muted(&mut self, track_id: usize) -> Result<bool, PlayerError> {
        let muted = !self.track_muted(track_id)?;
        self.set_track_muted(track_id, muted)?;
        Ok(muted)
    }

    pub fn track_muted(&self, track_id: usize) -> Result<bool, PlayerError> {
        self.muted
            .get(track_id)
            .copied()
            .ok_or(PlayerError::UnknownTrack(track_id))
    }

    /// Set one compressor parameter
    ///
    /// Values are validated against the parameter's legal range and
    /// rejected outright if outside it. Reprogramming is allowed in any
    /// state, including mid-playback.
    pub fn set_compressor_param(
        &mut self,
        param: CompressorParam,
        value: f32,
    ) -> Result<(), PlayerError> {
        let mut params = self.compressor_params;
        params.set(param, value)?;
        self.send(EngineCommand::SetCompressorParams(params))?;
        self.compressor_params = params;
        Ok(())
    }

    fn send(&mut self, cmd: EngineCommand) -> Result<(), PlayerError> {
        self.system
            .command_sender
            .send(cmd)
            .map_err(|_| PlayerError::CommandQueueFull)
    }

    /// Block briefly until the audio thread confirms a state transition
    ///
    /// Commands take effect at the top of the next render block, so the
    /// atomics lag a command by up to one buffer period. Transitions are
    /// control-initiated and rare, so a short poll keeps the public state
    /// machine deterministic.
    fn wait_for_state(&self, target: TransportState) {
        let deadline = std::time::Instant::now() + Duration::from_millis(500);
        while self.system.transport.state() != target {
            if std::time::Instant::now() > deadline {
                log::warn!(
                    "Transport did not reach {:?} within 500ms (at {:?})",
                    target,
                    self.system.transport.state()
                );
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn start_feeds(&mut self) {
        self.stop_feeds();

        let transport = Arc::clone(&self.system.transport);
        let sample_rate = self.system.sample_rate;
        let clock_tx = self.clock_tx.clone();
        self.clock_feed = Some(Feed::spawn("clock-feed", move |stop| {
            while !stop.load(Ordering::Relaxed) {
                if transport.state() != TransportState::Playing {
                    break;
                }
                let tick = ClockTick {
                    seconds: transport.position_seconds(sample_rate),
                };
                if clock_tx.send(tick).is_err() {
                    break;
                }
                std::thread::sleep(CLOCK_FEED_INTERVAL);
            }
        }));

        let transport = Arc::clone(&self.system.transport);
        let tap = self.system.analysis_tap.clone();
        let spectrum_tx = self.spectrum_tx.clone();
        self.spectrum_feed = Some(Feed::spawn("spectrum-feed", move |stop| {
            let mut analyser = Analyser::new(tap);
            while !stop.load(Ordering::Relaxed) {
                if transport.state() != TransportState::Playing {
                    break;
                }
                let frame = SpectrumFrame {
                    bins: analyser.frequency_bin_bytes(),
                };
                if spectrum_tx.send(frame).is_err() {
                    break;
                }
                std::thread::sleep(SPECTRUM_FEED_INTERVAL);
            }
        }));
    }

    fn stop_feeds(&mut self) {
        self.clock_feed = None;
        self.spectrum_feed = None;
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.stop_feeds();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_player(sources: Vec<PathBuf>) -> Player {
        Player::new_offline(sources, 8_000, 256).unwrap()
    }

    #[test]
    fn test_first_play_surfaces_load_failure_and_stays_idle() {
        let mut player = offline_player(vec![PathBuf::from("/nonexistent/one.wav")]);
        assert_eq!(player.state(), TransportState::Idle);
        match player.play() {
            Err(PlayerError::Load(LoadError::Io { path, .. })) => {
                assert_eq!(path, PathBuf::from("/nonexistent/one.wav"));
            }
            other => panic!("expected Load error, got {:?}", other.err()),
        }
        // Retryable: the failure left the transport in Idle.
        assert_eq!(player.state(), TransportState::Idle);
    }

    #[test]
    fn test_stop_and_seek_require_playing() {
        let mut player = offline_player(vec![]);
        assert!(matches!(
            player.stop(),
            Err(PlayerError::InvalidState(_))
        ));
        assert!(matches!(
            player.seek(1.0),
            Err(PlayerError::InvalidState(_))
        ));
    }

    #[test]
    fn test_empty_source_list_is_rejected() {
        let mut player = offline_player(vec![]);
        assert!(matches!(
            player.load_all(),
            Err(PlayerError::Load(LoadError::NoSources))
        ));
        assert!(matches!(
            player.play(),
            Err(PlayerError::Load(LoadError::NoSources))
        ));
        assert_eq!(player.state(), TransportState::Idle);
    }

    #[test]
    fn test_unknown_track_mute_is_rejected() {
        let mut player = offline_player(vec![]);
        assert!(matches!(
            player.set_track_muted(0, true),
            Err(PlayerError::UnknownTrack(0))
        ));
    }

    #[test]
    fn test_compressor_param_validation() {
        let mut player = offline_player(vec![]);
        assert!(player
            .set_compressor_param(CompressorParam::Threshold, -40.0)
            .is_ok());
        assert_eq!(player.compressor_params().threshold, -40.0);

        assert!(matches!(
            player.set_compressor_param(CompressorParam::Ratio, 25.0),
            Err(PlayerError::InvalidParam(_))
        ));
        assert_eq!(player.compressor_params().ratio, 12.0);
    }
}
