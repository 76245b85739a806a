//! The audio engine proper
//!
//! Owned exclusively by the audio thread. Every render callback drains the
//! command queue, renders the active session if the transport is Playing,
//! runs the master compressor, feeds the analysis tap, and publishes the
//! transport snapshot. Nothing here allocates or blocks.

use std::sync::Arc;

use rtrb::Consumer;

use crate::engine::analysis::AnalysisTap;
use crate::engine::command::EngineCommand;
use crate::engine::compressor::Compressor;
use crate::engine::graph::MAX_BLOCK_FRAMES;
use crate::engine::session::{Session, TransportAtomics};
use crate::types::{StereoBuffer, TransportState};

pub struct AudioEngine {
    commands: Consumer<EngineCommand>,
    session: Option<Session>,
    compressor: Compressor,
    tap: AnalysisTap,
    atomics: Arc<TransportAtomics>,
    /// Master bus, preallocated to the block ceiling
    master: StereoBuffer,
    sample_rate: u32,
}

impl AudioEngine {
    pub fn new(
        sample_rate: u32,
        commands: Consumer<EngineCommand>,
        atomics: Arc<TransportAtomics>,
        tap: AnalysisTap,
    ) -> Self {
        Self {
            commands,
            session: None,
            compressor: Compressor::new(sample_rate),
            tap,
            atomics,
            master: StereoBuffer::silence(MAX_BLOCK_FRAMES),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Drain and apply all pending commands
    ///
    /// `Play` doubles as seek: starting while nodes are already live
    /// discards them and creates fresh ones at the new offset, which is
    /// exactly the stop-then-restart a seek requires, applied atomically
    /// within one callback.
    fn process_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            match command {
                EngineCommand::InstallSession { graph, looping } => {
                    self.session = Some(Session::install(*graph, looping));
                    self.compressor.reset();
                    self.tap.clear();
                    self.atomics.set_state(TransportState::Ready);
                    self.atomics.set_position_frames(0);
                }
                EngineCommand::ClearSession => {
                    self.session = None;
                    self.atomics.set_state(TransportState::Idle);
                    self.atomics.set_position_frames(0);
                }
                EngineCommand::Play { offset_frames } => {
                    if let Some(session) = &mut self.session {
                        session.start(offset_frames);
                        self.atomics.set_state(TransportState::Playing);
                        self.atomics
                            .set_position_frames(session.position_frames());
                    }
                }
                EngineCommand::Stop => {
                    if let Some(session) = &mut self.session {
                        session.halt();
                        self.tap.clear();
                        self.atomics.set_state(TransportState::Stopped);
                        self.atomics.set_position_frames(0);
                    }
                }
                EngineCommand::SetLoop(looping) => {
                    if let Some(session) = &mut self.session {
                        session.set_looping(looping);
                    }
                }
                EngineCommand::SetTrackMuted { track_id, muted } => {
                    if let Some(session) = &mut self.session {
                        session.set_track_muted(track_id, muted);
                    }
                }
                EngineCommand::SetCompressorParams(params) => {
                    self.compressor.program(params);
                }
            }
        }
    }

    /// Fill one interleaved stereo output block
    pub fn process(&mut self, output: &mut [f32]) {
        self.process_commands();

        for chunk in output.chunks_mut(MAX_BLOCK_FRAMES * 2) {
            self.process_block(chunk);
        }
    }

    fn process_block(&mut self, output: &mut [f32]) {
        let frames = output.len() / 2;

        let playing = self.atomics.state() == TransportState::Playing;
        let Some(session) = self.session.as_mut().filter(|_| playing) else {
            output.fill(0.0);
            return;
        };

        let still_running = session.render(frames, &mut self.master);
        self.compressor.process(&mut self.master);
        self.tap.write(&self.master);

        output[..frames * 2].copy_from_slice(&self.master.as_interleaved()[..frames * 2]);

        if still_running {
            self.atomics
                .set_position_frames(session.position_frames());
        } else {
            // Natural end of a non-looping session behaves like stop.
            session.halt();
            self.tap.clear();
            self.atomics.set_state(TransportState::Stopped);
            self.atomics.set_position_frames(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::command::command_channel;
    use crate::engine::graph::{GraphSpec, LaneSpec};
    use crate::types::StereoSample;

    fn tone_spec(frames: usize, value: f32) -> GraphSpec {
        let mut buf = StereoBuffer::silence(frames);
        for s in buf.iter_mut() {
            *s = StereoSample::mono(value);
        }
        GraphSpec {
            lanes: vec![LaneSpec {
                track_id: 0,
                buffer: Arc::new(buf),
                frames: frames as u64,
            }],
            duration_frames: frames as u64,
        }
    }

    fn engine_with_queue() -> (rtrb::Producer<EngineCommand>, AudioEngine, Arc<TransportAtomics>) {
        let (tx, rx) = command_channel();
        let atomics = Arc::new(TransportAtomics::new());
        let engine = AudioEngine::new(8_000, rx, Arc::clone(&atomics), AnalysisTap::new());
        (tx, engine, atomics)
    }

    #[test]
    fn test_idle_engine_outputs_silence() {
        let (_tx, mut engine, atomics) = engine_with_queue();
        let mut out = vec![1.0f32; 64];
        engine.process(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(atomics.state(), TransportState::Idle);
    }

    #[test]
    fn test_install_then_play_produces_audio() {
        let (mut tx, mut engine, atomics) = engine_with_queue();
        tx.push(EngineCommand::InstallSession {
            graph: Box::new(tone_spec(1_024, 0.1)),
            looping: false,
        })
        .ok()
        .unwrap();
        tx.push(EngineCommand::Play { offset_frames: 0 }).ok().unwrap();

        let mut out = vec![0.0f32; 128];
        engine.process(&mut out);

        assert_eq!(atomics.state(), TransportState::Playing);
        assert_eq!(atomics.position_frames(), 64);
        assert!(out.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_stop_rewinds_the_clock() {
        let (mut tx, mut engine, atomics) = engine_with_queue();
        tx.push(EngineCommand::InstallSession {
            graph: Box::new(tone_spec(1_024, 0.1)),
            looping: false,
        })
        .ok()
        .unwrap();
        tx.push(EngineCommand::Play { offset_frames: 0 }).ok().unwrap();

        let mut out = vec![0.0f32; 128];
        engine.process(&mut out);
        assert!(atomics.position_frames() > 0);

        tx.push(EngineCommand::Stop).ok().unwrap();
        engine.process(&mut out);
        assert_eq!(atomics.state(), TransportState::Stopped);
        assert_eq!(atomics.position_frames(), 0);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_play_while_playing_restarts_at_offset() {
        let (mut tx, mut engine, atomics) = engine_with_queue();
        tx.push(EngineCommand::InstallSession {
            graph: Box::new(tone_spec(4_096, 0.1)),
            looping: false,
        })
        .ok()
        .unwrap();
        tx.push(EngineCommand::Play { offset_frames: 0 }).ok().unwrap();

        let mut out = vec![0.0f32; 128];
        engine.process(&mut out);

        tx.push(EngineCommand::Play { offset_frames: 2_000 }).ok().unwrap();
        engine.process(&mut out);
        assert_eq!(atomics.position_frames(), 2_064);
    }

    #[test]
    fn test_session_ends_in_stopped_state() {
        let (mut tx, mut engine, atomics) = engine_with_queue();
        tx.push(EngineCommand::InstallSession {
            graph: Box::new(tone_spec(100, 0.1)),
            looping: false,
        })
        .ok()
        .unwrap();
        tx.push(EngineCommand::Play { offset_frames: 0 }).ok().unwrap();

        let mut out = vec![0.0f32; 256];
        engine.process(&mut out);
        assert_eq!(atomics.state(), TransportState::Stopped);
        assert_eq!(atomics.position_frames(), 0);
    }
}
