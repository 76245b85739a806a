//! Device-free audio backend
//!
//! Runs the engine from a paced driver thread instead of a device stream.
//! Blocks are pulled at the cadence a real device would request them, so
//! transport timing, auto-stop, and the feeds behave exactly as they do
//! against hardware. The rendered audio is discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::backend::{AudioHandle, AudioSystemResult, CommandSender};
use super::error::AudioResult;
use crate::engine::{command_channel, AnalysisTap, AudioEngine, TransportAtomics};

/// Handle to the offline driver thread
///
/// Dropping the handle stops the driver and joins it.
pub struct OfflineAudioHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
    buffer_size: u32,
}

impl OfflineAudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }
}

impl Drop for OfflineAudioHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Start the engine on a paced driver thread
pub fn start_offline_system(sample_rate: u32, buffer_size: u32) -> AudioResult<AudioSystemResult> {
    let (command_tx, command_rx) = command_channel();
    let transport = Arc::new(TransportAtomics::new());
    let analysis_tap = AnalysisTap::new();

    let mut engine = AudioEngine::new(
        sample_rate,
        command_rx,
        Arc::clone(&transport),
        analysis_tap.clone(),
    );

    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);

    let block_period = Duration::from_secs_f64(buffer_size as f64 / sample_rate as f64);
    let latency_ms = (buffer_size as f32 / sample_rate as f32) * 1000.0;

    let thread = std::thread::Builder::new()
        .name("offline-audio".to_string())
        .spawn(move || {
            let mut block = vec![0.0f32; buffer_size as usize * 2];
            // Deadline-based pacing so block timing does not drift.
            let mut deadline = Instant::now();
            while !thread_stop.load(Ordering::Relaxed) {
                engine.process(&mut block);
                deadline += block_period;
                let now = Instant::now();
                if deadline > now {
                    std::thread::sleep(deadline - now);
                } else {
                    deadline = now;
                }
            }
        })
        .map_err(|e| super::error::AudioError::StreamBuildError(e.to_string()))?;

    log::info!(
        "Offline audio driver started: {}Hz, {} frames per block (~{:.1}ms)",
        sample_rate,
        buffer_size,
        latency_ms
    );

    let handle = OfflineAudioHandle {
        stop,
        thread: Some(thread),
        sample_rate,
        buffer_size,
    };

    Ok(AudioSystemResult {
        handle: AudioHandle::Offline(handle),
        command_sender: CommandSender {
            producer: command_tx,
        },
        transport,
        analysis_tap,
        sample_rate,
        buffer_size,
        latency_ms,
    })
}
