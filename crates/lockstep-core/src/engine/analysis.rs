//! Post-compressor analysis tap and spectrum analyser
//!
//! The audio thread taps the master output after compression so the
//! spectrum reflects what is actually heard. The tap is a mutex-guarded
//! window of recent samples written with `try_lock`; if the reader holds
//! the lock the write is skipped, never blocked, keeping the audio thread
//! wait-free. The analyser runs on the control side and turns the window
//! into byte-scaled frequency bins.

use std::sync::{Arc, Mutex};

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::types::StereoBuffer;

/// FFT window length in samples
pub const FFT_SIZE: usize = 256;
/// Number of frequency bins exposed per analysis frame
pub const BIN_COUNT: usize = FFT_SIZE / 2;
/// Time-smoothing factor applied to bin magnitudes between frames
pub const SMOOTHING: f32 = 0.8;
/// Bin magnitudes at or below this level map to byte 0
pub const MIN_DB: f32 = -100.0;
/// Bin magnitudes at or above this level map to byte 255
pub const MAX_DB: f32 = -30.0;

/// Shared sample window between the audio thread and the analyser
#[derive(Clone)]
pub struct AnalysisTap {
    window: Arc<Mutex<Vec<f32>>>,
}

impl AnalysisTap {
    pub fn new() -> Self {
        Self {
            window: Arc::new(Mutex::new(vec![0.0; FFT_SIZE])),
        }
    }

    /// Push the most recent output into the window (audio thread side)
    ///
    /// Mixes each frame down to mono and keeps the newest `FFT_SIZE`
    /// samples. Skips the update entirely when the reader holds the lock.
    pub fn write(&self, buffer: &StereoBuffer) {
        let Ok(mut window) = self.window.try_lock() else {
            return;
        };

        let incoming = buffer.len().min(FFT_SIZE);
        window.copy_within(incoming.., 0);
        for (dst, src) in window[FFT_SIZE - incoming..]
            .iter_mut()
            .zip(buffer.as_slice()[buffer.len() - incoming..].iter())
        {
            *dst = src.mixdown();
        }
    }

    /// Clear the window, e.g. when playback stops
    pub fn clear(&self) {
        if let Ok(mut window) = self.window.lock() {
            window.iter_mut().for_each(|s| *s = 0.0);
        }
    }

    fn snapshot(&self, out: &mut [f32; FFT_SIZE]) {
        if let Ok(window) = self.window.lock() {
            out.copy_from_slice(&window);
        }
    }
}

impl Default for AnalysisTap {
    fn default() -> Self {
        Self::new()
    }
}

/// Control-side spectrum analyser
///
/// Applies a Hann window, runs a forward FFT, smooths bin magnitudes over
/// time, and scales them to bytes over a fixed decibel range. One analyser
/// instance holds the smoothing state for one feed.
pub struct Analyser {
    tap: AnalysisTap,
    fft: Arc<dyn Fft<f32>>,
    hann: [f32; FFT_SIZE],
    smoothed: [f32; BIN_COUNT],
}

impl Analyser {
    pub fn new(tap: AnalysisTap) -> Self {
        let fft = FftPlanner::new().plan_fft_forward(FFT_SIZE);

        let mut hann = [0.0f32; FFT_SIZE];
        for (i, w) in hann.iter_mut().enumerate() {
            let phase = i as f32 / (FFT_SIZE - 1) as f32;
            *w = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * phase).cos());
        }

        Self {
            tap,
            fft,
            hann,
            smoothed: [0.0; BIN_COUNT],
        }
    }

    /// Compute one spectrum frame as `BIN_COUNT` bytes
    ///
    /// Byte 0 corresponds to `MIN_DB` and below, byte 255 to `MAX_DB` and
    /// above, matching the conventional analyser byte scaling.
    pub fn frequency_bin_bytes(&mut self) -> Vec<u8> {
        let mut window = [0.0f32; FFT_SIZE];
        self.tap.snapshot(&mut window);

        let mut spectrum: Vec<Complex<f32>> = window
            .iter()
            .zip(self.hann.iter())
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();
        self.fft.process(&mut spectrum);

        let mut bytes = Vec::with_capacity(BIN_COUNT);
        for (i, bin) in spectrum.iter().take(BIN_COUNT).enumerate() {
            let magnitude = bin.norm() / FFT_SIZE as f32;
            self.smoothed[i] = SMOOTHING * self.smoothed[i] + (1.0 - SMOOTHING) * magnitude;

            let db = if self.smoothed[i] <= 1e-10 {
                MIN_DB
            } else {
                20.0 * self.smoothed[i].log10()
            };
            let scaled = 255.0 * (db - MIN_DB) / (MAX_DB - MIN_DB);
            bytes.push(scaled.clamp(0.0, 255.0) as u8);
        }
        bytes
    }

    /// Drop smoothing state so the next frame starts cold
    pub fn reset(&mut self) {
        self.smoothed = [0.0; BIN_COUNT];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_silence_maps_to_zero_bytes() {
        let tap = AnalysisTap::new();
        let mut analyser = Analyser::new(tap);
        let bins = analyser.frequency_bin_bytes();
        assert_eq!(bins.len(), BIN_COUNT);
        assert!(bins.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_tone_raises_the_matching_bin() {
        let tap = AnalysisTap::new();
        let mut analyser = Analyser::new(tap.clone());

        // Bin 8 of a 256-point FFT: 8 cycles per window.
        let mut buf = StereoBuffer::silence(FFT_SIZE);
        for (i, s) in buf.as_mut_slice().iter_mut().enumerate() {
            let phase = 2.0 * std::f32::consts::PI * 8.0 * i as f32 / FFT_SIZE as f32;
            *s = StereoSample::mono(phase.sin() * 0.9);
        }
        tap.write(&buf);

        // Run a few frames so smoothing converges toward the live signal.
        let mut bins = Vec::new();
        for _ in 0..20 {
            bins = analyser.frequency_bin_bytes();
        }

        assert!(bins[8] > 200, "tone bin too quiet: {}", bins[8]);
        assert!(bins[40] < 50, "distant bin too loud: {}", bins[40]);
    }

    #[test]
    fn test_clear_empties_the_window() {
        let tap = AnalysisTap::new();
        let mut buf = StereoBuffer::silence(FFT_SIZE);
        for s in buf.iter_mut() {
            *s = StereoSample::mono(0.5);
        }
        tap.write(&buf);
        tap.clear();

        let mut analyser = Analyser::new(tap);
        let bins = analyser.frequency_bin_bytes();
        assert!(bins.iter().all(|&b| b == 0));
    }
}
