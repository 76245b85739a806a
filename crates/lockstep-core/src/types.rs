//! Common types for Lockstep
//!
//! Fundamental audio types shared by the loader, the mix graph, and the
//! audio backend: stereo sample/buffer handling and the transport state.

use std::ops::{Index, IndexMut};

/// Audio sample type (32-bit float throughout the processing chain)
pub type Sample = f32;

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` so a `&[StereoSample]` can be viewed as interleaved
/// `&[f32]` ([L, R, L, R, ...]) with bytemuck, avoiding per-frame format
/// conversions when handing buffers to the output device.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    /// Create a new stereo sample
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Create a mono sample (same value in both channels)
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }

    /// Mono mixdown (average of both channels)
    #[inline]
    pub fn mixdown(&self) -> Sample {
        0.5 * (self.left + self.right)
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// A buffer of stereo samples
///
/// The primary audio buffer type used throughout Lockstep: track buffers,
/// per-lane render scratch, and the master output all use it.
#[derive(Debug, Clone)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from interleaved samples [L, R, L, R, ...]
    pub fn from_interleaved(interleaved: &[Sample]) -> Self {
        assert!(interleaved.len() % 2 == 0, "Interleaved buffer must have even length");
        let samples = interleaved
            .chunks_exact(2)
            .map(|chunk| StereoSample::new(chunk[0], chunk[1]))
            .collect();
        Self { samples }
    }

    /// Get the number of stereo samples in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Resize the buffer, filling with silence if growing
    pub fn resize(&mut self, new_len: usize) {
        self.samples.resize(new_len, StereoSample::silence());
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Never allocates as long as `new_len <= capacity`. Newly exposed
    /// elements are filled with silence.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        let current_len = self.samples.len();
        if new_len > current_len {
            debug_assert!(
                new_len <= self.samples.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    /// Get a slice of the samples
    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    /// Get a mutable slice of the samples
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Get a zero-copy view of samples as interleaved f32 [L, R, L, R, ...]
    ///
    /// Zero-cost thanks to `#[repr(C)]` on StereoSample. Used when copying
    /// to a stereo device buffer.
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Add another buffer to this one (summing samples)
    pub fn add_buffer(&mut self, other: &StereoBuffer) {
        assert_eq!(self.len(), other.len(), "Buffer lengths must match");
        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }
    }

    /// Scale all samples by a factor
    pub fn scale(&mut self, factor: Sample) {
        for sample in &mut self.samples {
            *sample *= factor;
        }
    }

    /// Get an iterator over the samples
    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    /// Get a mutable iterator over the samples
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

impl Default for StereoBuffer {
    fn default() -> Self {
        Self { samples: Vec::new() }
    }
}

/// Transport state of the session
///
/// `Idle` and `Loading` exist only on the control side (before a session
/// is installed on the audio thread); `Ready`, `Playing` and `Stopped`
/// are written by the audio thread and read lock-free via atomics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    /// No session loaded yet
    #[default]
    Idle,
    /// Track load + decode in flight
    Loading,
    /// Graph built, never played
    Ready,
    /// All playback nodes running
    Playing,
    /// Hard-stopped (or reached the end of the program)
    Stopped,
}

impl TransportState {
    /// Encode for atomic storage
    pub fn as_u8(self) -> u8 {
        match self {
            TransportState::Idle => 0,
            TransportState::Loading => 1,
            TransportState::Ready => 2,
            TransportState::Playing => 3,
            TransportState::Stopped => 4,
        }
    }

    /// Decode from atomic storage (unknown values map to Idle)
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => TransportState::Loading,
            2 => TransportState::Ready,
            3 => TransportState::Playing,
            4 => TransportState::Stopped,
            _ => TransportState::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_sample_operations() {
        let a = StereoSample::new(1.0, 2.0);
        let b = StereoSample::new(0.5, 0.5);

        let sum = a + b;
        assert_eq!(sum.left, 1.5);
        assert_eq!(sum.right, 2.5);

        let scaled = a * 0.5;
        assert_eq!(scaled.left, 0.5);
        assert_eq!(scaled.right, 1.0);

        assert_eq!(a.mixdown(), 1.5);
    }

    #[test]
    fn test_stereo_buffer_from_interleaved() {
        let interleaved = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let buffer = StereoBuffer::from_interleaved(&interleaved);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer[0].left, 1.0);
        assert_eq!(buffer[0].right, 2.0);
        assert_eq!(buffer[2].left, 5.0);
        assert_eq!(buffer[2].right, 6.0);
    }

    #[test]
    fn test_interleaved_roundtrip_view() {
        let buffer = StereoBuffer::from_interleaved(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buffer.as_interleaved(), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_transport_state_encoding() {
        for state in [
            TransportState::Idle,
            TransportState::Loading,
            TransportState::Ready,
            TransportState::Playing,
            TransportState::Stopped,
        ] {
            assert_eq!(TransportState::from_u8(state.as_u8()), state);
        }
        assert_eq!(TransportState::from_u8(99), TransportState::Idle);
    }
}
