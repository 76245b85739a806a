//! Master-bus dynamics compressor
//!
//! Sits after the track mix and in front of the output tap. A soft-knee
//! downward compressor with an envelope follower smoothed by attack and
//! release time constants. Parameters can be reprogrammed at any time,
//! including mid-playback; reprogramming never resets the envelope, so a
//! repeated identical update is audibly a no-op.

use crate::engine::error::InvalidParamError;
use crate::types::{Sample, StereoBuffer};

/// Compressor parameter selector for single-parameter updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressorParam {
    Threshold,
    Knee,
    Ratio,
    Attack,
    Release,
}

impl CompressorParam {
    pub fn name(self) -> &'static str {
        match self {
            CompressorParam::Threshold => "threshold",
            CompressorParam::Knee => "knee",
            CompressorParam::Ratio => "ratio",
            CompressorParam::Attack => "attack",
            CompressorParam::Release => "release",
        }
    }

    /// Legal `(min, max)` range for this parameter
    pub fn range(self) -> (f32, f32) {
        match self {
            CompressorParam::Threshold => (-100.0, 0.0),
            CompressorParam::Knee => (0.0, 40.0),
            CompressorParam::Ratio => (1.0, 20.0),
            CompressorParam::Attack => (0.0, 1.0),
            CompressorParam::Release => (0.0, 1.0),
        }
    }
}

/// Validated compressor parameter set
///
/// Construction and mutation both range-check, so a value held in a
/// `CompressorParams` is always legal. Out-of-range values are rejected,
/// never clamped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorParams {
    /// Level above which compression starts, in dB
    pub threshold: f32,
    /// Width of the soft-knee region, in dB
    pub knee: f32,
    /// Input/output slope above threshold
    pub ratio: f32,
    /// Envelope attack time in seconds
    pub attack: f32,
    /// Envelope release time in seconds
    pub release: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            threshold: -24.0,
            knee: 30.0,
            ratio: 12.0,
            attack: 0.003,
            release: 0.25,
        }
    }
}

impl CompressorParams {
    /// Set one parameter, rejecting values outside its legal range
    pub fn set(&mut self, param: CompressorParam, value: f32) -> Result<(), InvalidParamError> {
        let (min, max) = param.range();
        if !value.is_finite() || value < min || value > max {
            return Err(InvalidParamError::new(param.name(), value, min, max));
        }
        match param {
            CompressorParam::Threshold => self.threshold = value,
            CompressorParam::Knee => self.knee = value,
            CompressorParam::Ratio => self.ratio = value,
            CompressorParam::Attack => self.attack = value,
            CompressorParam::Release => self.release = value,
        }
        Ok(())
    }

    pub fn get(&self, param: CompressorParam) -> f32 {
        match param {
            CompressorParam::Threshold => self.threshold,
            CompressorParam::Knee => self.knee,
            CompressorParam::Ratio => self.ratio,
            CompressorParam::Attack => self.attack,
            CompressorParam::Release => self.release,
        }
    }
}

fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

fn linear_to_db(linear: f32) -> f32 {
    if linear <= 1e-10 {
        -200.0
    } else {
        20.0 * linear.log10()
    }
}

/// Soft-knee compressor with an exponential envelope follower
pub struct Compressor {
    params: CompressorParams,
    sample_rate: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Smoothed gain reduction in dB (always <= 0)
    envelope_db: f32,
    /// Number of parameter programs applied since creation
    programmed: u64,
}

impl Compressor {
    pub fn new(sample_rate: u32) -> Self {
        let params = CompressorParams::default();
        let mut c = Self {
            params,
            sample_rate: sample_rate as f32,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope_db: 0.0,
            programmed: 0,
        };
        c.program(params);
        c
    }

    /// Install a new parameter set and recompute the smoothing coefficients
    ///
    /// The envelope carries over, so there is no click when the same or a
    /// nearby parameter set is reapplied during playback.
    pub fn program(&mut self, params: CompressorParams) {
        self.params = params;
        self.attack_coeff = time_coeff(params.attack, self.sample_rate);
        self.release_coeff = time_coeff(params.release, self.sample_rate);
        self.programmed += 1;
    }

    pub fn params(&self) -> CompressorParams {
        self.params
    }

    /// How many times parameters have been programmed
    pub fn programs_applied(&self) -> u64 {
        self.programmed
    }

    /// Target gain reduction in dB for an input level in dB
    ///
    /// Below the knee region the curve is unity; inside the knee it blends
    /// quadratically; above it the slope is `1/ratio`.
    fn reduction_db(&self, level_db: f32) -> f32 {
        let threshold = self.params.threshold;
        let knee = self.params.knee;
        let ratio = self.params.ratio;

        let over = level_db - threshold;
        if over <= -knee / 2.0 {
            0.0
        } else if over < knee / 2.0 {
            let x = over + knee / 2.0;
            (1.0 / ratio - 1.0) * x * x / (2.0 * knee)
        } else {
            (1.0 / ratio - 1.0) * over
        }
    }

    /// Compress `buffer` in place
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            let level_db = linear_to_db(sample.peak());
            let target_db = self.reduction_db(level_db);

            // More reduction means attack, less means release.
            let coeff = if target_db < self.envelope_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope_db = target_db + coeff * (self.envelope_db - target_db);

            let gain = db_to_linear(self.envelope_db);
            *sample *= gain;
        }
    }

    /// Drop any accumulated envelope, e.g. when a new session is installed
    pub fn reset(&mut self) {
        self.envelope_db = 0.0;
    }
}

/// One-pole smoothing coefficient for a time constant in seconds
fn time_coeff(seconds: f32, sample_rate: f32) -> f32 {
    if seconds <= 0.0 {
        0.0
    } else {
        (-1.0 / (seconds * sample_rate)).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_defaults_match_programmed_values() {
        let p = CompressorParams::default();
        assert_eq!(p.threshold, -24.0);
        assert_eq!(p.knee, 30.0);
        assert_eq!(p.ratio, 12.0);
        assert_eq!(p.attack, 0.003);
        assert_eq!(p.release, 0.25);
    }

    #[test]
    fn test_out_of_range_values_are_rejected() {
        let mut p = CompressorParams::default();
        assert!(p.set(CompressorParam::Threshold, 1.0).is_err());
        assert!(p.set(CompressorParam::Threshold, -101.0).is_err());
        assert!(p.set(CompressorParam::Ratio, 0.5).is_err());
        assert!(p.set(CompressorParam::Attack, f32::NAN).is_err());
        // Rejection leaves the previous value in place.
        assert_eq!(p.threshold, -24.0);
        assert_eq!(p.ratio, 12.0);
    }

    #[test]
    fn test_in_range_values_are_applied() {
        let mut p = CompressorParams::default();
        p.set(CompressorParam::Threshold, -50.0).unwrap();
        p.set(CompressorParam::Knee, 0.0).unwrap();
        p.set(CompressorParam::Ratio, 20.0).unwrap();
        assert_eq!(p.threshold, -50.0);
        assert_eq!(p.knee, 0.0);
        assert_eq!(p.ratio, 20.0);
    }

    #[test]
    fn test_quiet_signal_passes_unchanged() {
        let mut c = Compressor::new(48_000);
        let mut buf = StereoBuffer::silence(64);
        for s in buf.iter_mut() {
            *s = StereoSample::mono(0.001);
        }
        c.process(&mut buf);
        // -60 dB is far below threshold minus half the knee.
        for s in buf.iter() {
            assert!((s.left - 0.001).abs() < 1e-5);
        }
    }

    #[test]
    fn test_loud_signal_is_reduced() {
        let mut c = Compressor::new(48_000);
        let frames = 48_000 / 2;
        let mut buf = StereoBuffer::silence(frames);
        for s in buf.iter_mut() {
            *s = StereoSample::mono(1.0);
        }
        c.process(&mut buf);
        // After half a second at 0 dBFS the envelope has settled well past
        // the 3 ms attack; reduction should be substantial.
        let tail = buf[frames - 1].left;
        assert!(tail < 0.5, "expected reduction, got {}", tail);
    }

    #[test]
    fn test_reprogram_counts_applications() {
        let mut c = Compressor::new(48_000);
        assert_eq!(c.programs_applied(), 1);
        let p = c.params();
        c.program(p);
        c.program(p);
        assert_eq!(c.programs_applied(), 3);
        assert_eq!(c.params(), p);
    }
}
