//! Track loading: fetch, decode, and resample audio assets
//!
//! Loading fans out across all requested sources in parallel and fails as a
//! whole if any single source fails, so a session is never exposed with a
//! partial track list. Decoding is delegated to Symphonia; decoded audio is
//! adapted to stereo and resampled to the engine rate so every lane shares
//! one clock domain.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use thiserror::Error;

use crate::types::StereoBuffer;

/// Errors surfaced by the track loader
///
/// Every variant identifies the failing source ref so the caller can report
/// which asset broke the session load.
#[derive(Error, Debug)]
pub enum LoadError {
    /// An empty source list has no meaningful session
    #[error("No audio sources given")]
    NoSources,

    /// Reading the raw bytes failed
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Symphonia could not probe or decode the bytes
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    /// Sample rate conversion to the engine rate failed
    #[error("Failed to resample {path}: {reason}")]
    Resample { path: PathBuf, reason: String },
}

/// Raw decoder output: interleaved f32 plus stream metadata
#[derive(Debug)]
pub struct DecodedAudio {
    /// Interleaved samples, `channels` per frame
    pub samples: Vec<f32>,
    /// Sample rate of the source stream
    pub sample_rate: u32,
    /// Channel count of the source stream
    pub channels: u16,
}

impl DecodedAudio {
    /// Duration of the decoded stream in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.channels == 0 || self.sample_rate == 0 {
            return 0.0;
        }
        (self.samples.len() / self.channels as usize) as f64 / self.sample_rate as f64
    }
}

/// One decoded track within a session
///
/// `id` is the track's ordinal, equal to its position in the request order;
/// it stays stable for the whole session and correlates playback nodes,
/// gain nodes, and mute flags. The buffer is immutable once decoded and is
/// shared with the audio thread via `Arc`.
#[derive(Debug, Clone)]
pub struct Track {
    /// Ordinal index (request order)
    pub id: usize,
    /// Source the bytes came from
    pub source: PathBuf,
    /// Decoded stereo samples at the engine rate
    pub buffer: Arc<StereoBuffer>,
    /// Duration at the engine rate
    pub duration_seconds: f64,
    /// Channel count of the source asset (before stereo adaptation)
    pub channels: u16,
    /// Sample rate of the source asset (before resampling)
    pub source_sample_rate: u32,
}

/// Load and decode all sources concurrently, preserving input order
///
/// Fan-out runs on the Rayon pool, so total wall time is bounded by the
/// slowest source rather than the sum of all of them. Any individual
/// failure fails the whole call.
pub fn load_all(sources: &[PathBuf], target_rate: u32) -> Result<Vec<Track>, LoadError> {
    if sources.is_empty() {
        return Err(LoadError::NoSources);
    }

    let start = std::time::Instant::now();

    let tracks = sources
        .par_iter()
        .enumerate()
        .map(|(id, path)| load_track(id, path, target_rate))
        .collect::<Result<Vec<_>, _>>()?;

    log::info!(
        "Loaded {} tracks in {:?} (target rate {} Hz)",
        tracks.len(),
        start.elapsed(),
        target_rate
    );

    Ok(tracks)
}

/// Load a single source: read bytes, decode, adapt to stereo, resample
pub fn load_track(id: usize, path: &Path, target_rate: u32) -> Result<Track, LoadError> {
    let raw = std::fs::read(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let ext = path.extension().and_then(|e| e.to_str());
    let decoded = decode_bytes(raw, ext).map_err(|reason| LoadError::Decode {
        path: path.to_path_buf(),
        reason,
    })?;

    let channels = decoded.channels;
    let source_sample_rate = decoded.sample_rate;

    let stereo = to_stereo_interleaved(&decoded);
    let stereo = if source_sample_rate != target_rate {
        resample_stereo(&stereo, source_sample_rate, target_rate).map_err(|reason| {
            LoadError::Resample {
                path: path.to_path_buf(),
                reason,
            }
        })?
    } else {
        stereo
    };

    let buffer = StereoBuffer::from_interleaved(&stereo);
    let duration_seconds = buffer.len() as f64 / target_rate as f64;

    log::debug!(
        "Track {}: {:?}: {:.2}s, {} ch @ {} Hz (engine rate {} Hz)",
        id,
        path,
        duration_seconds,
        channels,
        source_sample_rate,
        target_rate
    );

    Ok(Track {
        id,
        source: path.to_path_buf(),
        buffer: Arc::new(buffer),
        duration_seconds,
        channels,
        source_sample_rate,
    })
}

/// Decode an opaque byte buffer to f32 samples using Symphonia
///
/// This is the codec collaborator boundary: bytes in, interleaved samples
/// plus sample-rate/channel metadata out.
pub fn decode_bytes(raw: Vec<u8>, ext_hint: Option<&str>) -> Result<DecodedAudio, String> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let mss = MediaSourceStream::new(Box::new(Cursor::new(raw)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = ext_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| e.to_string())?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| "No audio track found".to_string())?;

    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| "Unknown sample rate".to_string())?;

    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| e.to_string())?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Error decoding packet: {}", e);
                continue;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            let duration = decoded.capacity() as u64;
            sample_buf = Some(SampleBuffer::new(duration, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if samples.is_empty() {
        return Err("Decoded stream contained no samples".to_string());
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Adapt decoded audio of any channel count to interleaved stereo
///
/// Mono is duplicated into both channels; anything above stereo keeps the
/// first stereo pair.
fn to_stereo_interleaved(decoded: &DecodedAudio) -> Vec<f32> {
    match decoded.channels {
        0 | 1 => decoded.samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => decoded.samples.clone(),
        n => decoded
            .samples
            .chunks(n as usize)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

/// Resample interleaved stereo from `source_rate` to `target_rate`
fn resample_stereo(
    interleaved: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, String> {
    let frames = interleaved.len() / 2;
    if frames == 0 {
        return Ok(Vec::new());
    }

    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);
    for frame in interleaved.chunks_exact(2) {
        left.push(frame[0]);
        right.push(frame[1]);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(
        target_rate as f64 / source_rate as f64,
        2.0,
        params,
        frames,
        2,
    )
    .map_err(|e| e.to_string())?;

    let waves_in = vec![left, right];
    let waves_out = resampler.process(&waves_in, None).map_err(|e| e.to_string())?;

    let out_left = &waves_out[0];
    let out_right = &waves_out[1];
    let mut out = Vec::with_capacity(out_left.len() * 2);
    for (l, r) in out_left.iter().zip(out_right.iter()) {
        out.push(*l);
        out.push(*r);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(samples: Vec<f32>, channels: u16) -> DecodedAudio {
        DecodedAudio {
            samples,
            sample_rate: 48_000,
            channels,
        }
    }

    #[test]
    fn test_mono_is_duplicated() {
        let out = to_stereo_interleaved(&decoded(vec![0.1, 0.2], 1));
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn test_stereo_passes_through() {
        let out = to_stereo_interleaved(&decoded(vec![0.1, 0.2, 0.3, 0.4], 2));
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_multichannel_keeps_first_pair() {
        let out = to_stereo_interleaved(&decoded(vec![0.1, 0.2, 9.0, 9.0, 0.3, 0.4, 9.0, 9.0], 4));
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_resample_changes_length() {
        // A second of 44.1k stereo resampled to 48k should land close to
        // 48k frames (sinc resamplers trim a little at the edges).
        let frames = 44_100;
        let interleaved: Vec<f32> = (0..frames)
            .flat_map(|i| {
                let s = (i as f32 * 0.01).sin() * 0.5;
                [s, s]
            })
            .collect();

        let out = resample_stereo(&interleaved, 44_100, 48_000).unwrap();
        let out_frames = out.len() / 2;
        assert!(
            (out_frames as i64 - 48_000).unsigned_abs() < 1_000,
            "unexpected output length: {}",
            out_frames
        );
    }

    #[test]
    fn test_empty_source_list_is_rejected() {
        match load_all(&[], 48_000) {
            Err(LoadError::NoSources) => {}
            other => panic!("expected NoSources, got {:?}", other.map(|t| t.len())),
        }
    }
}
