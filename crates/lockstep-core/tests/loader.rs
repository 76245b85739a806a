//! Loader integration tests with real WAV fixtures

use std::fs;
use std::path::PathBuf;

use hound::{SampleFormat, WavSpec, WavWriter};
use tempfile::TempDir;

use lockstep_core::loader::{load_all, load_track, LoadError};

const RATE: u32 = 8_000;

fn write_wav(dir: &TempDir, name: &str, sample_rate: u32, channels: u16, frames: usize) -> PathBuf {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let path = dir.path().join(name);
    let mut writer = WavWriter::create(&path, spec).unwrap();
    for i in 0..frames {
        let s = (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin() * 0.5;
        for _ in 0..channels {
            writer.write_sample(s).unwrap();
        }
    }
    writer.finalize().unwrap();
    path
}

#[test]
fn test_tracks_come_back_in_request_order() {
    let dir = TempDir::new().unwrap();
    let sources = vec![
        write_wav(&dir, "a.wav", RATE, 2, 4_000),
        write_wav(&dir, "b.wav", RATE, 2, 1_000),
        write_wav(&dir, "c.wav", RATE, 2, 2_000),
    ];

    let tracks = load_all(&sources, RATE).unwrap();
    assert_eq!(tracks.len(), 3);
    for (i, track) in tracks.iter().enumerate() {
        assert_eq!(track.id, i);
        assert_eq!(track.source, sources[i]);
    }
    assert_eq!(tracks[0].buffer.len(), 4_000);
    assert_eq!(tracks[1].buffer.len(), 1_000);
}

#[test]
fn test_one_bad_source_fails_the_whole_load() {
    let dir = TempDir::new().unwrap();
    let good = write_wav(&dir, "good.wav", RATE, 2, 1_000);
    let bad = dir.path().join("broken.wav");
    fs::write(&bad, b"this is not a wav file").unwrap();

    let sources = vec![good, bad.clone()];
    match load_all(&sources, RATE) {
        Err(LoadError::Decode { path, .. }) => assert_eq!(path, bad),
        other => panic!("expected Decode error, got {:?}", other.map(|t| t.len())),
    }
}

#[test]
fn test_missing_file_names_the_path() {
    let missing = PathBuf::from("/nonexistent/track.wav");
    match load_all(std::slice::from_ref(&missing), RATE) {
        Err(LoadError::Io { path, .. }) => assert_eq!(path, missing),
        other => panic!("expected Io error, got {:?}", other.map(|t| t.len())),
    }
}

#[test]
fn test_mono_source_fills_both_channels() {
    let dir = TempDir::new().unwrap();
    let path = write_wav(&dir, "mono.wav", RATE, 1, 800);

    let track = load_track(0, &path, RATE).unwrap();
    assert_eq!(track.channels, 1);
    assert_eq!(track.buffer.len(), 800);
    for sample in track.buffer.iter() {
        assert_eq!(sample.left, sample.right);
    }
    // The tone is not silence.
    assert!(track.buffer.peak() > 0.4);
}

#[test]
fn test_mismatched_rate_is_resampled() {
    let dir = TempDir::new().unwrap();
    // Half a second at 4 kHz.
    let path = write_wav(&dir, "slow.wav", 4_000, 2, 2_000);

    let track = load_track(0, &path, RATE).unwrap();
    assert_eq!(track.source_sample_rate, 4_000);
    // Duration in seconds survives the rate conversion.
    assert!(
        (track.duration_seconds - 0.5).abs() < 0.05,
        "duration drifted: {:.3}s",
        track.duration_seconds
    );
}
