//! Lockstep Player - synchronized multi-track playback from the terminal
//!
//! Loads every audio file given on the command line as one session and
//! drives it from a small interactive prompt.
//!
//! ## Command line flags
//!
//! - `--loop`: wrap playback at the session end
//! - `--offline`: run without an audio device (timing only)
//! - `--buffer <frames>`: request a specific output buffer size

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use lockstep_core::audio::AudioConfig;
use lockstep_core::engine::CompressorParam;
use lockstep_core::Player;

fn main() -> Result<()> {
    // Initialize logger - set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let looping = args.iter().any(|a| a == "--loop");
    let offline = args.iter().any(|a| a == "--offline");
    let buffer_frames = args
        .iter()
        .position(|a| a == "--buffer")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse::<u32>().ok());

    let sources: Vec<PathBuf> = args
        .iter()
        .enumerate()
        .filter(|(i, a)| {
            !a.starts_with("--")
                && !matches!(
                    args.get(i.wrapping_sub(1)).map(String::as_str),
                    Some("--buffer")
                )
        })
        .map(|(_, a)| PathBuf::from(a))
        .collect();

    if sources.is_empty() {
        bail!("Usage: lockstep-player [--loop] [--offline] [--buffer <frames>] <file>...");
    }

    log::info!("lockstep-player starting up");

    // Initialize Rayon before audio starts so the pool never lazily
    // initializes inside the audio callback.
    rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .thread_name(|i| format!("rayon-audio-{}", i))
        .build_global()
        .context("Failed to initialize Rayon thread pool")?;

    let mut player = if offline {
        Player::new_offline(sources, 48_000, buffer_frames.unwrap_or(512))?
    } else {
        let mut config = AudioConfig::default();
        if let Some(frames) = buffer_frames {
            config = config.with_buffer_frames(frames);
        }
        Player::new(sources, &config)?
    };

    player.set_looping(looping)?;
    player.load_all()?;

    println!(
        "Loaded {} tracks, session length {:.2}s @ {} Hz",
        player.track_count(),
        player.duration_seconds(),
        player.sample_rate()
    );
    for track in player.tracks() {
        println!(
            "  [{}] {} ({:.2}s, {} ch @ {} Hz)",
            track.id,
            track.source.display(),
            track.duration_seconds,
            track.channels,
            track.source_sample_rate
        );
    }
    println!();
    println!("Commands: play | stop | seek <s> | mute <n> | loop on|off | comp <param> <value> | status | quit");

    let clock = player.clock_ticks();
    std::thread::spawn(move || {
        for tick in clock.iter() {
            log::debug!("clock {:.2}s", tick.seconds);
        }
    });

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let result = match parts.as_slice() {
            [] => Ok(()),
            ["play"] => player.play(),
            ["stop"] => player.stop(),
            ["seek", s] => match s.parse::<f64>() {
                Ok(seconds) => player.seek(seconds),
                Err(_) => {
                    println!("seek takes a position in seconds");
                    Ok(())
                }
            },
            ["mute", n] => match n.parse::<usize>() {
                Ok(track) => player.toggle_track_muted(track).map(|muted| {
                    println!("track {} {}", track, if muted { "muted" } else { "unmuted" });
                }),
                Err(_) => {
                    println!("mute takes a track number");
                    Ok(())
                }
            },
            ["loop", flag @ ("on" | "off")] => player.set_looping(*flag == "on"),
            ["comp", param, value] => match (parse_param(param), value.parse::<f32>()) {
                (Some(param), Ok(value)) => player.set_compressor_param(param, value),
                _ => {
                    println!("comp takes threshold|knee|ratio|attack|release and a value");
                    Ok(())
                }
            },
            ["status"] => {
                println!(
                    "{:?} at {:.2}s / {:.2}s (loop {})",
                    player.state(),
                    player.position_seconds(),
                    player.duration_seconds(),
                    if player.looping() { "on" } else { "off" }
                );
                Ok(())
            }
            ["quit"] | ["exit"] => break,
            _ => {
                println!("Unknown command: {}", line.trim());
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("Error: {}", e);
        }
    }

    log::info!("lockstep-player shutting down");
    Ok(())
}

fn parse_param(name: &str) -> Option<CompressorParam> {
    match name {
        "threshold" => Some(CompressorParam::Threshold),
        "knee" => Some(CompressorParam::Knee),
        "ratio" => Some(CompressorParam::Ratio),
        "attack" => Some(CompressorParam::Attack),
        "release" => Some(CompressorParam::Release),
        _ => None,
    }
}
