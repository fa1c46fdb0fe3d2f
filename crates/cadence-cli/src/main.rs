//! # Cadence
//!
//! Plays an audio file to completion from the terminal.
//!
//! Usage:
//!   cadence play <FILE>          - Play a file
//!   cadence play -i <FILE>       - Play with a p/r/s/q prompt on stdin
//!   cadence devices              - List output devices

mod config;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use cadence_audio::output::{default_device_name, list_output_devices};
use cadence_audio::{AudioClip, AudioPlayer, PlayerEvent};
use clap::{Parser, Subcommand};
use crossbeam_channel::{select, tick, unbounded, Receiver};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const STATUS_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Parser)]
#[command(name = "cadence", version, about = "Streaming audio player")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play an audio file
    Play {
        /// File to play
        file: PathBuf,
        /// JSON player configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Seconds of audio the buffer can hold
        #[arg(long)]
        look_ahead_secs: Option<u32>,
        /// Buffered seconds at which decoding pauses
        #[arg(long)]
        throttle_secs: Option<u32>,
        /// Longest single backpressure wait, in milliseconds
        #[arg(long)]
        backoff_ms: Option<u64>,
        /// Read p(ause), r(esume), s(top), q(uit) from stdin
        #[arg(short, long)]
        interactive: bool,
    },
    /// List output devices
    Devices,
}

/// Commands typed at the interactive prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptCommand {
    Pause,
    Resume,
    Stop,
    Quit,
}

impl PromptCommand {
    fn parse(line: &str) -> Option<Self> {
        match line.trim() {
            "p" | "pause" => Some(Self::Pause),
            "r" | "resume" => Some(Self::Resume),
            "s" | "stop" => Some(Self::Stop),
            "q" | "quit" => Some(Self::Quit),
            _ => None,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence=info,cadence_audio=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            file,
            config,
            look_ahead_secs,
            throttle_secs,
            backoff_ms,
            interactive,
        } => {
            let overrides = config::Overrides {
                look_ahead_secs,
                throttle_secs,
                backoff_ms,
            };
            let config = config::load(config.as_deref(), overrides)?;
            play(file, config, interactive)
        }
        Commands::Devices => devices(),
    }
}

fn devices() -> Result<()> {
    let default = default_device_name();
    for name in list_output_devices()? {
        let marker = if default.as_deref() == Some(name.as_str()) { "*" } else { " " };
        println!("{marker} {name}");
    }
    Ok(())
}

fn play(file: PathBuf, config: cadence_audio::PlayerConfig, interactive: bool) -> Result<()> {
    info!("Starting Cadence v{}", env!("CARGO_PKG_VERSION"));

    let clip = AudioClip::create(&file)
        .with_context(|| format!("Failed to open {}", file.display()))?;
    println!(
        "{} ({}, {} Hz, {} ch, {})",
        file.display(),
        clip.codec_name().unwrap_or("unknown codec"),
        clip.sample_rate(),
        clip.channels(),
        clip.duration().map_or_else(|| "?".to_string(), format_time),
    );

    let mut player = AudioPlayer::with_config(config)?;
    player.play(Arc::new(clip))?;

    let prompt = if interactive {
        println!("Commands: p(ause) r(esume) s(top) q(uit)");
        spawn_prompt()
    } else {
        crossbeam_channel::never()
    };
    let status = tick(STATUS_INTERVAL);

    loop {
        select! {
            recv(prompt) -> command => match command {
                Ok(PromptCommand::Pause) => report(player.pause()),
                Ok(PromptCommand::Resume) => report(player.resume()),
                Ok(PromptCommand::Stop) => report(player.stop()),
                Ok(PromptCommand::Quit) | Err(_) => break,
            },
            recv(status) -> _ => {
                while let Some(event) = player.try_recv_event() {
                    if let PlayerEvent::Error(message) = event {
                        warn!("Playback error: {message}");
                    }
                }
                if let Some(err) = player.take_error() {
                    bail!("Playback failed: {err}");
                }
                if player.is_finished() {
                    println!();
                    info!("Playback complete");
                    break;
                }
                if player.is_stopped() && !interactive {
                    break;
                }
                print_status(&player);
            },
        }
    }

    Ok(())
}

/// Forward stdin lines as prompt commands until EOF.
fn spawn_prompt() -> Receiver<PromptCommand> {
    let (tx, rx) = unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            match PromptCommand::parse(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None => eprintln!("Unknown command: {}", line.trim()),
            }
        }
    });
    rx
}

fn report(result: cadence_core::Result<()>) {
    if let Err(e) = result {
        eprintln!("{e}");
    }
}

fn print_status(player: &AudioPlayer) {
    let Some(progress) = player.progress() else {
        return;
    };
    let position = player.position().unwrap_or_default();
    let buffered = progress.buffered_samples as f64 / progress.capacity.max(1) as f64;
    eprint!(
        "\r[{}] {} buffered {:>3.0}%   ",
        player.state(),
        format_time(position),
        buffered * 100.0
    );
}

fn format_time(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_parsing() {
        assert_eq!(PromptCommand::parse("p"), Some(PromptCommand::Pause));
        assert_eq!(PromptCommand::parse(" resume \n"), Some(PromptCommand::Resume));
        assert_eq!(PromptCommand::parse("s"), Some(PromptCommand::Stop));
        assert_eq!(PromptCommand::parse("quit"), Some(PromptCommand::Quit));
        assert_eq!(PromptCommand::parse("x"), None);
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(61.9), "1:01");
        assert_eq!(format_time(-3.0), "0:00");
    }

    #[test]
    fn test_cli_parses_overrides() {
        let cli = Cli::try_parse_from(["cadence", "play", "song.ogg", "--throttle-secs", "10", "-i"])
            .unwrap_or_else(|e| panic!("{e}"));
        match cli.command {
            Commands::Play {
                file,
                throttle_secs,
                interactive,
                ..
            } => {
                assert_eq!(file, PathBuf::from("song.ogg"));
                assert_eq!(throttle_secs, Some(10));
                assert!(interactive);
            }
            Commands::Devices => panic!("parsed the wrong subcommand"),
        }
    }
}
