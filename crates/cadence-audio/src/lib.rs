//! # cadence-audio
//!
//! Streaming audio decode-and-playback engine for Cadence.
//!
//! Features:
//! - Bounded ring buffer between the decode worker and the output callback
//! - Symphonia-based decoding with exact sample normalization
//! - Backpressure that keeps roughly 25-30 seconds of audio buffered
//! - cpal output behind a swappable host trait

pub mod buffer;
pub mod clip;
pub mod config;
pub mod normalize;
pub mod output;
pub mod player;
pub mod session;
pub mod worker;

#[cfg(test)]
mod testing;

pub use buffer::{AudioBuffer, CallbackStatus, PlaybackProgress, RingBuffer};
pub use clip::AudioClip;
pub use config::PlayerConfig;
pub use output::{AudioHost, CpalHost, OutputConfig, OutputStream};
pub use player::{AudioPlayer, PlayerEvent};
pub use worker::ControlCommand;
