//! Sample buffers shared between the decode worker and the output callback.

pub mod audio;
pub mod ring;

pub use audio::{AudioBuffer, BufferState, CallbackStatus, PlaybackProgress};
pub use ring::RingBuffer;
