//! Session sample buffer: the hand-off point between decoding and playback.

use std::time::Duration;

use cadence_core::{Error, Result};
use parking_lot::{Condvar, Mutex, MutexGuard};

use super::RingBuffer;
use crate::config::PlayerConfig;

/// Value returned by the output callback to the host driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    /// Keep requesting audio.
    Continue,
    /// Every decoded sample has been played and decoding has finished.
    Complete,
}

/// Snapshot of a session's progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackProgress {
    /// Samples handed to the output device.
    pub consumed_samples: u64,
    /// Samples produced by the decoder.
    pub decoded_samples: u64,
    /// Samples currently waiting in the ring buffer.
    pub buffered_samples: usize,
    /// Ring buffer capacity in samples.
    pub capacity: usize,
    /// Whether the decoder reached end of stream.
    pub finished_decoding: bool,
}

impl PlaybackProgress {
    pub const fn is_complete(&self) -> bool {
        self.finished_decoding && self.consumed_samples >= self.decoded_samples
    }
}

/// State guarded by the [`AudioBuffer`] mutex.
#[derive(Debug)]
pub struct BufferState {
    samples: RingBuffer<f32>,
    current_sample_index: u64,
    decoded_samples: u64,
    finished_decoding: bool,
    wake_pending: bool,
}

impl BufferState {
    /// Append one normalized sample produced by the decoder.
    pub fn push_sample(&mut self, sample: f32) -> Result<()> {
        self.samples.push(sample)?;
        self.decoded_samples += 1;
        Ok(())
    }

    /// Record that the decoder hit end of stream.
    pub fn mark_finished(&mut self) {
        debug_assert!(!self.finished_decoding, "end of stream reported twice");
        self.finished_decoding = true;
    }

    pub const fn buffered(&self) -> usize {
        self.samples.size()
    }

    /// Samples that can still be appended before the ring is full.
    pub fn free(&self) -> usize {
        self.samples.free()
    }

    pub const fn current_sample_index(&self) -> u64 {
        self.current_sample_index
    }

    pub const fn decoded_samples(&self) -> u64 {
        self.decoded_samples
    }

    pub const fn finished_decoding(&self) -> bool {
        self.finished_decoding
    }

    pub const fn is_complete(&self) -> bool {
        self.finished_decoding && self.current_sample_index >= self.decoded_samples
    }
}

/// Interleaved float samples shared by the decode worker and the output callback.
///
/// The producer appends under the mutex one decoded frame at a time; the consumer
/// drains under the same mutex from the real-time thread. The condition variable
/// lets the consumer wake a throttled producer without blocking.
#[derive(Debug)]
pub struct AudioBuffer {
    state: Mutex<BufferState>,
    drained: Condvar,
    sample_rate: u32,
    channels: usize,
    threshold: usize,
}

impl AudioBuffer {
    /// Allocate a buffer for a stream of the given shape.
    pub fn new(sample_rate: u32, channels: usize, config: &PlayerConfig) -> Result<Self> {
        if channels == 0 {
            return Err(Error::UnsupportedFormat(
                "stream reports zero channels".to_string(),
            ));
        }

        let samples = RingBuffer::new(config.capacity_samples(sample_rate, channels))?;

        Ok(Self {
            state: Mutex::new(BufferState {
                samples,
                current_sample_index: 0,
                decoded_samples: 0,
                finished_decoding: false,
                wake_pending: false,
            }),
            drained: Condvar::new(),
            sample_rate,
            channels,
            threshold: config.threshold_samples(sample_rate, channels),
        })
    }

    /// Lock the buffer for appending.
    pub fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock()
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Occupancy in samples at which the producer is throttled.
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Fill `output` with interleaved frames, padding with silence on underrun.
    ///
    /// Runs on the driver's real-time thread: takes only the buffer mutex and
    /// never allocates.
    pub fn render(&self, output: &mut [f32]) -> CallbackStatus {
        let mut state = self.state.lock();

        let requested_frames = output.len() / self.channels;
        let available_frames = state.samples.size() / self.channels;
        let copied = requested_frames.min(available_frames) * self.channels;

        for slot in &mut output[..copied] {
            *slot = state.samples.pop().unwrap_or(0.0);
        }
        state.current_sample_index += copied as u64;
        output[copied..].fill(0.0);

        let status = if state.is_complete() {
            CallbackStatus::Complete
        } else {
            CallbackStatus::Continue
        };
        let below_threshold = state.samples.size() < self.threshold;
        drop(state);

        if below_threshold {
            self.drained.notify_one();
        }

        status
    }

    /// Block the producer while occupancy is at or above the threshold.
    ///
    /// Waits at most `backoff`; returns early when the consumer drains below the
    /// threshold or [`wake`](Self::wake) is called. Returns `true` while the
    /// producer should not decode yet.
    pub fn wait_for_space(&self, backoff: Duration) -> bool {
        self.wait_while(backoff, |state| state.samples.size() >= self.threshold)
    }

    /// Block the producer until `needed` samples fit in the ring.
    ///
    /// Same contract as [`wait_for_space`](Self::wait_for_space), for a decoded
    /// frame that must be appended whole.
    pub fn wait_for_room(&self, needed: usize, backoff: Duration) -> bool {
        self.wait_while(backoff, |state| state.samples.free() < needed)
    }

    fn wait_while(&self, backoff: Duration, blocked: impl Fn(&BufferState) -> bool) -> bool {
        let mut state = self.state.lock();
        let is_blocked = blocked(&*state);
        if std::mem::take(&mut state.wake_pending) || !is_blocked {
            return is_blocked;
        }
        self.drained.wait_for(&mut state, backoff);
        state.wake_pending = false;
        true
    }

    /// Wake a producer parked in [`wait_for_space`](Self::wait_for_space).
    ///
    /// A wake issued before the producer parks is kept and makes its next wait
    /// return immediately.
    pub fn wake(&self) {
        self.state.lock().wake_pending = true;
        self.drained.notify_all();
    }

    pub fn progress(&self) -> PlaybackProgress {
        let state = self.state.lock();
        PlaybackProgress {
            consumed_samples: state.current_sample_index,
            decoded_samples: state.decoded_samples,
            buffered_samples: state.samples.size(),
            capacity: state.samples.capacity(),
            finished_decoding: state.finished_decoding,
        }
    }
}
