//! Test doubles: an in-process output host and WAV fixtures.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use cadence_core::{Error, Result};
use parking_lot::Mutex;

use crate::clip::AudioClip;
use crate::output::{AudioHost, CallbackStatus, OutputConfig, OutputStream, RenderCallback};

#[derive(Default)]
struct FakeDevice {
    callback: Option<RenderCallback>,
    config: Option<OutputConfig>,
    active: bool,
    opened: usize,
    fail_next_open: bool,
}

/// Output host driven manually by tests through [`FakeHost::pump`].
#[derive(Clone, Default)]
pub struct FakeHost {
    device: Arc<Mutex<FakeDevice>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open_stream` call fail with a device error.
    pub fn fail_next_open(&self) {
        self.device.lock().fail_next_open = true;
    }

    /// Request `frames` frames from the open stream, like a driver would.
    ///
    /// Returns `None` when no stream is open or the stream is stopped.
    pub fn pump(&self, frames: usize) -> Option<(CallbackStatus, Vec<f32>)> {
        let mut device = self.device.lock();
        if !device.active {
            return None;
        }
        let channels = usize::from(device.config?.channels);
        let callback = device.callback.as_mut()?;

        let mut output = vec![f32::NAN; frames * channels];
        let status = callback(&mut output);
        Some((status, output))
    }

    /// Pump until the callback reports completion.
    pub fn pump_to_completion(&self, frames: usize, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut calls = 0;
        loop {
            assert!(Instant::now() < deadline, "playback did not complete in time");
            calls += 1;
            match self.pump(frames) {
                Some((CallbackStatus::Complete, _)) => return calls,
                Some((CallbackStatus::Continue, _)) => std::thread::yield_now(),
                None => panic!("stream is not running"),
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.device.lock().callback.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.device.lock().active
    }

    pub fn opened(&self) -> usize {
        self.device.lock().opened
    }

    pub fn config(&self) -> Option<OutputConfig> {
        self.device.lock().config
    }
}

impl AudioHost for FakeHost {
    fn open_stream(
        &self,
        config: OutputConfig,
        callback: RenderCallback,
    ) -> Result<Box<dyn OutputStream>> {
        let mut device = self.device.lock();
        if std::mem::take(&mut device.fail_next_open) {
            return Err(Error::Device("fake device refused stream".to_string()));
        }
        device.callback = Some(callback);
        device.config = Some(config);
        device.active = false;
        device.opened += 1;

        Ok(Box::new(FakeStream {
            device: Arc::clone(&self.device),
        }))
    }

    fn device_name(&self) -> String {
        "fake".to_string()
    }
}

struct FakeStream {
    device: Arc<Mutex<FakeDevice>>,
}

impl OutputStream for FakeStream {
    fn start(&mut self) -> Result<()> {
        self.device.lock().active = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.device.lock().active = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.device.lock().active
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        let mut device = self.device.lock();
        device.callback = None;
        device.config = None;
        device.active = false;
    }
}

/// Write a 16-bit PCM WAV file from interleaved samples.
pub fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
    let data_len = u32::try_from(samples.len() * 2).unwrap();
    let block_align = channels * 2;
    let byte_rate = sample_rate * u32::from(block_align);

    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }

    std::fs::write(path, bytes).unwrap();
}

/// Write a 440 Hz tone of `frames` frames into `dir` and open it as a clip.
pub fn sine_clip(dir: &Path, sample_rate: u32, channels: u16, frames: usize) -> AudioClip {
    let samples: Vec<i16> = (0..frames)
        .flat_map(|i| {
            let t = i as f32 / sample_rate as f32;
            let value = (t * 440.0 * std::f32::consts::TAU).sin() * 0.5;
            std::iter::repeat((value * f32::from(i16::MAX)) as i16).take(usize::from(channels))
        })
        .collect();

    let path = dir.join(format!("sine-{sample_rate}-{channels}-{frames}.wav"));
    write_wav(&path, sample_rate, channels, &samples);
    AudioClip::create(&path).unwrap()
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
