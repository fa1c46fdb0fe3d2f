//! Host audio output.
//!
//! The player talks to the device through [`AudioHost`] and [`OutputStream`];
//! [`CpalHost`] is the production backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cadence_core::{Error, Result};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, Device, SampleRate, Stream, StreamConfig,
};
use tracing::{debug, error, info};

pub use crate::buffer::CallbackStatus;

/// Real-time render callback: fills interleaved `f32` frames.
pub type RenderCallback = Box<dyn FnMut(&mut [f32]) -> CallbackStatus + Send + 'static>;

/// Shape of an output stream. Samples are always interleaved `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// A host audio API able to open output streams.
pub trait AudioHost {
    /// Open a stopped output stream bound to `callback`.
    fn open_stream(
        &self,
        config: OutputConfig,
        callback: RenderCallback,
    ) -> Result<Box<dyn OutputStream>>;

    /// Human-readable name of the output device.
    fn device_name(&self) -> String;
}

/// An open output stream. Dropping it closes the stream.
pub trait OutputStream {
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Whether the driver is currently pulling audio.
    fn is_active(&self) -> bool;
}

/// Output on the default cpal device.
pub struct CpalHost {
    device: Device,
    device_name: String,
}

impl CpalHost {
    /// Use the default output device of the default host.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Device("No output device found".to_string()))?;

        Ok(Self::with_device(device))
    }

    pub fn with_device(device: Device) -> Self {
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio output device: {device_name}");

        Self {
            device,
            device_name,
        }
    }
}

impl AudioHost for CpalHost {
    fn open_stream(
        &self,
        config: OutputConfig,
        mut callback: RenderCallback,
    ) -> Result<Box<dyn OutputStream>> {
        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: SampleRate(config.sample_rate),
            buffer_size: BufferSize::Default,
        };

        debug!(
            "Opening output stream: {}Hz, {} channels",
            config.sample_rate, config.channels
        );

        let complete = Arc::new(AtomicBool::new(false));
        let complete_cb = Arc::clone(&complete);

        let err_fn = |err| {
            error!("Audio stream error: {err}");
        };

        let stream = self
            .device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    // cpal has no completion status; emit silence once playback is done
                    if complete_cb.load(Ordering::Acquire) {
                        data.fill(0.0);
                        return;
                    }
                    if callback(data) == CallbackStatus::Complete {
                        complete_cb.store(true, Ordering::Release);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::Device(format!("Failed to build stream: {e}")))?;

        Ok(Box::new(CpalStream {
            stream,
            running: false,
            complete,
        }))
    }

    fn device_name(&self) -> String {
        self.device_name.clone()
    }
}

/// cpal stream plus the bookkeeping cpal does not expose.
struct CpalStream {
    stream: Stream,
    running: bool,
    complete: Arc<AtomicBool>,
}

impl OutputStream for CpalStream {
    fn start(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| Error::Device(format!("Failed to start stream: {e}")))?;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| Error::Device(format!("Failed to stop stream: {e}")))?;
        self.running = false;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.running && !self.complete.load(Ordering::Acquire)
    }
}

/// List available output devices.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::Device(format!("Failed to list devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect();

    Ok(devices)
}

/// Get the default output device name.
pub fn default_device_name() -> Option<String> {
    let host = cpal::default_host();
    host.default_output_device().and_then(|d| d.name().ok())
}
