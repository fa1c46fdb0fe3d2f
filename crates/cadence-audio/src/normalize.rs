//! Conversion of decoded samples to interleaved `f32`.
//!
//! The divisors are fixed for compatibility with previously rendered output:
//! unsigned 8-bit divides by 255, signed integers divide by their type's maximum
//! positive value, so the most negative value lands slightly below -1.0.

use cadence_core::{Error, Result};
use symphonia::core::audio::{AudioBuffer as DecodedBuffer, AudioBufferRef, Signal};
use symphonia::core::sample::{i24, Sample};

use crate::buffer::BufferState;

/// Largest positive value of a signed 24-bit sample.
const I24_MAX: f32 = 8_388_607.0;

/// A raw sample value that can be normalized to `f32`.
pub trait RawSample: Copy {
    fn normalize(self) -> f32;
}

impl RawSample for u8 {
    fn normalize(self) -> f32 {
        f32::from(self) / f32::from(u8::MAX)
    }
}

impl RawSample for i8 {
    fn normalize(self) -> f32 {
        f32::from(self) / f32::from(i8::MAX)
    }
}

impl RawSample for i16 {
    fn normalize(self) -> f32 {
        f32::from(self) / f32::from(i16::MAX)
    }
}

impl RawSample for i24 {
    fn normalize(self) -> f32 {
        self.inner() as f32 / I24_MAX
    }
}

impl RawSample for i32 {
    fn normalize(self) -> f32 {
        self as f32 / i32::MAX as f32
    }
}

impl RawSample for i64 {
    fn normalize(self) -> f32 {
        self as f32 / i64::MAX as f32
    }
}

impl RawSample for f32 {
    fn normalize(self) -> f32 {
        self
    }
}

impl RawSample for f64 {
    fn normalize(self) -> f32 {
        self as f32
    }
}

/// Destination for normalized samples.
pub trait SampleSink {
    fn push_sample(&mut self, sample: f32) -> Result<()>;
}

impl SampleSink for BufferState {
    fn push_sample(&mut self, sample: f32) -> Result<()> {
        Self::push_sample(self, sample)
    }
}

impl SampleSink for Vec<f32> {
    fn push_sample(&mut self, sample: f32) -> Result<()> {
        self.push(sample);
        Ok(())
    }
}

/// Append `frames` sample indices from per-channel planes, interleaving channels.
///
/// Reads `planes[c][s]` for each sample index `s` and channel `c`.
pub fn append_planar<S: RawSample>(
    planes: &[&[S]],
    frames: usize,
    sink: &mut impl SampleSink,
) -> Result<()> {
    if planes.iter().any(|plane| plane.len() < frames) {
        return Err(Error::AudioDecode(format!(
            "planar frame shorter than {frames} samples"
        )));
    }

    for s in 0..frames {
        for plane in planes {
            sink.push_sample(plane[s].normalize())?;
        }
    }
    Ok(())
}

/// Append one decoded frame, returning the number of samples appended.
///
/// Symphonia hands every decoded format over as per-channel planes, packed
/// sources included, so all layouts go through [`append_planar`].
pub fn append_decoded(decoded: &AudioBufferRef<'_>, sink: &mut impl SampleSink) -> Result<usize> {
    match decoded {
        AudioBufferRef::U8(buf) => append_buffer(buf, sink),
        AudioBufferRef::S8(buf) => append_buffer(buf, sink),
        AudioBufferRef::S16(buf) => append_buffer(buf, sink),
        AudioBufferRef::S24(buf) => append_buffer(buf, sink),
        AudioBufferRef::S32(buf) => append_buffer(buf, sink),
        AudioBufferRef::F32(buf) => append_buffer(buf, sink),
        AudioBufferRef::F64(buf) => append_buffer(buf, sink),
        AudioBufferRef::U16(_) => Err(unsupported_unsigned(16)),
        AudioBufferRef::U24(_) => Err(unsupported_unsigned(24)),
        AudioBufferRef::U32(_) => Err(unsupported_unsigned(32)),
    }
}

fn append_buffer<S: Sample + RawSample>(
    buffer: &DecodedBuffer<S>,
    sink: &mut impl SampleSink,
) -> Result<usize> {
    let frames = buffer.frames();
    let planes = buffer.planes();
    append_planar(planes.planes(), frames, sink)?;
    Ok(frames * planes.planes().len())
}

fn unsupported_unsigned(bits: u32) -> Error {
    Error::UnsupportedFormat(format!("unsigned {bits}-bit samples"))
}
