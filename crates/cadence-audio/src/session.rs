//! Decode sessions: an open container and codec feeding one [`AudioBuffer`].

use std::io::Cursor;
use std::sync::Arc;

use bytes::Bytes;
use cadence_core::{ClipId, Error, Result};
use symphonia::core::{
    codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, trace, warn};

use crate::buffer::AudioBuffer;
use crate::clip::AudioClip;
use crate::normalize;

/// Demuxer and decoder opened over an in-memory encoded asset.
pub(crate) struct OpenedStream {
    pub format: Box<dyn FormatReader>,
    pub decoder: Box<dyn Decoder>,
    pub track_id: u32,
    pub codec_params: CodecParameters,
}

impl OpenedStream {
    /// Probe the container and open a decoder for its first audio track.
    pub fn open(data: Bytes, extension: Option<&str>) -> Result<Self> {
        let mss = MediaSourceStream::new(
            Box::new(Cursor::new(data)),
            MediaSourceStreamOptions::default(),
        );

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| Error::AudioDecode(format!("Failed to open container: {e}")))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::AudioDecode("No audio stream found".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| Error::UnsupportedFormat(format!("Failed to open codec: {e}")))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            codec_params,
        })
    }
}

/// Outcome of decoding one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStep {
    /// Samples were appended to the buffer.
    Decoded(usize),
    /// The packet belonged to another track or was corrupt.
    Skipped,
    /// A decoded frame of `needed` samples is waiting for room in the buffer.
    Blocked { needed: usize },
    /// The container has no more packets.
    EndOfStream,
}

/// Resources tied to one `play()` call.
///
/// Owns the container and codec exclusively; both are released when the session
/// is dropped.
pub struct DecodeSession {
    clip_id: ClipId,
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    buffer: Arc<AudioBuffer>,
    /// Normalized frame that did not fit in the buffer yet.
    pending: Vec<f32>,
    finished: bool,
}

impl DecodeSession {
    /// Open a fresh container/codec pair over the clip's bytes.
    pub fn open(clip: &AudioClip, buffer: Arc<AudioBuffer>) -> Result<Self> {
        let opened = OpenedStream::open(clip.data().clone(), clip.extension())?;

        debug!(
            "Decode session opened for clip {}: track {}, {} Hz, {} channels",
            clip.id(),
            opened.track_id,
            buffer.sample_rate(),
            buffer.channels()
        );

        Ok(Self {
            clip_id: clip.id(),
            format: opened.format,
            decoder: opened.decoder,
            track_id: opened.track_id,
            buffer,
            pending: Vec::new(),
            finished: false,
        })
    }

    pub const fn clip_id(&self) -> ClipId {
        self.clip_id
    }

    pub const fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.buffer
    }

    /// Whether end of stream has been reached.
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Read one packet, decode it, and append its samples to the buffer.
    ///
    /// A frame is appended whole or not at all: when it does not fit, it is kept
    /// and retried by the next call. The buffer lock is held only while appending.
    pub fn decode_next(&mut self) -> Result<DecodeStep> {
        if !self.pending.is_empty() {
            return Ok(self.flush_pending());
        }
        if self.finished {
            return Ok(DecodeStep::EndOfStream);
        }

        let packet = match self.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.finish();
                return Ok(DecodeStep::EndOfStream);
            }
            Err(e) => {
                return Err(Error::AudioDecode(format!("Failed to read packet: {e}")));
            }
        };

        if packet.track_id() != self.track_id {
            return Ok(DecodeStep::Skipped);
        }

        let decoded = match self.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Corrupt packet skipped: {e}");
                return Ok(DecodeStep::Skipped);
            }
            Err(e) => {
                return Err(Error::AudioDecode(format!("Decode failed: {e}")));
            }
        };

        let channels = decoded.spec().channels.count();
        if channels != self.buffer.channels() {
            return Err(Error::UnsupportedFormat(format!(
                "decoded frame has {channels} channels, stream was opened with {}",
                self.buffer.channels()
            )));
        }

        let needed = decoded.frames() * channels;
        let mut state = self.buffer.lock();
        if state.free() >= needed {
            let appended = normalize::append_decoded(&decoded, &mut *state)?;
            trace!("Appended {appended} samples ({} buffered)", state.buffered());
            return Ok(DecodeStep::Decoded(appended));
        }
        drop(state);

        if needed > self.buffer.progress().capacity {
            return Err(Error::UnsupportedFormat(format!(
                "decoded frame of {needed} samples exceeds the buffer"
            )));
        }
        normalize::append_decoded(&decoded, &mut self.pending)?;
        trace!("Frame of {needed} samples waiting for room");
        Ok(DecodeStep::Blocked { needed })
    }

    /// Append the staged frame if it fits now.
    fn flush_pending(&mut self) -> DecodeStep {
        let needed = self.pending.len();
        let mut state = self.buffer.lock();
        if state.free() < needed {
            return DecodeStep::Blocked { needed };
        }

        for sample in self.pending.drain(..) {
            // Cannot fail: room was checked under the same lock
            let _ = state.push_sample(sample);
        }
        trace!("Appended {needed} staged samples ({} buffered)", state.buffered());
        DecodeStep::Decoded(needed)
    }

    /// Mark the buffer finished so playback completes once it drains.
    pub fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.buffer.lock().mark_finished();
        }
    }
}

impl Drop for DecodeSession {
    fn drop(&mut self) {
        debug!("Decode session for clip {} released", self.clip_id);
    }
}
