//! Encoded audio assets.

use std::path::Path;

use bytes::Bytes;
use cadence_core::{ClipId, Error, Result};
use symphonia::core::codecs::CodecParameters;
use tracing::{debug, info};

use crate::session::OpenedStream;

/// An immutable handle to an encoded audio asset.
///
/// Construction reads the whole file and verifies that its container and codec
/// can be opened; no samples are decoded until the clip is played. A clip can be
/// shared (`Arc<AudioClip>`) and played any number of times.
#[derive(Debug, Clone)]
pub struct AudioClip {
    id: ClipId,
    data: Bytes,
    extension: Option<String>,
    codec_params: CodecParameters,
    sample_rate: u32,
    channels: usize,
}

impl AudioClip {
    /// Load a clip from disk with a freshly generated id.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_id(ClipId::new(), path)
    }

    /// Load a clip from disk, keeping an id assigned by the caller.
    pub fn create_with_id(id: ClipId, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let extension = path.extension().and_then(|e| e.to_str());

        debug!("Read {} bytes from {}", data.len(), path.display());

        Self::from_bytes(id, data, extension)
    }

    /// Build a clip from encoded bytes already in memory.
    ///
    /// `extension` is a container hint such as `"ogg"` or `"wav"`.
    pub fn from_bytes(id: ClipId, data: impl Into<Bytes>, extension: Option<&str>) -> Result<Self> {
        let data = data.into();
        let opened = OpenedStream::open(data.clone(), extension)?;
        let params = opened.codec_params;

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::UnsupportedFormat("stream has no sample rate".to_string()))?;
        let channels = params
            .channels
            .map(|c| c.count())
            .filter(|&count| count > 0)
            .ok_or_else(|| Error::UnsupportedFormat("stream has no channel layout".to_string()))?;

        info!("Clip {id} opened: {sample_rate} Hz, {channels} channels, {} bytes", data.len());

        Ok(Self {
            id,
            data,
            extension: extension.map(str::to_ascii_lowercase),
            codec_params: params,
            sample_rate,
            channels,
        })
    }

    pub const fn id(&self) -> ClipId {
        self.id
    }

    /// The encoded bytes.
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Size of the encoded bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Short name of the codec, e.g. `"vorbis"`.
    pub fn codec_name(&self) -> Option<&'static str> {
        symphonia::default::get_codecs()
            .get_codec(self.codec_params.codec)
            .map(|descriptor| descriptor.short_name)
    }

    /// Replace the encoded bytes without re-validating them.
    #[cfg(test)]
    pub(crate) fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = data.into();
        self
    }

    /// Total duration in seconds, if the container reports it.
    pub fn duration(&self) -> Option<f64> {
        let time_base = self.codec_params.time_base?;
        let n_frames = self.codec_params.n_frames?;
        let time = time_base.calc_time(n_frames);
        Some(time.seconds as f64 + time.frac)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::testing::sine_clip;

    #[test]
    fn test_create_reads_stream_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let clip = sine_clip(dir.path(), 44100, 2, 44100);

        assert_eq!(clip.sample_rate(), 44100);
        assert_eq!(clip.channels(), 2);
        assert_eq!(clip.size(), 44 + 44100 * 2 * 2);
        assert_eq!(clip.extension(), Some("wav"));
        assert!((clip.duration().unwrap() - 1.0).abs() < 1e-6);
        assert!(clip.codec_name().is_some());
    }

    #[test]
    fn test_create_with_id_keeps_id() {
        let dir = tempfile::tempdir().unwrap();
        let first = sine_clip(dir.path(), 8000, 2, 80);
        let id = ClipId::new();

        let path = dir.path().join("again.wav");
        std::fs::write(&path, first.data()).unwrap();
        let clip = AudioClip::create_with_id(id, &path).unwrap();
        assert_eq!(clip.id(), id);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = AudioClip::create(dir.path().join("missing.wav"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result = AudioClip::from_bytes(ClipId::new(), vec![0x42u8; 512], None);
        assert!(result.is_err());
    }
}
