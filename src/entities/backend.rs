//! Default media backend: dispatches on [`MediaKind`].

use log::debug;

use super::error::DecodeError;
use super::media::{MediaKind, MediaSource};
use super::sequence::{SequenceDecoder, SequenceSampler};
use super::time::FrameRate;
use super::traits::{MediaBackend, RandomAccessSampler, SequentialDecoder};

/// Backend used by the binary and by default engine construction.
///
/// Image sequences are always available; video needs the `ffmpeg` feature.
#[derive(Debug, Clone)]
pub struct DefaultBackend {
    /// Nominal rate for image sequences (they carry no timing of their own)
    sequence_rate: FrameRate,
}

impl DefaultBackend {
    pub fn new(sequence_rate: FrameRate) -> Self {
        Self { sequence_rate }
    }
}

impl MediaBackend for DefaultBackend {
    fn open_sequential(&self, source: &MediaSource) -> Result<Box<dyn SequentialDecoder>, DecodeError> {
        debug!("Opening sequential decoder for {}", source.display_name());
        match source.kind() {
            MediaKind::ImageSequence => Ok(Box::new(SequenceDecoder::open(source, self.sequence_rate)?)),
            MediaKind::Video => open_video_decoder(source),
        }
    }

    fn open_sampler(&self, source: &MediaSource) -> Result<Box<dyn RandomAccessSampler>, DecodeError> {
        debug!("Opening scrub sampler for {}", source.display_name());
        match source.kind() {
            MediaKind::ImageSequence => Ok(Box::new(SequenceSampler::open(source, self.sequence_rate)?)),
            MediaKind::Video => open_video_sampler(source),
        }
    }
}

#[cfg(feature = "ffmpeg")]
fn open_video_decoder(source: &MediaSource) -> Result<Box<dyn SequentialDecoder>, DecodeError> {
    Ok(Box::new(super::loader_video::FfmpegDecoder::open(source.path())?))
}

#[cfg(feature = "ffmpeg")]
fn open_video_sampler(source: &MediaSource) -> Result<Box<dyn RandomAccessSampler>, DecodeError> {
    Ok(Box::new(super::loader_video::FfmpegSampler::open(source.path())?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video_decoder(source: &MediaSource) -> Result<Box<dyn SequentialDecoder>, DecodeError> {
    Err(video_unsupported(source))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_video_sampler(source: &MediaSource) -> Result<Box<dyn RandomAccessSampler>, DecodeError> {
    Err(video_unsupported(source))
}

#[cfg(not(feature = "ffmpeg"))]
fn video_unsupported(source: &MediaSource) -> DecodeError {
    DecodeError::Unsupported(format!(
        "{}: video decoding requires the `ffmpeg` feature",
        source.display_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(feature = "ffmpeg"))]
    #[test]
    fn test_video_without_ffmpeg_is_unsupported() {
        let backend = DefaultBackend::new(FrameRate::new(24, 1).unwrap());
        let source = MediaSource::detect("clip.mp4");
        assert!(matches!(
            backend.open_sequential(&source),
            Err(DecodeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_missing_sequence_fails_to_open() {
        let backend = DefaultBackend::new(FrameRate::new(24, 1).unwrap());
        let source = MediaSource::detect("/definitely/not/here/shot.0001.png");
        assert!(matches!(
            backend.open_sampler(&source),
            Err(DecodeError::Open { .. })
        ));
    }
}
