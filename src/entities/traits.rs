//! Decode capability traits.
//!
//! The engine coordinates two independent decode capabilities and never
//! talks to a concrete decode library directly:
//! - [`SequentialDecoder`]: precise, pacing-correct, pull-based stream decoding
//! - [`RandomAccessSampler`]: fast, approximate random access for scrubbing
//!
//! A [`MediaBackend`] opens both for a given [`MediaSource`].
//! Implementations live in `entities::sequence` and `entities::loader_video`.

use std::sync::Arc;

use super::error::DecodeError;
use super::frame::{DecodedFrame, Frame};
use super::media::MediaSource;
use super::time::{FrameRate, TimeMs};

/// Container-level facts reported by the precise decoder
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamMetadata {
    /// Duration from container metadata, if the container carries one
    pub duration_secs: Option<f64>,
    /// Nominal frame rate from container metadata
    pub frame_rate: Option<FrameRate>,
    pub width: u32,
    pub height: u32,
}

/// Result of the fast decoder's probing capability
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProbeInfo {
    pub frame_count: Option<u64>,
    pub fps: Option<f64>,
}

/// Where the sampler should look for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplePoint {
    /// Approximate frame index (derived from the effective frame rate)
    Frame(u64),
    /// Raw time, used when no frame rate is known
    Time(TimeMs),
}

/// Precise sequential decoder used for playback.
///
/// Pull-based: the playback clock drives it from its own thread and turns
/// the pulled frames into play/pause/on-frame semantics.
pub trait SequentialDecoder: Send {
    /// Container metadata (cheap, no decoding)
    fn metadata(&self) -> StreamMetadata;

    /// Move the stream cursor to the nearest decodable point at or before
    /// `target_ms`. Returns the cursor position the decoder believes it
    /// landed on; the first decoded frame afterwards is authoritative.
    fn seek(&mut self, target_ms: TimeMs) -> Result<TimeMs, DecodeError>;

    /// Decode the next frame in presentation order. `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, DecodeError>;
}

/// Fast random-access frame source used for scrub previews.
pub trait RandomAccessSampler: Send {
    /// Estimate stream length and rate without full decoding
    fn probe(&mut self) -> Result<ProbeInfo, DecodeError>;

    /// Best-effort frame near `at`. `Ok(None)` means nothing is available there.
    fn sample_near(&mut self, at: SamplePoint) -> Result<Option<Frame>, DecodeError>;
}

/// Opens decode capabilities for a media source.
///
/// Every call returns a fresh, independently owned handle; dropping the
/// handle releases all decode state for it.
pub trait MediaBackend: Send + Sync {
    fn open_sequential(&self, source: &MediaSource) -> Result<Box<dyn SequentialDecoder>, DecodeError>;

    fn open_sampler(&self, source: &MediaSource) -> Result<Box<dyn RandomAccessSampler>, DecodeError>;
}

/// Blanket impl: Arc<T> implements MediaBackend if T does
impl<T: MediaBackend + ?Sized> MediaBackend for Arc<T> {
    fn open_sequential(&self, source: &MediaSource) -> Result<Box<dyn SequentialDecoder>, DecodeError> {
        (**self).open_sequential(source)
    }

    fn open_sampler(&self, source: &MediaSource) -> Result<Box<dyn RandomAccessSampler>, DecodeError> {
        (**self).open_sampler(source)
    }
}
