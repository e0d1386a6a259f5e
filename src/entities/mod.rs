//! Entities - time model, media identity, frames and decode capabilities.
//!
//! Nothing here knows about threads or the control loop; `core` builds the
//! engine on top of these types.

pub mod backend;
pub mod error;
pub mod frame;
#[cfg(feature = "ffmpeg")]
pub mod loader_video;
pub mod media;
pub mod sequence;
pub mod time;
pub mod traits;

pub use backend::DefaultBackend;
pub use error::{DecodeError, DecodeFault, EngineError};
pub use frame::{DecodedFrame, Frame};
pub use media::{MediaKind, MediaSource};
pub use time::{DurationMs, FrameRate, TimeMs};
pub use traits::{MediaBackend, ProbeInfo, RandomAccessSampler, SamplePoint, SequentialDecoder, StreamMetadata};
