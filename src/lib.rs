//! scrubline - timeline synchronization engine
//!
//! Reconciles a precise sequential decoder (playback) and a fast
//! random-access sampler (scrubbing) into one millisecond timeline.
//!
//! Re-exports all modules for use by binary targets.

// Engine (timeline, clock, scrub, seek arbitration)
pub mod core;

// App modules
pub mod cli;
pub mod config;
pub mod entities;

// Re-export commonly used types from core
pub use core::engine::Engine;
pub use core::event_bus::{BoxedEvent, EventBus, EventEmitter, downcast_event};
pub use core::seek::InteractionState;
pub use core::timeline::TimelineModel;

// Re-export entities
pub use entities::{DurationMs, EngineError, Frame, FrameRate, MediaSource, TimeMs};
