//! Core engine modules - timeline, clocks, scrubbing, seek arbitration.
//!
//! These modules form the synchronization engine, independent of any UI.

pub mod clock;
pub mod duration;
pub mod engine;
pub mod engine_events;
pub mod event_bus;
pub mod scrub;
pub mod seek;
pub mod stepper;
#[cfg(test)]
pub mod testkit;
pub mod timeline;

// Re-exports for convenience
pub use clock::{ClockEvent, ClockOptions, PlaybackClock, SeekLanding, SeekTicket};
pub use duration::{DurationResolver, Resolution};
pub use engine::Engine;
pub use event_bus::{BoxedEvent, EventBus, EventEmitter, downcast_event};
pub use scrub::{PreviewResult, ScrubSampler};
pub use seek::{InteractionState, SeekCoordinator, SeekDirective};
pub use stepper::{FpsEstimator, FrameStepper};
pub use timeline::{TimelineChange, TimelineModel};
