//! Engine events: inbound commands and outbound notifications.
//!
//! Commands are plain structs so a host can route them through its own
//! [`EventBus`](super::event_bus::EventBus) and hand them to
//! [`Engine::handle_event`](super::engine::Engine::handle_event).
//! Notifications are emitted on the engine's bus.

use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::entities::{DecodeFault, DurationMs, Frame, FrameRate, TimeMs};

// === Inbound: media ===

#[derive(Clone, Debug)]
pub struct OpenMediaEvent(pub PathBuf);

#[derive(Clone, Debug)]
pub struct CloseMediaEvent;

// === Inbound: transport ===

#[derive(Clone, Debug)]
pub struct PlayEvent;

#[derive(Clone, Debug)]
pub struct PauseEvent;

#[derive(Clone, Debug)]
pub struct TogglePlayPauseEvent;

#[derive(Clone, Debug)]
pub struct SeekEvent(pub TimeMs);

#[derive(Clone, Debug)]
pub struct SeekToStartEvent;

#[derive(Clone, Debug)]
pub struct SeekToEndEvent;

/// Step by whole frames (negative = backward)
#[derive(Clone, Debug)]
pub struct StepFrameEvent(pub i32);

#[derive(Clone, Debug)]
pub struct SetRateEvent(pub f64);

// === Inbound: position control drag ===

#[derive(Clone, Debug)]
pub struct DragStartEvent;

#[derive(Clone, Debug)]
pub struct DragMoveEvent(pub TimeMs);

#[derive(Clone, Debug)]
pub struct DragEndEvent(pub TimeMs);

// === Outbound ===

/// Authoritative position changed
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PositionChangedEvent {
    pub position_ms: TimeMs,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DurationChangedEvent {
    pub duration: DurationMs,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecodeFaultEvent {
    pub fault: DecodeFault,
}

/// Scrub preview, not authoritative
#[derive(Clone, Debug)]
pub struct PreviewFrameReadyEvent {
    pub position_ms: TimeMs,
    pub frame: Frame,
}

/// Frame from the precise decoder (playback or committed seek)
#[derive(Clone, Debug)]
pub struct FrameReadyEvent {
    pub position_ms: TimeMs,
    pub frame: Frame,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlayStateChangedEvent {
    pub playing: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MediaOpenedEvent {
    pub id: Uuid,
    pub path: PathBuf,
    pub duration: DurationMs,
    pub frame_rate: Option<FrameRate>,
}

/// Playback reached end of stream
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MediaEndedEvent {
    pub position_ms: TimeMs,
}

/// Effective frame rate changed (metadata on open, or measured during playback)
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FrameRateChangedEvent {
    pub frame_rate: Option<FrameRate>,
}
