//! Engine - command facade and control-thread pump.
//!
//! Owns the [`TimelineModel`] and is its only writer. Decode threads
//! (playback clock, scrub sampler) report through channels that
//! [`Engine::update`] drains; the host calls it from its main loop,
//! like the player's per-frame update.
//!
//! Outbound notifications go to [`Engine::events`].

use log::{debug, error, info, trace, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::clock::{ClockEvent, ClockOptions, PlaybackClock};
use super::duration::DurationResolver;
use super::engine_events::*;
use super::event_bus::{BoxedEvent, EventBus, downcast_event};
use super::scrub::{PreviewResult, ScrubSampler};
use super::seek::{InteractionState, SeekCoordinator, SeekDirective};
use super::stepper::{FpsEstimator, FrameStepper};
use super::timeline::{TimelineChange, TimelineModel};
use crate::config::{EngineConfig, clamp_rate};
use crate::entities::{
    DecodeError, DecodeFault, DefaultBackend, DurationMs, EngineError, FrameRate, MediaBackend, MediaSource,
    SequentialDecoder, TimeMs,
};

pub struct Engine {
    // Decoders are declared first so they drop before the timeline
    // releases the media source
    clock: Option<PlaybackClock>,
    scrub: Option<ScrubSampler>,
    timeline: TimelineModel,
    coordinator: SeekCoordinator,
    fps: FpsEstimator,
    /// Frame rate comes from playback measurement, not metadata
    measured_rate: bool,
    backend: Arc<dyn MediaBackend>,
    config: EngineConfig,
    events: EventBus,
    /// Last published play state
    playing: bool,
    /// Resume playback once the drag's commit lands
    resume_after_drag: bool,
    /// Decoder hit end of stream since the last seek
    ended: bool,
}

impl Engine {
    pub fn new(backend: Arc<dyn MediaBackend>, config: EngineConfig) -> Self {
        let config = config.sanitized();
        let events = EventBus::new();

        let mut timeline = TimelineModel::new();
        let emitter = events.emitter();
        timeline.on_change(move |change| match *change {
            TimelineChange::Position(position_ms) => emitter.emit(PositionChangedEvent { position_ms }),
            TimelineChange::Duration(duration) => emitter.emit(DurationChangedEvent { duration }),
        });

        Self {
            clock: None,
            scrub: None,
            timeline,
            coordinator: SeekCoordinator::new(),
            fps: FpsEstimator::new(config.fps_ema_alpha, config.fps_min_samples),
            measured_rate: false,
            backend,
            config,
            events,
            playing: false,
            resume_after_drag: false,
            ended: false,
        }
    }

    /// Engine over the built-in image-sequence (and, with `ffmpeg`, video) backend
    pub fn with_default_backend(config: EngineConfig) -> Self {
        let backend = Arc::new(DefaultBackend::new(config.sequence_rate()));
        Self::new(backend, config)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn timeline(&self) -> &TimelineModel {
        &self.timeline
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> InteractionState {
        self.coordinator.state()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn position(&self) -> TimeMs {
        self.timeline.current_position()
    }

    pub fn duration(&self) -> DurationMs {
        self.timeline.current_duration()
    }

    pub fn frame_rate(&self) -> Option<FrameRate> {
        self.timeline.frame_rate()
    }

    pub fn is_loaded(&self) -> bool {
        self.clock.is_some()
    }

    // === Media ===

    /// Open a clip, replacing the current one.
    ///
    /// Resolves the duration (degrading to `Growing(0)`), starts both decode
    /// threads and commits a seek to 0 for the poster frame.
    pub fn open(&mut self, path: impl Into<PathBuf>) -> Result<(), EngineError> {
        self.close();
        let source = MediaSource::detect(path);
        info!("Opening {} ({:?}, {})", source.display_name(), source.kind(), source.id());

        let resolution =
            DurationResolver::new(self.backend.as_ref(), self.config.max_plausible_duration_ms).resolve(&source);

        let decoder = match self.open_decoder(&source) {
            Ok(decoder) => decoder,
            Err(e) => {
                let fault = DecodeFault::from(e);
                error!("{}: {}", source.display_name(), fault);
                self.events.emit(DecodeFaultEvent { fault: fault.clone() });
                return Err(EngineError::DecodeFault(fault));
            }
        };
        let shutdown_timeout = Duration::from_millis(self.config.shutdown_timeout_ms);
        self.scrub = match self.backend.open_sampler(&source) {
            Ok(sampler) => Some(ScrubSampler::spawn(
                sampler,
                self.config.preview_cache_frames,
                shutdown_timeout,
            )),
            Err(e) => {
                warn!("{}: scrub previews disabled ({})", source.display_name(), e);
                None
            }
        };
        self.clock = Some(PlaybackClock::spawn(decoder, ClockOptions::from(&self.config)));

        let id = source.id();
        let path = source.path().to_path_buf();
        self.timeline.set_source(source);
        self.measured_rate = resolution.frame_rate.is_none();
        self.timeline.set_frame_rate(resolution.frame_rate);

        let duration = match resolution.duration {
            DurationMs::Unknown => DurationMs::Growing(0),
            known => known,
        };
        self.events.emit(MediaOpenedEvent {
            id,
            path,
            duration,
            frame_rate: resolution.frame_rate,
        });
        self.timeline.set_duration(duration);
        self.events.emit(FrameRateChangedEvent {
            frame_rate: resolution.frame_rate,
        });

        let poster = self.coordinator.commit(0);
        self.apply(poster);
        Ok(())
    }

    fn open_decoder(&self, source: &MediaSource) -> Result<Box<dyn SequentialDecoder>, DecodeError> {
        self.backend.open_sequential(source).or_else(|e| {
            warn!("{}: open failed ({}), retrying once", source.display_name(), e);
            self.backend.open_sequential(source)
        })
    }

    /// Stop decode threads and release the clip
    pub fn close(&mut self) {
        if self.clock.is_none() && self.scrub.is_none() && self.timeline.source().is_none() {
            return;
        }
        // Joins both decode threads; the source outlives them
        self.clock = None;
        self.scrub = None;
        self.coordinator.reset();
        self.fps.reset();
        self.resume_after_drag = false;
        self.ended = false;
        if let Some(source) = self.timeline.clear_source() {
            info!("Closed {}", source.display_name());
        }
        self.sync_play_state();
    }

    // === Transport ===

    pub fn play(&mut self) -> Result<(), EngineError> {
        if self.clock.is_none() {
            return Err(EngineError::NoMedia);
        }
        let discard = self.coordinator.discard_previews();
        self.apply(discard);
        if self.ended {
            debug!("Replay from start");
            let restart = self.coordinator.commit(0);
            self.apply(restart);
        }
        if let Some(clock) = self.clock.as_mut() {
            clock.play();
        }
        self.sync_play_state();
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        let clock = self.clock.as_mut().ok_or(EngineError::NoMedia)?;
        clock.pause();
        self.fps.break_sequence();
        let discard = self.coordinator.discard_previews();
        self.apply(discard);
        self.sync_play_state();
        Ok(())
    }

    pub fn toggle_play_pause(&mut self) -> Result<(), EngineError> {
        if self.playing {
            self.pause()
        } else {
            self.play()
        }
    }

    /// Committed seek; clamped to `[0, duration]` when the duration is known
    pub fn seek(&mut self, position_ms: TimeMs) -> Result<(), EngineError> {
        if self.clock.is_none() {
            return Err(EngineError::NoMedia);
        }
        let target = self.clamp(position_ms);
        info!("Seek -> {} ms", target);
        let mut directives = self.coordinator.discard_previews();
        directives.extend(self.coordinator.commit(target));
        self.apply(directives);
        Ok(())
    }

    pub fn seek_to_start(&mut self) -> Result<(), EngineError> {
        self.seek(0)
    }

    /// Seek to the duration bound (the furthest position seen while growing)
    pub fn seek_to_end(&mut self) -> Result<(), EngineError> {
        let end = self.duration().bound().unwrap_or_else(|| self.position());
        self.seek(end)
    }

    /// Step whole frames. Pauses playback; rejected without a frame rate.
    pub fn step_frame(&mut self, delta: i32) -> Result<(), EngineError> {
        if self.clock.is_none() {
            return Err(EngineError::NoMedia);
        }
        let from = self.coordinator.effective_target().unwrap_or_else(|| self.position());
        let target = FrameStepper::step_target(from, delta, self.frame_rate(), self.duration())?;
        if self.playing {
            self.pause()?;
        }
        let mut directives = self.coordinator.discard_previews();
        directives.extend(self.coordinator.commit(target));
        self.apply(directives);
        Ok(())
    }

    /// Playback rate multiplier, clamped. Returns the applied rate.
    pub fn set_rate(&mut self, rate: f64) -> f64 {
        let rate = clamp_rate(rate);
        self.config.playback_rate = rate;
        if let Some(clock) = self.clock.as_mut() {
            clock.set_rate(rate);
        }
        rate
    }

    // === Position control drag ===

    pub fn drag_start(&mut self) -> Result<(), EngineError> {
        let clock = self.clock.as_mut().ok_or(EngineError::NoMedia)?;
        if clock.is_playing() {
            self.resume_after_drag = self.config.resume_after_scrub;
            clock.pause();
            self.fps.break_sequence();
        }
        let directives = self.coordinator.drag_start(self.timeline.current_position());
        self.apply(directives);
        self.sync_play_state();
        Ok(())
    }

    /// Preview only; the authoritative position is untouched
    pub fn drag_move(&mut self, position_ms: TimeMs) {
        let directives = self.coordinator.drag_move(self.clamp(position_ms));
        self.apply(directives);
    }

    /// Release: exactly one committed seek to the final position
    pub fn drag_end(&mut self, position_ms: TimeMs) -> Result<(), EngineError> {
        if self.clock.is_none() {
            return Err(EngineError::NoMedia);
        }
        let directives = self.coordinator.drag_end(self.clamp(position_ms));
        self.apply(directives);
        Ok(())
    }

    // === Pump ===

    /// Drain decode-thread results and publish notifications.
    pub fn update(&mut self) {
        let clock_events = self.clock.as_mut().map(|c| c.poll()).unwrap_or_default();
        for event in clock_events {
            self.on_clock_event(event);
        }
        let previews = self.scrub.as_ref().map(|s| s.poll()).unwrap_or_default();
        for preview in previews {
            self.on_preview(preview);
        }
        self.sync_play_state();
    }

    /// Route an inbound command. Returns false if the event is not a command.
    pub fn handle_event(&mut self, event: &BoxedEvent) -> bool {
        let result = if let Some(e) = downcast_event::<OpenMediaEvent>(event) {
            self.open(e.0.clone())
        } else if downcast_event::<CloseMediaEvent>(event).is_some() {
            self.close();
            Ok(())
        } else if downcast_event::<PlayEvent>(event).is_some() {
            self.play()
        } else if downcast_event::<PauseEvent>(event).is_some() {
            self.pause()
        } else if downcast_event::<TogglePlayPauseEvent>(event).is_some() {
            self.toggle_play_pause()
        } else if let Some(e) = downcast_event::<SeekEvent>(event) {
            self.seek(e.0)
        } else if downcast_event::<SeekToStartEvent>(event).is_some() {
            self.seek_to_start()
        } else if downcast_event::<SeekToEndEvent>(event).is_some() {
            self.seek_to_end()
        } else if let Some(e) = downcast_event::<StepFrameEvent>(event) {
            self.step_frame(e.0)
        } else if let Some(e) = downcast_event::<SetRateEvent>(event) {
            self.set_rate(e.0);
            Ok(())
        } else if downcast_event::<DragStartEvent>(event).is_some() {
            self.drag_start()
        } else if let Some(e) = downcast_event::<DragMoveEvent>(event) {
            self.drag_move(e.0);
            Ok(())
        } else if let Some(e) = downcast_event::<DragEndEvent>(event) {
            self.drag_end(e.0)
        } else {
            return false;
        };

        if let Err(e) = result {
            warn!("{} rejected: {}", (**event).type_name(), e);
        }
        true
    }

    fn on_clock_event(&mut self, event: ClockEvent) {
        match event {
            ClockEvent::Frame(frame) => {
                if self.coordinator.blocks_playback_updates() {
                    trace!("Playback frame {} ms held back ({:?})", frame.pts_ms, self.state());
                    return;
                }
                self.observe_pts(frame.pts_ms);
                self.timeline.set_position(frame.pts_ms);
                self.events.emit(FrameReadyEvent {
                    position_ms: frame.pts_ms,
                    frame: frame.frame,
                });
            }
            ClockEvent::SeekDone { ticket, result } => {
                let Some(follow) = self.coordinator.seek_done(ticket) else {
                    return;
                };
                match result {
                    Ok(landing) => {
                        debug!(
                            "Seek #{} landed at {} ms (target {} ms)",
                            ticket, landing.position_ms, landing.target_ms
                        );
                        self.fps.break_sequence();
                        self.observe_pts(landing.position_ms);
                        self.timeline.set_position(landing.position_ms);
                        if let Some(frame) = landing.frame {
                            self.events.emit(FrameReadyEvent {
                                position_ms: landing.position_ms,
                                frame,
                            });
                        }
                    }
                    Err(fault) => {
                        error!("Seek #{} failed: {}", ticket, fault);
                        self.events.emit(DecodeFaultEvent { fault });
                    }
                }
                self.apply(follow);

                if self.resume_after_drag && self.state() == InteractionState::Idle {
                    self.resume_after_drag = false;
                    if let Some(clock) = self.clock.as_mut() {
                        clock.play();
                    }
                }
            }
            ClockEvent::Ended { position_ms } => {
                info!("End of media at {} ms", position_ms);
                self.ended = true;
                if self.timeline.finalize_duration(position_ms) {
                    info!("Duration finalised: {}", self.duration());
                }
                self.events.emit(MediaEndedEvent { position_ms });
            }
            ClockEvent::Fault(fault) => {
                error!("Playback stopped: {}", fault);
                self.events.emit(DecodeFaultEvent { fault });
            }
        }
    }

    fn on_preview(&mut self, preview: PreviewResult) {
        let follow = self.coordinator.preview_finished();
        if self.coordinator.is_dragging() {
            match preview.frame {
                Some(frame) => self.events.emit(PreviewFrameReadyEvent {
                    position_ms: preview.position_ms,
                    frame,
                }),
                None => trace!("{}", EngineError::PreviewUnavailable(preview.position_ms)),
            }
        }
        self.apply(follow);
    }

    fn apply(&mut self, directives: Vec<SeekDirective>) {
        for directive in directives {
            match directive {
                SeekDirective::CancelPreviews => {
                    if let Some(scrub) = &self.scrub {
                        scrub.cancel();
                    }
                }
                SeekDirective::RequestPreview(position_ms) => match &self.scrub {
                    Some(scrub) => {
                        // A measured rate is unknown to the sampler; address it by time
                        let rate = if self.measured_rate { None } else { self.timeline.frame_rate() };
                        scrub.preview_at(position_ms, rate);
                    }
                    None => trace!("{}", EngineError::PreviewUnavailable(position_ms)),
                },
                SeekDirective::Commit { target_ms, ticket } => {
                    self.ended = false;
                    self.fps.break_sequence();
                    match self.clock.as_mut() {
                        Some(clock) => clock.seek(target_ms, ticket),
                        None => {
                            self.coordinator.seek_done(ticket);
                        }
                    }
                }
            }
        }
    }

    /// Feed the measured-rate estimator when metadata gave no rate
    fn observe_pts(&mut self, pts_ms: TimeMs) {
        if !self.measured_rate {
            return;
        }
        self.fps.observe(pts_ms);
        if let Some(rate) = self.fps.estimate()
            && self.timeline.set_frame_rate(Some(rate))
        {
            self.events.emit(FrameRateChangedEvent { frame_rate: Some(rate) });
        }
    }

    fn clamp(&self, position_ms: TimeMs) -> TimeMs {
        let position_ms = position_ms.max(0);
        match self.duration().known() {
            Some(end) => position_ms.min(end),
            None => position_ms,
        }
    }

    fn sync_play_state(&mut self) {
        let playing = self.clock.as_ref().is_some_and(|c| c.is_playing());
        if playing != self.playing {
            debug!("Play state -> {}", if playing { "playing" } else { "paused" });
            self.playing = playing;
            self.events.emit(PlayStateChangedEvent { playing });
        }
    }
}
