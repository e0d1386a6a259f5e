//! PlaybackClock - paces the precise sequential decoder on its own thread.
//!
//! The control thread sends [`ClockCommand`]s and drains results with
//! [`PlaybackClock::poll`]. Frames are delivered at their presentation
//! timestamps (scaled by the playback rate); the wall clock only decides
//! *when* a frame is released, never *what* position it reports.
//!
//! Every pause/seek bumps an epoch. Messages carry the epoch they were
//! produced under, and `poll()` drops anything older than the current one,
//! so a frame decoded before a seek can never overwrite its result.

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, info, trace, warn};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{EngineConfig, SeekPrecision, clamp_rate};
use crate::entities::{DecodeError, DecodeFault, DecodedFrame, Frame, SequentialDecoder, TimeMs};

/// Identifies one committed seek
pub type SeekTicket = u64;

/// Clock tuning taken from [`EngineConfig`]
#[derive(Debug, Clone, Copy)]
pub struct ClockOptions {
    pub precision: SeekPrecision,
    pub tolerance_ms: TimeMs,
    pub rate: f64,
    pub shutdown_timeout: Duration,
}

impl From<&EngineConfig> for ClockOptions {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            precision: cfg.seek_precision,
            tolerance_ms: cfg.seek_tolerance_ms,
            rate: clamp_rate(cfg.playback_rate),
            shutdown_timeout: Duration::from_millis(cfg.shutdown_timeout_ms),
        }
    }
}

impl Default for ClockOptions {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// Where a committed seek actually landed
#[derive(Debug, Clone)]
pub struct SeekLanding {
    pub target_ms: TimeMs,
    /// Decoder position after the seek (PTS of the landing frame)
    pub position_ms: TimeMs,
    pub frame: Option<Frame>,
}

/// Results delivered to the control thread
#[derive(Debug, Clone)]
pub enum ClockEvent {
    /// Paced playback frame
    Frame(DecodedFrame),
    SeekDone {
        ticket: SeekTicket,
        result: Result<SeekLanding, DecodeFault>,
    },
    /// Decoder reached end of stream; playback stopped
    Ended { position_ms: TimeMs },
    /// Unrecoverable decode error; playback stopped
    Fault(DecodeFault),
}

enum ClockCommand {
    Play,
    Pause { epoch: u64 },
    /// `resume` is the control-side play state; the decode thread adopts it
    /// so an end of stream reached before the seek cannot leave it idle
    Seek {
        target_ms: TimeMs,
        ticket: SeekTicket,
        epoch: u64,
        resume: bool,
    },
    SetRate(f64),
    Shutdown,
}

struct ClockMessage {
    epoch: u64,
    event: ClockEvent,
}

pub struct PlaybackClock {
    cmd_tx: Sender<ClockCommand>,
    msg_rx: Receiver<ClockMessage>,
    handle: Option<thread::JoinHandle<()>>,
    epoch: u64,
    playing: bool,
    rate: f64,
    shutdown_timeout: Duration,
}

impl PlaybackClock {
    /// Move `decoder` onto a new decode thread. Starts paused.
    pub fn spawn(decoder: Box<dyn SequentialDecoder>, options: ClockOptions) -> Self {
        let (cmd_tx, cmd_rx) = channel::unbounded();
        let (msg_tx, msg_rx) = channel::unbounded();

        let handle = thread::Builder::new()
            .name("scrubline-clock".into())
            .spawn(move || {
                trace!("Clock thread started");
                DecodeLoop::new(decoder, options, cmd_rx, msg_tx).run();
                trace!("Clock thread stopped");
            })
            .expect("Failed to spawn clock thread");

        Self {
            cmd_tx,
            msg_rx,
            handle: Some(handle),
            epoch: 0,
            playing: false,
            rate: options.rate,
            shutdown_timeout: options.shutdown_timeout,
        }
    }

    pub fn play(&mut self) {
        if self.playing {
            return;
        }
        debug!("Clock: play");
        self.playing = true;
        self.send(ClockCommand::Play);
    }

    pub fn pause(&mut self) {
        if !self.playing {
            return;
        }
        debug!("Clock: pause");
        self.playing = false;
        self.epoch += 1;
        self.send(ClockCommand::Pause { epoch: self.epoch });
    }

    /// Reposition the decoder. Completion arrives as [`ClockEvent::SeekDone`]
    /// with the same ticket. Play state is kept across the seek.
    pub fn seek(&mut self, target_ms: TimeMs, ticket: SeekTicket) {
        debug!("Clock: seek #{} -> {} ms", ticket, target_ms);
        self.epoch += 1;
        self.send(ClockCommand::Seek {
            target_ms,
            ticket,
            epoch: self.epoch,
            resume: self.playing,
        });
    }

    pub fn set_rate(&mut self, rate: f64) -> f64 {
        let rate = clamp_rate(rate);
        if rate != self.rate {
            debug!("Clock: rate {} -> {}", self.rate, rate);
            self.rate = rate;
            self.send(ClockCommand::SetRate(rate));
        }
        rate
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Drain pending results, dropping those from superseded epochs.
    /// Seek completions are always delivered.
    pub fn poll(&mut self) -> Vec<ClockEvent> {
        let mut out = Vec::new();
        while let Ok(msg) = self.msg_rx.try_recv() {
            let current = msg.epoch == self.epoch;
            let keep = match &msg.event {
                ClockEvent::SeekDone { result, .. } => {
                    if current && result.is_err() {
                        self.playing = false;
                    }
                    true
                }
                ClockEvent::Fault(_) => {
                    if current {
                        self.playing = false;
                    }
                    true
                }
                ClockEvent::Ended { .. } => {
                    if current {
                        self.playing = false;
                    }
                    current
                }
                ClockEvent::Frame(_) => current,
            };
            if keep {
                out.push(msg.event);
            } else {
                trace!("Clock: dropped stale message (epoch {} < {})", msg.epoch, self.epoch);
            }
        }
        out
    }

    fn send(&self, cmd: ClockCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            warn!("Clock thread is gone, command dropped");
        }
    }
}

impl Drop for PlaybackClock {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(ClockCommand::Shutdown);
        let Some(handle) = self.handle.take() else {
            return;
        };
        let deadline = Instant::now() + self.shutdown_timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("Clock thread did not stop within {:?}, detaching", self.shutdown_timeout);
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        let _ = handle.join();
    }
}

/// Decode-thread side of the clock
struct DecodeLoop {
    decoder: Box<dyn SequentialDecoder>,
    options: ClockOptions,
    cmd_rx: Receiver<ClockCommand>,
    msg_tx: Sender<ClockMessage>,
    epoch: u64,
    playing: bool,
    /// Wall time and PTS of the frame pacing is measured from
    anchor: Option<(Instant, TimeMs)>,
    /// Decoded but not yet due
    pending: Option<DecodedFrame>,
    last_pts: TimeMs,
}

/// Outcome of processing one command
enum Flow {
    Continue,
    Stop,
}

impl DecodeLoop {
    fn new(
        decoder: Box<dyn SequentialDecoder>,
        options: ClockOptions,
        cmd_rx: Receiver<ClockCommand>,
        msg_tx: Sender<ClockMessage>,
    ) -> Self {
        Self {
            decoder,
            options,
            cmd_rx,
            msg_tx,
            epoch: 0,
            playing: false,
            anchor: None,
            pending: None,
            last_pts: 0,
        }
    }

    fn run(mut self) {
        loop {
            if !self.playing {
                match self.cmd_rx.recv() {
                    Ok(cmd) => {
                        if let Flow::Stop = self.handle(cmd) {
                            return;
                        }
                    }
                    Err(_) => return,
                }
                continue;
            }

            // Commands first, so a slow decoder cannot starve pause/seek
            match self.cmd_rx.try_recv() {
                Ok(cmd) => {
                    if let Flow::Stop = self.handle(cmd) {
                        return;
                    }
                    continue;
                }
                Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => {}
            }

            if self.pending.is_none() {
                match self.read_with_retry() {
                    Ok(Some(frame)) => self.pending = Some(frame),
                    Ok(None) => {
                        info!("Clock: end of stream at {} ms", self.last_pts);
                        self.playing = false;
                        self.emit(ClockEvent::Ended {
                            position_ms: self.last_pts,
                        });
                        continue;
                    }
                    Err(fault) => {
                        self.playing = false;
                        self.emit(ClockEvent::Fault(fault));
                        continue;
                    }
                }
            }

            let Some(pts) = self.pending.as_ref().map(|f| f.pts_ms) else {
                continue;
            };
            let wait = self.time_until(pts);
            if !wait.is_zero() {
                match self.cmd_rx.recv_timeout(wait) {
                    Ok(cmd) => {
                        if let Flow::Stop = self.handle(cmd) {
                            return;
                        }
                        continue;
                    }
                    Err(RecvTimeoutError::Disconnected) => return,
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }

            if let Some(frame) = self.pending.take() {
                trace!("Clock: frame {} ms", frame.pts_ms);
                self.last_pts = frame.pts_ms;
                self.emit(ClockEvent::Frame(frame));
            }
        }
    }

    fn handle(&mut self, cmd: ClockCommand) -> Flow {
        match cmd {
            ClockCommand::Play => {
                self.playing = true;
                self.anchor = None;
            }
            ClockCommand::Pause { epoch } => {
                // The pending frame stays: it is the next one to show on resume
                self.epoch = epoch;
                self.playing = false;
            }
            ClockCommand::Seek {
                target_ms,
                ticket,
                epoch,
                resume,
            } => {
                self.epoch = epoch;
                self.pending = None;
                self.anchor = None;
                let result = self.seek_with_retry(target_ms);
                if let Ok(landing) = &result {
                    self.last_pts = landing.position_ms;
                    self.playing = resume;
                    // Pace the following frames from the landing frame
                    self.anchor = Some((Instant::now(), landing.position_ms));
                } else {
                    self.playing = false;
                }
                self.emit(ClockEvent::SeekDone { ticket, result });
            }
            ClockCommand::SetRate(rate) => {
                self.options.rate = rate;
                self.anchor = None;
            }
            ClockCommand::Shutdown => return Flow::Stop,
        }
        Flow::Continue
    }

    /// Time left until `pts` is due, re-anchoring on the first frame after
    /// play/seek/rate change or when PTS jumps backwards
    fn time_until(&mut self, pts: TimeMs) -> Duration {
        let now = Instant::now();
        let (wall, base) = match self.anchor {
            Some((wall, base)) if pts >= base => (wall, base),
            _ => {
                self.anchor = Some((now, pts));
                return Duration::ZERO;
            }
        };
        let offset_secs = (pts - base) as f64 / 1000.0 / self.options.rate;
        let due = wall + Duration::from_secs_f64(offset_secs);
        due.saturating_duration_since(now)
    }

    fn read_with_retry(&mut self) -> Result<Option<DecodedFrame>, DecodeFault> {
        match self.decoder.next_frame() {
            Ok(frame) => Ok(frame),
            Err(first) => {
                warn!("Clock: decode error ({}), retrying once", first);
                self.decoder.next_frame().map_err(|e| {
                    error!("Clock: decode fault: {}", e);
                    DecodeFault::from(e)
                })
            }
        }
    }

    fn seek_with_retry(&mut self, target_ms: TimeMs) -> Result<SeekLanding, DecodeFault> {
        match self.seek_once(target_ms) {
            Ok(landing) => Ok(landing),
            Err(first) => {
                warn!("Clock: seek to {} ms failed ({}), retrying once", target_ms, first);
                self.seek_once(target_ms).map_err(|e| {
                    error!("Clock: seek fault: {}", e);
                    DecodeFault::from(e)
                })
            }
        }
    }

    /// Seek, then decode forward to the frame displayed at `target`.
    ///
    /// Keyframe precision accepts the first frame. Past the end, the last
    /// decoded frame is the landing.
    fn seek_once(&mut self, target_ms: TimeMs) -> Result<SeekLanding, DecodeError> {
        let cursor = self.decoder.seek(target_ms)?;
        let (landing, next) = match self.options.precision {
            SeekPrecision::Exact => self.decode_to(target_ms)?,
            SeekPrecision::Keyframe => (self.decoder.next_frame()?, None),
        };
        // Already decoded; playback continues from it
        self.pending = next;

        Ok(match landing {
            Some(f) => SeekLanding {
                target_ms,
                position_ms: f.pts_ms,
                frame: Some(f.frame),
            },
            None => SeekLanding {
                target_ms,
                position_ms: cursor,
                frame: None,
            },
        })
    }

    /// Decode forward from the keyframe. Lands on the last frame at or before
    /// `target_ms`, or on the following frame when that one is strictly
    /// nearer and within tolerance. Returns the landing and, if the landing
    /// came first, the frame after it.
    fn decode_to(&mut self, target_ms: TimeMs) -> Result<(Option<DecodedFrame>, Option<DecodedFrame>), DecodeError> {
        let mut before: Option<DecodedFrame> = None;
        let mut skipped = 0usize;
        loop {
            let next = match self.decoder.next_frame() {
                Ok(next) => next,
                Err(e) if before.is_some() => {
                    // Landing is known; the error resurfaces on playback
                    debug!("Clock: read past landing failed ({})", e);
                    return Ok((before, None));
                }
                Err(e) => return Err(e),
            };
            let Some(frame) = next else {
                return Ok((before, None));
            };
            if frame.pts_ms <= target_ms {
                if before.replace(frame).is_some() {
                    skipped += 1;
                }
                continue;
            }

            if skipped > 0 {
                trace!("Clock: skipped {} frames before {} ms", skipped, target_ms);
            }
            let after = frame.pts_ms - target_ms;
            return Ok(match before {
                Some(b) if after >= target_ms - b.pts_ms || after > self.options.tolerance_ms => (Some(b), Some(frame)),
                _ => (Some(frame), None),
            });
        }
    }

    fn emit(&self, event: ClockEvent) {
        let _ = self.msg_tx.send(ClockMessage {
            epoch: self.epoch,
            event,
        });
    }
}
