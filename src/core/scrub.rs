//! ScrubSampler - best-effort preview frames from the fast random-access source.
//!
//! Runs on its own thread with its own decoder handle, so it never touches
//! the playback decoder. Requests are fire-and-forget from the control
//! thread; only the newest request is decoded and only its result is
//! delivered. A request id doubles as an epoch: bumping it (new request or
//! `cancel()`) makes every older request and result stale.
//!
//! An LRU of recently sampled frames keeps back-and-forth scrubbing cheap.

use crossbeam::channel::{self, Receiver, Sender};
use log::{debug, trace};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::entities::{EngineError, Frame, FrameRate, RandomAccessSampler, SamplePoint, TimeMs};

pub type PreviewId = u64;

/// Result of a preview request. `frame: None` means no preview there.
#[derive(Debug, Clone)]
pub struct PreviewResult {
    pub id: PreviewId,
    pub position_ms: TimeMs,
    pub frame: Option<Frame>,
}

struct PreviewRequest {
    id: PreviewId,
    position_ms: TimeMs,
    point: SamplePoint,
}

enum SamplerCommand {
    Sample(PreviewRequest),
    Shutdown,
}

/// Map a timeline position to what the fast decoder understands
pub fn sample_point(position_ms: TimeMs, rate: Option<FrameRate>) -> SamplePoint {
    let position_ms = position_ms.max(0);
    match rate {
        Some(rate) => SamplePoint::Frame(rate.ms_to_frame(position_ms)),
        None => SamplePoint::Time(position_ms),
    }
}

pub struct ScrubSampler {
    cmd_tx: Sender<SamplerCommand>,
    result_rx: Receiver<PreviewResult>,
    /// Newest request id; anything below is stale
    epoch: Arc<AtomicU64>,
    handle: Option<thread::JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl ScrubSampler {
    pub fn spawn(sampler: Box<dyn RandomAccessSampler>, cache_frames: usize, shutdown_timeout: Duration) -> Self {
        let (cmd_tx, cmd_rx) = channel::unbounded();
        let (result_tx, result_rx) = channel::unbounded();
        let epoch = Arc::new(AtomicU64::new(0));
        let capacity = NonZeroUsize::new(cache_frames.max(1)).unwrap_or(NonZeroUsize::MIN);

        let worker_epoch = Arc::clone(&epoch);
        let handle = thread::Builder::new()
            .name("scrubline-scrub".into())
            .spawn(move || {
                trace!("Scrub thread started");
                SampleLoop {
                    sampler,
                    cache: LruCache::new(capacity),
                    epoch: worker_epoch,
                    cmd_rx,
                    result_tx,
                }
                .run();
                trace!("Scrub thread stopped");
            })
            .expect("Failed to spawn scrub thread");

        Self {
            cmd_tx,
            result_rx,
            epoch,
            handle: Some(handle),
            shutdown_timeout,
        }
    }

    /// Request a preview near `position_ms`. Never blocks.
    ///
    /// Supersedes every earlier request.
    pub fn preview_at(&self, position_ms: TimeMs, rate: Option<FrameRate>) -> PreviewId {
        let id = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let request = PreviewRequest {
            id,
            position_ms,
            point: sample_point(position_ms, rate),
        };
        trace!("Preview #{} at {} ms ({:?})", id, position_ms, request.point);
        if self.cmd_tx.send(SamplerCommand::Sample(request)).is_err() {
            debug!("Scrub thread is gone, preview #{} dropped", id);
        }
        id
    }

    /// Make every outstanding request and undelivered result stale
    pub fn cancel(&self) {
        let id = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        trace!("Previews cancelled (epoch {})", id);
    }

    /// Results for the newest request only
    pub fn poll(&self) -> Vec<PreviewResult> {
        let current = self.epoch.load(Ordering::SeqCst);
        self.result_rx.try_iter().filter(|r| r.id == current).collect()
    }
}

impl Drop for ScrubSampler {
    fn drop(&mut self) {
        self.cancel();
        let _ = self.cmd_tx.send(SamplerCommand::Shutdown);
        let Some(handle) = self.handle.take() else {
            return;
        };
        let deadline = Instant::now() + self.shutdown_timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                debug!("Scrub thread did not stop within {:?}, detaching", self.shutdown_timeout);
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        let _ = handle.join();
    }
}

struct SampleLoop {
    sampler: Box<dyn RandomAccessSampler>,
    cache: LruCache<SamplePoint, Frame>,
    epoch: Arc<AtomicU64>,
    cmd_rx: Receiver<SamplerCommand>,
    result_tx: Sender<PreviewResult>,
}

impl SampleLoop {
    fn run(mut self) {
        while let Ok(cmd) = self.cmd_rx.recv() {
            let SamplerCommand::Sample(mut request) = cmd else {
                return;
            };
            // Skip to the newest queued request
            for next in self.cmd_rx.try_iter() {
                match next {
                    SamplerCommand::Sample(newer) => request = newer,
                    SamplerCommand::Shutdown => return,
                }
            }
            if self.is_stale(request.id) {
                continue;
            }

            let frame = self.sample(&request);
            if self.is_stale(request.id) {
                trace!("Preview #{} superseded while decoding", request.id);
                continue;
            }
            let _ = self.result_tx.send(PreviewResult {
                id: request.id,
                position_ms: request.position_ms,
                frame,
            });
        }
    }

    fn is_stale(&self, id: PreviewId) -> bool {
        id < self.epoch.load(Ordering::SeqCst)
    }

    fn sample(&mut self, request: &PreviewRequest) -> Option<Frame> {
        if let Some(frame) = self.cache.get(&request.point) {
            trace!("Preview cache hit {:?}", request.point);
            return Some(frame.clone());
        }
        match self.sampler.sample_near(request.point) {
            Ok(Some(frame)) => {
                self.cache.put(request.point, frame.clone());
                Some(frame)
            }
            Ok(None) => {
                trace!("{}", EngineError::PreviewUnavailable(request.position_ms));
                None
            }
            Err(e) => {
                debug!("{} ({})", EngineError::PreviewUnavailable(request.position_ms), e);
                None
            }
        }
    }
}
