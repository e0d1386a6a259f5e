//! Scripted in-memory decoders for driving the engine deterministically.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::entities::{
    DecodeError, DecodedFrame, Frame, FrameRate, MediaBackend, MediaSource, ProbeInfo, RandomAccessSampler,
    SamplePoint, SequentialDecoder, StreamMetadata, TimeMs,
};

/// Behaviour of one scripted clip
#[derive(Debug, Clone)]
pub struct Script {
    /// Presentation timestamps in decode order
    pub pts: Vec<TimeMs>,
    pub duration_secs: Option<f64>,
    pub frame_rate: Option<FrameRate>,
    /// `None` makes `probe()` fail
    pub probe: Option<ProbeInfo>,
    /// Seeks land on multiples of this frame index
    pub keyframe_interval: usize,
    /// Number of seeks that fail before seeking works
    pub failing_seeks: usize,
    /// Frame index at which `next_frame` starts failing
    pub fault_at: Option<usize>,
    /// Number of `open_sequential` calls that fail first
    pub failing_opens: usize,
    /// Artificial latency of `sample_near`
    pub sample_delay: Duration,
}

impl Script {
    /// `count` frames at `rate`, with matching metadata and probe info
    pub fn clip(rate: FrameRate, count: u64) -> Self {
        let pts: Vec<TimeMs> = (0..count).map(|i| rate.frame_to_ms(i)).collect();
        Self {
            duration_secs: Some(rate.frame_to_ms(count) as f64 / 1000.0),
            frame_rate: Some(rate),
            probe: Some(ProbeInfo {
                frame_count: Some(count),
                fps: Some(rate.as_f64()),
            }),
            pts,
            keyframe_interval: 1,
            failing_seeks: 0,
            fault_at: None,
            failing_opens: 0,
            sample_delay: Duration::ZERO,
        }
    }

    /// Same frames, but no metadata and a failing probe
    pub fn without_duration(mut self) -> Self {
        self.duration_secs = None;
        self.probe = None;
        self
    }
}

/// Counters shared by every handle a backend hands out
#[derive(Debug, Default)]
pub struct Stats {
    pub sequential_opened: AtomicUsize,
    pub samplers_opened: AtomicUsize,
    /// Handles currently alive
    pub live_handles: AtomicUsize,
    pub seeks: AtomicUsize,
    pub samples: AtomicUsize,
    /// Concurrent `sample_near` calls right now / at most
    pub sampling_now: AtomicUsize,
    pub sampling_peak: AtomicUsize,
    pub seek_targets: Mutex<Vec<TimeMs>>,
    pub sample_points: Mutex<Vec<SamplePoint>>,
}

impl Stats {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

fn test_frame() -> Frame {
    Frame::placeholder(2, 2)
}

pub struct ScriptedDecoder {
    script: Script,
    cursor: usize,
    failing_seeks: usize,
    stats: Arc<Stats>,
}

impl ScriptedDecoder {
    pub fn new(script: Script, stats: Arc<Stats>) -> Self {
        stats.live_handles.fetch_add(1, Ordering::SeqCst);
        Self {
            failing_seeks: script.failing_seeks,
            script,
            cursor: 0,
            stats,
        }
    }
}

impl Drop for ScriptedDecoder {
    fn drop(&mut self) {
        self.stats.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SequentialDecoder for ScriptedDecoder {
    fn metadata(&self) -> StreamMetadata {
        StreamMetadata {
            duration_secs: self.script.duration_secs,
            frame_rate: self.script.frame_rate,
            width: 2,
            height: 2,
        }
    }

    fn seek(&mut self, target_ms: TimeMs) -> Result<TimeMs, DecodeError> {
        self.stats.seeks.fetch_add(1, Ordering::SeqCst);
        self.stats.seek_targets.lock().unwrap().push(target_ms);
        if self.failing_seeks > 0 {
            self.failing_seeks -= 1;
            return Err(DecodeError::Seek {
                target_ms,
                reason: "scripted failure".into(),
            });
        }
        let at_or_before = self.script.pts.iter().rposition(|&p| p <= target_ms).unwrap_or(0);
        let k = self.script.keyframe_interval.max(1);
        self.cursor = at_or_before / k * k;
        Ok(self.script.pts.get(self.cursor).copied().unwrap_or(0))
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, DecodeError> {
        if let Some(at) = self.script.fault_at
            && self.cursor >= at
        {
            return Err(DecodeError::Stream("scripted corruption".into()));
        }
        let Some(&pts) = self.script.pts.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        Ok(Some(DecodedFrame::new(pts, test_frame())))
    }
}

pub struct ScriptedSampler {
    script: Script,
    stats: Arc<Stats>,
}

impl ScriptedSampler {
    pub fn new(script: Script, stats: Arc<Stats>) -> Self {
        stats.live_handles.fetch_add(1, Ordering::SeqCst);
        Self { script, stats }
    }
}

impl Drop for ScriptedSampler {
    fn drop(&mut self) {
        self.stats.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RandomAccessSampler for ScriptedSampler {
    fn probe(&mut self) -> Result<ProbeInfo, DecodeError> {
        self.script
            .probe
            .ok_or_else(|| DecodeError::Unsupported("scripted probe failure".into()))
    }

    fn sample_near(&mut self, at: SamplePoint) -> Result<Option<Frame>, DecodeError> {
        let now = self.stats.sampling_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.sampling_peak.fetch_max(now, Ordering::SeqCst);
        self.stats.sample_points.lock().unwrap().push(at);
        self.stats.samples.fetch_add(1, Ordering::SeqCst);
        if !self.script.sample_delay.is_zero() {
            std::thread::sleep(self.script.sample_delay);
        }
        let count = self.script.pts.len() as u64;
        let found = match at {
            SamplePoint::Frame(i) => i < count,
            SamplePoint::Time(ms) => self.script.pts.last().is_some_and(|&last| ms <= last),
        };
        self.stats.sampling_now.fetch_sub(1, Ordering::SeqCst);
        Ok(found.then(test_frame))
    }
}

pub struct ScriptedBackend {
    script: Script,
    failing_opens: AtomicUsize,
    pub stats: Arc<Stats>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            failing_opens: AtomicUsize::new(script.failing_opens),
            script,
            stats: Arc::new(Stats::default()),
        })
    }
}

impl MediaBackend for ScriptedBackend {
    fn open_sequential(&self, source: &MediaSource) -> Result<Box<dyn SequentialDecoder>, DecodeError> {
        let fail = self
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            return Err(DecodeError::Open {
                path: source.path().to_path_buf(),
                reason: "scripted failure".into(),
            });
        }
        self.stats.sequential_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedDecoder::new(self.script.clone(), Arc::clone(&self.stats))))
    }

    fn open_sampler(&self, _source: &MediaSource) -> Result<Box<dyn RandomAccessSampler>, DecodeError> {
        self.stats.samplers_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSampler::new(self.script.clone(), Arc::clone(&self.stats))))
    }
}

/// Call `poll` until it returns true or `timeout` expires.
pub fn wait_until(timeout: Duration, mut poll: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if poll() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

pub const WAIT: Duration = Duration::from_secs(5);
