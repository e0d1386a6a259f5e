//! FrameStepper and the measured frame-rate fallback.
//!
//! A step is `round(1000 / fps) * delta` milliseconds. The frame rate only
//! sizes steps; it never drives the timeline.

use log::{debug, trace};

use crate::entities::{DurationMs, EngineError, FrameRate, TimeMs};

pub struct FrameStepper;

impl FrameStepper {
    /// Target of a `delta`-frame step from `from_ms`.
    ///
    /// Clamped to `[0, duration]` when the duration is known, to `>= 0`
    /// otherwise.
    pub fn step_target(
        from_ms: TimeMs,
        delta: i32,
        rate: Option<FrameRate>,
        duration: DurationMs,
    ) -> Result<TimeMs, EngineError> {
        let rate = rate.ok_or(EngineError::NoFrameRate)?;
        let delta_ms = rate.frame_duration_ms() * delta as TimeMs;
        let mut target = from_ms.saturating_add(delta_ms).max(0);
        if let Some(end) = duration.known() {
            target = target.min(end);
        }
        trace!("Step {:+} from {} ms -> {} ms ({})", delta, from_ms, target, rate);
        Ok(target)
    }
}

/// Exponential moving average of `1000 / Δpts` over consecutive playback frames
#[derive(Debug, Clone)]
pub struct FpsEstimator {
    alpha: f64,
    min_samples: u32,
    ema: Option<f64>,
    samples: u32,
    last_pts: Option<TimeMs>,
}

impl FpsEstimator {
    pub fn new(alpha: f64, min_samples: u32) -> Self {
        Self {
            alpha: alpha.clamp(f64::EPSILON, 1.0),
            min_samples: min_samples.max(1),
            ema: None,
            samples: 0,
            last_pts: None,
        }
    }

    /// Feed the PTS of a frame that directly follows the previous one
    pub fn observe(&mut self, pts_ms: TimeMs) {
        let prev = self.last_pts.replace(pts_ms);
        let Some(prev) = prev else {
            return;
        };
        let delta = pts_ms - prev;
        if delta <= 0 {
            return;
        }
        let fps = 1000.0 / delta as f64;
        self.ema = Some(match self.ema {
            Some(ema) => self.alpha * fps + (1.0 - self.alpha) * ema,
            None => fps,
        });
        self.samples = self.samples.saturating_add(1);
    }

    /// The next frame does not follow the previous one (seek, pause)
    pub fn break_sequence(&mut self) {
        self.last_pts = None;
    }

    pub fn reset(&mut self) {
        self.ema = None;
        self.samples = 0;
        self.last_pts = None;
    }

    pub fn estimate(&self) -> Option<FrameRate> {
        if self.samples < self.min_samples {
            return None;
        }
        let rate = self.ema.and_then(FrameRate::from_fps);
        if rate.is_some() && self.samples == self.min_samples {
            debug!("Measured frame rate: {:?}", rate);
        }
        rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(num: u32, den: u32) -> Option<FrameRate> {
        FrameRate::new(num, den)
    }

    #[test]
    fn test_step_size() {
        let d = DurationMs::Known(10_000);
        assert_eq!(FrameStepper::step_target(1000, 1, rate(25, 1), d).unwrap(), 1040);
        assert_eq!(FrameStepper::step_target(1000, -1, rate(25, 1), d).unwrap(), 960);
        assert_eq!(FrameStepper::step_target(1000, 1, rate(30000, 1001), d).unwrap(), 1033);
        assert_eq!(FrameStepper::step_target(1000, 3, rate(24, 1), d).unwrap(), 1126);
    }

    #[test]
    fn test_step_round_trip() {
        let d = DurationMs::Known(60_000);
        for r in [rate(24, 1), rate(25, 1), rate(30000, 1001), rate(60, 1)] {
            for start in [500, 1234, 33_333] {
                let fwd = FrameStepper::step_target(start, 1, r, d).unwrap();
                let back = FrameStepper::step_target(fwd, -1, r, d).unwrap();
                assert!((back - start).abs() <= 1, "{:?} {} -> {} -> {}", r, start, fwd, back);
            }
        }
    }

    #[test]
    fn test_step_clamps() {
        let r = rate(25, 1);
        assert_eq!(FrameStepper::step_target(10, -1, r, DurationMs::Known(1000)).unwrap(), 0);
        assert_eq!(FrameStepper::step_target(990, 1, r, DurationMs::Known(1000)).unwrap(), 1000);
        // Unknown end: only the lower bound applies
        assert_eq!(FrameStepper::step_target(990, 1, r, DurationMs::Growing(1000)).unwrap(), 1030);
    }

    #[test]
    fn test_step_without_rate_rejected() {
        assert!(matches!(
            FrameStepper::step_target(0, 1, None, DurationMs::Known(1000)),
            Err(EngineError::NoFrameRate)
        ));
    }

    #[test]
    fn test_estimator_needs_samples() {
        let mut est = FpsEstimator::new(0.1, 3);
        est.observe(0);
        est.observe(40);
        est.observe(80);
        assert_eq!(est.estimate(), None);
        est.observe(120);
        assert_eq!(est.estimate(), rate(25, 1));
    }

    #[test]
    fn test_estimator_ignores_jumps_after_break() {
        let mut est = FpsEstimator::new(0.1, 1);
        est.observe(0);
        est.observe(40);
        est.break_sequence();
        est.observe(9000);
        est.observe(9040);
        assert_eq!(est.estimate(), rate(25, 1));

        est.reset();
        assert_eq!(est.estimate(), None);
    }

    #[test]
    fn test_estimator_smooths_jitter() {
        let mut est = FpsEstimator::new(0.1, 3);
        let mut pts = 0;
        for i in 0..200 {
            pts += if i % 2 == 0 { 33 } else { 34 };
            est.observe(pts);
        }
        let fps = est.estimate().unwrap().as_f64();
        assert!((fps - 29.85).abs() < 0.5, "{}", fps);
    }
}
