//! Time model: millisecond positions, duration states and rational frame rates.
//!
//! The timeline is always time-based. Frame indices only appear when a
//! frame rate is needed to size a step or to address the scrub sampler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position on the timeline in milliseconds from stream start.
pub type TimeMs = i64;

/// Clip duration as far as the engine knows it.
///
/// `Growing` carries the largest position observed so far; the bound only
/// ever ratchets upward for a loaded clip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "ms", rename_all = "snake_case")]
pub enum DurationMs {
    Known(TimeMs),
    #[default]
    Unknown,
    Growing(TimeMs),
}

impl DurationMs {
    /// Upper bound of the timeline (None while Unknown)
    pub fn bound(&self) -> Option<TimeMs> {
        match *self {
            DurationMs::Known(v) | DurationMs::Growing(v) => Some(v),
            DurationMs::Unknown => None,
        }
    }

    /// Known duration value, if any
    pub fn known(&self) -> Option<TimeMs> {
        match *self {
            DurationMs::Known(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, DurationMs::Known(_))
    }
}

impl fmt::Display for DurationMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurationMs::Known(v) => write!(f, "{} ms", v),
            DurationMs::Unknown => write!(f, "unknown"),
            DurationMs::Growing(v) => write!(f, "growing (>= {} ms)", v),
        }
    }
}

/// NTSC-style rates that arrive from containers as floats (23.976, 29.97, ...)
const NTSC_BASES: &[u32] = &[24, 30, 48, 60, 120];

/// Frame rate as an exact rational (frames per second = num / den).
///
/// Only constructed through `new`/`from_fps`, so both terms are non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FrameRate {
    num: u32,
    den: u32,
}

impl FrameRate {
    /// Film rate, used when nothing better is known
    pub const FILM: FrameRate = FrameRate { num: 24, den: 1 };

    /// Create from numerator/denominator. Returns None for a zero term.
    pub fn new(num: u32, den: u32) -> Option<Self> {
        if num == 0 || den == 0 {
            return None;
        }
        let g = gcd(num, den);
        Some(Self { num: num / g, den: den / g })
    }

    /// Approximate a floating-point fps as a rational.
    ///
    /// Snaps to NTSC (`N*1000/1001`) and integer rates when close enough,
    /// otherwise keeps millisecond-fps precision.
    pub fn from_fps(fps: f64) -> Option<Self> {
        if !fps.is_finite() || fps <= 0.0 || fps > 10_000.0 {
            return None;
        }
        for &base in NTSC_BASES {
            let ntsc = base as f64 * 1000.0 / 1001.0;
            if (fps - ntsc).abs() < 0.005 {
                return Self::new(base * 1000, 1001);
            }
        }
        let rounded = fps.round();
        if (fps - rounded).abs() < 0.001 && rounded >= 1.0 {
            return Self::new(rounded as u32, 1);
        }
        Self::new((fps * 1000.0).round() as u32, 1000)
    }

    pub fn num(&self) -> u32 {
        self.num
    }

    pub fn den(&self) -> u32 {
        self.den
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Duration of one frame, rounded to whole milliseconds
    pub fn frame_duration_ms(&self) -> TimeMs {
        (1000.0 * self.den as f64 / self.num as f64).round() as TimeMs
    }

    /// Index of the frame displayed at `ms` (floor)
    pub fn ms_to_frame(&self, ms: TimeMs) -> u64 {
        let ms = ms.max(0) as u128;
        (ms * self.num as u128 / (1000 * self.den as u128)) as u64
    }

    /// Presentation time of frame `index`, rounded to the nearest millisecond
    pub fn frame_to_ms(&self, index: u64) -> TimeMs {
        let scaled = index as u128 * 1000 * self.den as u128;
        ((scaled + self.num as u128 / 2) / self.num as u128) as TimeMs
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{} fps", self.num)
        } else {
            write!(f, "{}/{} ({:.3} fps)", self.num, self.den, self.as_f64())
        }
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Format as `HH:MM:SS.mmm`
pub fn format_timecode(ms: TimeMs) -> String {
    let ms = ms.max(0);
    let millis = ms % 1000;
    let total_secs = ms / 1000;
    let s = total_secs % 60;
    let m = (total_secs / 60) % 60;
    let h = total_secs / 3600;
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, millis)
}

/// Frame label shown next to the timecode, e.g. `#000042`
pub fn frame_label(ms: TimeMs, rate: Option<FrameRate>) -> String {
    match rate {
        Some(rate) => format!("#{:06}", rate.ms_to_frame(ms)),
        None => "#------".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ntsc_snap() {
        let r = FrameRate::from_fps(29.97).unwrap();
        assert_eq!((r.num(), r.den()), (30000, 1001));
        let r = FrameRate::from_fps(23.976).unwrap();
        assert_eq!((r.num(), r.den()), (24000, 1001));
    }

    #[test]
    fn test_integer_and_fractional_rates() {
        assert_eq!(FrameRate::from_fps(25.0), FrameRate::new(25, 1));
        let r = FrameRate::from_fps(12.5).unwrap();
        assert_eq!((r.num(), r.den()), (25, 2));
        assert!(FrameRate::from_fps(0.0).is_none());
        assert!(FrameRate::from_fps(f64::NAN).is_none());
        assert!(FrameRate::new(0, 1).is_none());
    }

    #[test]
    fn test_frame_duration() {
        assert_eq!(FrameRate::new(25, 1).unwrap().frame_duration_ms(), 40);
        assert_eq!(FrameRate::new(24, 1).unwrap().frame_duration_ms(), 42);
        assert_eq!(FrameRate::new(30000, 1001).unwrap().frame_duration_ms(), 33);
    }

    #[test]
    fn test_ms_frame_mapping() {
        let r = FrameRate::new(25, 1).unwrap();
        assert_eq!(r.ms_to_frame(0), 0);
        assert_eq!(r.ms_to_frame(39), 0);
        assert_eq!(r.ms_to_frame(40), 1);
        assert_eq!(r.ms_to_frame(-5), 0);
        assert_eq!(r.frame_to_ms(250), 10_000);

        let ntsc = FrameRate::new(30000, 1001).unwrap();
        // Frame 30 of 29.97 starts at 1001 ms
        assert_eq!(ntsc.frame_to_ms(30), 1001);
        assert_eq!(ntsc.ms_to_frame(1001), 30);
    }

    #[test]
    fn test_duration_bound() {
        assert_eq!(DurationMs::Known(5).bound(), Some(5));
        assert_eq!(DurationMs::Growing(7).bound(), Some(7));
        assert_eq!(DurationMs::Unknown.bound(), None);
        assert_eq!(DurationMs::Growing(7).known(), None);
    }

    #[test]
    fn test_timecode() {
        assert_eq!(format_timecode(0), "00:00:00.000");
        assert_eq!(format_timecode(3_723_045), "01:02:03.045");
        assert_eq!(format_timecode(-10), "00:00:00.000");
        assert_eq!(frame_label(1000, FrameRate::new(24, 1)), "#000024");
    }
}
