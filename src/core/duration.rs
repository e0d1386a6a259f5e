//! DurationResolver - authoritative clip duration with a probing fallback.
//!
//! 1. Container metadata from a disposable precise-decoder handle
//! 2. `frame_count / fps` from a disposable fast-sampler probe
//! 3. `Unknown` (the engine then runs with a `Growing` bound)
//!
//! Both handles are dropped before `resolve` returns.

use log::{debug, info, warn};

use crate::entities::{DurationMs, EngineError, FrameRate, MediaBackend, MediaSource, TimeMs};

/// What the resolver learned about a clip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub duration: DurationMs,
    /// Nominal rate from metadata or probe, if either reported one
    pub frame_rate: Option<FrameRate>,
}

pub struct DurationResolver<'a> {
    backend: &'a dyn MediaBackend,
    max_plausible_ms: TimeMs,
}

impl<'a> DurationResolver<'a> {
    pub fn new(backend: &'a dyn MediaBackend, max_plausible_ms: TimeMs) -> Self {
        Self {
            backend,
            max_plausible_ms,
        }
    }

    pub fn resolve(&self, source: &MediaSource) -> Resolution {
        let mut frame_rate = None;

        match self.backend.open_sequential(source) {
            Ok(decoder) => {
                let meta = decoder.metadata();
                drop(decoder);
                frame_rate = meta.frame_rate;
                if let Some(ms) = meta.duration_secs.and_then(|s| self.plausible_ms(s)) {
                    info!("{}: duration {} ms from metadata", source.display_name(), ms);
                    return Resolution {
                        duration: DurationMs::Known(ms),
                        frame_rate,
                    };
                }
                debug!(
                    "{}: metadata duration {:?} not usable, probing",
                    source.display_name(),
                    meta.duration_secs
                );
            }
            Err(e) => debug!("{}: metadata unavailable ({}), probing", source.display_name(), e),
        }

        match self.backend.open_sampler(source).and_then(|mut sampler| sampler.probe()) {
            Ok(probe) => {
                let probed_rate = probe.fps.and_then(FrameRate::from_fps);
                let frame_rate = frame_rate.or(probed_rate);
                let estimate = match (probe.frame_count, probe.fps) {
                    (Some(count), Some(fps)) if fps > 0.0 => self.plausible_ms(count as f64 / fps),
                    _ => None,
                };
                if let Some(ms) = estimate {
                    info!("{}: duration {} ms from probe", source.display_name(), ms);
                    return Resolution {
                        duration: DurationMs::Known(ms),
                        frame_rate,
                    };
                }
                warn!("{}: {}", source.display_name(), EngineError::DurationUnresolvable);
                Resolution {
                    duration: DurationMs::Unknown,
                    frame_rate,
                }
            }
            Err(e) => {
                warn!("{}: {} (probe: {})", source.display_name(), EngineError::DurationUnresolvable, e);
                Resolution {
                    duration: DurationMs::Unknown,
                    frame_rate,
                }
            }
        }
    }

    /// Seconds to ms if finite, positive and below the plausibility ceiling
    fn plausible_ms(&self, secs: f64) -> Option<TimeMs> {
        if !secs.is_finite() || secs <= 0.0 {
            return None;
        }
        let ms = (secs * 1000.0).round();
        if ms <= 0.0 || ms >= self.max_plausible_ms as f64 {
            return None;
        }
        Some(ms as TimeMs)
    }
}
