//! TimelineModel - the single authoritative position/duration/frame-rate store.
//!
//! Owned by the engine and mutated only on the control thread. Decode
//! threads never touch it; their results arrive as messages and the engine
//! applies them here. Listeners registered with [`TimelineModel::on_change`]
//! run synchronously on every change.

use log::{debug, trace};

use crate::entities::{DurationMs, FrameRate, MediaSource, TimeMs};

/// Change notification carrying the new value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineChange {
    Position(TimeMs),
    Duration(DurationMs),
}

type Listener = Box<dyn Fn(&TimelineChange) + Send>;

#[derive(Default)]
pub struct TimelineModel {
    source: Option<MediaSource>,
    position: TimeMs,
    duration: DurationMs,
    frame_rate: Option<FrameRate>,
    listeners: Vec<Listener>,
}

impl std::fmt::Debug for TimelineModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimelineModel")
            .field("source", &self.source)
            .field("position", &self.position)
            .field("duration", &self.duration)
            .field("frame_rate", &self.frame_rate)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl TimelineModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_change<F>(&mut self, callback: F)
    where
        F: Fn(&TimelineChange) + Send + 'static,
    {
        self.listeners.push(Box::new(callback));
    }

    fn notify(&self, change: TimelineChange) {
        for listener in &self.listeners {
            listener(&change);
        }
    }

    /// Take ownership of a newly opened clip.
    ///
    /// Resets position, duration and frame rate without notifying; the
    /// caller publishes the resolved values next.
    pub fn set_source(&mut self, source: MediaSource) {
        debug!("Timeline source -> {} ({})", source.display_name(), source.id());
        self.source = Some(source);
        self.position = 0;
        self.duration = DurationMs::Unknown;
        self.frame_rate = None;
    }

    /// Release the clip. Decoders must already be shut down.
    pub fn clear_source(&mut self) -> Option<MediaSource> {
        self.position = 0;
        self.duration = DurationMs::Unknown;
        self.frame_rate = None;
        self.source.take()
    }

    pub fn source(&self) -> Option<&MediaSource> {
        self.source.as_ref()
    }

    pub fn current_position(&self) -> TimeMs {
        self.position
    }

    pub fn current_duration(&self) -> DurationMs {
        self.duration
    }

    pub fn frame_rate(&self) -> Option<FrameRate> {
        self.frame_rate
    }

    pub fn set_frame_rate(&mut self, rate: Option<FrameRate>) -> bool {
        if self.frame_rate == rate {
            return false;
        }
        debug!("Effective frame rate: {:?} -> {:?}", self.frame_rate, rate);
        self.frame_rate = rate;
        true
    }

    /// Set the authoritative position and notify.
    ///
    /// Negative values clamp to 0. Values past a `Known` duration are kept
    /// as given. Under `Growing`, a larger position raises the bound first,
    /// so listeners see the duration change before the position.
    pub fn set_position(&mut self, position: TimeMs) {
        let position = position.max(0);
        if let DurationMs::Growing(bound) = self.duration
            && position > bound
        {
            self.duration = DurationMs::Growing(position);
            trace!("Growing bound -> {} ms", position);
            self.notify(TimelineChange::Duration(self.duration));
        }
        self.position = position;
        self.notify(TimelineChange::Position(position));
    }

    /// Replace the duration, honoring its ratchets:
    /// - `Known` never reverts to `Unknown` or `Growing`
    /// - a `Growing` bound never shrinks
    ///
    /// Returns true if the stored duration changed.
    pub fn set_duration(&mut self, duration: DurationMs) -> bool {
        let next = match (self.duration, duration) {
            (DurationMs::Known(_), DurationMs::Unknown | DurationMs::Growing(_)) => {
                debug!("Ignoring {} after duration became known", duration);
                return false;
            }
            (DurationMs::Growing(_), DurationMs::Unknown) => return false,
            (DurationMs::Growing(cur), DurationMs::Growing(new)) => DurationMs::Growing(cur.max(new.max(0))),
            (_, DurationMs::Known(v)) => DurationMs::Known(v.max(0)),
            (_, DurationMs::Growing(v)) => DurationMs::Growing(v.max(0)),
            (_, DurationMs::Unknown) => DurationMs::Unknown,
        };
        if next == self.duration {
            return false;
        }
        debug!("Duration {} -> {}", self.duration, next);
        self.duration = next;
        self.notify(TimelineChange::Duration(next));
        true
    }

    /// End of stream reached: a growing bound becomes the known duration
    pub fn finalize_duration(&mut self, end_ms: TimeMs) -> bool {
        match self.duration {
            DurationMs::Growing(bound) => self.set_duration(DurationMs::Known(bound.max(end_ms))),
            DurationMs::Unknown => self.set_duration(DurationMs::Known(end_ms.max(0))),
            DurationMs::Known(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorded(model: &mut TimelineModel) -> Arc<Mutex<Vec<TimelineChange>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        model.on_change(move |c| sink.lock().unwrap().push(*c));
        log
    }

    #[test]
    fn test_position_notifies() {
        let mut model = TimelineModel::new();
        let log = recorded(&mut model);
        model.set_position(1200);
        model.set_position(-40);
        assert_eq!(model.current_position(), 0);
        assert_eq!(
            *log.lock().unwrap(),
            vec![TimelineChange::Position(1200), TimelineChange::Position(0)]
        );
    }

    #[test]
    fn test_known_duration_does_not_clamp() {
        let mut model = TimelineModel::new();
        model.set_duration(DurationMs::Known(1000));
        model.set_position(1500);
        assert_eq!(model.current_position(), 1500);
        assert_eq!(model.current_duration(), DurationMs::Known(1000));
    }

    #[test]
    fn test_growing_ratchet() {
        let mut model = TimelineModel::new();
        let log = recorded(&mut model);
        model.set_duration(DurationMs::Growing(0));

        let mut max_seen = 0;
        for p in [40, 80, 3000, 120, 5000, 2000] {
            model.set_position(p);
            max_seen = max_seen.max(p);
            assert_eq!(model.current_duration(), DurationMs::Growing(max_seen));
        }

        // Shrinking requests are ignored
        assert!(!model.set_duration(DurationMs::Growing(10)));
        assert!(!model.set_duration(DurationMs::Unknown));
        assert_eq!(model.current_duration(), DurationMs::Growing(5000));

        // Duration change precedes the position that caused it
        let log = log.lock().unwrap();
        let idx = log.iter().position(|c| *c == TimelineChange::Duration(DurationMs::Growing(3000))).unwrap();
        assert_eq!(log[idx + 1], TimelineChange::Position(3000));
    }

    #[test]
    fn test_known_is_final() {
        let mut model = TimelineModel::new();
        model.set_duration(DurationMs::Growing(100));
        assert!(model.finalize_duration(900));
        assert_eq!(model.current_duration(), DurationMs::Known(900));
        assert!(!model.set_duration(DurationMs::Growing(2000)));
        assert!(!model.set_duration(DurationMs::Unknown));
        assert!(!model.finalize_duration(5000));
        assert_eq!(model.current_duration(), DurationMs::Known(900));
    }

    #[test]
    fn test_source_lifecycle() {
        let mut model = TimelineModel::new();
        model.set_source(MediaSource::detect("a.mp4"));
        model.set_position(500);
        model.set_duration(DurationMs::Known(1000));
        model.set_frame_rate(FrameRate::new(25, 1));

        let old = model.clear_source().unwrap();
        assert_eq!(old.display_name(), "a.mp4");
        assert!(model.source().is_none());
        assert_eq!(model.current_position(), 0);
        assert_eq!(model.current_duration(), DurationMs::Unknown);
        assert_eq!(model.frame_rate(), None);
    }
}
