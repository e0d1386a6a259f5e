//! SeekCoordinator - arbitrates between live scrubbing and committed seeks.
//!
//! Pure state machine: it owns no decoders. Each input returns the
//! [`SeekDirective`]s the engine must carry out against the scrub sampler
//! and the playback clock.
//!
//! ```text
//!   Idle --drag_start--> Scrubbing --drag_end--> CommittingSeek --seek_done--> Idle
//!                          ^   |                      |
//!                          |   +-- drag_move: one preview in flight, newest pending
//!                          +--------- drag_start -----+  (commit deferred until resolved)
//! ```

use log::{debug, trace};
use std::collections::VecDeque;

use super::clock::SeekTicket;
use crate::entities::TimeMs;

/// Which frame source currently drives what the user sees
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Idle,
    /// Dragging; carries the last requested preview position
    Scrubbing(TimeMs),
    /// A precise seek is outstanding
    CommittingSeek(TimeMs),
}

/// Work the engine performs on the coordinator's behalf
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirective {
    CancelPreviews,
    RequestPreview(TimeMs),
    Commit { target_ms: TimeMs, ticket: SeekTicket },
}

#[derive(Debug, Default)]
pub struct SeekCoordinator {
    dragging: bool,
    last_preview_ms: TimeMs,
    preview_in_flight: bool,
    pending_preview: Option<TimeMs>,
    outstanding: Option<(TimeMs, SeekTicket)>,
    queued: VecDeque<TimeMs>,
    next_ticket: SeekTicket,
}

impl SeekCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> InteractionState {
        if self.dragging {
            InteractionState::Scrubbing(self.last_preview_ms)
        } else if let Some((target, _)) = self.outstanding {
            InteractionState::CommittingSeek(target)
        } else {
            InteractionState::Idle
        }
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    /// True while playback frames must not touch the authoritative position
    pub fn blocks_playback_updates(&self) -> bool {
        self.dragging || self.outstanding.is_some()
    }

    /// Where the timeline will be once every queued seek resolves
    pub fn effective_target(&self) -> Option<TimeMs> {
        self.queued
            .back()
            .copied()
            .or(self.outstanding.map(|(target, _)| target))
    }

    pub fn drag_start(&mut self, from_ms: TimeMs) -> Vec<SeekDirective> {
        debug!("Scrub: drag start at {} ms ({:?})", from_ms, self.state());
        self.dragging = true;
        self.last_preview_ms = from_ms;
        self.preview_in_flight = false;
        self.pending_preview = None;
        vec![SeekDirective::CancelPreviews]
    }

    /// At most one preview is in flight; newer positions replace the pending one
    pub fn drag_move(&mut self, position_ms: TimeMs) -> Vec<SeekDirective> {
        if !self.dragging {
            trace!("Scrub: move without drag ignored");
            return Vec::new();
        }
        self.last_preview_ms = position_ms;
        if self.preview_in_flight {
            self.pending_preview = Some(position_ms);
            return Vec::new();
        }
        self.preview_in_flight = true;
        vec![SeekDirective::RequestPreview(position_ms)]
    }

    /// The in-flight preview resolved (frame or not); send the newest pending one
    pub fn preview_finished(&mut self) -> Vec<SeekDirective> {
        self.preview_in_flight = false;
        match self.pending_preview.take() {
            Some(position_ms) if self.dragging => {
                self.preview_in_flight = true;
                vec![SeekDirective::RequestPreview(position_ms)]
            }
            _ => Vec::new(),
        }
    }

    /// Release: drop previews and commit exactly one seek to `position_ms`
    pub fn drag_end(&mut self, position_ms: TimeMs) -> Vec<SeekDirective> {
        debug!("Scrub: drag end at {} ms", position_ms);
        self.dragging = false;
        self.preview_in_flight = false;
        self.pending_preview = None;
        let mut out = vec![SeekDirective::CancelPreviews];
        out.extend(self.commit(position_ms));
        out
    }

    /// Explicit command during a drag: outstanding previews are discarded
    pub fn discard_previews(&mut self) -> Vec<SeekDirective> {
        if !self.dragging && !self.preview_in_flight {
            return Vec::new();
        }
        self.preview_in_flight = false;
        self.pending_preview = None;
        vec![SeekDirective::CancelPreviews]
    }

    /// Precise seek, bypassing the preview phase. Queued behind an
    /// outstanding commit; a repeat of the newest target is dropped.
    pub fn commit(&mut self, target_ms: TimeMs) -> Vec<SeekDirective> {
        if self.outstanding.is_some() {
            if self.effective_target() == Some(target_ms) {
                trace!("Seek to {} ms already pending", target_ms);
            } else {
                debug!("Seek to {} ms queued behind {:?}", target_ms, self.outstanding);
                self.queued.push_back(target_ms);
            }
            return Vec::new();
        }
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.outstanding = Some((target_ms, ticket));
        vec![SeekDirective::Commit { target_ms, ticket }]
    }

    /// Completion of a committed seek. Returns `None` for an unknown ticket,
    /// otherwise the follow-up directives (the next queued commit, if any).
    ///
    /// A commit released by an earlier gesture may resolve while a new drag
    /// is active. Its landing is still authoritative and gets published; the
    /// new drag only holds back its own commit until release.
    pub fn seek_done(&mut self, ticket: SeekTicket) -> Option<Vec<SeekDirective>> {
        match self.outstanding {
            Some((_, t)) if t == ticket => {}
            _ => {
                debug!("Ignoring completion of unknown seek #{}", ticket);
                return None;
            }
        }
        self.outstanding = None;
        Some(match self.queued.pop_front() {
            Some(next) => self.commit(next),
            None => Vec::new(),
        })
    }

    /// Forget all interaction state (clip closed)
    pub fn reset(&mut self) {
        let next_ticket = self.next_ticket;
        *self = Self {
            next_ticket,
            ..Self::default()
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commits(directives: &[SeekDirective]) -> Vec<(TimeMs, SeekTicket)> {
        directives
            .iter()
            .filter_map(|d| match *d {
                SeekDirective::Commit { target_ms, ticket } => Some((target_ms, ticket)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_drag_lifecycle() {
        let mut sc = SeekCoordinator::new();
        assert_eq!(sc.state(), InteractionState::Idle);

        assert_eq!(sc.drag_start(1000), vec![SeekDirective::CancelPreviews]);
        assert_eq!(sc.state(), InteractionState::Scrubbing(1000));
        assert!(sc.blocks_playback_updates());

        assert_eq!(sc.drag_move(2000), vec![SeekDirective::RequestPreview(2000)]);
        assert_eq!(sc.state(), InteractionState::Scrubbing(2000));

        let out = sc.drag_end(9000);
        assert_eq!(out[0], SeekDirective::CancelPreviews);
        let c = commits(&out);
        assert_eq!(c.len(), 1);
        assert_eq!(sc.state(), InteractionState::CommittingSeek(9000));

        assert_eq!(sc.seek_done(c[0].1), Some(Vec::new()));
        assert_eq!(sc.state(), InteractionState::Idle);
        assert!(!sc.blocks_playback_updates());
    }

    #[test]
    fn test_one_preview_in_flight() {
        let mut sc = SeekCoordinator::new();
        sc.drag_start(0);

        let mut requested = Vec::new();
        for i in 1..=50 {
            for d in sc.drag_move(i * 10) {
                if let SeekDirective::RequestPreview(p) = d {
                    requested.push(p);
                }
            }
        }
        // Only the first went out; the newest is pending
        assert_eq!(requested, vec![10]);
        assert_eq!(sc.preview_finished(), vec![SeekDirective::RequestPreview(500)]);
        assert_eq!(sc.preview_finished(), Vec::new());
    }

    #[test]
    fn test_drag_during_commit_defers_next_commit() {
        let mut sc = SeekCoordinator::new();
        sc.drag_start(0);
        let first = commits(&sc.drag_end(4000));

        // New gesture while the first commit is outstanding
        sc.drag_start(4000);
        assert_eq!(sc.state(), InteractionState::Scrubbing(4000));
        assert_eq!(sc.drag_move(6000), vec![SeekDirective::RequestPreview(6000)]);
        assert!(commits(&sc.drag_end(7000)).is_empty());
        assert_eq!(sc.state(), InteractionState::CommittingSeek(4000));
        assert_eq!(sc.effective_target(), Some(7000));

        let follow = sc.seek_done(first[0].1).unwrap();
        let second = commits(&follow);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].0, 7000);
        assert_ne!(second[0].1, first[0].1);
        assert_eq!(sc.state(), InteractionState::CommittingSeek(7000));
    }

    #[test]
    fn test_earlier_commit_resolves_mid_drag() {
        let mut sc = SeekCoordinator::new();
        sc.drag_start(0);
        let first = commits(&sc.drag_end(4000));
        sc.drag_start(4000);
        sc.drag_move(5000);

        // Nothing queued yet: completion issues no commit and the drag continues
        assert_eq!(sc.seek_done(first[0].1), Some(Vec::new()));
        assert_eq!(sc.state(), InteractionState::Scrubbing(5000));
        assert!(sc.blocks_playback_updates());

        let second = commits(&sc.drag_end(5000));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].0, 5000);
    }

    #[test]
    fn test_duplicate_and_stale() {
        let mut sc = SeekCoordinator::new();
        let first = commits(&sc.commit(500));
        assert!(sc.commit(500).is_empty());
        assert!(sc.commit(800).is_empty());
        assert!(sc.commit(800).is_empty());

        assert_eq!(sc.seek_done(999), None);
        let next = sc.seek_done(first[0].1).unwrap();
        assert_eq!(commits(&next).len(), 1);
        assert_eq!(commits(&next)[0].0, 800);
    }

    #[test]
    fn test_discard_previews() {
        let mut sc = SeekCoordinator::new();
        assert!(sc.discard_previews().is_empty());
        sc.drag_start(0);
        sc.drag_move(100);
        sc.drag_move(200);
        assert_eq!(sc.discard_previews(), vec![SeekDirective::CancelPreviews]);
        // Pending preview was dropped
        assert!(sc.preview_finished().is_empty());
        assert!(sc.is_dragging());
    }

    #[test]
    fn test_move_without_drag_ignored() {
        let mut sc = SeekCoordinator::new();
        assert!(sc.drag_move(100).is_empty());
        assert_eq!(sc.state(), InteractionState::Idle);
    }
}
