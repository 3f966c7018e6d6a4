//! Bookkeeping for media time that has scrolled out of a live playlist.

use tracing::trace;

use crate::playlist::MediaPlaylist;

/// Used for a missing segment when the playlist has no target duration.
const DEFAULT_TARGET_DURATION: f64 = 10.0;

/// Tracks the cumulative duration that has left the live window since
/// tracking began.
///
/// Sequence numbers are only comparable between refreshes of one rendition,
/// so nothing is tracked across a rendition switch or before tracking is
/// enabled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveWindow {
    tracking: bool,
    expired: f64,
}

impl LiveWindow {
    pub fn new() -> LiveWindow {
        LiveWindow::default()
    }

    pub fn enable(&mut self) {
        self.tracking = true;
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn expired_seconds(&self) -> f64 {
        self.expired
    }

    /// Accounts for the step from `previous` (the playlist that was active
    /// before the update) to `current` (the accepted update).
    pub fn update(&mut self, previous: Option<&MediaPlaylist>, current: &MediaPlaylist) {
        if !self.tracking {
            return;
        }
        let previous = match previous {
            Some(previous) if previous.uri == current.uri => previous,
            _ => return,
        };

        if let Some(first) = current.segments.first() {
            if let Some(start) = first.start {
                self.expired = start;
                return;
            }
            if let Some(end) = first.end {
                self.expired = end - first.duration;
                return;
            }
        }

        let dropped = match current.media_sequence.checked_sub(previous.media_sequence) {
            Some(dropped) if dropped > 0 => dropped,
            _ => return,
        };
        let retained = previous.segments.len() as u64;

        // Everything past the old snapshot's end is a gap in retained history.
        if dropped > retained {
            let missing = dropped - retained;
            self.expired +=
                missing as f64 * previous.target_duration_or(DEFAULT_TARGET_DURATION);
        }

        let walk_from = dropped.min(retained) as usize;
        for segment in previous.segments[..walk_from].iter().rev() {
            if let Some(end) = segment.end {
                self.expired = end;
                return;
            }
            if let Some(start) = segment.start {
                self.expired = start + segment.duration;
                return;
            }
            self.expired += segment.duration;
        }
        trace!(
            uri = %current.uri,
            expired = self.expired,
            "expired time estimated from segment durations"
        );
    }
}
