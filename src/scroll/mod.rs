//! Deferred scroll requests for the view layer.
//!
//! The view has to finish rendering before a scroll can be measured, so
//! requests are parked here and handed out by [`ScrollIntentScheduler::poll`]
//! once their debounce delay has passed. Only one request may be parked.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::ScrollConfig;
use crate::message::LineId;

mod viewport;

pub use viewport::{preserved_scroll_top, ViewportMetrics};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrollIntent {
    ScrollTo { message_id: LineId, forced: bool },
    PreserveAfterPrepend,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScrollError {
    #[error("a scroll intent is already pending ({pending:?}), cancel it before scheduling another")]
    AlreadyPending { pending: ScrollIntent },
}

#[derive(Debug)]
pub struct ScrollIntentScheduler {
    debounce: Duration,
    min_margin: f64,
    viewport_ratio: f64,
    pending: Option<PendingIntent>,
}

#[derive(Debug)]
struct PendingIntent {
    intent: ScrollIntent,
    due_at: Instant,
}

impl ScrollIntentScheduler {
    pub fn new(config: &ScrollConfig) -> Self {
        Self {
            debounce: config.debounce_duration(),
            min_margin: config.safety_margin_min_px,
            viewport_ratio: config.safety_margin_viewport_ratio,
            pending: None,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&ScrollIntent> {
        self.pending.as_ref().map(|pending| &pending.intent)
    }

    /// Schedules a scroll towards `message_id`. Non-immediate requests fail
    /// while another intent is parked; immediate ones replace it.
    pub fn request_scroll_to(
        &mut self,
        message_id: impl Into<LineId>,
        immediate: bool,
        forced: bool,
    ) -> Result<(), ScrollError> {
        self.request(
            ScrollIntent::ScrollTo {
                message_id: message_id.into(),
                forced,
            },
            immediate,
            Instant::now(),
        )
    }

    pub fn request_preserve_after_prepend(&mut self, immediate: bool) -> Result<(), ScrollError> {
        self.request(ScrollIntent::PreserveAfterPrepend, immediate, Instant::now())
    }

    /// Replaces whatever is parked with `intent`, returning the replaced one.
    pub fn supersede(&mut self, intent: ScrollIntent, immediate: bool) -> Option<ScrollIntent> {
        let previous = self.cancel();
        self.park(intent, immediate, Instant::now());
        previous
    }

    /// Drops the parked intent, if any. Calling this with nothing parked is
    /// a no-op.
    pub fn cancel(&mut self) -> Option<ScrollIntent> {
        self.pending.take().map(|pending| pending.intent)
    }

    pub fn poll(&mut self) -> Option<ScrollIntent> {
        self.poll_at(Instant::now())
    }

    pub fn poll_at(&mut self, now: Instant) -> Option<ScrollIntent> {
        let due = self
            .pending
            .as_ref()
            .map(|pending| pending.due_at <= now)
            .unwrap_or(false);
        if !due {
            return None;
        }
        self.cancel()
    }

    /// Distance from the bottom edge within which the user still counts as
    /// following the live edge of the feed.
    pub fn safety_margin(&self, viewport_height: f64) -> f64 {
        self.min_margin.max(viewport_height * self.viewport_ratio)
    }

    /// Whether `intent` should actually move the viewport. Forced scrolls
    /// always apply; others are dropped when the user scrolled away from the
    /// live edge.
    pub fn should_apply(&self, intent: &ScrollIntent, metrics: &ViewportMetrics) -> bool {
        match intent {
            ScrollIntent::ScrollTo { forced: true, .. } => true,
            ScrollIntent::ScrollTo { forced: false, .. } => {
                metrics.distance_from_bottom() <= self.safety_margin(metrics.client_height)
            }
            ScrollIntent::PreserveAfterPrepend => true,
        }
    }

    fn request(
        &mut self,
        intent: ScrollIntent,
        immediate: bool,
        now: Instant,
    ) -> Result<(), ScrollError> {
        if !immediate {
            if let Some(pending) = &self.pending {
                return Err(ScrollError::AlreadyPending {
                    pending: pending.intent.clone(),
                });
            }
        }
        self.park(intent, immediate, now);
        Ok(())
    }

    fn park(&mut self, intent: ScrollIntent, immediate: bool, now: Instant) {
        let due_at = if immediate { now } else { now + self.debounce };
        tracing::trace!(?intent, immediate, "scroll intent scheduled");
        self.pending = Some(PendingIntent { intent, due_at });
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn scheduler(debounce_ms: u64) -> ScrollIntentScheduler {
        ScrollIntentScheduler::new(&ScrollConfig {
            debounce_ms,
            ..ScrollConfig::default()
        })
    }

    #[test]
    fn second_debounced_request_fails_loudly() {
        let mut scroll = scheduler(50);
        scroll.request_scroll_to("m1", false, false).expect("first");
        assert_matches!(
            scroll.request_preserve_after_prepend(false),
            Err(ScrollError::AlreadyPending {
                pending: ScrollIntent::ScrollTo { .. }
            })
        );
        assert_eq!(
            scroll.pending(),
            Some(&ScrollIntent::ScrollTo {
                message_id: "m1".into(),
                forced: false
            })
        );
    }

    #[test]
    fn immediate_request_replaces_pending_and_is_due_at_once() {
        let mut scroll = scheduler(50);
        scroll.request_scroll_to("m1", false, false).expect("debounced");
        scroll.request_scroll_to("m2", true, true).expect("immediate");
        assert_eq!(
            scroll.poll_at(Instant::now()),
            Some(ScrollIntent::ScrollTo {
                message_id: "m2".into(),
                forced: true
            })
        );
        assert!(!scroll.is_pending());
    }

    #[test]
    fn debounced_intent_waits_for_its_delay() {
        let mut scroll = scheduler(50);
        let start = Instant::now();
        scroll.request_preserve_after_prepend(false).expect("schedule");
        assert_eq!(scroll.poll_at(start), None);
        assert_eq!(
            scroll.poll_at(start + Duration::from_millis(60)),
            Some(ScrollIntent::PreserveAfterPrepend)
        );
        assert_eq!(scroll.poll_at(start + Duration::from_millis(120)), None);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut scroll = scheduler(0);
        assert_eq!(scroll.cancel(), None);
        scroll.request_preserve_after_prepend(false).expect("schedule");
        assert_eq!(scroll.cancel(), Some(ScrollIntent::PreserveAfterPrepend));
        assert_eq!(scroll.cancel(), None);
        scroll
            .request_scroll_to("m1", false, false)
            .expect("slot is free again");
    }

    #[test]
    fn forced_scroll_bypasses_live_edge_heuristic() {
        let scroll = scheduler(0);
        let far_away = ViewportMetrics {
            scroll_top: 0.0,
            scroll_height: 5_000.0,
            client_height: 500.0,
        };
        let near_edge = ViewportMetrics {
            scroll_top: 4_320.0,
            ..far_away
        };
        let relaxed = ScrollIntent::ScrollTo {
            message_id: "m1".into(),
            forced: false,
        };
        let forced = ScrollIntent::ScrollTo {
            message_id: "m1".into(),
            forced: true,
        };
        assert!(!scroll.should_apply(&relaxed, &far_away));
        assert!(scroll.should_apply(&forced, &far_away));
        assert!(scroll.should_apply(&relaxed, &near_edge));
    }

    #[test]
    fn safety_margin_has_a_pixel_floor() {
        let scroll = scheduler(0);
        assert_eq!(scroll.safety_margin(100.0), 80.0);
        assert_eq!(scroll.safety_margin(1_000.0), 400.0);
    }
}
