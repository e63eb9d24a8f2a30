//! Window Controller
//!
//! Decides, per incoming event, whether it is buffered, dropped, or ends the
//! run. The decision depends only on the event's own time compared against
//! the fixed `CollectionWindow`, never on local receipt time, because the
//! stream may deliver late or out of order.

mod schedule;

pub use schedule::WindowSchedule;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::types::{CollectionWindow, RawEvent};

/// Outcome of evaluating one event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Append to the buffer
    Accept,
    /// Drop silently
    Ignore,
    /// End the stream read loop cleanly
    Stop,
}

/// Where a time falls relative to the saving interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPhase {
    BeforeWindow,
    Saving,
    AfterWindow,
}

/// Time-gated accept/ignore/stop policy for one run
#[derive(Debug, Clone)]
pub struct WindowController {
    window: CollectionWindow,
}

impl WindowController {
    pub fn new(window: CollectionWindow) -> Self {
        Self { window }
    }

    pub fn window(&self) -> &CollectionWindow {
        &self.window
    }

    pub fn phase(&self, time: NaiveDateTime) -> WindowPhase {
        if time < self.window.start_saving() {
            WindowPhase::BeforeWindow
        } else if time < self.window.end_saving() {
            WindowPhase::Saving
        } else {
            WindowPhase::AfterWindow
        }
    }

    /// Decide on a bare event time
    ///
    /// `[start_saving, end_saving)` accepts, `>= end_execution` stops, and
    /// everything else (before the window, or in the grace period) is ignored.
    pub fn decide_time(&self, event_time: NaiveDateTime) -> Decision {
        if event_time >= self.window.end_execution() {
            Decision::Stop
        } else if self.window.is_saving(event_time) {
            Decision::Accept
        } else {
            Decision::Ignore
        }
    }

    /// Decide on a parsed event
    ///
    /// Events without the marker field or without a parseable time are
    /// ignored whatever their time, so they can neither be buffered nor end
    /// the run. An event that would be accepted but has no identity key is
    /// ignored as well, since it could never be deduplicated.
    pub fn decide(&self, event: &RawEvent) -> Decision {
        if !event.has_marker {
            return Decision::Ignore;
        }
        let Some(event_time) = event.event_time else {
            return Decision::Ignore;
        };

        match self.decide_time(event_time) {
            Decision::Accept if event.identity_key.is_none() => Decision::Ignore,
            decision => decision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn controller() -> WindowController {
        let window = CollectionWindow::new(at(10, 0, 0), at(10, 1, 0), at(10, 1, 30)).unwrap();
        WindowController::new(window)
    }

    fn event(time: Option<NaiveDateTime>, key: Option<&str>, marker: bool) -> RawEvent {
        RawEvent {
            identity_key: key.map(str::to_string),
            event_time: time,
            has_marker: marker,
            serialized_form: "{}".to_string(),
        }
    }

    #[test]
    fn test_window_boundaries() {
        let c = controller();

        assert_eq!(c.decide_time(at(9, 59, 59)), Decision::Ignore);
        assert_eq!(c.decide_time(at(10, 0, 0)), Decision::Accept);
        assert_eq!(c.decide_time(at(10, 0, 59)), Decision::Accept);
        assert_eq!(c.decide_time(at(10, 1, 0)), Decision::Ignore);
        assert_eq!(c.decide_time(at(10, 1, 29)), Decision::Ignore);
        assert_eq!(c.decide_time(at(10, 1, 30)), Decision::Stop);
        assert_eq!(c.decide_time(at(23, 0, 0)), Decision::Stop);
    }

    #[test]
    fn test_phases() {
        let c = controller();
        assert_eq!(c.phase(at(9, 0, 0)), WindowPhase::BeforeWindow);
        assert_eq!(c.phase(at(10, 0, 0)), WindowPhase::Saving);
        assert_eq!(c.phase(at(10, 1, 0)), WindowPhase::AfterWindow);
    }

    #[test]
    fn test_marker_gates_every_decision() {
        let c = controller();

        assert_eq!(c.decide(&event(Some(at(10, 0, 10)), Some("1"), true)), Decision::Accept);
        assert_eq!(c.decide(&event(Some(at(10, 0, 10)), Some("1"), false)), Decision::Ignore);
        // An unmarked event past the end does not stop the run
        assert_eq!(c.decide(&event(Some(at(11, 0, 0)), Some("1"), false)), Decision::Ignore);
        assert_eq!(c.decide(&event(Some(at(11, 0, 0)), Some("1"), true)), Decision::Stop);
    }

    #[test]
    fn test_missing_attributes_are_ignored() {
        let c = controller();

        assert_eq!(c.decide(&event(None, Some("1"), true)), Decision::Ignore);
        assert_eq!(c.decide(&event(Some(at(10, 0, 10)), None, true)), Decision::Ignore);
        // Without a key the event still ends the run
        assert_eq!(c.decide(&event(Some(at(10, 1, 30)), None, true)), Decision::Stop);
    }

    #[test]
    fn test_degenerate_window_never_accepts() {
        let window = CollectionWindow::new(at(10, 0, 0), at(10, 0, 0), at(10, 0, 0)).unwrap();
        let c = WindowController::new(window);

        assert_eq!(c.decide_time(at(9, 59, 59)), Decision::Ignore);
        assert_eq!(c.decide_time(at(10, 0, 0)), Decision::Stop);
    }
}
