use crate::error::CoreGraphicsError;
use crate::options::EventFilterMask;
use crate::options::EventSuppressionState;
use crate::options::LocalEventClass;
use crate::options::MOUSE_DOWN_EVENT_MASKING_DEAD_SWITCH_TIMEOUT;
use crate::options::NUMBER_OF_EVENT_SUPPRESSION_STATES;
use crate::synthesis::MouseButton;
use crate::synthesis::SyntheticEvent;
use std::time::Duration;
use std::time::Instant;

pub const DEFAULT_SUPPRESSION_INTERVAL: Duration = Duration::from_millis(250);

pub const DEFAULT_SUPPRESSION_FILTER: EventFilterMask = EventFilterMask::PERMIT_LOCAL_KEYBOARD_EVENTS
    .union(EventFilterMask::PERMIT_SYSTEM_DEFINED_EVENTS);

/// Accepts a suppression interval in seconds, the unit the window server uses.
pub fn interval_from_secs(seconds: f64) -> Result<Duration, CoreGraphicsError> {
    if !seconds.is_finite() || seconds < 0.0 {
        tracing::warn!("rejecting suppression interval of {seconds} seconds");
        return Err(CoreGraphicsError::IllegalArgument);
    }

    Duration::try_from_secs_f64(seconds).map_err(|_| {
        tracing::warn!("suppression interval of {seconds} seconds is out of range");
        CoreGraphicsError::IllegalArgument
    })
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct RemoteDrag {
    last_drag: Instant,
    warned: bool,
}

/// Event filtering that follows the posting of synthetic events.
///
/// Posting anything opens a suppression interval. Posting a primary button
/// down additionally enters the remote mouse drag state, which lasts until the
/// matching button up. While any state is in force, a local event is delivered
/// only if the filter of every active state permits its class.
#[derive(Debug, Clone)]
pub struct SuppressionTracker {
    filters: [EventFilterMask; NUMBER_OF_EVENT_SUPPRESSION_STATES],
    interval: Duration,
    inhibited: bool,
    combining: bool,
    last_posted: Option<Instant>,
    remote_drag: Option<RemoteDrag>,
}

impl Default for SuppressionTracker {
    fn default() -> Self {
        Self {
            filters: [DEFAULT_SUPPRESSION_FILTER; NUMBER_OF_EVENT_SUPPRESSION_STATES],
            interval: DEFAULT_SUPPRESSION_INTERVAL,
            inhibited: false,
            combining: true,
            last_posted: None,
            remote_drag: None,
        }
    }
}

impl SuppressionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn filter(&self, state: EventSuppressionState) -> EventFilterMask {
        self.filters[state.index()]
    }

    pub fn set_filter(&mut self, state: EventSuppressionState, filter: EventFilterMask) {
        tracing::debug!("setting {state} filter to {filter:?}");
        self.filters[state.index()] = filter;
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    pub fn set_interval(&mut self, interval: Duration) {
        tracing::debug!("setting suppression interval to {interval:?}");
        self.interval = interval;
    }

    pub const fn inhibited(&self) -> bool {
        self.inhibited
    }

    pub fn set_inhibited(&mut self, inhibited: bool) {
        self.inhibited = inhibited;
    }

    pub const fn combining(&self) -> bool {
        self.combining
    }

    pub fn set_combining(&mut self, combining: bool) {
        self.combining = combining;
    }

    pub fn record_posted(&mut self, event: &SyntheticEvent, now: Instant) {
        self.last_posted = Some(now);

        match event {
            SyntheticEvent::MouseDown { button, .. } if *button == MouseButton::PRIMARY => {
                self.remote_drag = Some(RemoteDrag {
                    last_drag: now,
                    warned: false,
                });
            }
            SyntheticEvent::MouseDragged { button, .. } if *button == MouseButton::PRIMARY => {
                if let Some(drag) = &mut self.remote_drag {
                    drag.last_drag = now;
                    drag.warned = false;
                }
            }
            SyntheticEvent::MouseUp { button, .. } if *button == MouseButton::PRIMARY => {
                self.remote_drag = None;
            }
            _ => {}
        }
    }

    pub fn is_active(&self, state: EventSuppressionState, now: Instant) -> bool {
        match state {
            EventSuppressionState::SuppressionInterval => self
                .last_posted
                .is_some_and(|posted| now.saturating_duration_since(posted) < self.interval),
            EventSuppressionState::RemoteMouseDrag => self.remote_drag.is_some(),
        }
    }

    pub fn active_states(&self, now: Instant) -> Vec<EventSuppressionState> {
        [
            EventSuppressionState::SuppressionInterval,
            EventSuppressionState::RemoteMouseDrag,
        ]
        .into_iter()
        .filter(|state| self.is_active(*state, now))
        .collect()
    }

    /// Whether a local hardware event of `class` reaches the event stream.
    pub fn permits_local(&self, class: LocalEventClass, now: Instant) -> bool {
        if self.inhibited {
            return false;
        }

        self.active_states(now)
            .into_iter()
            .all(|state| self.filter(state).permits(class))
    }

    /// Logs once when a remote drag has gone quiet for longer than the dead
    /// switch timeout. Returns true when the warning fired.
    pub fn check_dead_switch(&mut self, now: Instant) -> bool {
        let Some(drag) = &mut self.remote_drag else {
            return false;
        };

        let idle = now.saturating_duration_since(drag.last_drag);
        if drag.warned || idle < MOUSE_DOWN_EVENT_MASKING_DEAD_SWITCH_TIMEOUT {
            return false;
        }

        tracing::warn!(
            "no remote mouse drag for {idle:?} while hardware mouse moves are suppressed; the local mouse will appear dead until the button is released"
        );
        drag.warned = true;

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn mouse_down() -> SyntheticEvent {
        SyntheticEvent::MouseDown {
            position: Point::default(),
            button: MouseButton::PRIMARY,
        }
    }

    fn mouse_up() -> SyntheticEvent {
        SyntheticEvent::MouseUp {
            position: Point::default(),
            button: MouseButton::PRIMARY,
        }
    }

    #[test]
    fn test_nothing_is_suppressed_before_posting() {
        let tracker = SuppressionTracker::new();
        assert!(tracker.active_states(Instant::now()).is_empty());
        assert!(tracker.permits_local(LocalEventClass::Mouse, Instant::now()));
    }

    #[test]
    fn test_interval_expires() {
        let mut tracker = SuppressionTracker::new();
        let start = Instant::now();
        tracker.record_posted(&SyntheticEvent::keyboard(0, 0, true), start);

        assert!(!tracker.permits_local(LocalEventClass::Mouse, start));
        assert!(tracker.permits_local(LocalEventClass::Keyboard, start));

        let later = start + DEFAULT_SUPPRESSION_INTERVAL;
        assert!(tracker.permits_local(LocalEventClass::Mouse, later));
    }

    #[test]
    fn test_remote_drag_lasts_until_mouse_up() {
        let mut tracker = SuppressionTracker::new();
        tracker.set_filter(
            EventSuppressionState::SuppressionInterval,
            EventFilterMask::PERMIT_ALL_EVENTS,
        );

        let start = Instant::now();
        tracker.record_posted(&mouse_down(), start);

        let later = start + Duration::from_secs(5);
        assert_eq!(
            tracker.active_states(later),
            vec![EventSuppressionState::RemoteMouseDrag]
        );
        assert!(!tracker.permits_local(LocalEventClass::Mouse, later));

        tracker.record_posted(&mouse_up(), later);
        let after = later + Duration::from_secs(1);
        assert!(tracker.permits_local(LocalEventClass::Mouse, after));
    }

    #[test]
    fn test_inhibit_blocks_everything() {
        let mut tracker = SuppressionTracker::new();
        tracker.set_inhibited(true);

        assert!(!tracker.permits_local(LocalEventClass::Keyboard, Instant::now()));
        assert!(!tracker.permits_local(LocalEventClass::SystemDefined, Instant::now()));
    }

    #[test]
    fn test_dead_switch_warns_once() {
        let mut tracker = SuppressionTracker::new();
        let start = Instant::now();
        tracker.record_posted(&mouse_down(), start);

        assert!(!tracker.check_dead_switch(start + Duration::from_secs(59)));
        assert!(tracker.check_dead_switch(start + MOUSE_DOWN_EVENT_MASKING_DEAD_SWITCH_TIMEOUT));
        assert!(!tracker.check_dead_switch(start + Duration::from_secs(120)));

        // a fresh drag re-arms it
        let dragged = start + Duration::from_secs(121);
        tracker.record_posted(
            &SyntheticEvent::MouseDragged {
                position: Point::new(1.0, 1.0),
                button: MouseButton::PRIMARY,
            },
            dragged,
        );
        assert!(tracker.check_dead_switch(dragged + Duration::from_secs(60)));
    }

    #[test]
    fn test_interval_from_secs() {
        assert_eq!(interval_from_secs(0.5), Ok(Duration::from_millis(500)));
        assert_eq!(interval_from_secs(0.0), Ok(Duration::ZERO));
        assert!(interval_from_secs(-1.0).is_err());
        assert!(interval_from_secs(f64::NAN).is_err());
        assert!(interval_from_secs(f64::INFINITY).is_err());
    }

    #[test]
    fn test_interval_from_secs_out_of_range() {
        assert_eq!(
            interval_from_secs(1e30),
            Err(CoreGraphicsError::IllegalArgument)
        );
        assert_eq!(
            interval_from_secs(f64::MAX),
            Err(CoreGraphicsError::IllegalArgument)
        );
    }
}
