use crate::callbacks::CallbackRegistry;
use crate::callbacks::ScreenRefreshCallback;
use crate::callbacks::ScreenUpdateMoveCallback;
use crate::callbacks::UserInfo;
use crate::error::CoreGraphicsError;
use crate::geometry::MoveDelta;
use crate::geometry::Point;
use crate::geometry::Rect;
use crate::geometry::coalesce;
use crate::options::EventFilterMask;
use crate::options::EventSuppressionState;
use crate::options::LocalEventClass;
use crate::options::ScreenUpdateOperation;
use crate::server::RawRects;
use crate::server::RawScreenUpdate;
use crate::server::WindowServer;
use crate::server_port::LocalPort;
use crate::server_port::ServerPort;
use crate::suppression::SuppressionTracker;
use crate::synthesis::SyntheticEvent;
use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use parking_lot::Condvar;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

/// Changes kept for waiters before the oldest are dropped.
const MAX_PENDING_CHANGES: usize = 256;
/// Changes queued for callbacks between event loop passes.
const MAX_QUEUED_DELIVERIES: usize = 50;

/// Identifies a reported change so that exactly one consumer takes it.
type ChangeId = u64;

/// A change on screen as the server observed it.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenChange {
    Refresh(Vec<Rect>),
    /// `rects` describe the area before the move.
    Move { delta: MoveDelta, rects: Vec<Rect> },
}

impl ScreenChange {
    /// Shape the change the way a waiter asked for it.
    pub fn for_request(
        &self,
        requested: ScreenUpdateOperation,
    ) -> (ScreenUpdateOperation, Vec<Rect>, MoveDelta) {
        let (operation, rects, delta) = match self {
            Self::Refresh(rects) => (
                ScreenUpdateOperation::REFRESH,
                rects.clone(),
                MoveDelta::default(),
            ),
            Self::Move { delta, rects } if requested.is_move() => {
                (ScreenUpdateOperation::MOVE, rects.clone(), *delta)
            }
            Self::Move { delta, rects } => {
                // as a refresh, both the vacated and the newly covered area changed
                let mut refreshed = rects.clone();
                refreshed.extend(rects.iter().map(|rect| rect.offset_by(*delta)));
                (ScreenUpdateOperation::REFRESH, refreshed, MoveDelta::default())
            }
        };

        if requested.contains(ScreenUpdateOperation::REDUCED_DIRTY_RECTANGLE_COUNT) {
            (operation, coalesce(&rects), delta)
        } else {
            (operation, rects, delta)
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CursorState {
    pub position: Point,
    pub visible: bool,
    pub drawn_in_framebuffer: bool,
    pub associated: bool,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            position: Point::default(),
            visible: true,
            drawn_in_framebuffer: false,
            associated: true,
        }
    }
}

struct SimulatedState {
    running: bool,
    pending: VecDeque<(ChangeId, ScreenChange)>,
    next_change: ChangeId,
    outstanding: HashSet<usize>,
    cursor: CursorState,
    posted: Vec<SyntheticEvent>,
    suppression: SuppressionTracker,
    ports: Vec<Arc<LocalPort>>,
}

impl Default for SimulatedState {
    fn default() -> Self {
        Self {
            running: true,
            pending: VecDeque::new(),
            next_change: 0,
            outstanding: HashSet::new(),
            cursor: CursorState::default(),
            posted: Vec::new(),
            suppression: SuppressionTracker::default(),
            ports: Vec::new(),
        }
    }
}

impl SimulatedState {
    fn ensure_running(&self) -> Result<(), CoreGraphicsError> {
        if self.running {
            Ok(())
        } else {
            Err(CoreGraphicsError::InvalidConnection)
        }
    }

    /// Removes a change from the pending queue, returning false if it is gone.
    fn claim(&mut self, id: ChangeId) -> bool {
        match self.pending.iter().position(|(pending, _)| *pending == id) {
            Some(idx) => {
                self.pending.remove(idx);
                true
            }
            None => false,
        }
    }

    fn allocate(&mut self, rects: Vec<Rect>) -> RawRects {
        if rects.is_empty() {
            return RawRects::empty();
        }

        let len = rects.len();
        let ptr = Box::into_raw(rects.into_boxed_slice()).cast::<Rect>();
        self.outstanding.insert(ptr as usize);

        RawRects { ptr, len }
    }
}

/// An in-process window server.
///
/// Screen changes are fed in with [`SimulatedServer::report_refresh`] and
/// [`SimulatedServer::report_move`]. Waiters pick them up directly; registered
/// callbacks only see them when [`SimulatedServer::run_event_loop_once`] is
/// pumped, which stands in for the application's event loop. Each change goes
/// to whichever consumer takes it first, never to both.
pub struct SimulatedServer {
    state: Mutex<SimulatedState>,
    change_available: Condvar,
    refresh_callbacks: CallbackRegistry<ScreenRefreshCallback>,
    move_callbacks: CallbackRegistry<ScreenUpdateMoveCallback>,
    deliveries: (Sender<(ChangeId, ScreenChange)>, Receiver<(ChangeId, ScreenChange)>),
}

impl Default for SimulatedServer {
    fn default() -> Self {
        Self {
            state: Mutex::new(SimulatedState::default()),
            change_available: Condvar::new(),
            refresh_callbacks: CallbackRegistry::new(),
            move_callbacks: CallbackRegistry::new(),
            deliveries: crossbeam_channel::bounded(MAX_QUEUED_DELIVERIES),
        }
    }
}

impl SimulatedServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_refresh(&self, rects: Vec<Rect>) {
        self.report(ScreenChange::Refresh(rects));
    }

    pub fn report_move(&self, delta: MoveDelta, rects: Vec<Rect>) {
        self.report(ScreenChange::Move { delta, rects });
    }

    pub fn report(&self, change: ScreenChange) {
        let mut state = self.state.lock();
        if !state.running {
            tracing::debug!("ignoring screen change while the server is down");
            return;
        }

        let id = state.next_change;
        state.next_change += 1;

        if self.has_screen_callbacks()
            && self.deliveries.0.try_send((id, change.clone())).is_err()
        {
            tracing::warn!("channel is full; dropping notification")
        }

        if state.pending.len() == MAX_PENDING_CHANGES {
            tracing::warn!("nobody is waiting for screen updates; dropping the oldest change");
            state.pending.pop_front();
        }

        state.pending.push_back((id, change));
        self.change_available.notify_all();
    }

    /// Deliver queued changes to registered callbacks on the calling thread.
    /// Returns how many changes were delivered.
    pub fn run_event_loop_once(&self) -> usize {
        self.state.lock().suppression.check_dead_switch(Instant::now());

        let mut delivered = 0;
        while let Ok((id, change)) = self.deliveries.1.try_recv() {
            // a waiter may have taken the change first
            if !self.state.lock().claim(id) {
                continue;
            }

            match &change {
                ScreenChange::Refresh(rects) => {
                    self.refresh_callbacks.dispatch(rects);
                }
                ScreenChange::Move { delta, rects } => {
                    // refresh callbacks still hear about moves, as a refresh
                    if !self.move_callbacks.is_empty() {
                        self.move_callbacks.dispatch(*delta, rects);
                    }

                    if !self.refresh_callbacks.is_empty() {
                        let (_, refreshed, _) = change.for_request(ScreenUpdateOperation::REFRESH);
                        self.refresh_callbacks.dispatch(&refreshed);
                    }
                }
            }

            delivered += 1;
        }

        delivered
    }

    /// Number of rectangle lists handed out and not yet released.
    pub fn outstanding_rect_lists(&self) -> usize {
        self.state.lock().outstanding.len()
    }

    pub fn pending_changes(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn posted_events(&self) -> Vec<SyntheticEvent> {
        self.state.lock().posted.clone()
    }

    pub fn cursor(&self) -> CursorState {
        self.state.lock().cursor
    }

    pub fn set_cursor_visible(&self, visible: bool) {
        self.state.lock().cursor.visible = visible;
    }

    pub fn set_cursor_drawn_in_framebuffer(&self, drawn: bool) {
        self.state.lock().cursor.drawn_in_framebuffer = drawn;
    }

    /// Whether a local hardware event of `class` would be delivered right now.
    pub fn local_event_permitted(&self, class: LocalEventClass) -> bool {
        self.local_event_permitted_at(class, Instant::now())
    }

    pub fn local_event_permitted_at(&self, class: LocalEventClass, now: Instant) -> bool {
        self.state.lock().suppression.permits_local(class, now)
    }

    pub fn event_state_combining(&self) -> bool {
        self.state.lock().suppression.combining()
    }

    pub fn local_events_inhibited(&self) -> bool {
        self.state.lock().suppression.inhibited()
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Take the server down: waiters fail, ports die, requests error out.
    pub fn terminate(&self) {
        let ports = {
            let mut state = self.state.lock();
            if !state.running {
                return;
            }

            tracing::info!("simulated window server terminating");
            state.running = false;
            state.pending.clear();
            self.change_available.notify_all();
            std::mem::take(&mut state.ports)
        };

        for port in ports {
            port.invalidate();
        }
    }

    /// Bring the server back. Ports from before the restart stay invalid.
    pub fn restart(&self) {
        let mut state = self.state.lock();
        if !state.running {
            tracing::info!("simulated window server restarting");
            state.running = true;
        }
    }
}

impl WindowServer for SimulatedServer {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn register_screen_refresh_callback(
        &self,
        callback: ScreenRefreshCallback,
        user_info: UserInfo,
    ) -> Result<(), CoreGraphicsError> {
        self.state.lock().ensure_running()?;
        self.refresh_callbacks.register(callback, user_info);
        Ok(())
    }

    fn unregister_screen_refresh_callback(
        &self,
        callback: ScreenRefreshCallback,
        user_info: &UserInfo,
    ) {
        if !self.refresh_callbacks.unregister(callback, user_info) {
            tracing::debug!("no refresh callback registered with {user_info:?}");
        }
    }

    fn register_screen_move_callback(
        &self,
        callback: ScreenUpdateMoveCallback,
        user_info: UserInfo,
    ) -> Result<(), CoreGraphicsError> {
        self.state.lock().ensure_running()?;
        self.move_callbacks.register(callback, user_info);
        Ok(())
    }

    fn unregister_screen_move_callback(
        &self,
        callback: ScreenUpdateMoveCallback,
        user_info: &UserInfo,
    ) {
        if !self.move_callbacks.unregister(callback, user_info) {
            tracing::debug!("no move callback registered with {user_info:?}");
        }
    }

    fn has_screen_callbacks(&self) -> bool {
        !self.refresh_callbacks.is_empty() || !self.move_callbacks.is_empty()
    }

    fn wait_for_screen_refresh_rects(&self) -> Result<RawRects, CoreGraphicsError> {
        self.wait_for_screen_update_rects(ScreenUpdateOperation::REFRESH)
            .map(|update| update.rects)
    }

    fn wait_for_screen_update_rects(
        &self,
        requested: ScreenUpdateOperation,
    ) -> Result<RawScreenUpdate, CoreGraphicsError> {
        let mut state = self.state.lock();

        loop {
            state.ensure_running()?;

            if let Some((_, change)) = state.pending.pop_front() {
                let (operation, rects, delta) = change.for_request(requested);
                let rects = state.allocate(rects);

                return Ok(RawScreenUpdate {
                    operation,
                    rects,
                    delta,
                });
            }

            self.change_available.wait(&mut state);
        }
    }

    fn release_screen_refresh_rects(&self, rects: RawRects) {
        if rects.is_empty() {
            return;
        }

        let mut state = self.state.lock();
        if !state.outstanding.remove(&(rects.ptr as usize)) {
            tracing::error!("ignoring release of a rect list this server does not own");
            return;
        }

        // the pointer came from Box::into_raw on a boxed slice of this length
        drop(unsafe {
            Box::from_raw(std::ptr::slice_from_raw_parts_mut(rects.ptr, rects.len))
        });
    }

    fn cursor_is_visible(&self) -> bool {
        self.state.lock().cursor.visible
    }

    fn cursor_is_drawn_in_framebuffer(&self) -> bool {
        self.state.lock().cursor.drawn_in_framebuffer
    }

    fn cursor_position(&self) -> Result<Point, CoreGraphicsError> {
        let state = self.state.lock();
        state.ensure_running()?;
        Ok(state.cursor.position)
    }

    fn warp_mouse_cursor_position(&self, position: Point) -> Result<(), CoreGraphicsError> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        state.cursor.position = position;
        Ok(())
    }

    fn associate_mouse_and_mouse_cursor_position(
        &self,
        connected: bool,
    ) -> Result<(), CoreGraphicsError> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        state.cursor.associated = connected;
        Ok(())
    }

    fn create_server_port(&self) -> Option<ServerPort> {
        let mut state = self.state.lock();
        if !state.running {
            return None;
        }

        // ports the client already dropped need no invalidation
        state.ports.retain(|port| Arc::strong_count(port) > 1);

        let port = LocalPort::new();
        state.ports.push(port.clone());

        Some(ServerPort::new(Box::new(port)))
    }

    fn post_event(&self, event: &SyntheticEvent) -> Result<(), CoreGraphicsError> {
        let mut state = self.state.lock();
        state.ensure_running()?;

        if let Some(position) = event.position() {
            state.cursor.position = position;
        }

        state.suppression.record_posted(event, Instant::now());
        state.posted.push(event.clone());

        Ok(())
    }

    fn set_event_state_combining(&self, combine: bool) -> Result<(), CoreGraphicsError> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        state.suppression.set_combining(combine);
        Ok(())
    }

    fn set_local_events_inhibited(&self, inhibit: bool) -> Result<(), CoreGraphicsError> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        state.suppression.set_inhibited(inhibit);
        Ok(())
    }

    fn set_local_events_filter_during_suppression_state(
        &self,
        filter: EventFilterMask,
        suppression_state: EventSuppressionState,
    ) -> Result<(), CoreGraphicsError> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        state.suppression.set_filter(suppression_state, filter);
        Ok(())
    }

    fn local_events_filter_during_suppression_state(
        &self,
        state: EventSuppressionState,
    ) -> EventFilterMask {
        self.state.lock().suppression.filter(state)
    }

    fn set_local_events_suppression_interval(
        &self,
        interval: Duration,
    ) -> Result<(), CoreGraphicsError> {
        let mut state = self.state.lock();
        state.ensure_running()?;
        state.suppression.set_interval(interval);
        Ok(())
    }

    fn local_events_suppression_interval(&self) -> Duration {
        self.state.lock().suppression.interval()
    }
}

impl Drop for SimulatedServer {
    fn drop(&mut self) {
        let outstanding = self.state.get_mut().outstanding.len();
        if outstanding > 0 {
            tracing::warn!("{outstanding} rect list(s) were never released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_as_refresh_covers_both_areas() {
        let change = ScreenChange::Move {
            delta: MoveDelta::new(10, 0),
            rects: vec![Rect::new(0.0, 0.0, 10.0, 10.0)],
        };

        let (operation, rects, delta) = change.for_request(ScreenUpdateOperation::REFRESH);
        assert_eq!(operation, ScreenUpdateOperation::REFRESH);
        assert!(delta.is_zero());
        assert_eq!(
            rects,
            vec![
                Rect::new(0.0, 0.0, 10.0, 10.0),
                Rect::new(10.0, 0.0, 10.0, 10.0)
            ]
        );

        let (_, reduced, _) = change.for_request(
            ScreenUpdateOperation::REFRESH | ScreenUpdateOperation::REDUCED_DIRTY_RECTANGLE_COUNT,
        );
        assert_eq!(reduced, vec![Rect::new(0.0, 0.0, 20.0, 10.0)]);
    }

    #[test]
    fn test_move_requested_keeps_delta() {
        let change = ScreenChange::Move {
            delta: MoveDelta::new(-4, 7),
            rects: vec![Rect::new(0.0, 0.0, 10.0, 10.0)],
        };

        let (operation, rects, delta) =
            change.for_request(ScreenUpdateOperation::REFRESH | ScreenUpdateOperation::MOVE);
        assert_eq!(operation, ScreenUpdateOperation::MOVE);
        assert_eq!(delta, MoveDelta::new(-4, 7));
        assert_eq!(rects, vec![Rect::new(0.0, 0.0, 10.0, 10.0)]);
    }

    #[test]
    fn test_wait_allocates_and_release_frees() {
        let server = SimulatedServer::new();
        server.report_refresh(vec![Rect::new(0.0, 0.0, 1.0, 1.0)]);

        let raw = server.wait_for_screen_refresh_rects().unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(server.outstanding_rect_lists(), 1);

        server.release_screen_refresh_rects(raw);
        assert_eq!(server.outstanding_rect_lists(), 0);
    }

    #[test]
    fn test_foreign_release_is_ignored() {
        let server = SimulatedServer::new();
        let mut rect = Rect::default();

        server.release_screen_refresh_rects(RawRects {
            ptr: &mut rect,
            len: 1,
        });
        assert_eq!(server.outstanding_rect_lists(), 0);
    }

    #[test]
    fn test_requests_fail_while_down() {
        let server = SimulatedServer::new();
        server.terminate();

        assert_eq!(
            server.warp_mouse_cursor_position(Point::new(1.0, 1.0)),
            Err(CoreGraphicsError::InvalidConnection)
        );
        assert!(server.create_server_port().is_none());
        assert!(server.wait_for_screen_refresh_rects().is_err());

        server.restart();
        assert!(server.warp_mouse_cursor_position(Point::new(1.0, 1.0)).is_ok());
    }

    #[test]
    fn test_changes_without_callbacks_are_not_queued_for_delivery() {
        let server = SimulatedServer::new();
        server.report_refresh(vec![Rect::new(0.0, 0.0, 1.0, 1.0)]);

        assert_eq!(server.run_event_loop_once(), 0);
        assert_eq!(server.pending_changes(), 1);
    }

    fn count_refresh(rects: &[Rect], user_info: &UserInfo) {
        if let Some(seen) = user_info.downcast_ref::<Mutex<usize>>() {
            *seen.lock() += rects.len();
        }
    }

    #[test]
    fn test_changes_delivered_to_callbacks_are_not_replayed_to_waiters() {
        let server = SimulatedServer::new();
        let seen = Arc::new(Mutex::new(0_usize));
        let context = UserInfo::from_arc(seen.clone());

        server
            .register_screen_refresh_callback(count_refresh, context.clone())
            .unwrap();

        for x in 0..300 {
            server.report_refresh(vec![Rect::new(f64::from(x), 0.0, 1.0, 1.0)]);
            assert_eq!(server.run_event_loop_once(), 1);
        }

        assert_eq!(*seen.lock(), 300);
        assert_eq!(server.pending_changes(), 0);

        server.unregister_screen_refresh_callback(count_refresh, &context);
        server.report_refresh(vec![Rect::new(500.0, 0.0, 1.0, 1.0)]);

        let raw = server.wait_for_screen_refresh_rects().unwrap();
        let rects = crate::server::ScreenRefreshRects::new(raw, &server);
        assert_eq!(&*rects, &[Rect::new(500.0, 0.0, 1.0, 1.0)]);
    }

    #[test]
    fn test_changes_taken_by_a_waiter_skip_callbacks() {
        let server = SimulatedServer::new();
        let seen = Arc::new(Mutex::new(0_usize));

        server
            .register_screen_refresh_callback(count_refresh, UserInfo::from_arc(seen.clone()))
            .unwrap();
        server.report_refresh(vec![Rect::new(0.0, 0.0, 1.0, 1.0)]);

        let raw = server.wait_for_screen_refresh_rects().unwrap();
        server.release_screen_refresh_rects(raw);

        assert_eq!(server.run_event_loop_once(), 0);
        assert_eq!(*seen.lock(), 0);
    }
}
