use crate::RemoteOperationError;
use crate::callbacks::ScreenRefreshCallback;
use crate::callbacks::ScreenUpdateMoveCallback;
use crate::callbacks::UserInfo;
use crate::config::Backend;
use crate::config::RemoteOperationConfig;
use crate::error::CoreGraphicsError;
use crate::geometry::Point;
use crate::options::CharCode;
use crate::options::EventFilterMask;
use crate::options::EventSuppressionState;
use crate::options::KeyCode;
use crate::options::ScreenUpdateOperation;
use crate::server::ScreenRefreshRects;
use crate::server::ScreenUpdate;
use crate::server::WindowServer;
use crate::server::simulated::SimulatedServer;
use crate::server_port::ServerPort;
use crate::suppression::interval_from_secs;
use crate::synthesis::MouseState;
use crate::synthesis::SyntheticEvent;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Client side of the remote operation API.
///
/// Wraps one window server connection and tracks the synthetic mouse state
/// needed to turn the legacy "post the whole mouse state" calls into discrete
/// events.
pub struct RemoteOperation {
    server: Arc<dyn WindowServer>,
    mouse: Mutex<Option<MouseState>>,
}

impl RemoteOperation {
    pub fn new(server: Arc<dyn WindowServer>) -> Self {
        tracing::debug!("using the {} window server", server.name());

        Self {
            server,
            mouse: Mutex::new(None),
        }
    }

    /// Connect to the configured backend and apply the configured settings.
    pub fn with_config(config: &RemoteOperationConfig) -> Result<Self, RemoteOperationError> {
        let server: Arc<dyn WindowServer> = match config.backend {
            Backend::Simulated => Arc::new(SimulatedServer::new()),
            #[cfg(target_os = "macos")]
            Backend::Quartz => Arc::new(crate::server::quartz::QuartzServer::new()?),
            #[cfg(not(target_os = "macos"))]
            Backend::Quartz => return Err(RemoteOperationError::BackendUnavailable(Backend::Quartz)),
        };

        config.apply(server.as_ref())?;

        Ok(Self::new(server))
    }

    /// Connect using the configuration file, or defaults when there is none.
    pub fn from_environment() -> Result<Self, RemoteOperationError> {
        Self::with_config(&RemoteOperationConfig::load()?)
    }

    pub fn server(&self) -> &dyn WindowServer {
        self.server.as_ref()
    }

    /// Register a callback for refreshed or modified areas of local displays.
    ///
    /// Callbacks only run while the application runs its event loop, on the
    /// thread running it.
    pub fn register_screen_refresh_callback(
        &self,
        callback: ScreenRefreshCallback,
        user_info: UserInfo,
    ) -> Result<(), CoreGraphicsError> {
        self.server
            .register_screen_refresh_callback(callback, user_info)
    }

    /// Both `callback` and `user_info` must match the registered entry.
    pub fn unregister_screen_refresh_callback(
        &self,
        callback: ScreenRefreshCallback,
        user_info: &UserInfo,
    ) {
        self.server
            .unregister_screen_refresh_callback(callback, user_info);
    }

    pub fn screen_register_move_callback(
        &self,
        callback: ScreenUpdateMoveCallback,
        user_info: UserInfo,
    ) -> Result<(), CoreGraphicsError> {
        self.server.register_screen_move_callback(callback, user_info)
    }

    pub fn screen_unregister_move_callback(
        &self,
        callback: ScreenUpdateMoveCallback,
        user_info: &UserInfo,
    ) {
        self.server.unregister_screen_move_callback(callback, user_info);
    }

    fn warn_if_callbacks_registered(&self) {
        if self.server.has_screen_callbacks() {
            tracing::warn!(
                "waiting for screen updates while screen callbacks are registered; updates may go to either"
            );
        }
    }

    /// Block until the server reports refreshed areas. Call this off the main
    /// event-processing thread.
    pub fn wait_for_screen_refresh_rects(
        &self,
    ) -> Result<ScreenRefreshRects<'_>, CoreGraphicsError> {
        self.warn_if_callbacks_registered();

        let raw = self.server.wait_for_screen_refresh_rects()?;
        Ok(ScreenRefreshRects::new(raw, self.server.as_ref()))
    }

    /// Block until the server reports an update of one of the `requested`
    /// kinds. Without [`ScreenUpdateOperation::MOVE`], moves come back as
    /// refreshes.
    pub fn wait_for_screen_update_rects(
        &self,
        requested: ScreenUpdateOperation,
    ) -> Result<ScreenUpdate<'_>, CoreGraphicsError> {
        self.warn_if_callbacks_registered();

        let raw = self.server.wait_for_screen_update_rects(requested)?;
        let delta = raw.operation.is_move().then_some(raw.delta);

        Ok(ScreenUpdate {
            operation: raw.operation,
            rects: ScreenRefreshRects::new(raw.rects, self.server.as_ref()),
            delta,
        })
    }

    /// Give a rectangle list back to the server. Dropping it does the same.
    pub fn release_screen_refresh_rects(&self, rects: ScreenRefreshRects<'_>) {
        rects.release();
    }

    pub fn cursor_is_visible(&self) -> bool {
        self.server.cursor_is_visible()
    }

    /// True if the cursor is drawn into frame buffer memory on any display, in
    /// which case it is read back along with window contents.
    pub fn cursor_is_drawn_in_framebuffer(&self) -> bool {
        self.server.cursor_is_drawn_in_framebuffer()
    }

    /// Move the cursor in global display coordinates without generating events.
    #[tracing::instrument(skip(self))]
    pub fn warp_mouse_cursor_position(&self, position: Point) -> Result<(), CoreGraphicsError> {
        self.server.warp_mouse_cursor_position(position)?;

        if let Some(mouse) = self.mouse.lock().as_mut() {
            mouse.position = position;
        }

        Ok(())
    }

    /// Disconnecting leaves events at a fixed location carrying only deltas.
    pub fn associate_mouse_and_mouse_cursor_position(
        &self,
        connected: bool,
    ) -> Result<(), CoreGraphicsError> {
        tracing::debug!(
            "{} mouse and cursor",
            if connected { "associating" } else { "disassociating" }
        );

        self.server.associate_mouse_and_mouse_cursor_position(connected)
    }

    /// A port that dies with the window server, or `None` while no server runs.
    pub fn window_server_create_server_port(&self) -> Option<ServerPort> {
        self.server.create_server_port()
    }

    #[deprecated(note = "use window_server_create_server_port")]
    pub fn window_server_cf_mach_port(&self) -> Option<ServerPort> {
        self.window_server_create_server_port()
    }

    /// Post one synthetic event into the event stream.
    pub fn post_event(&self, event: &SyntheticEvent) -> Result<(), CoreGraphicsError> {
        self.server.post_event(event)?;

        if event.is_mouse() {
            let mut mouse = self.mouse.lock();
            let state = mouse.get_or_insert_with(MouseState::default);
            state.apply(event);
        }

        Ok(())
    }

    /// Post the full mouse state. `buttons` holds one entry per button, primary
    /// first, up to 32; events are generated for whatever changed since the
    /// last call.
    #[deprecated(note = "build events with MouseState::transition_to and use post_event")]
    pub fn post_mouse_event(
        &self,
        position: Point,
        update_mouse_cursor_position: bool,
        buttons: &[bool],
    ) -> Result<(), CoreGraphicsError> {
        let mut mouse = self.mouse.lock();
        let current = match *mouse {
            Some(state) => state,
            None => MouseState::new(self.server.cursor_position()?),
        };

        let (_, events) = current.transition_to(position, buttons)?;
        let restore_to = if update_mouse_cursor_position {
            None
        } else {
            Some(self.server.cursor_position()?)
        };

        let mut state = current;
        let mut result = Ok(());
        for event in &events {
            result = self.server.post_event(event);
            if result.is_err() {
                break;
            }

            state.apply(event);
        }

        // whatever got through is now the synthetic mouse state
        *mouse = Some(state);
        result?;

        if let Some(position) = restore_to
            && !events.is_empty()
        {
            self.server.warp_mouse_cursor_position(position)?;
        }

        Ok(())
    }

    /// Post scroll wheel movement for 1 to 3 wheels, primary first. Values are
    /// small signed line counts, typically -10 to +10.
    #[deprecated(note = "use post_event with SyntheticEvent::scroll_wheel")]
    pub fn post_scroll_wheel_event(&self, wheels: &[i32]) -> Result<(), CoreGraphicsError> {
        self.post_event(&SyntheticEvent::scroll_wheel(wheels)?)
    }

    #[deprecated(note = "use post_event with SyntheticEvent::keyboard")]
    pub fn post_keyboard_event(
        &self,
        char_code: CharCode,
        key_code: KeyCode,
        key_down: bool,
    ) -> Result<(), CoreGraphicsError> {
        self.post_event(&SyntheticEvent::keyboard(char_code, key_code, key_down))
    }

    #[deprecated(note = "configure event_state_combining through RemoteOperationConfig")]
    pub fn enable_event_state_combining(&self, combine_state: bool) -> Result<(), CoreGraphicsError> {
        self.server.set_event_state_combining(combine_state)
    }

    #[deprecated(note = "use set_local_events_filter_during_suppression_state")]
    pub fn inhibit_local_events(&self, inhibit: bool) -> Result<(), CoreGraphicsError> {
        self.server.set_local_events_inhibited(inhibit)
    }

    pub fn set_local_events_filter_during_suppression_state(
        &self,
        filter: EventFilterMask,
        state: EventSuppressionState,
    ) -> Result<(), CoreGraphicsError> {
        self.server
            .set_local_events_filter_during_suppression_state(filter, state)
    }

    #[deprecated(note = "use set_local_events_filter_during_suppression_state")]
    pub fn set_local_events_filter_during_supression_state(
        &self,
        filter: EventFilterMask,
        state: EventSuppressionState,
    ) -> Result<(), CoreGraphicsError> {
        self.set_local_events_filter_during_suppression_state(filter, state)
    }

    pub fn local_events_filter_during_suppression_state(
        &self,
        state: EventSuppressionState,
    ) -> EventFilterMask {
        self.server.local_events_filter_during_suppression_state(state)
    }

    pub fn set_local_events_suppression_interval(
        &self,
        interval: Duration,
    ) -> Result<(), CoreGraphicsError> {
        self.server.set_local_events_suppression_interval(interval)
    }

    /// Same as [`RemoteOperation::set_local_events_suppression_interval`] but in
    /// seconds; negative or non-finite values are rejected.
    pub fn set_local_events_suppression_interval_secs(
        &self,
        seconds: f64,
    ) -> Result<(), CoreGraphicsError> {
        self.set_local_events_suppression_interval(interval_from_secs(seconds)?)
    }

    pub fn local_events_suppression_interval(&self) -> Duration {
        self.server.local_events_suppression_interval()
    }
}

#[cfg(test)]
#[allow(deprecated)]
mod tests {
    use super::*;
    use crate::geometry::MoveDelta;
    use crate::geometry::Rect;
    use crate::options::LocalEventClass;
    use crate::synthesis::MouseButton;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;

    fn simulated() -> (Arc<SimulatedServer>, RemoteOperation) {
        let server = Arc::new(SimulatedServer::new());
        let remote = RemoteOperation::new(server.clone());
        (server, remote)
    }

    fn record_refresh(rects: &[Rect], user_info: &UserInfo) {
        if let Some(seen) = user_info.downcast_ref::<Mutex<Vec<Rect>>>() {
            seen.lock().extend_from_slice(rects);
        }
    }

    fn record_move(delta: MoveDelta, _: &[Rect], user_info: &UserInfo) {
        if let Some(seen) = user_info.downcast_ref::<Mutex<Vec<MoveDelta>>>() {
            seen.lock().push(delta);
        }
    }

    #[test]
    fn test_refresh_callbacks_run_only_when_the_loop_is_pumped() {
        let (server, remote) = simulated();
        let seen = Arc::new(Mutex::new(Vec::<Rect>::new()));
        let context = UserInfo::from_arc(seen.clone());

        remote
            .register_screen_refresh_callback(record_refresh, context.clone())
            .unwrap();
        server.report_refresh(vec![Rect::new(0.0, 0.0, 10.0, 10.0)]);

        assert!(seen.lock().is_empty());
        assert_eq!(server.run_event_loop_once(), 1);
        assert_eq!(*seen.lock(), vec![Rect::new(0.0, 0.0, 10.0, 10.0)]);

        remote.unregister_screen_refresh_callback(record_refresh, &context);
        server.report_refresh(vec![Rect::new(1.0, 1.0, 1.0, 1.0)]);
        assert_eq!(server.run_event_loop_once(), 0);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_mismatched_context_keeps_registration() {
        let (server, remote) = simulated();
        let seen = Arc::new(Mutex::new(Vec::<Rect>::new()));
        let context = UserInfo::from_arc(seen.clone());

        remote
            .register_screen_refresh_callback(record_refresh, context)
            .unwrap();
        remote.unregister_screen_refresh_callback(record_refresh, &UserInfo::none());
        remote.unregister_screen_refresh_callback(
            record_refresh,
            &UserInfo::new(Mutex::new(Vec::<Rect>::new())),
        );

        assert!(server.has_screen_callbacks());
        server.report_refresh(vec![Rect::new(0.0, 0.0, 2.0, 2.0)]);
        server.run_event_loop_once();
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_move_callback_preserves_sign() {
        let (server, remote) = simulated();
        let seen = Arc::new(Mutex::new(Vec::<MoveDelta>::new()));

        remote
            .screen_register_move_callback(record_move, UserInfo::from_arc(seen.clone()))
            .unwrap();
        server.report_move(MoveDelta::new(15, -3), vec![Rect::new(0.0, 0.0, 5.0, 5.0)]);
        server.run_event_loop_once();

        let deltas = seen.lock();
        assert_eq!(*deltas, vec![MoveDelta::new(15, -3)]);
        assert!(deltas[0].is_rightward());
        assert!(deltas[0].is_upward());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_wait_with_callbacks_registered_warns_and_returns_change() {
        let (server, remote) = simulated();
        let seen = Arc::new(Mutex::new(Vec::<Rect>::new()));
        let logs = CapturedLogs::default();

        remote
            .register_screen_refresh_callback(record_refresh, UserInfo::from_arc(seen.clone()))
            .unwrap();
        server.report_refresh(vec![Rect::new(7.0, 7.0, 1.0, 1.0)]);

        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let rects = remote.wait_for_screen_refresh_rects().unwrap();
            assert_eq!(&*rects, &[Rect::new(7.0, 7.0, 1.0, 1.0)]);
        });

        assert!(server.has_screen_callbacks());
        assert_eq!(server.run_event_loop_once(), 0);
        assert!(seen.lock().is_empty());

        let output = String::from_utf8_lossy(&logs.0.lock()).to_string();
        assert!(output.contains("WARN"));
        assert!(output.contains("while screen callbacks are registered"));
    }

    #[test]
    fn test_every_wait_is_released_exactly_once() {
        let (server, remote) = simulated();
        server.report_refresh(vec![Rect::new(0.0, 0.0, 1.0, 1.0)]);
        server.report_refresh(vec![Rect::new(2.0, 2.0, 1.0, 1.0)]);

        {
            let rects = remote.wait_for_screen_refresh_rects().unwrap();
            assert_eq!(&*rects, &[Rect::new(0.0, 0.0, 1.0, 1.0)]);
            assert_eq!(server.outstanding_rect_lists(), 1);
        }
        assert_eq!(server.outstanding_rect_lists(), 0);

        let rects = remote.wait_for_screen_refresh_rects().unwrap();
        assert_eq!(rects.len(), 1);
        remote.release_screen_refresh_rects(rects);
        assert_eq!(server.outstanding_rect_lists(), 0);
    }

    #[test]
    fn test_wait_for_update_reports_moves() {
        let (server, remote) = simulated();
        server.report_move(MoveDelta::new(0, 10), vec![Rect::new(0.0, 0.0, 4.0, 4.0)]);
        server.report_refresh(vec![Rect::new(9.0, 9.0, 1.0, 1.0)]);

        let requested = ScreenUpdateOperation::REFRESH | ScreenUpdateOperation::MOVE;
        let update = remote.wait_for_screen_update_rects(requested).unwrap();
        assert_eq!(update.operation, ScreenUpdateOperation::MOVE);
        assert_eq!(update.delta, Some(MoveDelta::new(0, 10)));
        assert_eq!(&*update.rects, &[Rect::new(0.0, 0.0, 4.0, 4.0)]);
        drop(update);

        let update = remote.wait_for_screen_update_rects(requested).unwrap();
        assert_eq!(update.operation, ScreenUpdateOperation::REFRESH);
        assert_eq!(update.delta, None);
        drop(update);

        assert_eq!(server.outstanding_rect_lists(), 0);
    }

    #[test]
    fn test_wait_blocks_until_a_change_arrives() {
        let (server, remote) = simulated();

        std::thread::scope(|scope| {
            let waiter = scope.spawn(|| {
                let rects = remote.wait_for_screen_refresh_rects().unwrap();
                rects.to_vec()
            });

            std::thread::sleep(Duration::from_millis(50));
            server.report_refresh(vec![Rect::new(3.0, 3.0, 3.0, 3.0)]);

            assert_eq!(waiter.join().unwrap(), vec![Rect::new(3.0, 3.0, 3.0, 3.0)]);
        });

        assert_eq!(server.outstanding_rect_lists(), 0);
    }

    #[test]
    fn test_wait_fails_when_the_server_exits() {
        let (server, remote) = simulated();

        std::thread::scope(|scope| {
            let waiter = scope.spawn(|| remote.wait_for_screen_refresh_rects().map(|r| r.len()));

            std::thread::sleep(Duration::from_millis(50));
            server.terminate();

            assert_eq!(
                waiter.join().unwrap(),
                Err(CoreGraphicsError::InvalidConnection)
            );
        });
    }

    #[test]
    fn test_server_port_dies_with_the_server() {
        let (server, remote) = simulated();
        let port = remote.window_server_create_server_port().unwrap();
        let died = Arc::new(AtomicBool::new(false));

        let flag = died.clone();
        port.on_invalidation(move || flag.store(true, Ordering::SeqCst));

        server.terminate();
        assert!(!port.is_valid());
        assert!(died.load(Ordering::SeqCst));
        assert!(remote.window_server_cf_mach_port().is_none());

        server.restart();
        assert!(!port.is_valid());
        assert!(remote.window_server_create_server_port().unwrap().is_valid());
    }

    #[test]
    fn test_warp_generates_no_events() {
        let (server, remote) = simulated();
        remote
            .warp_mouse_cursor_position(Point::new(100.0, 200.0))
            .unwrap();

        assert_eq!(server.cursor().position, Point::new(100.0, 200.0));
        assert!(server.posted_events().is_empty());
    }

    #[test]
    fn test_associate_and_cursor_queries() {
        let (server, remote) = simulated();
        remote.associate_mouse_and_mouse_cursor_position(false).unwrap();
        assert!(!server.cursor().associated);

        server.set_cursor_visible(false);
        server.set_cursor_drawn_in_framebuffer(true);
        assert!(!remote.cursor_is_visible());
        assert!(remote.cursor_is_drawn_in_framebuffer());
    }

    #[test]
    fn test_post_mouse_event_without_moving_the_cursor() {
        let (server, remote) = simulated();
        remote.warp_mouse_cursor_position(Point::new(1.0, 1.0)).unwrap();

        remote
            .post_mouse_event(Point::new(50.0, 50.0), false, &[true])
            .unwrap();
        remote
            .post_mouse_event(Point::new(50.0, 50.0), false, &[false])
            .unwrap();

        assert_eq!(
            server.posted_events(),
            vec![
                SyntheticEvent::MouseMoved {
                    position: Point::new(50.0, 50.0)
                },
                SyntheticEvent::MouseDown {
                    position: Point::new(50.0, 50.0),
                    button: MouseButton::PRIMARY,
                },
                SyntheticEvent::MouseUp {
                    position: Point::new(50.0, 50.0),
                    button: MouseButton::PRIMARY,
                },
            ]
        );
        assert_eq!(server.cursor().position, Point::new(1.0, 1.0));
    }

    #[test]
    fn test_post_mouse_event_drag() {
        let (server, remote) = simulated();

        remote.post_mouse_event(Point::new(0.0, 0.0), true, &[true]).unwrap();
        remote
            .post_mouse_event(Point::new(30.0, 0.0), true, &[true])
            .unwrap();

        assert_eq!(
            server.posted_events().last(),
            Some(&SyntheticEvent::MouseDragged {
                position: Point::new(30.0, 0.0),
                button: MouseButton::PRIMARY,
            })
        );
        assert_eq!(server.cursor().position, Point::new(30.0, 0.0));
        assert!(!server.local_event_permitted(LocalEventClass::Mouse));
    }

    #[test]
    fn test_post_mouse_event_rejects_bad_button_counts() {
        let (server, remote) = simulated();

        assert_eq!(
            remote.post_mouse_event(Point::default(), true, &[]),
            Err(CoreGraphicsError::IllegalArgument)
        );
        assert_eq!(
            remote.post_mouse_event(Point::default(), true, &[false; 33]),
            Err(CoreGraphicsError::IllegalArgument)
        );
        assert!(server.posted_events().is_empty());
    }

    #[test]
    fn test_scroll_and_keyboard_events() {
        let (server, remote) = simulated();

        remote.post_scroll_wheel_event(&[-2]).unwrap();
        remote.post_keyboard_event(u16::from(b'a'), 0, true).unwrap();
        assert_eq!(
            remote.post_scroll_wheel_event(&[1, 1, 1, 1]),
            Err(CoreGraphicsError::IllegalArgument)
        );

        assert_eq!(
            server.posted_events(),
            vec![
                SyntheticEvent::ScrollWheel { wheels: vec![-2] },
                SyntheticEvent::keyboard(u16::from(b'a'), 0, true),
            ]
        );
    }

    #[test]
    fn test_suppression_settings() {
        let (server, remote) = simulated();

        remote
            .set_local_events_filter_during_supression_state(
                EventFilterMask::PERMIT_ALL_EVENTS,
                EventSuppressionState::RemoteMouseDrag,
            )
            .unwrap();
        assert_eq!(
            remote.local_events_filter_during_suppression_state(
                EventSuppressionState::RemoteMouseDrag
            ),
            EventFilterMask::PERMIT_ALL_EVENTS
        );

        remote.set_local_events_suppression_interval_secs(0.0).unwrap();
        assert_eq!(remote.local_events_suppression_interval(), Duration::ZERO);
        assert_eq!(
            remote.set_local_events_suppression_interval_secs(-0.5),
            Err(CoreGraphicsError::IllegalArgument)
        );
        assert_eq!(
            remote.set_local_events_suppression_interval_secs(1e30),
            Err(CoreGraphicsError::IllegalArgument)
        );
        assert_eq!(remote.local_events_suppression_interval(), Duration::ZERO);

        remote.inhibit_local_events(true).unwrap();
        assert!(!server.local_event_permitted(LocalEventClass::Keyboard));
        remote.inhibit_local_events(false).unwrap();
        assert!(server.local_event_permitted(LocalEventClass::Keyboard));

        remote.enable_event_state_combining(false).unwrap();
        assert!(!server.event_state_combining());
    }

    #[test]
    fn test_with_config_simulated() {
        let config = RemoteOperationConfig {
            backend: Backend::Simulated,
            suppression_interval: 1.0,
            ..Default::default()
        };

        let remote = RemoteOperation::with_config(&config).unwrap();
        assert_eq!(remote.server().name(), "simulated");
        assert_eq!(
            remote.local_events_suppression_interval(),
            Duration::from_secs(1)
        );
    }
}
