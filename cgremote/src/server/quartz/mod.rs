use crate::callbacks::CallbackRegistry;
use crate::callbacks::ScreenRefreshCallback;
use crate::callbacks::ScreenUpdateMoveCallback;
use crate::callbacks::UserInfo;
use crate::error::CoreGraphicsError;
use crate::geometry::MoveDelta;
use crate::geometry::Point;
use crate::geometry::Rect;
use crate::options::EventFilterMask;
use crate::options::EventSuppressionState;
use crate::options::NUMBER_OF_EVENT_SUPPRESSION_STATES;
use crate::options::ScreenUpdateOperation;
use crate::server::RawRects;
use crate::server::RawScreenUpdate;
use crate::server::WindowServer;
use crate::server_port::InvalidationCallback;
use crate::server_port::ServerPort;
use crate::server_port::ServerPortHandle;
use crate::synthesis::MouseButton;
use crate::synthesis::SyntheticEvent;
use ffi::*;
use lazy_static::lazy_static;
use objc2_core_foundation::CFMachPort;
use objc2_core_foundation::CFRetained;
use objc2_core_foundation::CGPoint;
use objc2_core_foundation::CGRect;
use objc2_core_graphics::CGEvent;
use objc2_core_graphics::CGEventSource;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ffi::c_void;
use std::ops::Deref;
use std::ptr::NonNull;
use std::time::Duration;

pub mod ffi;

lazy_static! {
    static ref REFRESH_CALLBACKS: CallbackRegistry<ScreenRefreshCallback> = CallbackRegistry::new();
    static ref MOVE_CALLBACKS: CallbackRegistry<ScreenUpdateMoveCallback> = CallbackRegistry::new();
    static ref REGISTRATION: Mutex<()> = Mutex::new(());
    static ref PORT_INVALIDATION_CALLBACKS: Mutex<HashMap<usize, Vec<InvalidationCallback>>> =
        Mutex::new(HashMap::new());
}

unsafe extern "C-unwind" fn refresh_callback(
    count: u32,
    rects: *const CGRect,
    _user_info: *mut c_void,
) {
    let rects = unsafe { rects_from_raw(rects, count as usize) };
    tracing::trace!("screen refresh: {} rect(s)", rects.len());
    REFRESH_CALLBACKS.dispatch(rects);
}

unsafe extern "C-unwind" fn move_callback(
    delta: MoveDelta,
    count: usize,
    rects: *const CGRect,
    _user_info: *mut c_void,
) {
    let rects = unsafe { rects_from_raw(rects, count) };
    tracing::trace!("screen move by {delta:?}: {} rect(s)", rects.len());
    MOVE_CALLBACKS.dispatch(delta, rects);
}

unsafe extern "C-unwind" fn port_invalidated(port: *mut CFMachPort, _info: *mut c_void) {
    let callbacks = PORT_INVALIDATION_CALLBACKS.lock().remove(&(port as usize));
    tracing::info!("window server port invalidated");

    for callback in callbacks.into_iter().flatten() {
        callback();
    }
}

/// `Rect` shares `CGRect`'s layout, so server-owned arrays are viewed in place.
unsafe fn rects_from_raw<'a>(rects: *const CGRect, count: usize) -> &'a [Rect] {
    if rects.is_null() || count == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(rects.cast::<Rect>(), count) }
    }
}

#[derive(Debug)]
pub struct EventSourceRef(pub CFRetained<CGEventSource>);
unsafe impl Sync for EventSourceRef {}
unsafe impl Send for EventSourceRef {}
impl Deref for EventSourceRef {
    type Target = CGEventSource;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl EventSourceRef {
    fn create(state_id: CGEventSourceStateID) -> Result<Self, CoreGraphicsError> {
        let source = unsafe { CGEventSourceCreate(state_id) };
        NonNull::new(source)
            .map(|source| Self(unsafe { CFRetained::from_raw(source) }))
            .ok_or(CoreGraphicsError::CannotComplete)
    }

    fn as_ptr(&self) -> *const CGEventSource {
        let source: &CGEventSource = self;
        source
    }
}

#[derive(Debug)]
struct QuartzSource {
    source: EventSourceRef,
    combining: bool,
    /// Filters to restore once local events stop being inhibited.
    inhibited_filters: Option<[EventFilterMask; NUMBER_OF_EVENT_SUPPRESSION_STATES]>,
}

impl QuartzSource {
    fn filter(&self, state: EventSuppressionState) -> EventFilterMask {
        EventFilterMask::from_bits_truncate(unsafe {
            CGEventSourceGetLocalEventsFilterDuringSuppressionState(
                self.source.as_ptr(),
                state as u32,
            )
        })
    }

    fn set_filter(&self, state: EventSuppressionState, filter: EventFilterMask) {
        unsafe {
            CGEventSourceSetLocalEventsFilterDuringSuppressionState(
                self.source.as_ptr(),
                filter.bits(),
                state as u32,
            )
        }
    }

    fn filters(&self) -> [EventFilterMask; NUMBER_OF_EVENT_SUPPRESSION_STATES] {
        [
            self.filter(EventSuppressionState::SuppressionInterval),
            self.filter(EventSuppressionState::RemoteMouseDrag),
        ]
    }

    fn set_filters(&self, filters: [EventFilterMask; NUMBER_OF_EVENT_SUPPRESSION_STATES]) {
        self.set_filter(EventSuppressionState::SuppressionInterval, filters[0]);
        self.set_filter(EventSuppressionState::RemoteMouseDrag, filters[1]);
    }

    fn interval(&self) -> f64 {
        unsafe { CGEventSourceGetLocalEventsSuppressionInterval(self.source.as_ptr()) }
    }

    fn set_interval(&self, seconds: f64) {
        unsafe { CGEventSourceSetLocalEventsSuppressionInterval(self.source.as_ptr(), seconds) }
    }
}

/// The real window server, reached through CoreGraphics.
///
/// Synthetic events are posted from one event source owned by this value; the
/// suppression settings apply to that source.
pub struct QuartzServer {
    source: Mutex<QuartzSource>,
}

impl QuartzServer {
    pub fn new() -> Result<Self, CoreGraphicsError> {
        let source = EventSourceRef::create(kCGEventSourceStateCombinedSessionState)?;

        Ok(Self {
            source: Mutex::new(QuartzSource {
                source,
                combining: true,
                inhibited_filters: None,
            }),
        })
    }

    fn mouse_event(
        source: &EventSourceRef,
        event_type: CGEventType,
        position: Point,
        button: MouseButton,
    ) -> Option<CFRetained<CGEvent>> {
        let event = unsafe {
            CGEventCreateMouseEvent(
                source.as_ptr(),
                event_type,
                CGPoint::from(position),
                button.0,
            )
        };

        NonNull::new(event).map(|event| unsafe { CFRetained::from_raw(event) })
    }

    fn build_event(
        source: &EventSourceRef,
        event: &SyntheticEvent,
    ) -> Option<CFRetained<CGEvent>> {
        match event {
            SyntheticEvent::MouseMoved { position } => {
                Self::mouse_event(source, kCGEventMouseMoved, *position, MouseButton::PRIMARY)
            }
            SyntheticEvent::MouseDragged { position, button } => {
                let event_type = match *button {
                    MouseButton::PRIMARY => kCGEventLeftMouseDragged,
                    MouseButton::SECONDARY => kCGEventRightMouseDragged,
                    _ => kCGEventOtherMouseDragged,
                };
                Self::mouse_event(source, event_type, *position, *button)
            }
            SyntheticEvent::MouseDown { position, button } => {
                let event_type = match *button {
                    MouseButton::PRIMARY => kCGEventLeftMouseDown,
                    MouseButton::SECONDARY => kCGEventRightMouseDown,
                    _ => kCGEventOtherMouseDown,
                };
                Self::mouse_event(source, event_type, *position, *button)
            }
            SyntheticEvent::MouseUp { position, button } => {
                let event_type = match *button {
                    MouseButton::PRIMARY => kCGEventLeftMouseUp,
                    MouseButton::SECONDARY => kCGEventRightMouseUp,
                    _ => kCGEventOtherMouseUp,
                };
                Self::mouse_event(source, event_type, *position, *button)
            }
            SyntheticEvent::ScrollWheel { wheels } => {
                let wheel = |idx: usize| wheels.get(idx).copied().unwrap_or_default();
                let event = unsafe {
                    CGEventCreateScrollWheelEvent2(
                        source.as_ptr(),
                        kCGScrollEventUnitLine,
                        wheels.len() as u32,
                        wheel(0),
                        wheel(1),
                        wheel(2),
                    )
                };

                NonNull::new(event).map(|event| unsafe { CFRetained::from_raw(event) })
            }
            SyntheticEvent::Keyboard {
                char_code,
                key_code,
                key_down,
            } => {
                let event =
                    unsafe { CGEventCreateKeyboardEvent(source.as_ptr(), *key_code, *key_down) };
                let event = NonNull::new(event).map(|event| unsafe { CFRetained::from_raw(event) })?;

                if *char_code != 0 {
                    let chars = [*char_code];
                    let raw: &CGEvent = &event;
                    unsafe { CGEventKeyboardSetUnicodeString(raw, 1, chars.as_ptr()) };
                }

                Some(event)
            }
        }
    }
}

impl WindowServer for QuartzServer {
    fn name(&self) -> &'static str {
        "quartz"
    }

    fn register_screen_refresh_callback(
        &self,
        callback: ScreenRefreshCallback,
        user_info: UserInfo,
    ) -> Result<(), CoreGraphicsError> {
        let _guard = REGISTRATION.lock();

        if REFRESH_CALLBACKS.register(callback, user_info.clone()) {
            tracing::info!("registering screen refresh callback");

            let result = CoreGraphicsError::check(
                unsafe {
                    CGRegisterScreenRefreshCallback(Some(refresh_callback), std::ptr::null_mut())
                }
                .0,
            );

            if let Err(error) = result {
                REFRESH_CALLBACKS.unregister(callback, &user_info);
                return Err(error);
            }
        }

        Ok(())
    }

    fn unregister_screen_refresh_callback(
        &self,
        callback: ScreenRefreshCallback,
        user_info: &UserInfo,
    ) {
        let _guard = REGISTRATION.lock();

        if REFRESH_CALLBACKS.unregister(callback, user_info) && REFRESH_CALLBACKS.is_empty() {
            tracing::info!("removing screen refresh callback");
            unsafe {
                CGUnregisterScreenRefreshCallback(Some(refresh_callback), std::ptr::null_mut())
            }
        }
    }

    fn register_screen_move_callback(
        &self,
        callback: ScreenUpdateMoveCallback,
        user_info: UserInfo,
    ) -> Result<(), CoreGraphicsError> {
        let _guard = REGISTRATION.lock();

        if MOVE_CALLBACKS.register(callback, user_info.clone()) {
            tracing::info!("registering screen move callback");

            let result = CoreGraphicsError::check(
                unsafe { CGScreenRegisterMoveCallback(Some(move_callback), std::ptr::null_mut()) }
                    .0,
            );

            if let Err(error) = result {
                MOVE_CALLBACKS.unregister(callback, &user_info);
                return Err(error);
            }
        }

        Ok(())
    }

    fn unregister_screen_move_callback(
        &self,
        callback: ScreenUpdateMoveCallback,
        user_info: &UserInfo,
    ) {
        let _guard = REGISTRATION.lock();

        if MOVE_CALLBACKS.unregister(callback, user_info) && MOVE_CALLBACKS.is_empty() {
            tracing::info!("removing screen move callback");
            unsafe { CGScreenUnregisterMoveCallback(Some(move_callback), std::ptr::null_mut()) }
        }
    }

    fn has_screen_callbacks(&self) -> bool {
        !REFRESH_CALLBACKS.is_empty() || !MOVE_CALLBACKS.is_empty()
    }

    fn wait_for_screen_refresh_rects(&self) -> Result<RawRects, CoreGraphicsError> {
        let mut rects: *mut CGRect = std::ptr::null_mut();
        let mut count: u32 = 0;

        match CoreGraphicsError::from(unsafe { CGWaitForScreenRefreshRects(&mut rects, &mut count) })
        {
            CoreGraphicsError::Success => Ok(RawRects {
                ptr: rects.cast::<Rect>(),
                len: count as usize,
            }),
            error => Err(error),
        }
    }

    fn wait_for_screen_update_rects(
        &self,
        requested: ScreenUpdateOperation,
    ) -> Result<RawScreenUpdate, CoreGraphicsError> {
        let mut current: u32 = 0;
        let mut rects: *mut CGRect = std::ptr::null_mut();
        let mut count: usize = 0;
        let mut delta = MoveDelta::default();

        match CoreGraphicsError::from(unsafe {
            CGWaitForScreenUpdateRects(
                requested.bits(),
                &mut current,
                &mut rects,
                &mut count,
                &mut delta,
            )
        }) {
            CoreGraphicsError::Success => Ok(RawScreenUpdate {
                operation: ScreenUpdateOperation::from_bits_retain(current),
                rects: RawRects {
                    ptr: rects.cast::<Rect>(),
                    len: count,
                },
                delta,
            }),
            error => Err(error),
        }
    }

    fn release_screen_refresh_rects(&self, rects: RawRects) {
        if !rects.ptr.is_null() {
            unsafe { CGReleaseScreenRefreshRects(rects.ptr.cast::<CGRect>()) }
        }
    }

    fn cursor_is_visible(&self) -> bool {
        unsafe { CGCursorIsVisible() != 0 }
    }

    fn cursor_is_drawn_in_framebuffer(&self) -> bool {
        unsafe { CGCursorIsDrawnInFramebuffer() != 0 }
    }

    fn cursor_position(&self) -> Result<Point, CoreGraphicsError> {
        let event = NonNull::new(unsafe { CGEventCreate(std::ptr::null()) })
            .map(|event| unsafe { CFRetained::from_raw(event) })
            .ok_or(CoreGraphicsError::CannotComplete)?;

        let raw: &CGEvent = &event;
        Ok(Point::from(unsafe { CGEventGetLocation(raw) }))
    }

    fn warp_mouse_cursor_position(&self, position: Point) -> Result<(), CoreGraphicsError> {
        match CoreGraphicsError::from(unsafe {
            CGWarpMouseCursorPosition(CGPoint::from(position))
        }) {
            CoreGraphicsError::Success => Ok(()),
            error => Err(error),
        }
    }

    fn associate_mouse_and_mouse_cursor_position(
        &self,
        connected: bool,
    ) -> Result<(), CoreGraphicsError> {
        match CoreGraphicsError::from(unsafe {
            CGAssociateMouseAndMouseCursorPosition(boolean_t::from(connected))
        }) {
            CoreGraphicsError::Success => Ok(()),
            error => Err(error),
        }
    }

    fn create_server_port(&self) -> Option<ServerPort> {
        let port = NonNull::new(unsafe { CGWindowServerCreateServerPort() })?;
        let port = unsafe { CFRetained::from_raw(port) };

        Some(ServerPort::new(Box::new(QuartzPort(port))))
    }

    fn post_event(&self, event: &SyntheticEvent) -> Result<(), CoreGraphicsError> {
        let source = self.source.lock();
        let cg_event =
            Self::build_event(&source.source, event).ok_or(CoreGraphicsError::CannotComplete)?;

        tracing::debug!("posting {event}");
        let raw: &CGEvent = &cg_event;
        unsafe { CGEventPost(kCGHIDEventTap, raw) };

        Ok(())
    }

    fn set_event_state_combining(&self, combine: bool) -> Result<(), CoreGraphicsError> {
        let mut source = self.source.lock();
        if source.combining == combine {
            return Ok(());
        }

        let filters = source.filters();
        let interval = source.interval();

        source.source = EventSourceRef::create(if combine {
            kCGEventSourceStateCombinedSessionState
        } else {
            kCGEventSourceStatePrivate
        })?;
        source.combining = combine;

        // a fresh source starts from defaults
        source.set_filters(filters);
        source.set_interval(interval);

        Ok(())
    }

    fn set_local_events_inhibited(&self, inhibit: bool) -> Result<(), CoreGraphicsError> {
        let mut source = self.source.lock();

        match (inhibit, source.inhibited_filters) {
            (true, None) => {
                let filters = source.filters();
                source.inhibited_filters = Some(filters);
                source.set_filters([EventFilterMask::empty(); NUMBER_OF_EVENT_SUPPRESSION_STATES]);
            }
            (false, Some(filters)) => {
                source.set_filters(filters);
                source.inhibited_filters = None;
            }
            _ => {}
        }

        Ok(())
    }

    fn set_local_events_filter_during_suppression_state(
        &self,
        filter: EventFilterMask,
        state: EventSuppressionState,
    ) -> Result<(), CoreGraphicsError> {
        let mut source = self.source.lock();

        if let Some(filters) = &mut source.inhibited_filters {
            // applied once inhibition ends
            filters[state.index()] = filter;
        } else {
            source.set_filter(state, filter);
        }

        Ok(())
    }

    fn local_events_filter_during_suppression_state(
        &self,
        state: EventSuppressionState,
    ) -> EventFilterMask {
        let source = self.source.lock();
        match &source.inhibited_filters {
            Some(filters) => filters[state.index()],
            None => source.filter(state),
        }
    }

    fn set_local_events_suppression_interval(
        &self,
        interval: Duration,
    ) -> Result<(), CoreGraphicsError> {
        self.source.lock().set_interval(interval.as_secs_f64());
        Ok(())
    }

    fn local_events_suppression_interval(&self) -> Duration {
        let seconds = self.source.lock().interval();
        crate::suppression::interval_from_secs(seconds).unwrap_or_default()
    }
}

struct QuartzPort(CFRetained<CFMachPort>);
unsafe impl Sync for QuartzPort {}
unsafe impl Send for QuartzPort {}

impl QuartzPort {
    fn as_ptr(&self) -> *const CFMachPort {
        let port: &CFMachPort = &self.0;
        port
    }
}

impl ServerPortHandle for QuartzPort {
    fn is_valid(&self) -> bool {
        unsafe { CFMachPortIsValid(self.as_ptr()) != 0 }
    }

    fn on_invalidation(&self, callback: InvalidationCallback) {
        if !self.is_valid() {
            callback();
            return;
        }

        PORT_INVALIDATION_CALLBACKS
            .lock()
            .entry(self.as_ptr() as usize)
            .or_default()
            .push(callback);

        // fires from the run loop the port is scheduled on
        unsafe { CFMachPortSetInvalidationCallBack(self.as_ptr(), Some(port_invalidated)) }
    }
}

impl Drop for QuartzPort {
    fn drop(&mut self) {
        PORT_INVALIDATION_CALLBACKS
            .lock()
            .remove(&(self.as_ptr() as usize));
    }
}
