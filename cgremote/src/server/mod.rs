use crate::callbacks::ScreenRefreshCallback;
use crate::callbacks::ScreenUpdateMoveCallback;
use crate::callbacks::UserInfo;
use crate::error::CoreGraphicsError;
use crate::geometry::MoveDelta;
use crate::geometry::Point;
use crate::geometry::Rect;
use crate::options::EventFilterMask;
use crate::options::EventSuppressionState;
use crate::options::ScreenUpdateOperation;
use crate::server_port::ServerPort;
use crate::synthesis::SyntheticEvent;
use std::ops::Deref;
use std::time::Duration;

#[cfg(target_os = "macos")]
pub mod quartz;
pub mod simulated;

/// A rectangle array allocated by the window server. It is only ever handed to
/// [`ScreenRefreshRects`], which gives it back through
/// [`WindowServer::release_screen_refresh_rects`].
#[derive(Debug)]
pub struct RawRects {
    pub(crate) ptr: *mut Rect,
    pub(crate) len: usize,
}

impl RawRects {
    pub const fn empty() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
            len: 0,
        }
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0 || self.ptr.is_null()
    }
}

#[derive(Debug)]
pub struct RawScreenUpdate {
    pub operation: ScreenUpdateOperation,
    pub rects: RawRects,
    pub delta: MoveDelta,
}

/// The windowing server as seen from a client process.
///
/// Every method is a request to the server; state lives on the server side.
pub trait WindowServer: Send + Sync {
    fn name(&self) -> &'static str;

    fn register_screen_refresh_callback(
        &self,
        callback: ScreenRefreshCallback,
        user_info: UserInfo,
    ) -> Result<(), CoreGraphicsError>;

    /// Does nothing unless both the callback and the context match an entry.
    fn unregister_screen_refresh_callback(
        &self,
        callback: ScreenRefreshCallback,
        user_info: &UserInfo,
    );

    fn register_screen_move_callback(
        &self,
        callback: ScreenUpdateMoveCallback,
        user_info: UserInfo,
    ) -> Result<(), CoreGraphicsError>;

    fn unregister_screen_move_callback(
        &self,
        callback: ScreenUpdateMoveCallback,
        user_info: &UserInfo,
    );

    /// Whether any refresh or move callback is currently registered.
    fn has_screen_callbacks(&self) -> bool;

    fn wait_for_screen_refresh_rects(&self) -> Result<RawRects, CoreGraphicsError>;

    fn wait_for_screen_update_rects(
        &self,
        requested: ScreenUpdateOperation,
    ) -> Result<RawScreenUpdate, CoreGraphicsError>;

    fn release_screen_refresh_rects(&self, rects: RawRects);

    fn cursor_is_visible(&self) -> bool;

    fn cursor_is_drawn_in_framebuffer(&self) -> bool;

    fn cursor_position(&self) -> Result<Point, CoreGraphicsError>;

    fn warp_mouse_cursor_position(&self, position: Point) -> Result<(), CoreGraphicsError>;

    fn associate_mouse_and_mouse_cursor_position(
        &self,
        connected: bool,
    ) -> Result<(), CoreGraphicsError>;

    /// `None` while no window server is running.
    fn create_server_port(&self) -> Option<ServerPort>;

    fn post_event(&self, event: &SyntheticEvent) -> Result<(), CoreGraphicsError>;

    fn set_event_state_combining(&self, combine: bool) -> Result<(), CoreGraphicsError>;

    fn set_local_events_inhibited(&self, inhibit: bool) -> Result<(), CoreGraphicsError>;

    fn set_local_events_filter_during_suppression_state(
        &self,
        filter: EventFilterMask,
        state: EventSuppressionState,
    ) -> Result<(), CoreGraphicsError>;

    fn local_events_filter_during_suppression_state(
        &self,
        state: EventSuppressionState,
    ) -> EventFilterMask;

    fn set_local_events_suppression_interval(
        &self,
        interval: Duration,
    ) -> Result<(), CoreGraphicsError>;

    fn local_events_suppression_interval(&self) -> Duration;
}

/// Rectangles returned by a wait. The list is released back to the server
/// exactly once, when it is dropped or passed to [`ScreenRefreshRects::release`].
pub struct ScreenRefreshRects<'s> {
    raw: Option<RawRects>,
    server: &'s dyn WindowServer,
}

impl<'s> ScreenRefreshRects<'s> {
    pub fn new(raw: RawRects, server: &'s dyn WindowServer) -> Self {
        Self {
            raw: Some(raw),
            server,
        }
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Deref for ScreenRefreshRects<'_> {
    type Target = [Rect];

    fn deref(&self) -> &Self::Target {
        match &self.raw {
            Some(raw) if !raw.is_empty() => unsafe {
                std::slice::from_raw_parts(raw.ptr.cast_const(), raw.len)
            },
            _ => &[],
        }
    }
}

impl std::fmt::Debug for ScreenRefreshRects<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl Drop for ScreenRefreshRects<'_> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.server.release_screen_refresh_rects(raw);
        }
    }
}

/// Result of [`crate::RemoteOperation::wait_for_screen_update_rects`].
#[derive(Debug)]
pub struct ScreenUpdate<'s> {
    pub operation: ScreenUpdateOperation,
    pub rects: ScreenRefreshRects<'s>,
    /// Only present when `operation` is a move.
    pub delta: Option<MoveDelta>,
}
