#![allow(non_camel_case_types, non_upper_case_globals, non_snake_case, unused)]

use crate::geometry::MoveDelta;
use objc2_core_foundation::CFMachPort;
use objc2_core_foundation::CGPoint;
use objc2_core_foundation::CGRect;
use objc2_core_graphics::CGError;
use objc2_core_graphics::CGEvent;
use objc2_core_graphics::CGEventSource;
use std::ffi::c_void;

#[cfg(any(target_arch = "x86", target_arch = "arm", target_arch = "aarch64"))]
pub type boolean_t = std::ffi::c_int;
#[cfg(target_arch = "x86_64")]
pub type boolean_t = std::ffi::c_uint;

pub type Boolean = u8;
pub type CGEventType = u32;
pub type CGMouseButton = u32;
pub type CGEventTapLocation = u32;
pub type CGEventSourceStateID = i32;
pub type CGScrollEventUnit = u32;
pub type UniCharCount = std::ffi::c_ulong;

pub const kCGEventLeftMouseDown: CGEventType = 1;
pub const kCGEventLeftMouseUp: CGEventType = 2;
pub const kCGEventRightMouseDown: CGEventType = 3;
pub const kCGEventRightMouseUp: CGEventType = 4;
pub const kCGEventMouseMoved: CGEventType = 5;
pub const kCGEventLeftMouseDragged: CGEventType = 6;
pub const kCGEventRightMouseDragged: CGEventType = 7;
pub const kCGEventOtherMouseDown: CGEventType = 25;
pub const kCGEventOtherMouseUp: CGEventType = 26;
pub const kCGEventOtherMouseDragged: CGEventType = 27;

pub const kCGHIDEventTap: CGEventTapLocation = 0;

pub const kCGEventSourceStatePrivate: CGEventSourceStateID = -1;
pub const kCGEventSourceStateCombinedSessionState: CGEventSourceStateID = 0;

pub const kCGScrollEventUnitLine: CGScrollEventUnit = 1;

pub type CGScreenRefreshCallback =
    Option<unsafe extern "C-unwind" fn(count: u32, rects: *const CGRect, user_info: *mut c_void)>;

pub type CGScreenUpdateMoveCallback = Option<
    unsafe extern "C-unwind" fn(
        delta: MoveDelta,
        count: usize,
        rects: *const CGRect,
        user_info: *mut c_void,
    ),
>;

pub type CFMachPortInvalidationCallBack =
    Option<unsafe extern "C-unwind" fn(port: *mut CFMachPort, info: *mut c_void)>;

// The screen update half of this API is deprecated and has no objc2 wrapper,
// so the whole remote operation surface is declared here in one place.
#[link(name = "CoreGraphics", kind = "framework")]
unsafe extern "C-unwind" {
    pub fn CGRegisterScreenRefreshCallback(
        callback: CGScreenRefreshCallback,
        user_info: *mut c_void,
    ) -> CGError;
    pub fn CGUnregisterScreenRefreshCallback(
        callback: CGScreenRefreshCallback,
        user_info: *mut c_void,
    );
    pub fn CGWaitForScreenRefreshRects(rects: *mut *mut CGRect, count: *mut u32) -> CGError;

    pub fn CGScreenRegisterMoveCallback(
        callback: CGScreenUpdateMoveCallback,
        user_info: *mut c_void,
    ) -> CGError;
    pub fn CGScreenUnregisterMoveCallback(
        callback: CGScreenUpdateMoveCallback,
        user_info: *mut c_void,
    );
    pub fn CGWaitForScreenUpdateRects(
        requested_operations: u32,
        current_operation: *mut u32,
        rects: *mut *mut CGRect,
        rect_count: *mut usize,
        delta: *mut MoveDelta,
    ) -> CGError;
    pub fn CGReleaseScreenRefreshRects(rects: *mut CGRect);

    pub fn CGCursorIsVisible() -> boolean_t;
    pub fn CGCursorIsDrawnInFramebuffer() -> boolean_t;
    pub fn CGWarpMouseCursorPosition(new_cursor_position: CGPoint) -> CGError;
    pub fn CGAssociateMouseAndMouseCursorPosition(connected: boolean_t) -> CGError;
    pub fn CGWindowServerCreateServerPort() -> *mut CFMachPort;

    pub fn CGEventSourceCreate(state_id: CGEventSourceStateID) -> *mut CGEventSource;
    pub fn CGEventSourceSetLocalEventsFilterDuringSuppressionState(
        source: *const CGEventSource,
        filter: u32,
        state: u32,
    );
    pub fn CGEventSourceGetLocalEventsFilterDuringSuppressionState(
        source: *const CGEventSource,
        state: u32,
    ) -> u32;
    pub fn CGEventSourceSetLocalEventsSuppressionInterval(
        source: *const CGEventSource,
        seconds: f64,
    );
    pub fn CGEventSourceGetLocalEventsSuppressionInterval(source: *const CGEventSource) -> f64;

    pub fn CGEventCreate(source: *const CGEventSource) -> *mut CGEvent;
    pub fn CGEventGetLocation(event: *const CGEvent) -> CGPoint;
    pub fn CGEventCreateMouseEvent(
        source: *const CGEventSource,
        mouse_type: CGEventType,
        mouse_cursor_position: CGPoint,
        mouse_button: CGMouseButton,
    ) -> *mut CGEvent;
    pub fn CGEventCreateKeyboardEvent(
        source: *const CGEventSource,
        virtual_key: u16,
        key_down: bool,
    ) -> *mut CGEvent;
    pub fn CGEventKeyboardSetUnicodeString(
        event: *const CGEvent,
        string_length: UniCharCount,
        unicode_string: *const u16,
    );
    pub fn CGEventCreateScrollWheelEvent2(
        source: *const CGEventSource,
        units: CGScrollEventUnit,
        wheel_count: u32,
        wheel1: i32,
        wheel2: i32,
        wheel3: i32,
    ) -> *mut CGEvent;
    pub fn CGEventPost(tap: CGEventTapLocation, event: *const CGEvent);
}

#[link(name = "CoreFoundation", kind = "framework")]
unsafe extern "C-unwind" {
    pub fn CFMachPortIsValid(port: *const CFMachPort) -> Boolean;
    pub fn CFMachPortSetInvalidationCallBack(
        port: *const CFMachPort,
        callout: CFMachPortInvalidationCallBack,
    );
}
