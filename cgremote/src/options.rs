#![allow(deprecated)]

use serde::Deserialize;
use serde::Serialize;
use std::time::Duration;
use strum::Display;
use strum::EnumIter;

/// Number of buttons described by a synthetic mouse event.
pub type ButtonCount = u32;
/// Number of scrolling devices described by a synthetic scroll event.
pub type WheelCount = u32;
/// A character generated by pressing one or more keys.
pub type CharCode = u16;
/// A virtual key code.
pub type KeyCode = u16;
/// Count of items in an array of rectangles.
pub type RectCount = u32;

pub const MAX_BUTTON_COUNT: ButtonCount = 32;
pub const MAX_WHEEL_COUNT: WheelCount = 3;

/// How long a left mouse down may suppress hardware mouse movement without any
/// remote drag before a warning is logged.
pub const MOUSE_DOWN_EVENT_MASKING_DEAD_SWITCH_TIMEOUT: Duration = Duration::from_secs(60);

bitflags::bitflags! {
    /// Kinds of screen update operation requested from, or reported by, a wait.
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct ScreenUpdateOperation: u32 {
        const REFRESH = 0;
        const MOVE = 1 << 0;
        const REDUCED_DIRTY_RECTANGLE_COUNT = 1 << 31;
    }
}

impl ScreenUpdateOperation {
    pub const fn is_move(self) -> bool {
        self.contains(Self::MOVE)
    }
}

bitflags::bitflags! {
    /// Classes of local hardware events that remain permitted while a
    /// suppression state is in force.
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
    pub struct EventFilterMask: u32 {
        const PERMIT_LOCAL_MOUSE_EVENTS = 0x0000_0001;
        const PERMIT_LOCAL_KEYBOARD_EVENTS = 0x0000_0002;
        const PERMIT_SYSTEM_DEFINED_EVENTS = 0x0000_0004;
    }
}

impl EventFilterMask {
    pub const PERMIT_ALL_EVENTS: Self = Self::PERMIT_LOCAL_MOUSE_EVENTS
        .union(Self::PERMIT_LOCAL_KEYBOARD_EVENTS)
        .union(Self::PERMIT_SYSTEM_DEFINED_EVENTS);

    pub const fn permits(self, class: LocalEventClass) -> bool {
        self.contains(class.mask())
    }
}

/// Classes a local hardware event can belong to, one per filter mask bit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
pub enum LocalEventClass {
    Mouse,
    Keyboard,
    SystemDefined,
}

impl LocalEventClass {
    pub const fn mask(self) -> EventFilterMask {
        match self {
            Self::Mouse => EventFilterMask::PERMIT_LOCAL_MOUSE_EVENTS,
            Self::Keyboard => EventFilterMask::PERMIT_LOCAL_KEYBOARD_EVENTS,
            Self::SystemDefined => EventFilterMask::PERMIT_SYSTEM_DEFINED_EVENTS,
        }
    }
}

impl FromIterator<LocalEventClass> for EventFilterMask {
    fn from_iter<T: IntoIterator<Item = LocalEventClass>>(iter: T) -> Self {
        iter.into_iter()
            .fold(EventFilterMask::empty(), |mask, class| mask | class.mask())
    }
}

/// Phases that can follow the posting of a synthetic event.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[cfg_attr(feature = "schemars", derive(schemars::JsonSchema))]
#[repr(u32)]
pub enum EventSuppressionState {
    SuppressionInterval = 0,
    RemoteMouseDrag = 1,
}

pub const NUMBER_OF_EVENT_SUPPRESSION_STATES: usize = 2;

impl EventSuppressionState {
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl TryFrom<u32> for EventSuppressionState {
    type Error = crate::error::CoreGraphicsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::SuppressionInterval),
            1 => Ok(Self::RemoteMouseDrag),
            _ => Err(crate::error::CoreGraphicsError::IllegalArgument),
        }
    }
}

// Misspelled names from older headers.
#[deprecated(note = "use EventSuppressionState")]
pub type EventSupressionState = EventSuppressionState;
#[deprecated(note = "use EventSuppressionState::SuppressionInterval")]
pub const EVENT_SUPRESSION_STATE_SUPRESSION_INTERVAL: EventSuppressionState =
    EventSuppressionState::SuppressionInterval;
#[deprecated(note = "use EventSuppressionState::RemoteMouseDrag")]
pub const EVENT_SUPRESSION_STATE_REMOTE_MOUSE_DRAG: EventSuppressionState =
    EventSuppressionState::RemoteMouseDrag;
#[deprecated(note = "use NUMBER_OF_EVENT_SUPPRESSION_STATES")]
pub const NUMBER_OF_EVENT_SUPRESSION_STATES: usize = NUMBER_OF_EVENT_SUPPRESSION_STATES;
