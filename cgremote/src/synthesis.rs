use crate::error::CoreGraphicsError;
use crate::geometry::Point;
use crate::options::CharCode;
use crate::options::KeyCode;
use crate::options::MAX_BUTTON_COUNT;
use crate::options::MAX_WHEEL_COUNT;
use serde::Deserialize;
use serde::Serialize;
use strum::Display;

/// Zero-based button number: 0 is primary, 1 secondary, 2 center, the rest in
/// USB device order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MouseButton(pub u32);

impl MouseButton {
    pub const PRIMARY: Self = Self(0);
    pub const SECONDARY: Self = Self(1);
    pub const CENTER: Self = Self(2);
}

/// A single low-level event as it is injected into the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Display)]
pub enum SyntheticEvent {
    MouseMoved {
        position: Point,
    },
    MouseDragged {
        position: Point,
        button: MouseButton,
    },
    MouseDown {
        position: Point,
        button: MouseButton,
    },
    MouseUp {
        position: Point,
        button: MouseButton,
    },
    ScrollWheel {
        wheels: Vec<i32>,
    },
    Keyboard {
        char_code: CharCode,
        key_code: KeyCode,
        key_down: bool,
    },
}

impl SyntheticEvent {
    pub fn scroll_wheel(wheels: &[i32]) -> Result<Self, CoreGraphicsError> {
        if wheels.is_empty() || wheels.len() > MAX_WHEEL_COUNT as usize {
            tracing::warn!(
                "scroll wheel events need between 1 and {MAX_WHEEL_COUNT} wheels, got {}",
                wheels.len()
            );
            return Err(CoreGraphicsError::IllegalArgument);
        }

        Ok(Self::ScrollWheel {
            wheels: wheels.to_vec(),
        })
    }

    pub const fn keyboard(char_code: CharCode, key_code: KeyCode, key_down: bool) -> Self {
        Self::Keyboard {
            char_code,
            key_code,
            key_down,
        }
    }

    pub const fn is_mouse(&self) -> bool {
        matches!(
            self,
            Self::MouseMoved { .. }
                | Self::MouseDragged { .. }
                | Self::MouseDown { .. }
                | Self::MouseUp { .. }
        )
    }

    pub const fn position(&self) -> Option<Point> {
        match self {
            Self::MouseMoved { position }
            | Self::MouseDragged { position, .. }
            | Self::MouseDown { position, .. }
            | Self::MouseUp { position, .. } => Some(*position),
            Self::ScrollWheel { .. } | Self::Keyboard { .. } => None,
        }
    }
}

/// Button bitmask plus position of the synthetic mouse.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct MouseState {
    pub position: Point,
    pub buttons: u32,
}

impl MouseState {
    pub const fn new(position: Point) -> Self {
        Self {
            position,
            buttons: 0,
        }
    }

    pub const fn is_down(&self, button: MouseButton) -> bool {
        button.0 < MAX_BUTTON_COUNT && self.buttons & (1 << button.0) != 0
    }

    /// Lowest-numbered held button, which is the one a drag is attributed to.
    pub const fn drag_button(&self) -> Option<MouseButton> {
        if self.buttons == 0 {
            None
        } else {
            Some(MouseButton(self.buttons.trailing_zeros()))
        }
    }

    /// Pack per-button states (primary first) into a bitmask.
    pub fn buttons_from_states(states: &[bool]) -> Result<u32, CoreGraphicsError> {
        if states.is_empty() || states.len() > MAX_BUTTON_COUNT as usize {
            tracing::warn!(
                "mouse events need between 1 and {MAX_BUTTON_COUNT} buttons, got {}",
                states.len()
            );
            return Err(CoreGraphicsError::IllegalArgument);
        }

        Ok(states
            .iter()
            .enumerate()
            .filter(|(_, down)| **down)
            .fold(0, |mask, (idx, _)| mask | (1 << idx)))
    }

    /// Events that take the mouse from this state to `(position, states)`.
    ///
    /// Buttons beyond `states.len()` keep their current state. Motion comes
    /// first and is a drag if any button was held before the call, then one
    /// down or up per changed button in button order at the new position.
    pub fn transition_to(
        &self,
        position: Point,
        states: &[bool],
    ) -> Result<(MouseState, Vec<SyntheticEvent>), CoreGraphicsError> {
        let described = Self::buttons_from_states(states)?;
        let described_mask = if states.len() as u32 >= MAX_BUTTON_COUNT {
            u32::MAX
        } else {
            (1 << states.len()) - 1
        };

        let buttons = (self.buttons & !described_mask) | described;
        let mut events = Vec::new();

        if position != self.position {
            match self.drag_button() {
                Some(button) => events.push(SyntheticEvent::MouseDragged { position, button }),
                None => events.push(SyntheticEvent::MouseMoved { position }),
            }
        }

        let changed = self.buttons ^ buttons;
        for idx in 0..MAX_BUTTON_COUNT {
            if changed & (1 << idx) == 0 {
                continue;
            }

            let button = MouseButton(idx);
            if buttons & (1 << idx) != 0 {
                events.push(SyntheticEvent::MouseDown { position, button });
            } else {
                events.push(SyntheticEvent::MouseUp { position, button });
            }
        }

        Ok((MouseState { position, buttons }, events))
    }

    /// Fold an already-built event into the tracked state.
    pub fn apply(&mut self, event: &SyntheticEvent) {
        match event {
            SyntheticEvent::MouseMoved { position } | SyntheticEvent::MouseDragged { position, .. } => {
                self.position = *position;
            }
            SyntheticEvent::MouseDown { position, button } => {
                self.position = *position;
                if button.0 < MAX_BUTTON_COUNT {
                    self.buttons |= 1 << button.0;
                }
            }
            SyntheticEvent::MouseUp { position, button } => {
                self.position = *position;
                if button.0 < MAX_BUTTON_COUNT {
                    self.buttons &= !(1 << button.0);
                }
            }
            SyntheticEvent::ScrollWheel { .. } | SyntheticEvent::Keyboard { .. } => {}
        }
    }
}
