// Copyright 2025 juke Authors
// SPDX-License-Identifier: Apache-2.0

//! Input event wire format.
//!
//! The renderer encodes host input into fixed 12-byte slots; the emulator
//! decodes them on each refresh tick and feeds the guest input sink.

use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Relative mouse motion; `x`/`y` carry the deltas.
pub const EVENT_MOUSE_REL: u8 = 1;
/// Absolute mouse motion; `x`/`y` are in `[0, width) x [0, height)`.
pub const EVENT_MOUSE_ABS: u8 = 2;
/// Mouse button transition; `button` identifies it, `pressed` is 0/1.
pub const EVENT_MOUSE_BUTTON: u8 = 3;
/// Key transition; `x` is the scancode, `pressed` is 0/1, `y` unused.
pub const EVENT_KEY: u8 = 4;

/// One 12-byte slot of the input ring.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct InputEvent {
    pub kind: u8,
    pub button: u8,
    pub pressed: u8,
    pub reserved: u8,
    pub x: i32,
    pub y: i32,
}

const _: () = assert!(core::mem::size_of::<InputEvent>() == 12);

/// A decoded input event, ready for dispatch to the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuestInput {
    /// Mouse motion by a delta.
    MouseRelative { dx: i32, dy: i32 },
    /// Mouse motion to an absolute surface coordinate.
    MouseAbsolute { x: i32, y: i32 },
    /// Mouse button press or release.
    Button { button: u8, pressed: bool },
    /// Key press or release, by scancode.
    Key { scancode: u32, pressed: bool },
}

impl InputEvent {
    /// Decodes a slot. Unknown event types yield `None` and are dropped by
    /// the drain loop.
    pub fn decode(&self) -> Option<GuestInput> {
        match self.kind {
            EVENT_MOUSE_REL => Some(GuestInput::MouseRelative {
                dx: self.x,
                dy: self.y,
            }),
            EVENT_MOUSE_ABS => Some(GuestInput::MouseAbsolute {
                x: self.x,
                y: self.y,
            }),
            EVENT_MOUSE_BUTTON => Some(GuestInput::Button {
                button: self.button,
                pressed: self.pressed != 0,
            }),
            EVENT_KEY => Some(GuestInput::Key {
                scancode: self.x as u32,
                pressed: self.pressed != 0,
            }),
            _ => None,
        }
    }
}

impl GuestInput {
    /// Encodes into a ring slot. The emulator never produces events; this is
    /// for the renderer side and for tests.
    pub fn encode(&self) -> InputEvent {
        match *self {
            GuestInput::MouseRelative { dx, dy } => InputEvent {
                kind: EVENT_MOUSE_REL,
                x: dx,
                y: dy,
                ..InputEvent::default()
            },
            GuestInput::MouseAbsolute { x, y } => InputEvent {
                kind: EVENT_MOUSE_ABS,
                x,
                y,
                ..InputEvent::default()
            },
            GuestInput::Button { button, pressed } => InputEvent {
                kind: EVENT_MOUSE_BUTTON,
                button,
                pressed: pressed as u8,
                ..InputEvent::default()
            },
            GuestInput::Key { scancode, pressed } => InputEvent {
                kind: EVENT_KEY,
                pressed: pressed as u8,
                x: scancode as i32,
                ..InputEvent::default()
            },
        }
    }
}
