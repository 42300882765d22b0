// Copyright 2025 juke Authors
// SPDX-License-Identifier: Apache-2.0

//! Host framework adapters.
//!
//! The bridge is embedded in an emulator whose display, input, and audio
//! frameworks call into the channels. These traits are the seams: the host
//! implements them over its own console, input queue, and pacing machinery.

use std::time::Instant;

/// Canonical cursor sprite as reported by the host console.
///
/// `data` holds `width * height * 4` RGBA8888 bytes, rows packed with no
/// stride padding.
#[derive(Clone, Debug)]
pub struct CursorSprite {
    pub width: u32,
    pub height: u32,
    pub hot_x: i32,
    pub hot_y: i32,
    pub data: Vec<u8>,
}

/// Access to the host console owning the guest surface.
pub trait Console {
    /// The console's current canonical cursor, if any. The display channel
    /// reads this instead of any sprite passed alongside a cursor callback,
    /// which can lag behind the console state.
    fn cursor(&self) -> Option<CursorSprite>;

    /// Ask the host to re-render the guest surface. Called at the end of
    /// every refresh tick, after the input ring has been drained.
    fn request_update(&mut self);
}

/// A console with no cursor of its own. Suitable for headless hosts and for
/// surfaces whose cursor is composited by the guest.
#[derive(Debug, Default)]
pub struct NullConsole;

impl Console for NullConsole {
    fn cursor(&self) -> Option<CursorSprite> {
        None
    }

    fn request_update(&mut self) {}
}

/// Destination for input events drained from the renderer.
///
/// Events arrive in ring order; `sync` is called once after each non-empty
/// drain so the host can flush a batch to the guest.
pub trait InputSink {
    /// Relative mouse motion.
    fn mouse_rel(&mut self, dx: i32, dy: i32);

    /// Absolute mouse motion in surface coordinates.
    fn mouse_abs(&mut self, x: i32, y: i32);

    /// Mouse button press or release.
    fn button(&mut self, button: u8, pressed: bool);

    /// Key press or release, by scancode.
    fn key(&mut self, scancode: u32, pressed: bool);

    /// Flush queued events to the guest.
    fn sync(&mut self);
}

/// Upstream pacing used while the renderer is not draining the audio ring.
///
/// `pending_bytes` reports how many bytes a real-time consumer would have
/// drained since the previous call; the audio channel returns that to the
/// mixer so upstream keeps flowing at wall-clock pace without blocking.
pub trait RateControl {
    /// (Re)start pacing at the given byte rate.
    fn start(&mut self, bytes_per_second: u32);

    /// Bytes drained at real-time pace since the last call.
    fn pending_bytes(&mut self) -> usize;
}

/// Wall-clock pacing, the default rate controller.
#[derive(Debug)]
pub struct WallClockRate {
    bytes_per_second: u32,
    last: Instant,
}

impl WallClockRate {
    pub fn new() -> Self {
        WallClockRate {
            bytes_per_second: 0,
            last: Instant::now(),
        }
    }
}

impl Default for WallClockRate {
    fn default() -> Self {
        Self::new()
    }
}

impl RateControl for WallClockRate {
    fn start(&mut self, bytes_per_second: u32) {
        self.bytes_per_second = bytes_per_second;
        self.last = Instant::now();
    }

    fn pending_bytes(&mut self) -> usize {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last);
        self.last = now;
        (elapsed.as_nanos() * u128::from(self.bytes_per_second) / 1_000_000_000) as usize
    }
}
