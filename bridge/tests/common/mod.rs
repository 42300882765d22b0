// Copyright 2025 juke Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared fakes standing in for the host framework.

use std::sync::{Arc, Mutex};

use juke_bridge::host::{Console, CursorSprite, InputSink, RateControl};
use juke_protocol::input::GuestInput;

/// Console whose cursor the test can swap at any time.
#[derive(Clone, Default)]
pub struct FakeConsole {
    pub cursor: Arc<Mutex<Option<CursorSprite>>>,
    pub updates: Arc<Mutex<u32>>,
}

impl Console for FakeConsole {
    fn cursor(&self) -> Option<CursorSprite> {
        self.cursor.lock().unwrap().clone()
    }

    fn request_update(&mut self) {
        *self.updates.lock().unwrap() += 1;
    }
}

/// Input sink recording everything dispatched to it.
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub events: Arc<Mutex<Vec<GuestInput>>>,
    pub syncs: Arc<Mutex<u32>>,
}

impl InputSink for RecordingSink {
    fn mouse_rel(&mut self, dx: i32, dy: i32) {
        self.events
            .lock()
            .unwrap()
            .push(GuestInput::MouseRelative { dx, dy });
    }

    fn mouse_abs(&mut self, x: i32, y: i32) {
        self.events
            .lock()
            .unwrap()
            .push(GuestInput::MouseAbsolute { x, y });
    }

    fn button(&mut self, button: u8, pressed: bool) {
        self.events
            .lock()
            .unwrap()
            .push(GuestInput::Button { button, pressed });
    }

    fn key(&mut self, scancode: u32, pressed: bool) {
        self.events
            .lock()
            .unwrap()
            .push(GuestInput::Key { scancode, pressed });
    }

    fn sync(&mut self) {
        *self.syncs.lock().unwrap() += 1;
    }
}

/// Rate controller returning a scripted estimate instead of wall-clock math.
#[derive(Clone, Default)]
pub struct ScriptedRate {
    pub pending: usize,
    pub starts: Arc<Mutex<Vec<u32>>>,
}

impl RateControl for ScriptedRate {
    fn start(&mut self, bytes_per_second: u32) {
        self.starts.lock().unwrap().push(bytes_per_second);
    }

    fn pending_bytes(&mut self) -> usize {
        self.pending
    }
}

/// A socket path no renderer listens on; every handshake attempt fails fast.
pub fn dead_socket_path(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("juke-absent-{}-{tag}.sock", std::process::id()))
}
