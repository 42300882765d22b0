// Copyright 2025 juke Authors
// SPDX-License-Identifier: Apache-2.0

//! juke emulator bridge.
//!
//! Hands the guest framebuffer, cursor, input events, and PCM audio to an
//! external renderer through two shared-memory channels, with zero syscalls
//! on the hot path. Each channel rendezvouses over a UNIX socket exactly
//! once, to pass the region fd; after that all data flows through the
//! mapped memory under the release/acquire protocol described in
//! `juke-protocol`.
//!
//! The host framework owns scheduling: all callbacks on one channel are
//! invoked from a single thread, and the channels assume no concurrent
//! calls. Coordination is strictly with the renderer process on the other
//! side of the mapping.
//!
//! Configuration is one socket path per channel, passed to the channel
//! constructors. Registration with the host framework, and the refresh
//! cadence chosen by [`refresh::poll_interval`], are process-lifetime state
//! owned by the host.

pub mod audio;
pub mod display;
pub mod host;
pub mod refresh;
pub mod shm;
pub mod transport;

pub use audio::AudioChannel;
pub use display::{DisplayChannel, SurfaceRef};
pub use host::{Console, CursorSprite, InputSink, NullConsole, RateControl, WallClockRate};
pub use juke_protocol as protocol;

/// Errors surfaced at channel setup. Hot-path operations never fail; they
/// log once per error class and degrade as described in the module docs.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("shared memory allocation failed: {0}")]
    Allocation(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
