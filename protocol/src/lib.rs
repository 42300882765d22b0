// Copyright 2025 juke Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared-memory wire contract between the juke emulator bridge and the
//! external renderer.
//!
//! Everything in this crate is ABI. Field orders, widths, and offsets are
//! agreed with the renderer byte for byte; all multi-byte values are
//! little-endian. The `magic` and `version` constants in the two headers are
//! the compatibility contract — changes require coordinated bumps on both
//! sides.
//!
//! Lock-free fields are declared as `AtomicU32`/`AtomicU64` directly inside
//! the `#[repr(C)]` headers so that the same struct can be laid over the
//! mapped region by either process. Exactly one side writes each index; the
//! other side only reads it with acquire ordering.

pub mod audio;
pub mod display;
pub mod input;

pub use audio::{
    AUDIO_MAGIC, AUDIO_VERSION, AudioHeader, PcmSettings, RING_FRAMES, RING_MASK, SAMPLES_OFFSET,
    SampleFormat, audio_region_size,
};
pub use display::{
    CURSOR_DIM, CURSOR_OFFSET, CURSOR_SLOT_BYTES, DISPLAY_MAGIC, DISPLAY_VERSION, DisplayHeader,
    INPUT_RING_CAPACITY, INPUT_RING_OFFSET, InputRing, PIXELS_OFFSET, display_region_size,
};
pub use input::{GuestInput, InputEvent};
