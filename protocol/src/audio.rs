// Copyright 2025 juke Authors
// SPDX-License-Identifier: Apache-2.0

//! Audio region layout.
//!
//! A 64-byte header followed by a single-producer/single-consumer PCM ring
//! of `RING_FRAMES` frames. The emulator owns `write_idx`, the renderer owns
//! `read_idx` and the `enabled` flag; full is distinguished from empty by
//! leaving one slot unused.

use std::mem;
use std::sync::atomic::AtomicU32;

use serde::{Deserialize, Serialize};

/// Magic number for audio header validation: "JAUD" little-endian.
pub const AUDIO_MAGIC: u32 = 0x4455_414A;

/// Audio protocol version.
pub const AUDIO_VERSION: u32 = 2;

/// Ring capacity in frames. Power of two so `idx & RING_MASK` yields the slot.
pub const RING_FRAMES: u32 = 8192;

/// Slot mask for the ring.
pub const RING_MASK: u32 = RING_FRAMES - 1;

const _: () = assert!(RING_FRAMES.is_power_of_two());

/// PCM sample format.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    /// 16-bit signed PCM, little-endian.
    S16Le = 1,
    /// 32-bit float, little-endian.
    F32Le = 2,
}

impl TryFrom<u32> for SampleFormat {
    type Error = &'static str;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SampleFormat::S16Le),
            2 => Ok(SampleFormat::F32Le),
            _ => Err("Invalid sample format value"),
        }
    }
}

impl SampleFormat {
    /// Returns the number of bytes per sample.
    pub fn bytes_per_sample(self) -> u32 {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::F32Le => 4,
        }
    }
}

/// Voice settings as negotiated by the host audio framework.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmSettings {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count, 1 or 2.
    pub channels: u32,
    /// Sample format.
    pub format: SampleFormat,
}

impl PcmSettings {
    /// Bytes per frame (one sample per channel).
    pub fn bytes_per_frame(&self) -> u32 {
        self.channels * self.format.bytes_per_sample()
    }

    /// Bytes a real-time consumer drains per second.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.bytes_per_frame()
    }
}

/// Audio region header, padded to 64 bytes.
#[repr(C)]
#[derive(Debug)]
pub struct AudioHeader {
    /// Magic number for validation: 0x4455414A ("JAUD").
    pub magic: u32,
    /// Protocol version number.
    pub version: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count, 1 or 2.
    pub channels: u32,
    /// Sample format code (`SampleFormat` as u32).
    pub format: u32,
    /// Ring capacity in frames, fixed at `RING_FRAMES`.
    pub ring_frames: u32,
    /// Producer index (emulator).
    pub write_idx: AtomicU32,
    /// Consumer index (renderer).
    pub read_idx: AtomicU32,
    /// Renderer writes 0/1 to pause/resume the stream.
    pub enabled: AtomicU32,
    /// Guest mute state, 0/1.
    pub muted: AtomicU32,
    /// Guest volume, 0..=255 per side.
    pub volume_left: AtomicU32,
    pub volume_right: AtomicU32,
    _pad: [u32; 4],
}

impl AudioHeader {
    /// Creates a header for a fresh region. The stream starts paused
    /// (`enabled = 0`, renderer-owned) at full unmuted volume.
    pub fn new(settings: &PcmSettings) -> Self {
        AudioHeader {
            magic: AUDIO_MAGIC,
            version: AUDIO_VERSION,
            sample_rate: settings.sample_rate,
            channels: settings.channels,
            format: settings.format as u32,
            ring_frames: RING_FRAMES,
            write_idx: AtomicU32::new(0),
            read_idx: AtomicU32::new(0),
            enabled: AtomicU32::new(0),
            muted: AtomicU32::new(0),
            volume_left: AtomicU32::new(255),
            volume_right: AtomicU32::new(255),
            _pad: [0; 4],
        }
    }

    /// Validates the magic number and version.
    pub fn validate(&self) -> bool {
        self.magic == AUDIO_MAGIC && self.version == AUDIO_VERSION
    }
}

/// Offset of the sample ring from the start of the region.
pub const SAMPLES_OFFSET: usize = mem::size_of::<AudioHeader>();

/// Total region size for the given voice settings.
pub fn audio_region_size(settings: &PcmSettings) -> usize {
    SAMPLES_OFFSET + (RING_FRAMES * settings.bytes_per_frame()) as usize
}

const _: () = assert!(mem::size_of::<AudioHeader>() == 64);
