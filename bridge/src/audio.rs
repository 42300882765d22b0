// Copyright 2025 juke Authors
// SPDX-License-Identifier: Apache-2.0

//! Audio channel.
//!
//! Owns the fixed-size PCM region: a 64-byte header and an 8192-frame SPSC
//! ring. The emulator produces frames; the renderer consumes them and owns
//! `read_idx` and `enabled`. While the renderer is paused or the ring is
//! full, the rate controller models a real-time drain so the upstream mixer
//! never blocks.

use std::path::PathBuf;
use std::ptr;
use std::sync::atomic::Ordering;

use log::{debug, warn};

use juke_protocol::audio::{
    AudioHeader, PcmSettings, RING_FRAMES, RING_MASK, SAMPLES_OFFSET, audio_region_size,
};

use crate::BridgeError;
use crate::host::RateControl;
use crate::shm::SharedRegion;
use crate::transport::Rendezvous;

/// Emulator side of the audio channel.
pub struct AudioChannel<R> {
    transport: Rendezvous,
    region: Option<SharedRegion>,
    settings: Option<PcmSettings>,
    /// Shadow of the header's `write_idx`; this side owns it, so no
    /// synchronization is needed to read it back.
    write_idx: u32,
    rate: R,
}

impl<R: RateControl> AudioChannel<R> {
    pub fn new(socket_path: impl Into<PathBuf>, rate: R) -> Self {
        AudioChannel {
            transport: Rendezvous::new(socket_path),
            region: None,
            settings: None,
            write_idx: 0,
            rate,
        }
    }

    /// The current region, if the voice has been initialized.
    pub fn region(&self) -> Option<&SharedRegion> {
        self.region.as_ref()
    }

    /// Voice initialization. The first call allocates the region and writes
    /// the header; the region is never grown or replaced afterwards.
    pub fn init_out(&mut self, settings: PcmSettings) -> Result<(), BridgeError> {
        if let Some(existing) = self.settings {
            if existing != settings {
                warn!("voice re-init with different settings ignored: {settings:?}");
            }
            self.rate.start(existing.bytes_per_second());
            return Ok(());
        }

        let region = SharedRegion::allocate("juke-audio", audio_region_size(&settings))
            .map_err(BridgeError::Allocation)?;
        // SAFETY: the region starts with an AudioHeader-sized prefix owned
        // by this channel; the ring behind it is already zero.
        unsafe {
            ptr::write(region.as_ptr().cast::<AudioHeader>(), AudioHeader::new(&settings));
        }
        debug!(
            "audio region {} Hz x{} ({} bytes)",
            settings.sample_rate,
            settings.channels,
            audio_region_size(&settings)
        );

        self.write_idx = 0;
        self.region = Some(region);
        self.settings = Some(settings);
        self.rate.start(settings.bytes_per_second());
        self.poll_transport();
        Ok(())
    }

    /// The hot path: copy mixer output into the ring.
    ///
    /// Returns the bytes accepted — exactly `frames * bytes_per_frame` when
    /// the ring takes frames, or the rate controller's real-time estimate
    /// when the stream is paused or the ring is full. Never blocks.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        if self.region.is_none() {
            return 0;
        }
        self.poll_transport();

        let (Some(region), Some(settings)) = (self.region.as_ref(), self.settings.as_ref()) else {
            return 0;
        };
        let bpf = settings.bytes_per_frame() as usize;
        // SAFETY: the header prefix is mapped for the region's lifetime.
        let header: &AudioHeader = unsafe { &*region.as_ptr().cast() };

        if header.enabled.load(Ordering::Acquire) == 0 {
            // Paused by the renderer: drain upstream at real-time pace.
            return self.rate.pending_bytes();
        }

        let read = header.read_idx.load(Ordering::Acquire);
        let used = self.write_idx.wrapping_sub(read) & RING_MASK;
        let free = RING_FRAMES - used - 1;
        let frames = ((buf.len() / bpf) as u32).min(free);
        if frames == 0 {
            // Backpressure without blocking; no samples are dropped here,
            // upstream just sees a real-time consumer.
            return self.rate.pending_bytes();
        }

        let ring = region.as_ptr().wrapping_add(SAMPLES_OFFSET);
        let slot = self.write_idx & RING_MASK;
        let first = frames.min(RING_FRAMES - slot);
        // SAFETY: both copies stay inside the `RING_FRAMES * bpf` sample
        // section; `first` caps the run at the wrap boundary.
        unsafe {
            ptr::copy_nonoverlapping(buf.as_ptr(), ring.add(slot as usize * bpf), first as usize * bpf);
            if first < frames {
                ptr::copy_nonoverlapping(
                    buf.as_ptr().add(first as usize * bpf),
                    ring,
                    (frames - first) as usize * bpf,
                );
            }
        }

        self.write_idx = self.write_idx.wrapping_add(frames);
        header.write_idx.store(self.write_idx, Ordering::Release);
        frames as usize * bpf
    }

    /// Stream state change from the host mixer. Enabling restarts the rate
    /// controller; the header's `enabled` field belongs to the renderer and
    /// is never touched from this side.
    pub fn enable_out(&mut self, enabled: bool) {
        if !enabled {
            return;
        }
        if let Some(settings) = &self.settings {
            self.rate.start(settings.bytes_per_second());
        }
    }

    /// Mirror of the guest mixer state for the renderer to honor.
    pub fn volume_out(&mut self, muted: bool, volume: &[u8]) {
        let Some(region) = self.region.as_ref() else {
            return;
        };
        // SAFETY: the header prefix is mapped for the region's lifetime.
        let header: &AudioHeader = unsafe { &*region.as_ptr().cast() };

        let channels = self.settings.map_or(1, |s| s.channels);
        let left = volume.first().copied().unwrap_or(255);
        let right = if channels > 1 {
            volume.get(1).copied().unwrap_or(left)
        } else {
            left
        };

        header.muted.store(u32::from(muted), Ordering::Release);
        header.volume_left.store(u32::from(left), Ordering::Release);
        header.volume_right.store(u32::from(right), Ordering::Release);
    }

    /// Free ring space in bytes, for the framework's buffer sizing query.
    pub fn free_bytes(&self) -> usize {
        let (Some(region), Some(settings)) = (self.region.as_ref(), self.settings.as_ref()) else {
            return 0;
        };
        // SAFETY: the header prefix is mapped for the region's lifetime.
        let header: &AudioHeader = unsafe { &*region.as_ptr().cast() };
        let read = header.read_idx.load(Ordering::Acquire);
        let used = self.write_idx.wrapping_sub(read) & RING_MASK;
        ((RING_FRAMES - used - 1) * settings.bytes_per_frame()) as usize
    }

    /// Releases the region and the socket.
    pub fn fini(&mut self) {
        self.transport.close();
        self.region = None;
        self.settings = None;
        self.write_idx = 0;
    }

    fn poll_transport(&mut self) {
        use std::os::fd::AsRawFd;
        let fd = self.region.as_ref().map(|r| r.fd().as_raw_fd());
        self.transport.poll(fd);
    }
}
