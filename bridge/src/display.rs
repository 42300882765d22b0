// Copyright 2025 juke Authors
// SPDX-License-Identifier: Apache-2.0

//! Display channel.
//!
//! Owns the resizable display region: header, cursor sprite slot, input
//! ring, and pixel buffer. The emulator writes pixels and cursor state; the
//! renderer writes input events. `frame_counter` and `cursor_version` are
//! the commit anchors — everything written before their release-add is
//! visible to a renderer that acquire-loads the new value.

use std::path::PathBuf;
use std::ptr;
use std::sync::atomic::{Ordering, fence};

use log::{debug, warn};

use juke_protocol::display::{
    CURSOR_DIM, CURSOR_OFFSET, DisplayHeader, INPUT_RING_CAPACITY, INPUT_RING_OFFSET, InputRing,
    PIXELS_OFFSET, display_region_size,
};
use juke_protocol::input::GuestInput;

use crate::host::{Console, InputSink};
use crate::shm::SharedRegion;
use crate::transport::Rendezvous;

/// Borrowed view of the host surface for the duration of one callback.
#[derive(Clone, Copy)]
pub struct SurfaceRef<'a> {
    pub width: u32,
    pub height: u32,
    /// Row stride in bytes.
    pub stride: u32,
    /// Host pixel-format identifier, passed through to the header.
    pub format: u32,
    /// At least `stride * height` bytes.
    pub data: &'a [u8],
}

/// Emulator side of the display channel.
pub struct DisplayChannel<C, I> {
    transport: Rendezvous,
    region: Option<SharedRegion>,
    console: C,
    input: I,
    alloc_warned: bool,
}

impl<C: Console, I: InputSink> DisplayChannel<C, I> {
    pub fn new(socket_path: impl Into<PathBuf>, console: C, input: I) -> Self {
        DisplayChannel {
            transport: Rendezvous::new(socket_path),
            region: None,
            console,
            input,
            alloc_warned: false,
        }
    }

    /// The current region, if one has been allocated. The host needs this
    /// for diagnostics; the renderer gets the fd through the transport.
    pub fn region(&self) -> Option<&SharedRegion> {
        self.region.as_ref()
    }

    fn header_ptr(&self) -> Option<*mut DisplayHeader> {
        self.region.as_ref().map(|r| r.as_ptr().cast())
    }

    /// Guest surface changed size or format.
    ///
    /// Grow-only: a smaller surface reuses the existing region, a larger one
    /// replaces it (and the new fd goes out on the next handshake chance).
    pub fn gfx_switch(&mut self, surface: SurfaceRef<'_>) {
        let needed = display_region_size(surface.stride, surface.height);
        let have = self.region.as_ref().map_or(0, SharedRegion::len);

        if self.region.is_none() || needed > have {
            // Release the old mapping before allocating its replacement.
            self.region = None;
            match SharedRegion::allocate("juke-fb", needed) {
                Ok(region) => {
                    // Fresh regions are zero-filled, which already clears the
                    // cursor slot and the input ring.
                    // SAFETY: the region starts with a DisplayHeader-sized
                    // prefix owned by this channel.
                    unsafe {
                        ptr::write(
                            region.as_ptr().cast::<DisplayHeader>(),
                            DisplayHeader::new(
                                surface.width,
                                surface.height,
                                surface.stride,
                                surface.format,
                            ),
                        );
                    }
                    self.region = Some(region);
                    self.transport.mark_region_replaced();
                    self.alloc_warned = false;
                    debug!(
                        "display region {}x{} stride {} ({needed} bytes)",
                        surface.width, surface.height, surface.stride
                    );
                }
                Err(e) => {
                    if !self.alloc_warned {
                        warn!("display region allocation failed: {e}");
                        self.alloc_warned = true;
                    }
                    return;
                }
            }
        } else if let Some(header) = self.header_ptr() {
            // Same region, new geometry. Counters keep running.
            // SAFETY: region is present, so the header prefix is mapped.
            unsafe {
                (*header).width = surface.width;
                (*header).height = surface.height;
                (*header).stride = surface.stride;
                (*header).format = surface.format;
            }
        }

        self.copy_rows(&surface, 0, surface.height);

        // A connected renderer gets the new fd immediately; otherwise the
        // next refresh retries.
        if self.transport.connected() {
            self.poll_transport();
        }
    }

    /// Guest pixels changed inside the given rectangle.
    ///
    /// Copies whole rows `[y, y+h)`, clamped to the surface and the region,
    /// and publishes the caller's dirty box; the renderer only trusts the
    /// box. Every call commits, degenerate rectangles included — the
    /// release-add on `frame_counter` is the one publish point. Only the
    /// latest rectangle is published, so a slow renderer sees the newest
    /// frame and may skip intermediates.
    pub fn gfx_update(&mut self, surface: SurfaceRef<'_>, x: u32, y: u32, w: u32, h: u32) {
        let Some(header) = self.header_ptr() else {
            return;
        };

        self.copy_rows(&surface, y, h);

        // SAFETY: header prefix is mapped; the release-add below publishes
        // the plain stores before it.
        unsafe {
            (*header).dirty_x = x;
            (*header).dirty_y = y;
            (*header).dirty_w = w;
            (*header).dirty_h = h;
            (*header).frame_counter.fetch_add(1, Ordering::Release);
        }
    }

    /// Cursor sprite changed.
    ///
    /// Reads the console's canonical cursor rather than any sprite passed
    /// along by the framework, which can lag the console state. A missing
    /// cursor clears the dimensions; either way `cursor_version` bumps so
    /// the renderer refreshes its cache.
    pub fn cursor_define(&mut self) {
        let Some(region) = self.region.as_ref() else {
            return;
        };
        let header: *mut DisplayHeader = region.as_ptr().cast();
        let slot = region.as_ptr().wrapping_add(CURSOR_OFFSET);

        match self.console.cursor() {
            Some(sprite) => {
                let width = sprite.width.min(CURSOR_DIM);
                let height = sprite.height.min(CURSOR_DIM);
                let src_stride = (sprite.width * 4) as usize;
                let row_bytes = (width * 4) as usize;

                for row in 0..height as usize {
                    let Some(src) = sprite
                        .data
                        .get(row * src_stride..row * src_stride + row_bytes)
                    else {
                        break;
                    };
                    // SAFETY: destination row lies inside the 64x64 RGBA
                    // cursor slot; columns past `width` are left untouched.
                    unsafe {
                        ptr::copy_nonoverlapping(
                            src.as_ptr(),
                            slot.add(row * (CURSOR_DIM * 4) as usize),
                            row_bytes,
                        );
                    }
                }

                // SAFETY: header prefix is mapped.
                unsafe {
                    (*header).cursor_width = width;
                    (*header).cursor_height = height;
                    (*header).cursor_hot_x = sprite.hot_x;
                    (*header).cursor_hot_y = sprite.hot_y;
                }
            }
            None => {
                // SAFETY: header prefix is mapped.
                unsafe {
                    (*header).cursor_width = 0;
                    (*header).cursor_height = 0;
                }
            }
        }

        // SAFETY: header prefix is mapped.
        unsafe {
            (*header).cursor_version.fetch_add(1, Ordering::Release);
        }
    }

    /// Cursor moved or toggled visibility.
    ///
    /// Position is best-effort for the renderer; no version bump, just a
    /// release fence so the stores are not reordered past later publishes.
    pub fn mouse_set(&mut self, x: i32, y: i32, visible: bool) {
        let Some(header) = self.header_ptr() else {
            return;
        };
        // SAFETY: header prefix is mapped.
        unsafe {
            (*header).cursor_x = x;
            (*header).cursor_y = y;
            (*header).cursor_visible = u32::from(visible);
        }
        fence(Ordering::Release);
    }

    /// Periodic tick: handshake retry, input drain, then the host's own
    /// surface update.
    pub fn refresh(&mut self) {
        self.poll_transport();
        self.drain_input();
        self.console.request_update();
    }

    /// Releases the region and the socket.
    pub fn fini(&mut self) {
        self.transport.close();
        self.region = None;
    }

    fn poll_transport(&mut self) {
        use std::os::fd::AsRawFd;
        let fd = self.region.as_ref().map(|r| r.fd().as_raw_fd());
        self.transport.poll(fd);
    }

    /// Copies whole surface rows `[y, y+h)` into the pixel buffer, clamped
    /// to the surface and the region.
    fn copy_rows(&self, surface: &SurfaceRef<'_>, y: u32, h: u32) {
        let Some(region) = self.region.as_ref() else {
            return;
        };
        let stride = surface.stride as usize;
        if stride == 0 {
            return;
        }

        let capacity_rows = (region.len() - PIXELS_OFFSET) / stride;
        let src_rows = surface.data.len() / stride;
        let end = (y.saturating_add(h) as usize)
            .min(surface.height as usize)
            .min(capacity_rows)
            .min(src_rows);
        let start = (y as usize).min(end);

        let pixels = region.as_ptr().wrapping_add(PIXELS_OFFSET);
        for row in start..end {
            // SAFETY: `row * stride + stride` is within both the source
            // slice and the region, by the clamps above.
            unsafe {
                ptr::copy_nonoverlapping(
                    surface.data.as_ptr().add(row * stride),
                    pixels.add(row * stride),
                    stride,
                );
            }
        }
    }

    /// Drains the renderer-written input ring and dispatches to the sink.
    ///
    /// Indices are unbounded u32 counters; `read != write` in modular
    /// arithmetic is the pending condition, so the counters never need a
    /// wrap reset.
    fn drain_input(&mut self) {
        let Some(region) = self.region.as_ref() else {
            return;
        };
        // SAFETY: the ring section is mapped at INPUT_RING_OFFSET for the
        // region's lifetime.
        let ring: &InputRing = unsafe { &*region.as_ptr().add(INPUT_RING_OFFSET).cast() };

        let write = ring.write_idx.load(Ordering::Acquire);
        let mut read = ring.read_idx.load(Ordering::Relaxed);
        if read == write {
            return;
        }

        let mut drained = 0u32;
        while read != write {
            let slot = (read % INPUT_RING_CAPACITY) as usize;
            // SAFETY: slot < capacity; the producer published every slot
            // below `write` before its release store.
            let event = unsafe { ptr::read_volatile(ring.events.as_ptr().add(slot)) };
            match event.decode() {
                Some(GuestInput::MouseRelative { dx, dy }) => self.input.mouse_rel(dx, dy),
                Some(GuestInput::MouseAbsolute { x, y }) => self.input.mouse_abs(x, y),
                Some(GuestInput::Button { button, pressed }) => self.input.button(button, pressed),
                Some(GuestInput::Key { scancode, pressed }) => self.input.key(scancode, pressed),
                None => debug!("dropping unknown input event type {}", event.kind),
            }
            read = read.wrapping_add(1);
            drained += 1;
        }

        if drained > 0 {
            self.input.sync();
            ring.read_idx.store(read, Ordering::Release);
        }
    }
}
