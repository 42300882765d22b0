// Copyright 2025 juke Authors
// SPDX-License-Identifier: Apache-2.0

//! Refresh-rate probe.
//!
//! Picks the poll interval for the display refresh callback from the host's
//! active display mode. The framework default of ~30 ms caps updates at
//! ~33 fps; matching the panel without overshooting it is the goal here.

use std::time::Duration;

use log::info;

/// Fallback interval when no mode can be probed (~120 Hz).
pub const FALLBACK_POLL_MS: u64 = 8;

/// Probed intervals must be strictly below this to be trusted.
pub const MAX_POLL_MS: u64 = 100;

/// Chooses the display poll interval.
///
/// The host registers this with its refresh scheduler once at startup.
pub fn poll_interval() -> Duration {
    let ms = match probe_interval_ms() {
        Some(ms) if ms > 0 && ms < MAX_POLL_MS => {
            info!("display poll interval {ms} ms (probed)");
            ms
        }
        _ => {
            info!("display poll interval {FALLBACK_POLL_MS} ms (fallback)");
            FALLBACK_POLL_MS
        }
    };
    Duration::from_millis(ms)
}

#[cfg(target_os = "linux")]
fn probe_interval_ms() -> Option<u64> {
    drm::fastest_interval_ms()
}

/// Stub probe for hosts without a supported mode query; callers fall back to
/// [`FALLBACK_POLL_MS`].
#[cfg(not(target_os = "linux"))]
fn probe_interval_ms() -> Option<u64> {
    None
}

/// Minimal KMS mode query: enumerate `/dev/dri/card*`, read each card's CRTC
/// list, and derive the refresh period from the active mode timings.
#[cfg(target_os = "linux")]
mod drm {
    use std::fs::{self, File};
    use std::io;
    use std::mem;
    use std::os::fd::{AsRawFd, RawFd};
    use std::path::{Path, PathBuf};

    use log::debug;

    // Kernel ABI from drm_mode.h; only the fields the probe touches are
    // meaningful here, but sizes must match for the ioctls to be accepted.
    #[repr(C)]
    #[derive(Clone, Copy, Default)]
    struct DrmModeCardRes {
        fb_id_ptr: u64,
        crtc_id_ptr: u64,
        connector_id_ptr: u64,
        encoder_id_ptr: u64,
        count_fbs: u32,
        count_crtcs: u32,
        count_connectors: u32,
        count_encoders: u32,
        min_width: u32,
        max_width: u32,
        min_height: u32,
        max_height: u32,
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct DrmModeModeinfo {
        clock: u32,
        hdisplay: u16,
        hsync_start: u16,
        hsync_end: u16,
        htotal: u16,
        hskew: u16,
        vdisplay: u16,
        vsync_start: u16,
        vsync_end: u16,
        vtotal: u16,
        vscan: u16,
        vrefresh: u32,
        flags: u32,
        mode_type: u32,
        name: [u8; 32],
    }

    #[repr(C)]
    #[derive(Clone, Copy)]
    struct DrmModeCrtc {
        set_connectors_ptr: u64,
        count_connectors: u32,
        crtc_id: u32,
        fb_id: u32,
        x: u32,
        y: u32,
        gamma_size: u32,
        mode_valid: u32,
        mode: DrmModeModeinfo,
    }

    const _: () = assert!(mem::size_of::<DrmModeModeinfo>() == 68);
    const _: () = assert!(mem::size_of::<DrmModeCrtc>() == 104);
    const _: () = assert!(mem::size_of::<DrmModeCardRes>() == 64);

    // _IOWR('d', nr, size)
    const fn drm_iowr(nr: libc::c_ulong, size: usize) -> libc::c_ulong {
        (3 << 30) | ((size as libc::c_ulong) << 16) | (0x64 << 8) | nr
    }

    const DRM_IOCTL_MODE_GETRESOURCES: libc::c_ulong =
        drm_iowr(0xA0, mem::size_of::<DrmModeCardRes>());
    const DRM_IOCTL_MODE_GETCRTC: libc::c_ulong = drm_iowr(0xA1, mem::size_of::<DrmModeCrtc>());

    fn mode_ioctl<T>(fd: RawFd, request: libc::c_ulong, arg: &mut T) -> io::Result<()> {
        // SAFETY: `arg` is the kernel ABI struct matching `request`, sized
        // into the ioctl number above.
        let rc = unsafe { libc::ioctl(fd, request, arg as *mut T) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Smallest refresh period across the first card that reports an active
    /// CRTC mode, in whole milliseconds.
    pub(super) fn fastest_interval_ms() -> Option<u64> {
        let mut cards: Vec<PathBuf> = fs::read_dir("/dev/dri")
            .ok()?
            .flatten()
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with("card"))
            })
            .map(|entry| entry.path())
            .collect();
        cards.sort();

        for card in cards {
            match card_interval_ms(&card) {
                Ok(Some(ms)) => {
                    debug!("{}: refresh period {ms} ms", card.display());
                    return Some(ms);
                }
                Ok(None) => {}
                Err(e) => debug!("{}: mode query failed: {e}", card.display()),
            }
        }
        None
    }

    fn card_interval_ms(path: &Path) -> io::Result<Option<u64>> {
        let file = File::open(path)?;
        let fd = file.as_raw_fd();

        // First pass reports the counts, second pass fills the id array.
        let mut res = DrmModeCardRes::default();
        mode_ioctl(fd, DRM_IOCTL_MODE_GETRESOURCES, &mut res)?;
        if res.count_crtcs == 0 {
            return Ok(None);
        }

        let mut crtc_ids = vec![0u32; res.count_crtcs as usize];
        let mut res = DrmModeCardRes {
            crtc_id_ptr: crtc_ids.as_mut_ptr() as u64,
            count_crtcs: crtc_ids.len() as u32,
            ..Default::default()
        };
        mode_ioctl(fd, DRM_IOCTL_MODE_GETRESOURCES, &mut res)?;
        let count = res.count_crtcs.min(crtc_ids.len() as u32) as usize;

        let mut best: Option<u64> = None;
        for &crtc_id in &crtc_ids[..count] {
            // SAFETY: DrmModeCrtc is plain old data; zeroed is a valid value.
            let mut crtc: DrmModeCrtc = unsafe { mem::zeroed() };
            crtc.crtc_id = crtc_id;
            if mode_ioctl(fd, DRM_IOCTL_MODE_GETCRTC, &mut crtc).is_err() {
                continue;
            }
            if crtc.mode_valid == 0 {
                continue;
            }
            let denom = u64::from(crtc.mode.htotal) * u64::from(crtc.mode.vtotal);
            if denom == 0 {
                continue;
            }
            let hz = u64::from(crtc.mode.clock) * 1000 / denom;
            if hz == 0 {
                continue;
            }
            let ms = 1000 / hz;
            if ms == 0 {
                continue;
            }
            best = Some(best.map_or(ms, |b| b.min(ms)));
        }
        Ok(best)
    }
}
