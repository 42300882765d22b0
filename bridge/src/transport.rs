// Copyright 2025 juke Authors
// SPDX-License-Identifier: Apache-2.0

//! Rendezvous transport.
//!
//! A UNIX stream socket used for exactly one thing: handing the renderer the
//! shared-region fd via `SCM_RIGHTS` ancillary data. The renderer is the
//! server; this side connects lazily and retries forever, since the renderer
//! may not be up yet. After the fd is across, the socket sits idle.

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::ptr;

use log::{debug, info, warn};

#[cfg(target_os = "linux")]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: libc::c_int = 0;

/// Rendezvous client for one channel.
pub struct Rendezvous {
    path: PathBuf,
    stream: Option<UnixStream>,
    fd_sent: bool,
    send_warned: bool,
}

impl Rendezvous {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Rendezvous {
            path: path.into(),
            stream: None,
            fd_sent: false,
            send_warned: false,
        }
    }

    /// The configured socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Whether the current region's fd has reached the renderer.
    pub fn fd_sent(&self) -> bool {
        self.fd_sent
    }

    /// Forget the previously shared fd. Called when the region is replaced
    /// so the next poll sends the new fd.
    pub fn mark_region_replaced(&mut self) {
        self.fd_sent = false;
    }

    /// Connect if needed and share the region fd once.
    ///
    /// All failures are swallowed: a missing server is the normal state
    /// until the renderer starts, and a failed send drops the stream so a
    /// later poll reconnects and re-sends to the new peer.
    pub fn poll(&mut self, fd: Option<RawFd>) {
        if self.stream.is_none() {
            match UnixStream::connect(&self.path) {
                Ok(stream) => {
                    info!("renderer connected on {}", self.path.display());
                    self.stream = Some(stream);
                    self.send_warned = false;
                }
                Err(e) => {
                    debug!("renderer not reachable on {}: {e}", self.path.display());
                    return;
                }
            }
        }

        if self.fd_sent {
            return;
        }
        let Some(fd) = fd else { return };
        let Some(stream) = self.stream.as_ref() else {
            return;
        };

        match send_fd(stream, fd) {
            Ok(()) => {
                debug!("region fd sent on {}", self.path.display());
                self.fd_sent = true;
            }
            Err(e) => {
                if !self.send_warned {
                    warn!("failed to send region fd on {}: {e}", self.path.display());
                    self.send_warned = true;
                }
                // Peer is gone; reconnect and re-send on a later poll.
                self.stream = None;
                self.fd_sent = false;
            }
        }
    }

    /// Drop the connection and forget the handshake state.
    pub fn close(&mut self) {
        self.stream = None;
        self.fd_sent = false;
    }
}

/// Sends one dummy payload byte carrying `fd` as `SCM_RIGHTS` ancillary
/// data. The payload byte matters: some kernels refuse control messages on
/// zero-length sends.
fn send_fd(stream: &UnixStream, fd: RawFd) -> io::Result<()> {
    let payload = [0u8; 1];
    let mut iov = libc::iovec {
        iov_base: payload.as_ptr() as *mut libc::c_void,
        iov_len: payload.len(),
    };
    // Room for one descriptor, aligned for cmsghdr.
    let mut cmsg_buf = [0u64; 8];

    // SAFETY: msghdr points at one valid iovec and a control buffer large
    // enough for CMSG_SPACE(sizeof(int)); the cmsg pointers derived from it
    // stay inside that buffer.
    unsafe {
        let mut msg: libc::msghdr = mem::zeroed();
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = cmsg_buf.as_mut_ptr().cast();
        msg.msg_controllen = libc::CMSG_SPACE(mem::size_of::<RawFd>() as u32) as _;

        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN(mem::size_of::<RawFd>() as u32) as _;
        ptr::copy_nonoverlapping(
            (&raw const fd).cast::<u8>(),
            libc::CMSG_DATA(cmsg),
            mem::size_of::<RawFd>(),
        );

        if libc::sendmsg(stream.as_raw_fd(), &msg, SEND_FLAGS) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
