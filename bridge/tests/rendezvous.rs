// Copyright 2025 juke Authors
// SPDX-License-Identifier: Apache-2.0

//! Rendezvous handshake tests.
//!
//! These tests play the renderer: bind the UNIX listener, accept the
//! bridge's connection, and receive the region fd from the `SCM_RIGHTS`
//! control message that rides on the single payload byte.

use std::fs::File;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::ptr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use juke_bridge::display::{DisplayChannel, SurfaceRef};
use juke_bridge::host::{InputSink, NullConsole};
use juke_bridge::shm::SharedRegion;
use juke_bridge::transport::Rendezvous;
use juke_protocol::display::DisplayHeader;
use memmap2::MmapMut;

/// Input sink for tests that never receive events.
struct DropSink;

impl InputSink for DropSink {
    fn mouse_rel(&mut self, _dx: i32, _dy: i32) {}
    fn mouse_abs(&mut self, _x: i32, _y: i32) {}
    fn button(&mut self, _button: u8, _pressed: bool) {}
    fn key(&mut self, _scancode: u32, _pressed: bool) {}
    fn sync(&mut self) {}
}

fn socket_path(tag: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("juke-rdv-{}-{tag}.sock", std::process::id()));
    let _ = std::fs::remove_file(&path);
    path
}

/// Receives one payload byte and the fd from its `SCM_RIGHTS` message.
fn recv_fd(stream: &UnixStream) -> io::Result<(u8, File)> {
    let mut byte = 0u8;
    let mut iov = libc::iovec {
        iov_base: (&raw mut byte).cast(),
        iov_len: 1,
    };
    let mut cmsg_buf = [0u64; 8];

    // SAFETY: msghdr points at one valid iovec and an aligned control
    // buffer; the cmsg pointers derived from it stay inside that buffer.
    unsafe {
        let mut msg: libc::msghdr = mem::zeroed();
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = cmsg_buf.as_mut_ptr().cast();
        msg.msg_controllen = libc::CMSG_SPACE(mem::size_of::<RawFd>() as u32) as _;

        let received = libc::recvmsg(stream.as_raw_fd(), &mut msg, 0);
        if received < 0 {
            return Err(io::Error::last_os_error());
        }
        assert_eq!(received, 1, "expected exactly one payload byte");

        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        assert!(!cmsg.is_null(), "missing control message");
        assert_eq!((*cmsg).cmsg_level, libc::SOL_SOCKET);
        assert_eq!((*cmsg).cmsg_type, libc::SCM_RIGHTS);

        let mut fd: RawFd = -1;
        ptr::copy_nonoverlapping(
            libc::CMSG_DATA(cmsg),
            (&raw mut fd).cast::<u8>(),
            mem::size_of::<RawFd>(),
        );
        assert!(fd >= 0, "received an invalid fd");
        Ok((byte, File::from_raw_fd(fd)))
    }
}

#[test]
fn test_fd_handshake_shares_the_region() {
    let path = socket_path("share");
    let listener = UnixListener::bind(&path).unwrap();

    let region = SharedRegion::allocate("juke-rdv-test", 4096).unwrap();
    // SAFETY: offset 100 is inside the 4096-byte mapping.
    unsafe {
        region.as_ptr().add(100).write(0x42);
    }

    let mut transport = Rendezvous::new(&path);
    transport.poll(Some(region.fd().as_raw_fd()));
    assert!(transport.connected());
    assert!(transport.fd_sent());

    let (peer, _addr) = listener.accept().unwrap();
    let (byte, file) = recv_fd(&peer).unwrap();
    assert_eq!(byte, 0);

    // The received fd maps the same memory the bridge writes.
    // SAFETY: mapping a descriptor we own.
    let view = unsafe { MmapMut::map_mut(&file).unwrap() };
    assert_eq!(view.len(), 4096);
    assert_eq!(view[100], 0x42);
    // SAFETY: offset 200 is inside the mapping.
    unsafe {
        region.as_ptr().add(200).write(0x43);
    }
    assert_eq!(view[200], 0x43);

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_handshake_is_idempotent() {
    let path = socket_path("idem");
    let listener = UnixListener::bind(&path).unwrap();
    let region = SharedRegion::allocate("juke-rdv-test", 1024).unwrap();

    let mut transport = Rendezvous::new(&path);
    for _ in 0..5 {
        transport.poll(Some(region.fd().as_raw_fd()));
    }

    let (peer, _addr) = listener.accept().unwrap();
    let (_byte, _file) = recv_fd(&peer).unwrap();

    // No second message: the later polls were no-ops.
    peer.set_read_timeout(Some(Duration::from_millis(100))).unwrap();
    let mut probe = [0u8; 1];
    let err = io::Read::read(&mut (&peer), &mut probe).unwrap_err();
    assert!(
        matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut),
        "unexpected extra traffic: {err}"
    );

    let _ = std::fs::remove_file(&path);
}

#[test]
fn test_display_channel_resends_fd_for_replaced_region() {
    let path = socket_path("resend");
    let listener = UnixListener::bind(&path).unwrap();

    let mut channel = DisplayChannel::new(&path, NullConsole, DropSink);
    let small: Vec<u8> = vec![0x11; 320 * 4 * 240];
    channel.gfx_switch(SurfaceRef {
        width: 320,
        height: 240,
        stride: 320 * 4,
        format: 7,
        data: &small,
    });

    // No peer was connected during the switch; the refresh tick catches up.
    channel.refresh();
    let (peer, _addr) = listener.accept().unwrap();
    let (_byte, file) = recv_fd(&peer).unwrap();
    // SAFETY: mapping a descriptor we own.
    let view = unsafe { MmapMut::map_mut(&file).unwrap() };
    // SAFETY: the region starts with a DisplayHeader.
    let header: &DisplayHeader = unsafe { &*view.as_ptr().cast() };
    assert!(header.validate());
    assert_eq!(header.width, 320);

    // A growing surface replaces the region; the new fd arrives on the
    // already-open stream without waiting for the next refresh.
    let big: Vec<u8> = vec![0x22; 800 * 4 * 600];
    channel.gfx_switch(SurfaceRef {
        width: 800,
        height: 600,
        stride: 800 * 4,
        format: 7,
        data: &big,
    });
    let (_byte, file) = recv_fd(&peer).unwrap();
    // SAFETY: mapping a descriptor we own.
    let view = unsafe { MmapMut::map_mut(&file).unwrap() };
    // SAFETY: the region starts with a DisplayHeader.
    let header: &DisplayHeader = unsafe { &*view.as_ptr().cast() };
    assert_eq!(header.width, 800);
    assert_eq!(header.height, 600);
    assert_eq!(header.frame_counter.load(Ordering::Acquire), 0);

    let _ = std::fs::remove_file(&path);
}
