// Copyright 2025 juke Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared region allocation.
//!
//! Wraps the host's anonymous memory-backed fd primitive and keeps the fd
//! and the read-write mapping together for the lifetime of a region. The fd
//! is what the rendezvous transport hands to the renderer.

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, BorrowedFd, FromRawFd};

use memmap2::MmapMut;

/// An anonymous memory-backed region shared with the renderer.
///
/// Dropping the region unmaps it and closes the fd.
pub struct SharedRegion {
    // Held for the mapping lifetime; field order keeps the map dropped first.
    map: MmapMut,
    file: File,
    base: *mut u8,
}

// SAFETY: the region owns its mapping and fd; the base pointer is valid for
// the mapping lifetime and all cross-process access goes through atomics.
unsafe impl Send for SharedRegion {}

impl SharedRegion {
    /// Allocates a zero-filled region of `len` bytes. `name` is advisory and
    /// only shows up in host debugging tools.
    pub fn allocate(name: &str, len: usize) -> io::Result<Self> {
        let file = create_backing(name, len)?;
        // SAFETY: `file` is a fresh descriptor sized to `len`; no other
        // mapping of it exists yet in this process.
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        let base = map.as_mut_ptr();
        Ok(SharedRegion { map, file, base })
    }

    /// Region length in bytes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.len() == 0
    }

    /// Base of the mapping. Writes through this pointer are visible to the
    /// renderer subject to the release/acquire protocol of each section.
    pub fn as_ptr(&self) -> *mut u8 {
        self.base
    }

    /// The fd to hand to the renderer.
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

#[cfg(target_os = "linux")]
fn create_backing(name: &str, len: usize) -> io::Result<File> {
    let cname = CString::new(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: `cname` is a valid nul-terminated string.
    let fd = unsafe { libc::memfd_create(cname.as_ptr(), libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: memfd_create returned a fresh owned descriptor.
    let file = unsafe { File::from_raw_fd(fd) };
    file.set_len(len as u64)?;
    Ok(file)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn create_backing(name: &str, len: usize) -> io::Result<File> {
    // No memfd here: open a uniquely named POSIX shm object and unlink it
    // right away so only the fd keeps it alive.
    let unique = format!("/{}.{}", name, std::process::id());
    let cname = CString::new(unique).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: `cname` is a valid nul-terminated string.
    let fd = unsafe {
        libc::shm_open(
            cname.as_ptr(),
            libc::O_RDWR | libc::O_CREAT | libc::O_EXCL,
            0o600,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: unlinking the just-created name; the fd stays valid.
    unsafe {
        libc::shm_unlink(cname.as_ptr());
    }
    // SAFETY: shm_open returned a fresh owned descriptor.
    let file = unsafe { File::from_raw_fd(fd) };
    file.set_len(len as u64)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsRawFd;

    use super::*;

    #[test]
    fn test_allocate_zero_filled() {
        let region = SharedRegion::allocate("juke-test", 4096).unwrap();
        assert_eq!(region.len(), 4096);
        assert!(!region.is_empty());
        assert!(region.fd().as_raw_fd() >= 0);

        // SAFETY: the region is 4096 bytes long and freshly mapped.
        let bytes = unsafe { std::slice::from_raw_parts(region.as_ptr(), region.len()) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_writes_land_in_backing_file() {
        let region = SharedRegion::allocate("juke-test", 128).unwrap();
        // SAFETY: offset 7 is inside the 128-byte mapping.
        unsafe {
            region.as_ptr().add(7).write(0xAB);
        }

        // Read back through the fd the renderer would receive.
        let dup = region.fd().try_clone_to_owned().unwrap();
        let file = File::from(dup);
        // SAFETY: mapping a descriptor we own.
        let view = unsafe { MmapMut::map_mut(&file).unwrap() };
        assert_eq!(view[7], 0xAB);
    }
}
