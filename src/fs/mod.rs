//! Descriptor-level filesystem operations
//!
//! Raw syscall wrappers the export engine is built on: non-blocking mode
//! control, the copy-on-write and zero-copy fast paths, snapshot
//! acquisition, and best-effort metadata copying.

pub mod metadata;
pub mod snapshot;
pub mod zerocopy;

pub use metadata::{copy_times, copy_xattrs};
pub use snapshot::reflink_snapshot;
pub use zerocopy::{reflink, sendfile_chunk, TRANSFER_CHUNK};

use std::io;
use std::os::unix::io::{AsRawFd, BorrowedFd};

/// Put a descriptor into non-blocking mode
pub fn set_nonblocking(fd: BorrowedFd<'_>) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    if flags & libc::O_NONBLOCK != 0 {
        return Ok(());
    }
    let rc = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// One non-blocking `write(2)` on a descriptor
///
/// `EAGAIN` surfaces as `ErrorKind::WouldBlock`; partial writes are normal.
pub fn write_nonblocking(fd: BorrowedFd<'_>, buf: &[u8]) -> io::Result<usize> {
    let n = unsafe {
        libc::write(
            fd.as_raw_fd(),
            buf.as_ptr() as *const libc::c_void,
            buf.len(),
        )
    };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsFd;

    #[test]
    fn test_set_nonblocking_sets_the_flag() {
        let file = tempfile::tempfile().unwrap();
        set_nonblocking(file.as_fd()).unwrap();

        let flags = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GETFL) };
        assert!(flags >= 0);
        assert_ne!(flags & libc::O_NONBLOCK, 0);

        // Idempotent on a descriptor that is already non-blocking
        set_nonblocking(file.as_fd()).unwrap();
    }

    #[test]
    fn test_write_nonblocking_to_file() {
        let file = tempfile::tempfile().unwrap();
        set_nonblocking(file.as_fd()).unwrap();

        let n = write_nonblocking(file.as_fd(), b"payload").unwrap();
        assert_eq!(n, 7);
    }
}
