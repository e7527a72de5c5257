//! Best-effort metadata copy at export completion
//!
//! Copies timestamps and extended attributes from the (possibly
//! snapshotted) input descriptor to the output descriptor after a
//! successful transfer. Every failure here is non-fatal; the transfer
//! result is already decided by the time these run.

use std::fs::File;
use std::io;
use std::os::unix::io::{AsRawFd, BorrowedFd};

/// Copy access and modification times from `src` to `dst`
pub fn copy_times(src: &File, dst: BorrowedFd<'_>) -> io::Result<()> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(src.as_raw_fd(), &mut st) } < 0 {
        return Err(io::Error::last_os_error());
    }

    let times = [
        libc::timespec {
            tv_sec: st.st_atime,
            tv_nsec: st.st_atime_nsec,
        },
        libc::timespec {
            tv_sec: st.st_mtime,
            tv_nsec: st.st_mtime_nsec,
        },
    ];

    if unsafe { libc::futimens(dst.as_raw_fd(), times.as_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Copy extended attributes from `src` to `dst`
///
/// Attributes that cannot be read or written are skipped individually;
/// only a failure to enumerate them at all is reported.
#[cfg(target_os = "linux")]
pub fn copy_xattrs(src: &File, dst: BorrowedFd<'_>) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use xattr::FileExt;

    for name in src.list_xattr()? {
        let value = match src.get_xattr(&name) {
            Ok(Some(value)) => value,
            _ => continue,
        };
        let cname = match CString::new(name.as_bytes()) {
            Ok(cname) => cname,
            Err(_) => continue,
        };
        let _ = unsafe {
            libc::fsetxattr(
                dst.as_raw_fd(),
                cname.as_ptr(),
                value.as_ptr() as *const libc::c_void,
                value.len(),
                0,
            )
        };
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn copy_xattrs(_src: &File, _dst: BorrowedFd<'_>) -> io::Result<()> {
    Ok(())
}
