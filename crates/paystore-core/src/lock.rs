//! Exclusive advisory lock that keeps a store file to one live handle.

use std::fs::File;
use std::path::Path;

use crate::error::{StoreError, StoreResult};

/// Take a non-blocking exclusive lock on `file`.
///
/// The lock belongs to the open file description and is released when the
/// `File` is dropped. A second handle on the same path, in this process or
/// another, fails with `StoreError::Locked`.
#[cfg(unix)]
pub(crate) fn lock_exclusive(file: &File, path: &Path) -> StoreResult<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: flock operates on a valid fd obtained from a live File.
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::WouldBlock {
        Err(StoreError::Locked { path: path.to_path_buf() })
    } else {
        Err(StoreError::io_at(path, "Failed to lock store file", err))
    }
}

/// Non-unix targets rely on the single-process contract; no advisory lock is taken.
#[cfg(not(unix))]
pub(crate) fn lock_exclusive(_file: &File, _path: &Path) -> StoreResult<()> {
    Ok(())
}
