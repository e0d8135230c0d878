//! Getting store bytes and renames onto stable storage.
//!
//! Commits, the file header, tail truncation and compaction all funnel
//! through `sync_file`; compaction's rename goes through `sync_parent`.
//! Both report failures as `StoreError::Io` carrying the affected path.

use std::fs::File;
use std::io;
use std::path::Path;

use crate::error::{StoreError, StoreResult};

/// Flush `file`, the open handle of `path`, to stable storage.
///
/// `context` names the step that needed the flush ("commit", "truncation"...)
/// and ends up in the error message.
pub(crate) fn sync_file(file: &File, path: &Path, context: &str) -> StoreResult<()> {
    flush_to_media(file).map_err(|e| StoreError::io_at(path, &format!("Failed to sync after {}", context), e))
}

/// Persist a rename of `path` by syncing the directory that holds it.
pub(crate) fn sync_parent(path: &Path) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    sync_dir(dir).map_err(|e| StoreError::io_at(dir, "Failed to sync directory", e))
}

// Data only, not metadata: the store file's length is fixed by what was
// appended, and fdatasync still flushes a size change.
#[cfg(target_os = "linux")]
fn flush_to_media(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the fd belongs to a live File for the duration of the call.
    check(unsafe { libc::fdatasync(file.as_raw_fd()) })
}

// fsync() on Apple platforms stops at the drive cache.
#[cfg(any(target_os = "macos", target_os = "ios"))]
fn flush_to_media(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;
    // SAFETY: the fd belongs to a live File for the duration of the call.
    check(unsafe { libc::fcntl(file.as_raw_fd(), libc::F_FULLFSYNC) })
}

#[cfg(target_os = "windows")]
fn flush_to_media(file: &File) -> io::Result<()> {
    use std::os::windows::io::AsRawHandle;
    use winapi::um::fileapi::FlushFileBuffers;
    // SAFETY: the handle belongs to a live File for the duration of the call.
    if unsafe { FlushFileBuffers(file.as_raw_handle() as *mut _) } != 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "ios", target_os = "windows")))]
fn flush_to_media(file: &File) -> io::Result<()> {
    file.sync_data()
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "ios"))]
fn check(result: libc::c_int) -> io::Result<()> {
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

// Directories cannot be opened as files on Windows; NTFS journals renames.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
