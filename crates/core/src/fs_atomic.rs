use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Renames `source` to `target`, failing with `AlreadyExists` instead of
/// replacing an existing `target`.
///
/// Uses the kernel's no-replace rename where there is one, which checks and
/// renames in a single step. Filesystems that reject the flag fall back to an
/// existence check followed by `fs::rename`.
pub fn rename_no_replace(source: &Path, target: &Path) -> io::Result<()> {
    match native_rename_no_replace(source, target) {
        Some(Ok(())) => return Ok(()),
        Some(Err(err)) if !is_unsupported(&err) => return Err(err),
        Some(Err(err)) => {
            debug!(error = %err, "no-replace rename unsupported here, falling back");
        }
        None => {}
    }

    if fs::symlink_metadata(target).is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "target already exists",
        ));
    }
    fs::rename(source, target)
}

/// Whether the current user may create and remove entries in `dir`.
pub fn dir_writable(dir: &Path) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(dir.as_os_str().as_bytes())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        // Safety: `c_path` is a valid NUL-terminated string for the call.
        let ret = unsafe { libc::access(c_path.as_ptr(), libc::W_OK | libc::X_OK) };
        if ret == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EACCES) | Some(libc::EROFS) | Some(libc::EPERM) => Ok(false),
            _ => Err(err),
        }
    }
    #[cfg(not(unix))]
    {
        Ok(!fs::metadata(dir)?.permissions().readonly())
    }
}

fn is_unsupported(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        matches!(
            err.raw_os_error(),
            Some(libc::EINVAL) | Some(libc::ENOSYS) | Some(libc::ENOTSUP)
        )
    }
    #[cfg(not(unix))]
    {
        err.kind() == io::ErrorKind::Unsupported
    }
}

#[cfg(target_os = "linux")]
fn native_rename_no_replace(source: &Path, target: &Path) -> Option<io::Result<()>> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let (Ok(src), Ok(dst)) = (
        CString::new(source.as_os_str().as_bytes()),
        CString::new(target.as_os_str().as_bytes()),
    ) else {
        return Some(Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path contains a NUL byte",
        )));
    };
    // Safety: both pointers come from live CStrings; AT_FDCWD resolves
    // relative paths against the working directory like `fs::rename`.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_renameat2,
            libc::AT_FDCWD,
            src.as_ptr(),
            libc::AT_FDCWD,
            dst.as_ptr(),
            libc::RENAME_NOREPLACE,
        )
    };
    if ret == 0 {
        Some(Ok(()))
    } else {
        Some(Err(io::Error::last_os_error()))
    }
}

#[cfg(target_os = "macos")]
fn native_rename_no_replace(source: &Path, target: &Path) -> Option<io::Result<()>> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let (Ok(src), Ok(dst)) = (
        CString::new(source.as_os_str().as_bytes()),
        CString::new(target.as_os_str().as_bytes()),
    ) else {
        return Some(Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path contains a NUL byte",
        )));
    };
    // Safety: both pointers come from live CStrings.
    let ret = unsafe { libc::renamex_np(src.as_ptr(), dst.as_ptr(), libc::RENAME_EXCL) };
    if ret == 0 {
        Some(Ok(()))
    } else {
        Some(Err(io::Error::last_os_error()))
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn native_rename_no_replace(_source: &Path, _target: &Path) -> Option<io::Result<()>> {
    None
}
