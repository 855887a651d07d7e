// Licensed under the Apache-2.0 license

//! The `user.is_encrypted` extended attribute marking files encrypted in place.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

pub const ENCRYPTED_XATTR: &str = "user.is_encrypted";

fn c_path(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn c_name() -> CString {
    CString::new(ENCRYPTED_XATTR).unwrap_or_default()
}

/// Sets the marker to a single `1` byte.
pub fn mark_encrypted(path: &Path) -> io::Result<()> {
    let path = c_path(path)?;
    let name = c_name();
    let value = [1u8];
    // SAFETY: both strings are NUL terminated and `value` outlives the call.
    let rc = unsafe {
        libc::setxattr(
            path.as_ptr(),
            name.as_ptr(),
            value.as_ptr() as *const libc::c_void,
            value.len(),
            0,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Whether the marker is present and set. Files on filesystems without user
/// attributes are never encrypted.
pub fn is_encrypted(path: &Path) -> bool {
    let Ok(path) = c_path(path) else {
        return false;
    };
    let name = c_name();
    let mut value = [0u8; 1];
    // SAFETY: both strings are NUL terminated and `value` is writable for its
    // full length.
    let len = unsafe {
        libc::getxattr(
            path.as_ptr(),
            name.as_ptr(),
            value.as_mut_ptr() as *mut libc::c_void,
            value.len(),
        )
    };
    len == 1 && value[0] != 0
}
