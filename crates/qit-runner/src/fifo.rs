//! Named pipes: creation, non-blocking opens and readiness polling.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

pub fn make_fifo(path: &Path) -> Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .with_context(|| format!("fifo path contains NUL: {}", path.display()))?;
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error())
            .with_context(|| format!("mkfifo: {}", path.display()));
    }
    log::debug!("created fifo {}", path.display());
    Ok(())
}

/// Opens the read end without waiting for a writer.
pub fn open_nonblocking_reader(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .with_context(|| format!("open fifo for reading: {}", path.display()))
}

pub fn clear_nonblocking(file: &File) -> Result<()> {
    let fd = file.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(std::io::Error::last_os_error()).context("fcntl(F_GETFL)");
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) } < 0 {
        return Err(std::io::Error::last_os_error()).context("fcntl(F_SETFL)");
    }
    Ok(())
}

/// True when `file` has data or hang-up pending. An interrupted wait counts
/// as not ready.
pub fn poll_readable(file: &File, timeout: Duration) -> std::io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    Ok(rc > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn fifo_round_trips_through_nonblocking_reader() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pipe");
        make_fifo(&path).expect("mkfifo");
        assert!(make_fifo(&path).is_err());

        let reader = open_nonblocking_reader(&path).expect("open reader");
        assert!(!poll_readable(&reader, Duration::from_millis(10)).expect("poll"));

        let mut writer = OpenOptions::new().write(true).open(&path).expect("open writer");
        writer.write_all(b"hello").expect("write");
        drop(writer);

        assert!(poll_readable(&reader, Duration::from_millis(1000)).expect("poll"));
        clear_nonblocking(&reader).expect("clear nonblocking");
        let mut buf = String::new();
        (&reader).read_to_string(&mut buf).expect("read");
        assert_eq!(buf, "hello");
    }
}
