use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};

/// Per-stream cap on captured child output.
pub const CAPTURE_CAP: usize = 1024 * 1024;

pub fn read_to_end_capped<R: Read>(mut reader: R, cap: usize) -> std::io::Result<(Vec<u8>, bool)> {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 8192];
    let mut truncated = false;

    loop {
        let n = match reader.read(&mut tmp) {
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        if n == 0 {
            break;
        }

        if truncated {
            continue;
        }

        let remaining = cap.saturating_sub(buf.len());
        if n <= remaining {
            buf.extend_from_slice(&tmp[..n]);
        } else {
            buf.extend_from_slice(&tmp[..remaining]);
            truncated = true;
        }
    }

    Ok((buf, truncated))
}

/// Exit code, or `128 + signal` for a signalled child.
pub fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    let exit_signal = {
        use std::os::unix::process::ExitStatusExt as _;
        status.signal()
    };
    #[cfg(not(unix))]
    let exit_signal: Option<i32> = None;

    match status.code() {
        Some(code) => code,
        None => exit_signal.map(|s| 128 + s).unwrap_or(1),
    }
}

pub fn lossy(bytes: &[u8], truncated: bool) -> String {
    let mut s = String::from_utf8_lossy(bytes).into_owned();
    if truncated {
        s.push_str("\n...<truncated>...");
    }
    s
}

/// Creates `<dir>/qit-<pid>-<n>.cpp`, never reusing an existing file.
pub fn create_unique_source(dir: &Path) -> Result<(PathBuf, File)> {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let pid = std::process::id();
    loop {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("qit-{pid}-{n}.cpp"));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err).with_context(|| format!("create source: {}", path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_stops_growing_at_cap() {
        let data = vec![7u8; 20_000];
        let (buf, truncated) = read_to_end_capped(data.as_slice(), 100).expect("read");
        assert_eq!(buf.len(), 100);
        assert!(truncated);

        let (buf, truncated) = read_to_end_capped(&b"abc"[..], 100).expect("read");
        assert_eq!(buf, b"abc");
        assert!(!truncated);
    }

    #[test]
    fn unique_sources_do_not_collide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (a, _) = create_unique_source(dir.path()).expect("first");
        let (b, _) = create_unique_source(dir.path()).expect("second");
        assert_ne!(a, b);
        assert!(a.extension().is_some_and(|e| e == "cpp"));
    }

    #[cfg(unix)]
    #[test]
    fn signals_map_above_128() {
        use std::os::unix::process::ExitStatusExt as _;
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
        assert_eq!(exit_code(ExitStatus::from_raw(2 << 8)), 2);
    }
}
