/// Small helpers shared across the jail: fd IO, tiny-file IO, strict
/// decimal parsing, signal and address formatting
use crate::types::JailError;
use nix::sys::signal::Signal;
use nix::sys::socket::{getpeername, SockaddrLike, SockaddrStorage};
use std::fs;
use std::io::ErrorKind;
use std::os::unix::io::RawFd;
use std::path::Path;

/// Read from an fd, retrying on EINTR. Returns the number of bytes read.
pub fn read_fd(fd: RawFd, buf: &mut [u8]) -> std::io::Result<usize> {
    loop {
        let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if n >= 0 {
            return Ok(n as usize);
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

/// Write a whole buffer to an fd, retrying on EINTR and short writes.
pub fn write_fd(fd: RawFd, buf: &[u8]) -> std::io::Result<()> {
    let mut off = 0;
    while off < buf.len() {
        let n = unsafe {
            libc::write(
                fd,
                buf[off..].as_ptr() as *const libc::c_void,
                buf.len() - off,
            )
        };
        if n > 0 {
            off += n as usize;
            continue;
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
    Ok(())
}

/// Write a small control file (sysfs/cgroupfs style) in one shot.
pub fn write_small_file(path: &Path, contents: &str) -> std::io::Result<()> {
    fs::write(path, contents)
}

/// Read a small control file into a string.
pub fn read_small_file(path: &Path) -> std::io::Result<String> {
    fs::read_to_string(path)
}

/// Parse a kernel-reported decimal counter.
///
/// Accepts exactly `[0-9]+` followed by optional whitespace; the value must
/// fit in a non-negative i64. Anything else is rejected: leading signs or
/// garbage, trailing non-whitespace, empty input, and out-of-range values.
pub fn parse_strict_decimal(text: &str) -> Option<i64> {
    let digits = text.trim_end();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<i64>().ok()
}

/// Human-readable signal name, "SIG<n>" for unknown numbers.
pub fn sig_name(sig: i32) -> String {
    match Signal::try_from(sig) {
        Ok(s) => s.to_string(),
        Err(_) => format!("SIG{}", sig),
    }
}

/// Printable peer address of a connected socket plus its binary form.
///
/// Errors are folded into "[unknown]" so logging never fails registration.
pub fn conn_to_text(fd: RawFd) -> (String, Option<SockaddrStorage>) {
    let addr = match getpeername::<SockaddrStorage>(fd) {
        Ok(addr) => addr,
        Err(_) => return ("[unknown]".to_string(), None),
    };
    let txt = if let Some(sin) = addr.as_sockaddr_in() {
        sin.to_string()
    } else if let Some(sin6) = addr.as_sockaddr_in6() {
        sin6.to_string()
    } else if addr.family() == Some(nix::sys::socket::AddressFamily::Unix) {
        "[local]".to_string()
    } else {
        "[unknown]".to_string()
    };
    (txt, Some(addr))
}

/// Quote an argv for log lines.
pub fn quote_args(args: &[String]) -> String {
    args.iter()
        .map(|a| format!("{:?}", a))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Name every known clone flag present in `flags`, appending any unknown
/// residue in hex.
pub fn clone_flags_to_str(flags: u64) -> String {
    const FLAGS: &[(u64, &str)] = &[
        (crate::config::CLONE_NEWTIME, "CLONE_NEWTIME"),
        (libc::CLONE_VM as u64, "CLONE_VM"),
        (libc::CLONE_FS as u64, "CLONE_FS"),
        (libc::CLONE_FILES as u64, "CLONE_FILES"),
        (libc::CLONE_SIGHAND as u64, "CLONE_SIGHAND"),
        (libc::CLONE_PIDFD as u64, "CLONE_PIDFD"),
        (libc::CLONE_PTRACE as u64, "CLONE_PTRACE"),
        (libc::CLONE_VFORK as u64, "CLONE_VFORK"),
        (libc::CLONE_PARENT as u64, "CLONE_PARENT"),
        (libc::CLONE_THREAD as u64, "CLONE_THREAD"),
        (libc::CLONE_NEWNS as u64, "CLONE_NEWNS"),
        (libc::CLONE_SYSVSEM as u64, "CLONE_SYSVSEM"),
        (libc::CLONE_SETTLS as u64, "CLONE_SETTLS"),
        (libc::CLONE_PARENT_SETTID as u64, "CLONE_PARENT_SETTID"),
        (libc::CLONE_CHILD_CLEARTID as u64, "CLONE_CHILD_CLEARTID"),
        (libc::CLONE_DETACHED as u64, "CLONE_DETACHED"),
        (libc::CLONE_UNTRACED as u64, "CLONE_UNTRACED"),
        (libc::CLONE_CHILD_SETTID as u64, "CLONE_CHILD_SETTID"),
        (libc::CLONE_NEWCGROUP as u64, "CLONE_NEWCGROUP"),
        (libc::CLONE_NEWUTS as u64, "CLONE_NEWUTS"),
        (libc::CLONE_NEWIPC as u64, "CLONE_NEWIPC"),
        (libc::CLONE_NEWUSER as u64, "CLONE_NEWUSER"),
        (libc::CLONE_NEWPID as u64, "CLONE_NEWPID"),
        (libc::CLONE_NEWNET as u64, "CLONE_NEWNET"),
        (libc::CLONE_IO as u64, "CLONE_IO"),
        (crate::clone::CLONE_CLEAR_SIGHAND, "CLONE_CLEAR_SIGHAND"),
    ];

    let mut parts = Vec::new();
    let mut known = 0u64;
    for &(flag, name) in FLAGS {
        if flags & flag != 0 {
            parts.push(name.to_string());
        }
        known |= flag;
    }
    if flags & !known != 0 {
        parts.push(format!("{:#x}", flags & !known));
    }
    parts.join("|")
}

/// Map an io error to a cgroup error with path context.
pub fn cgroup_err(what: &str, path: &Path, err: std::io::Error) -> JailError {
    JailError::Cgroup(format!("{} '{}': {}", what, path.display(), err))
}

/// True when a file is absent rather than unreadable.
pub fn is_enoent(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::NotFound
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strict_decimal_accepts_plain_numbers() {
        assert_eq!(parse_strict_decimal("0"), Some(0));
        assert_eq!(parse_strict_decimal("12345\n"), Some(12345));
        assert_eq!(parse_strict_decimal("42   "), Some(42));
        assert_eq!(
            parse_strict_decimal("9223372036854775807"),
            Some(i64::MAX)
        );
    }

    #[test]
    fn test_parse_strict_decimal_rejects_garbage() {
        assert_eq!(parse_strict_decimal(""), None);
        assert_eq!(parse_strict_decimal("   "), None);
        assert_eq!(parse_strict_decimal("-1"), None);
        assert_eq!(parse_strict_decimal("+1"), None);
        assert_eq!(parse_strict_decimal("12x"), None);
        assert_eq!(parse_strict_decimal("x12"), None);
        assert_eq!(parse_strict_decimal("12 7"), None);
        assert_eq!(parse_strict_decimal("0x10"), None);
    }

    #[test]
    fn test_parse_strict_decimal_rejects_out_of_range() {
        // One past i64::MAX
        assert_eq!(parse_strict_decimal("9223372036854775808"), None);
        assert_eq!(parse_strict_decimal("99999999999999999999999"), None);
    }

    #[test]
    fn test_sig_name() {
        assert_eq!(sig_name(libc::SIGKILL), "SIGKILL");
        assert_eq!(sig_name(libc::SIGSYS), "SIGSYS");
        assert_eq!(sig_name(4096), "SIG4096");
    }

    #[test]
    fn test_clone_flags_to_str_names_bits() {
        let s = clone_flags_to_str(libc::CLONE_NEWPID as u64 | libc::CLONE_NEWNET as u64);
        assert!(s.contains("CLONE_NEWPID"));
        assert!(s.contains("CLONE_NEWNET"));
        assert!(!s.contains("CLONE_VM"));
    }

    #[test]
    fn test_clone_flags_to_str_unknown_residue() {
        let s = clone_flags_to_str(1 << 63);
        assert!(s.contains("0x8000000000000000"));
    }

    #[test]
    fn test_fd_roundtrip_through_pipe() {
        use std::os::unix::io::AsRawFd;
        let (r, w) = nix::unistd::pipe().unwrap();
        write_fd(w.as_raw_fd(), b"D").unwrap();
        let mut buf = [0u8; 1];
        assert_eq!(read_fd(r.as_raw_fd(), &mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'D');
    }
}
