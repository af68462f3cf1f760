//! Pluggable collaborator seams
//!
//! The supervisor core drives namespace plumbing, containment, and seccomp
//! through these traits; concrete policy lives behind them. The bundled
//! defaults pass everything through so the jail runs with minimal isolation
//! out of the box.

use crate::config::JailConfig;
use crate::types::{JailError, Result};
use nix::unistd::Pid;
use std::os::unix::io::RawFd;

/// Parent-side network plumbing for a freshly cloned child
pub trait NetworkHook {
    /// Set up the child's network namespace view (veth, addresses, routes).
    fn init_ns_from_parent(&self, cfg: &JailConfig, pid: Pid) -> Result<()>;

    /// Admission control for an incoming connection. Returning false
    /// rejects the connection without spawning anything.
    fn limit_conns(&self, cfg: &JailConfig, netfd: RawFd) -> bool;
}

/// Parent-side uid/gid mapping for the child's user namespace
pub trait UserHook {
    fn init_ns_from_parent(&self, cfg: &JailConfig, pid: Pid) -> Result<()>;
}

/// Child-side stdio installation and filesystem/credential containment
pub trait ContainHook {
    /// Install the supplied descriptors on fds 0/1/2.
    fn setup_stdio(&self, cfg: &JailConfig, fd_in: RawFd, fd_out: RawFd, fd_err: RawFd)
        -> Result<()>;

    /// Chroot/pivot_root, mounts, caps, rlimits, personality, hostname.
    fn contain_proc(&self, cfg: &JailConfig) -> Result<()>;
}

/// Child-side syscall policy; installed last, right before exec
pub trait SeccompHook {
    fn apply_policy(&self, cfg: &JailConfig) -> Result<()>;
}

/// The collaborator bundle consumed by the supervisor
pub struct Collaborators {
    pub net: Box<dyn NetworkHook>,
    pub user: Box<dyn UserHook>,
    pub contain: Box<dyn ContainHook>,
    pub seccomp: Box<dyn SeccompHook>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            net: Box::new(PassthroughNet),
            user: Box::new(PassthroughUser),
            contain: Box::new(StdioOnlyContain),
            seccomp: Box::new(NoSeccompPolicy),
        }
    }
}

/// No veth plumbing, every connection admitted
pub struct PassthroughNet;

impl NetworkHook for PassthroughNet {
    fn init_ns_from_parent(&self, _cfg: &JailConfig, _pid: Pid) -> Result<()> {
        Ok(())
    }

    fn limit_conns(&self, _cfg: &JailConfig, _netfd: RawFd) -> bool {
        true
    }
}

/// Leaves uid/gid maps to the kernel defaults
pub struct PassthroughUser;

impl UserHook for PassthroughUser {
    fn init_ns_from_parent(&self, _cfg: &JailConfig, _pid: Pid) -> Result<()> {
        Ok(())
    }
}

/// Installs stdio but performs no filesystem containment
pub struct StdioOnlyContain;

impl ContainHook for StdioOnlyContain {
    fn setup_stdio(
        &self,
        _cfg: &JailConfig,
        fd_in: RawFd,
        fd_out: RawFd,
        fd_err: RawFd,
    ) -> Result<()> {
        for (src, dst) in [
            (fd_in, libc::STDIN_FILENO),
            (fd_out, libc::STDOUT_FILENO),
            (fd_err, libc::STDERR_FILENO),
        ] {
            if src == dst || src < 0 {
                continue;
            }
            if unsafe { libc::dup2(src, dst) } == -1 {
                return Err(JailError::Process(format!(
                    "dup2({}, {}) failed: {}",
                    src,
                    dst,
                    std::io::Error::last_os_error()
                )));
            }
        }
        Ok(())
    }

    fn contain_proc(&self, _cfg: &JailConfig) -> Result<()> {
        Ok(())
    }
}

/// No syscall filter
pub struct NoSeccompPolicy;

impl SeccompHook for NoSeccompPolicy {
    fn apply_policy(&self, _cfg: &JailConfig) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_collaborators_admit_everything() {
        let collab = Collaborators::default();
        let cfg = JailConfig::default();
        assert!(collab.net.limit_conns(&cfg, 0));
        assert!(collab.net.init_ns_from_parent(&cfg, Pid::from_raw(1)).is_ok());
        assert!(collab.user.init_ns_from_parent(&cfg, Pid::from_raw(1)).is_ok());
        assert!(collab.contain.contain_proc(&cfg).is_ok());
        assert!(collab.seccomp.apply_policy(&cfg).is_ok());
    }

    #[test]
    fn test_stdio_setup_skips_identity_and_closed_fds() {
        let collab = Collaborators::default();
        let cfg = JailConfig::default();
        // Identity mapping and -1 placeholders must be no-ops.
        assert!(collab.contain.setup_stdio(&cfg, 0, 1, 2).is_ok());
        assert!(collab.contain.setup_stdio(&cfg, -1, -1, -1).is_ok());
    }
}
