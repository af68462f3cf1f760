//! Child-side bootstrap
//!
//! Runs in the freshly cloned process (or in place, for standalone mode)
//! and carries it from a raw clone to the target program: stdio, signal
//! state, the parent handshake, containment, environment, seccomp, exec.
//! Seccomp is installed last; after it many syscalls are gone.

use crate::cgroup::CgroupController;
use crate::clone::raw_getpid;
use crate::config::JailConfig;
use crate::hooks::Collaborators;
use crate::supervisor::HANDSHAKE_READY;
use crate::types::{JailError, Result};
use crate::util;
use nix::sys::signal::{sigaction, sigprocmask, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::signal::SigmaskHow;
use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;

/// Signals whose dispositions the supervisor touches; the child resets
/// exactly these before doing anything else.
const MANAGED_SIGNALS: &[Signal] = &[
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGUSR1,
    Signal::SIGALRM,
    Signal::SIGCHLD,
    Signal::SIGTERM,
    Signal::SIGPIPE,
];

/// Put every managed signal back to SIG_DFL and empty the signal mask.
/// clone3 with CLONE_CLEAR_SIGHAND already delivers default dispositions,
/// but the mask is inherited either way and the legacy clone path resets
/// nothing.
fn reset_signals() -> Result<()> {
    let dfl = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for &sig in MANAGED_SIGNALS {
        unsafe { sigaction(sig, &dfl) }
            .map_err(|e| JailError::Process(format!("sigaction({}, SIG_DFL): {}", sig, e)))?;
    }
    sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None)
        .map_err(|e| JailError::Process(format!("sigprocmask(SIG_SETMASK, empty): {}", e)))?;
    Ok(())
}

fn cstring(text: &str) -> Result<CString> {
    CString::new(text)
        .map_err(|_| JailError::Config(format!("string contains a NUL byte: {:?}", text)))
}

/// Final environment for the payload: optionally the inherited host
/// environment, then the configured KEY=VALUE pairs, later keys replacing
/// earlier ones.
fn build_env(cfg: &JailConfig) -> Result<Vec<CString>> {
    let mut entries: Vec<String> = Vec::new();
    if cfg.keep_env {
        for (key, value) in std::env::vars() {
            entries.push(format!("{}={}", key, value));
        }
    }
    for env in &cfg.envs {
        let key = env.split('=').next().unwrap_or(env.as_str());
        entries.retain(|e| e.split('=').next() != Some(key));
        entries.push(env.clone());
    }
    entries.iter().map(|e| cstring(e)).collect()
}

fn build_argv(cfg: &JailConfig) -> Result<Vec<CString>> {
    cfg.argv.iter().map(|a| cstring(a)).collect()
}

fn exec_payload(cfg: &JailConfig, argv: &[CString], envp: &[CString]) -> JailError {
    if cfg.use_execveat {
        let fd = match cfg.exec_fd {
            Some(fd) => fd,
            None => {
                return JailError::Exec("use_execveat is set but no exec fd was supplied".to_string())
            }
        };
        let mut argv_ptrs: Vec<*const libc::c_char> =
            argv.iter().map(|a| a.as_ptr()).collect();
        argv_ptrs.push(std::ptr::null());
        let mut envp_ptrs: Vec<*const libc::c_char> =
            envp.iter().map(|e| e.as_ptr()).collect();
        envp_ptrs.push(std::ptr::null());
        let empty = [0 as libc::c_char];
        unsafe {
            libc::syscall(
                libc::SYS_execveat,
                fd,
                empty.as_ptr(),
                argv_ptrs.as_ptr(),
                envp_ptrs.as_ptr(),
                libc::AT_EMPTY_PATH,
            );
        }
        JailError::Exec(format!(
            "execveat(fd={}) failed: {}",
            fd,
            std::io::Error::last_os_error()
        ))
    } else {
        let path = match CString::new(cfg.exec_file.as_os_str().as_bytes()) {
            Ok(path) => path,
            Err(_) => return JailError::Config("exec path contains a NUL byte".to_string()),
        };
        match nix::unistd::execve(&path, argv, envp) {
            Ok(_) => unreachable!("execve returned without error"),
            Err(e) => JailError::Exec(format!(
                "execve('{}') failed: {}",
                cfg.exec_file.display(),
                e
            )),
        }
    }
}

/// Bootstrap the current process into the jailed payload.
///
/// With a handshake fd this is the cloned-child path: it blocks until the
/// parent reports the namespaces ready. Without one (standalone mode) the
/// process does its own user-namespace and cgroup setup. On success this
/// never returns; every error return means "abort before exec".
pub fn run_child(
    cfg: &JailConfig,
    collab: &Collaborators,
    cgroup: &dyn CgroupController,
    netfd: RawFd,
    fd_in: RawFd,
    fd_out: RawFd,
    fd_err: RawFd,
    handshake: Option<RawFd>,
) -> Result<()> {
    collab.contain.setup_stdio(cfg, fd_in, fd_out, fd_err)?;
    reset_signals()?;

    match handshake {
        Some(fd) => {
            let mut byte = [0u8; 1];
            let n = util::read_fd(fd, &mut byte)
                .map_err(|e| JailError::Process(format!("handshake read failed: {}", e)))?;
            if n != 1 || byte[0] != HANDSHAKE_READY {
                return Err(JailError::Process(
                    "parent aborted before signalling namespace readiness".to_string(),
                ));
            }
        }
        None => {
            // Nobody on the other side; do the parent's share ourselves.
            let pid = raw_getpid();
            collab.user.init_ns_from_parent(cfg, pid)?;
            cgroup.init_child(cfg, pid)?;
        }
    }

    collab.contain.contain_proc(cfg)?;

    let argv = build_argv(cfg)?;
    let envp = build_env(cfg)?;
    let (remote, _) = util::conn_to_text(netfd);
    log::info!(
        "executing '{}' for '{}'",
        cfg.exec_file.display(),
        remote
    );
    log::debug!(
        "exec: '{}', args: [{}]",
        cfg.exec_file.display(),
        util::quote_args(&cfg.argv)
    );

    collab.seccomp.apply_policy(cfg)?;

    Err(exec_payload(cfg, &argv, &envp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_env_empty_without_keep_env() {
        let cfg = JailConfig::default();
        assert!(build_env(&cfg).unwrap().is_empty());
    }

    #[test]
    fn test_build_env_applies_pairs() {
        let cfg = JailConfig {
            envs: vec!["A=1".to_string(), "B=two".to_string()],
            ..Default::default()
        };
        let env = build_env(&cfg).unwrap();
        let strs: Vec<&str> = env.iter().map(|e| e.to_str().unwrap()).collect();
        assert_eq!(strs, vec!["A=1", "B=two"]);
    }

    #[test]
    fn test_build_env_keep_env_inherits_then_overrides() {
        std::env::set_var("PROCJAIL_TEST_MARKER", "host");
        let cfg = JailConfig {
            keep_env: true,
            envs: vec!["PROCJAIL_TEST_MARKER=jail".to_string()],
            ..Default::default()
        };
        let env = build_env(&cfg).unwrap();
        let strs: Vec<&str> = env.iter().map(|e| e.to_str().unwrap()).collect();
        assert!(strs.contains(&"PROCJAIL_TEST_MARKER=jail"));
        assert!(!strs.contains(&"PROCJAIL_TEST_MARKER=host"));
        std::env::remove_var("PROCJAIL_TEST_MARKER");
    }

    #[test]
    fn test_build_env_rejects_nul() {
        let cfg = JailConfig {
            envs: vec!["A=\0".to_string()],
            ..Default::default()
        };
        assert!(build_env(&cfg).is_err());
    }

    #[test]
    fn test_exec_payload_fails_without_fd() {
        let cfg = JailConfig {
            use_execveat: true,
            exec_fd: None,
            ..Default::default()
        };
        let err = exec_payload(&cfg, &[], &[]);
        assert!(err.to_string().contains("no exec fd"));
    }
}
