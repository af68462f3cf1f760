//! Namespace-aware process creation
//!
//! Wraps clone3 with a legacy-clone fallback. Runtime PID/TID caches are
//! stale in the child after a raw clone, so child-side code must not trust
//! `getpid()` until after the next syscall; callers that need the real PID
//! in the child should use `raw_getpid`.

use crate::types::{JailError, Result};
use crate::util;
use nix::unistd::Pid;
use std::ffi::c_void;

/// clone3 flag: start the child with default signal dispositions (Linux 5.5+)
pub const CLONE_CLEAR_SIGHAND: u64 = 0x1_0000_0000;

const CLONE_STACK_SIZE: usize = 128 * 1024;

/// clone_args for the clone3 syscall (linux/sched.h)
#[repr(C)]
#[derive(Debug, Default)]
struct CloneArgs {
    flags: u64,
    pidfd: u64,
    exit_signal: u64,
    stack: u64,
    stack_size: u64,
    tls: u64,
    set_tid: u64,
    set_tid_size: u64,
    cgroup: u64,
}

// Lives in BSS and is only ever touched by the short-lived trampoline of a
// freshly cloned child. The supervisor is single-threaded, so at most one
// clone is in flight. Some architectures require stack alignment (aarch64).
#[repr(C, align(64))]
struct CloneStack([u8; CLONE_STACK_SIZE]);
static mut CLONE_STACK: CloneStack = CloneStack([0; CLONE_STACK_SIZE]);

struct TrampolinePayload<F> {
    entry: Option<F>,
}

extern "C" fn trampoline<F: FnOnce() -> i32>(arg: *mut c_void) -> libc::c_int {
    let payload = unsafe { &mut *(arg as *mut TrampolinePayload<F>) };
    let entry = payload.entry.take();
    let code = match entry {
        Some(f) => f(),
        None => 0xff,
    };
    unsafe { libc::_exit(code) }
}

/// PID via the raw syscall, bypassing any stale runtime cache.
pub fn raw_getpid() -> Pid {
    Pid::from_raw(unsafe { libc::syscall(libc::SYS_getpid) } as libc::pid_t)
}

fn clone3(flags: u64, exit_signal: i32) -> libc::c_long {
    let args = CloneArgs {
        flags,
        exit_signal: exit_signal as u64,
        ..Default::default()
    };
    unsafe {
        libc::syscall(
            libc::SYS_clone3,
            &args as *const CloneArgs,
            std::mem::size_of::<CloneArgs>(),
        )
    }
}

/// Create a new process in the namespaces selected by `flags` and run
/// `child_entry` inside it; the entry's return value becomes the child's
/// exit status. Returns the child PID on the parent side.
///
/// CLONE_VM is rejected: the child must not share the supervisor's address
/// space. CLONE_NEWTIME is honored only on the clone3 path; if clone3 is
/// unavailable the call fails instead of silently dropping the namespace.
pub fn clone_proc<F>(flags: u64, exit_signal: i32, child_entry: F) -> Result<Pid>
where
    F: FnOnce() -> i32,
{
    if flags & libc::CLONE_VM as u64 != 0 {
        return Err(JailError::Clone(
            "cannot clone with CLONE_VM: child would share the supervisor address space"
                .to_string(),
        ));
    }

    let exit_signal = exit_signal & 0xff;
    let mut payload = TrampolinePayload {
        entry: Some(child_entry),
    };

    let ret = clone3(flags | CLONE_CLEAR_SIGHAND, exit_signal);
    if ret == 0 {
        // Fresh child: run the entry and die with its status.
        trampoline::<F>(&mut payload as *mut TrampolinePayload<F> as *mut c_void);
    }
    if ret > 0 {
        return Ok(Pid::from_raw(ret as libc::pid_t));
    }

    // CLONE_CLEAR_SIGHAND needs Linux 5.5 while clone3 itself appeared in
    // 5.3; EINVAL may just mean the flag is too new for this kernel.
    let errno = std::io::Error::last_os_error();
    if errno.raw_os_error() == Some(libc::EINVAL) {
        let ret = clone3(flags, exit_signal);
        if ret == 0 {
            trampoline::<F>(&mut payload as *mut TrampolinePayload<F> as *mut c_void);
        }
        if ret > 0 {
            return Ok(Pid::from_raw(ret as libc::pid_t));
        }
    }
    let errno = std::io::Error::last_os_error();
    if errno.raw_os_error() != Some(libc::ENOSYS) {
        return Err(JailError::Clone(format!(
            "clone3(flags={}) failed: {}",
            util::clone_flags_to_str(flags),
            errno
        )));
    }

    if flags & crate::config::CLONE_NEWTIME != 0 {
        return Err(JailError::Clone(
            "CLONE_NEWTIME requested but the kernel does not support clone3".to_string(),
        ));
    }

    log::debug!(
        "falling back to legacy clone, flags: {}",
        util::clone_flags_to_str(flags)
    );
    // The middle of the static buffer works for stacks growing either way;
    // the trampoline never returns, so the space is reclaimed on exec/_exit.
    let stack = unsafe {
        std::ptr::addr_of_mut!(CLONE_STACK.0)
            .cast::<u8>()
            .add(CLONE_STACK_SIZE / 2)
    };
    let pid = unsafe {
        libc::clone(
            trampoline::<F>,
            stack as *mut c_void,
            flags as libc::c_int | exit_signal,
            &mut payload as *mut TrampolinePayload<F> as *mut c_void,
        )
    };
    if pid == -1 {
        return Err(JailError::Clone(format!(
            "clone(flags={}) failed: {}",
            util::clone_flags_to_str(flags),
            std::io::Error::last_os_error()
        )));
    }
    Ok(Pid::from_raw(pid))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wait_for(pid: Pid) -> i32 {
        let mut status = 0;
        let ret = unsafe { libc::waitpid(pid.as_raw(), &mut status, 0) };
        assert_eq!(ret, pid.as_raw());
        status
    }

    #[test]
    fn test_clone_vm_is_rejected() {
        let err = clone_proc(libc::CLONE_VM as u64, libc::SIGCHLD, || 0).unwrap_err();
        assert!(err.to_string().contains("CLONE_VM"));
    }

    #[test]
    fn test_clone_child_exit_status_propagates() {
        let pid = clone_proc(0, libc::SIGCHLD, || 7).unwrap();
        let status = wait_for(pid);
        assert!(libc::WIFEXITED(status));
        assert_eq!(libc::WEXITSTATUS(status), 7);
    }

    #[test]
    fn test_clone_child_runs_in_new_process() {
        // The child mutates its copy of this flag; the parent's copy must
        // be untouched because CLONE_VM is never used.
        let mut touched = false;
        let touched_ptr = &mut touched as *mut bool as usize;
        let pid = clone_proc(0, libc::SIGCHLD, move || {
            unsafe { *(touched_ptr as *mut bool) = true };
            0
        })
        .unwrap();
        let status = wait_for(pid);
        assert!(libc::WIFEXITED(status));
        assert!(!touched);
    }
}
