//! Process table and supervision
//!
//! Owns the lifecycle of every jailed child: clone + handshake, per-child
//! cgroup setup from the parent side, non-blocking reaping with exit
//! classification, seccomp-violation diagnostics, wallclock enforcement,
//! and shutdown.

use crate::cgroup::{self, CgroupController};
use crate::child;
use crate::clone::clone_proc;
use crate::config::{JailConfig, RunMode};
use crate::hooks::Collaborators;
use crate::types::{JailError, Result};
use crate::util;
use nix::sys::signal::{kill, Signal};
use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType, SockaddrStorage};
use nix::unistd::{ForkResult, Pid};
use std::collections::HashMap;
use std::ffi::CString;
use std::fs::File;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::SystemTime;

/// Parent -> child: namespaces are ready, continue the bootstrap
pub const HANDSHAKE_READY: u8 = b'D';
/// Child -> parent: setup failed before exec
pub const HANDSHAKE_ERROR: u8 = b'E';

/// Everything the supervisor remembers about one live child
struct ProcRecord {
    /// Wallclock time of registration
    start: SystemTime,
    /// Printable peer address of the connection that spawned the child
    remote_txt: String,
    #[allow(dead_code)]
    remote_addr: Option<SockaddrStorage>,
    /// Open handle to /proc/<pid>/syscall, usable while the zombie exists
    /// even after the process has died. Closed exactly once, on removal.
    syscall_fd: Option<File>,
    /// CPU rlimit configured for this child at registration time
    cpu_rl_cur: u64,
    cpu_rl_max: u64,
}

/// How a signal death is reported
#[derive(Debug, PartialEq, Eq)]
enum SignalClass {
    CpuSoftLimit,
    CpuHardLimit,
    Plain,
}

fn classify_signal(sig: i32, tot_sec: f64, cpu_rl_max: u64) -> SignalClass {
    if sig == libc::SIGXCPU {
        return SignalClass::CpuSoftLimit;
    }
    if sig == libc::SIGKILL && cpu_rl_max != libc::RLIM_INFINITY && tot_sec >= cpu_rl_max as f64 {
        return SignalClass::CpuHardLimit;
    }
    SignalClass::Plain
}

/// Parsed shape of /proc/<pid>/syscall
#[derive(Debug, PartialEq, Eq)]
enum SyscallSnapshot {
    /// Running or signal-stopped in a syscall: number, six argument
    /// registers, stack pointer, program counter
    Full {
        nr: i64,
        args: [u64; 6],
        sp: u64,
        pc: u64,
    },
    /// Task not in a syscall: stack pointer and program counter only
    Brief { sp: u64, pc: u64 },
    Unparsed,
}

fn parse_hex(token: &str) -> Option<u64> {
    let digits = token.strip_prefix("0x").unwrap_or(token);
    u64::from_str_radix(digits, 16).ok()
}

fn parse_syscall_snapshot(text: &str) -> SyscallSnapshot {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    match tokens.len() {
        9 => {
            let nr = match tokens[0].parse::<i64>() {
                Ok(nr) => nr,
                Err(_) => return SyscallSnapshot::Unparsed,
            };
            let mut vals = [0u64; 8];
            for (i, token) in tokens[1..].iter().enumerate() {
                match parse_hex(token) {
                    Some(v) => vals[i] = v,
                    None => return SyscallSnapshot::Unparsed,
                }
            }
            SyscallSnapshot::Full {
                nr,
                args: [vals[0], vals[1], vals[2], vals[3], vals[4], vals[5]],
                sp: vals[6],
                pc: vals[7],
            }
        }
        3 => {
            if tokens[0].parse::<i64>().is_err() {
                return SyscallSnapshot::Unparsed;
            }
            match (parse_hex(tokens[1]), parse_hex(tokens[2])) {
                (Some(sp), Some(pc)) => SyscallSnapshot::Brief { sp, pc },
                _ => SyscallSnapshot::Unparsed,
            }
        }
        _ => SyscallSnapshot::Unparsed,
    }
}

/// Single-threaded supervisor context; one per jail instance
pub struct Supervisor {
    cfg: JailConfig,
    collab: Collaborators,
    cgroup: Box<dyn CgroupController>,
    procs: HashMap<libc::pid_t, ProcRecord>,
}

impl Supervisor {
    /// Build a supervisor: cgroup detection runs here, once, and fixes the
    /// controller variant for the whole lifetime.
    pub fn new(mut cfg: JailConfig, collab: Collaborators) -> Self {
        let cgroup = cgroup::select(&mut cfg);
        Self {
            cfg,
            collab,
            cgroup,
            procs: HashMap::new(),
        }
    }

    pub fn with_defaults(cfg: JailConfig) -> Self {
        Self::new(cfg, Collaborators::default())
    }

    pub fn config(&self) -> &JailConfig {
        &self.cfg
    }

    /// Number of live (registered, unreaped) children
    pub fn count_procs(&self) -> usize {
        self.procs.len()
    }

    /// Log every tracked child with its runtime and remaining budget.
    pub fn display_procs(&self) {
        log::info!("total number of spawned namespaces: {}", self.procs.len());
        let now = SystemTime::now();
        for (pid, rec) in &self.procs {
            let run_secs = now
                .duration_since(rec.start)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let left = if self.cfg.tlimit != 0 {
                format!("{}", self.cfg.tlimit.saturating_sub(run_secs))
            } else {
                "unlimited".to_string()
            };
            log::info!(
                "pid={} remote: {}, run time: {} sec. (time left: {} s.)",
                pid,
                rec.remote_txt,
                run_secs,
                left
            );
        }
    }

    fn add_proc(&mut self, pid: Pid, netfd: RawFd) {
        if self.procs.contains_key(&pid.as_raw()) {
            log::error!("pid={} already exists in the process table", pid);
            std::process::abort();
        }

        let (remote_txt, remote_addr) = util::conn_to_text(netfd);
        // Taken now so SIGSYS diagnostics still work once the process is a
        // zombie; failure to open is tolerated.
        let syscall_fd = std::fs::OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(format!("/proc/{}/syscall", pid))
            .ok();
        let rl = self.cfg.effective_cpu_rlimit();

        let record = ProcRecord {
            start: SystemTime::now(),
            remote_txt,
            remote_addr,
            syscall_fd,
            cpu_rl_cur: rl,
            cpu_rl_max: rl,
        };
        log::debug!("added pid={} to the process table for '{}'", pid, record.remote_txt);
        self.procs.insert(pid.as_raw(), record);
    }

    fn remove_proc(&mut self, pid: Pid) {
        match self.procs.remove(&pid.as_raw()) {
            // Dropping the record closes syscall_fd, its only release site.
            Some(rec) => log::debug!(
                "removed pid={} from the process table (remote: '{}')",
                pid,
                rec.remote_txt
            ),
            None => log::warn!("pid={} is not in the process table?", pid),
        }
    }

    /// Parent-side setup after clone: network, cgroup, user namespace,
    /// then the readiness byte. A cgroup failure here is fatal to the whole
    /// supervisor: letting the child run outside its limits would break the
    /// policy contract.
    fn init_parent(&mut self, pid: Pid, handshake_fd: RawFd) -> Result<()> {
        self.collab.net.init_ns_from_parent(&self.cfg, pid).map_err(|e| {
            JailError::Process(format!(
                "couldn't initialize net namespace for pid={}: {}",
                pid, e
            ))
        })?;

        if let Err(e) = self.cgroup.init_child(&self.cfg, pid) {
            log::error!("couldn't initialize cgroup for pid={}: {}", pid, e);
            std::process::exit(0xff);
        }

        self.collab.user.init_ns_from_parent(&self.cfg, pid).map_err(|e| {
            JailError::Process(format!(
                "couldn't initialize user namespace for pid={}: {}",
                pid, e
            ))
        })?;

        util::write_fd(handshake_fd, &[HANDSHAKE_READY]).map_err(|e| {
            JailError::Process(format!(
                "couldn't signal readiness to pid={} over the socketpair: {}",
                pid, e
            ))
        })
    }

    /// Launch one jailed child for the connection on `netfd`.
    ///
    /// Returns the child PID, or None when admission control rejected the
    /// connection. In standalone mode this call execs the payload in place
    /// and only ever returns an error.
    pub fn run_child(
        &mut self,
        netfd: RawFd,
        fd_in: RawFd,
        fd_out: RawFd,
        fd_err: RawFd,
    ) -> Result<Option<Pid>> {
        if !self.collab.net.limit_conns(&self.cfg, netfd) {
            return Ok(None);
        }

        let flags = self.cfg.clone_flags();

        if self.cfg.mode == RunMode::StandaloneExecve {
            log::debug!("unshare(flags: {})", util::clone_flags_to_str(flags));
            if unsafe { libc::unshare(flags as libc::c_int) } == -1 {
                return Err(JailError::Process(format!(
                    "unshare({}) failed: {}",
                    util::clone_flags_to_str(flags),
                    std::io::Error::last_os_error()
                )));
            }
            child::run_child(
                &self.cfg,
                &self.collab,
                self.cgroup.as_ref(),
                netfd,
                fd_in,
                fd_out,
                fd_err,
                None,
            )?;
            return Err(JailError::Exec("launching the payload failed".to_string()));
        }

        log::debug!(
            "creating new process with clone flags: {} and exit signal SIGCHLD",
            util::clone_flags_to_str(flags)
        );

        let (child_end, parent_end) = socketpair(
            AddressFamily::Unix,
            SockType::Stream,
            None,
            SockFlag::SOCK_CLOEXEC,
        )
        .map_err(|e| JailError::Process(format!("socketpair(AF_UNIX, SOCK_STREAM): {}", e)))?;

        let child_raw = child_end.as_raw_fd();
        let parent_raw = parent_end.as_raw_fd();
        let cfg = &self.cfg;
        let collab = &self.collab;
        let cgroup = self.cgroup.as_ref();

        let pid = clone_proc(flags, libc::SIGCHLD, move || {
            unsafe { libc::close(parent_raw) };
            // Only failures return from the bootstrap; success execs.
            if let Err(err) = child::run_child(
                cfg,
                collab,
                cgroup,
                netfd,
                fd_in,
                fd_out,
                fd_err,
                Some(child_raw),
            ) {
                log::error!("child setup failed before exec: {}", err);
            }
            let _ = util::write_fd(child_raw, &[HANDSHAKE_ERROR]);
            0xff
        })?;
        drop(child_end);

        self.add_proc(pid, netfd);

        if let Err(e) = self.init_parent(pid, parent_raw) {
            log::warn!("parent-side init failed for pid={}: {}", pid, e);
            // Registration is rolled back; the zombie is collected (and its
            // cgroup torn down) by the next reap pass.
            self.remove_proc(pid);
            return Err(e);
        }

        let mut byte = [0u8; 1];
        if matches!(util::read_fd(parent_raw, &mut byte), Ok(1)) && byte[0] == HANDSHAKE_ERROR {
            log::warn!(
                "pid={} reported an error before it could be executed",
                pid
            );
            self.remove_proc(pid);
            return Err(JailError::Process(format!(
                "pid={} failed its setup before exec",
                pid
            )));
        }
        drop(parent_end);

        Ok(Some(pid))
    }

    fn log_siginfo_fallback(&self, si: &libc::siginfo_t, extra: Option<(u64, u64)>) {
        let (pid, status, uid) =
            unsafe { (si.si_pid(), si.si_status(), si.si_uid()) };
        match extra {
            Some((sp, pc)) => log::warn!(
                "pid={} si_status:{} si_uid:{} SP:{:#x}, PC:{:#x} (if si_status==31 (SIGSYS), \
                 see 'dmesg' or 'journalctl -ek' for a possible auditd report with more data)",
                pid, status, uid, sp, pc
            ),
            None => log::warn!(
                "pid={} si_status:{} si_uid:{} (if si_status==31 (SIGSYS), see 'dmesg' or \
                 'journalctl -ek' for a possible auditd report with more data)",
                pid, status, uid
            ),
        }
    }

    /// Explain a SIGSYS death from the child's /proc/<pid>/syscall.
    ///
    /// Must run before the final reap: waitid with WNOWAIT leaves the
    /// zombie in place and the file stays readable until it is collected.
    fn log_seccomp_violation(&self, si: &libc::siginfo_t) {
        let pid = unsafe { si.si_pid() };
        log::warn!(
            "pid={} committed a syscall/seccomp violation and exited with SIGSYS",
            pid
        );

        let rec = match self.procs.get(&pid) {
            Some(rec) => rec,
            None => {
                self.log_siginfo_fallback(si, None);
                log::error!("couldn't find pid={} in the process table", pid);
                return;
            }
        };
        let file = match &rec.syscall_fd {
            Some(file) => file,
            None => {
                self.log_siginfo_fallback(si, None);
                return;
            }
        };

        let mut buf = [0u8; 4095];
        let n = match file.read_at(&mut buf, 0) {
            Ok(n) if n > 0 => n,
            _ => {
                self.log_siginfo_fallback(si, None);
                return;
            }
        };
        let text = String::from_utf8_lossy(&buf[..n]);

        match parse_syscall_snapshot(&text) {
            SyscallSnapshot::Full { nr, args, sp, pc } => log::warn!(
                "pid={}, syscall number:{}, arguments:{:#x}, {:#x}, {:#x}, {:#x}, {:#x}, {:#x}, \
                 SP:{:#x}, PC:{:#x}, si_status:{}",
                pid,
                nr,
                args[0],
                args[1],
                args[2],
                args[3],
                args[4],
                args[5],
                sp,
                pc,
                unsafe { si.si_status() }
            ),
            SyscallSnapshot::Brief { sp, pc } => self.log_siginfo_fallback(si, Some((sp, pc))),
            SyscallSnapshot::Unparsed => self.log_siginfo_fallback(si, None),
        }
    }

    /// Reap one child. Returns its mapped exit code, or 0 when the process
    /// was not reapable (not exited yet, or already gone).
    fn reap_one(&mut self, pid: Pid, blocking: bool) -> i32 {
        // Pull the stored limits before waiting; wait4 consumes the zombie.
        let (remote_txt, cpu_rl_max) = match self.procs.get(&pid.as_raw()) {
            Some(rec) => {
                log::debug!(
                    "pid={} configured RLIMIT_CPU: cur={}, max={}",
                    pid,
                    rec.cpu_rl_cur,
                    rec.cpu_rl_max
                );
                (rec.remote_txt.clone(), rec.cpu_rl_max)
            }
            None => {
                log::warn!("pid={} not found in the process table during reap", pid);
                ("[unknown]".to_string(), libc::RLIM_INFINITY)
            }
        };

        let mut status = 0;
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        let options = if blocking { 0 } else { libc::WNOHANG };
        let ret = unsafe { libc::wait4(pid.as_raw(), &mut status, options, &mut usage) };
        if ret != pid.as_raw() {
            let err = std::io::Error::last_os_error();
            if ret == -1 && err.raw_os_error() != Some(libc::ECHILD) {
                log::warn!("wait4(pid={}, blocking={}) failed: {}", pid, blocking, err);
            }
            return 0;
        }

        let user_sec = usage.ru_utime.tv_sec as f64 + usage.ru_utime.tv_usec as f64 / 1e6;
        let sys_sec = usage.ru_stime.tv_sec as f64 + usage.ru_stime.tv_usec as f64 / 1e6;
        let tot_sec = user_sec + sys_sec;
        log::info!(
            "pid={} CPU usage -> user: {:.6}s, sys: {:.6}s, total: {:.6}s",
            pid,
            user_sec,
            sys_sec,
            tot_sec
        );

        // The zombie is gone, so the cgroup no longer counts it.
        self.cgroup.finish_child(&self.cfg, pid);

        let left = self.procs.len().saturating_sub(1);
        if libc::WIFEXITED(status) {
            let code = libc::WEXITSTATUS(status);
            log::info!(
                "pid={} ({}) exited with status: {}, (PIDs left: {})",
                pid,
                remote_txt,
                code,
                left
            );
            self.remove_proc(pid);
            return code;
        }
        if libc::WIFSIGNALED(status) {
            let sig = libc::WTERMSIG(status);
            match classify_signal(sig, tot_sec, cpu_rl_max) {
                SignalClass::CpuSoftLimit => log::info!(
                    "pid={} ({}) killed: CPU soft limit exceeded (SIGXCPU), (PIDs left: {})",
                    pid,
                    remote_txt,
                    left
                ),
                SignalClass::CpuHardLimit => log::info!(
                    "pid={} ({}) killed: CPU hard limit exceeded (SIGKILL), used={:.3}s, \
                     hard_limit={}s, (PIDs left: {})",
                    pid,
                    remote_txt,
                    tot_sec,
                    cpu_rl_max,
                    left
                ),
                SignalClass::Plain => log::info!(
                    "pid={} ({}) terminated with signal: {} ({}), (PIDs left: {})",
                    pid,
                    remote_txt,
                    util::sig_name(sig),
                    sig,
                    left
                ),
            }
            self.remove_proc(pid);
            return 128 + sig;
        }
        0
    }

    /// One non-blocking reap pass: drain every exited child, then enforce
    /// wallclock deadlines on the survivors. Returns the last mapped exit
    /// code seen, 0 if none.
    pub fn reap(&mut self) -> i32 {
        let mut rv = 0;
        loop {
            let mut si: libc::siginfo_t = unsafe { std::mem::zeroed() };
            let ret = unsafe {
                libc::waitid(
                    libc::P_ALL,
                    0,
                    &mut si,
                    libc::WNOHANG | libc::WNOWAIT | libc::WEXITED,
                )
            };
            if ret == -1 {
                break;
            }
            let pid = unsafe { si.si_pid() };
            if pid == 0 {
                break;
            }
            if si.si_code == libc::CLD_KILLED && unsafe { si.si_status() } == libc::SIGSYS {
                self.log_seccomp_violation(&si);
            }
            rv = self.reap_one(Pid::from_raw(pid), false);
        }

        self.enforce_deadlines();
        rv
    }

    fn enforce_deadlines(&self) {
        if self.cfg.tlimit == 0 {
            return;
        }
        let now = SystemTime::now();
        for (&pid, rec) in &self.procs {
            let elapsed = match now.duration_since(rec.start) {
                Ok(d) => d.as_secs(),
                Err(_) => {
                    log::warn!(
                        "pid={} start time is in the future; skipping its deadline check",
                        pid
                    );
                    continue;
                }
            };
            if elapsed >= self.cfg.tlimit {
                log::info!(
                    "pid={} run time >= time limit ({} >= {}) ({}). Killing it",
                    pid,
                    elapsed,
                    self.cfg.tlimit,
                    rec.remote_txt
                );
                let pid = Pid::from_raw(pid);
                // A stopped, namespaced process can shrug off SIGKILL;
                // wake it first.
                let _ = kill(pid, Signal::SIGCONT);
                log::debug!("sent SIGCONT to pid={}", pid);
                let _ = kill(pid, Signal::SIGKILL);
                log::debug!("sent SIGKILL to pid={}", pid);
            }
        }
    }

    /// Kill and reap every tracked child; used at shutdown.
    pub fn kill_and_reap_all(&mut self, signal: Signal) {
        while let Some(&pid) = self.procs.keys().next() {
            let pid = Pid::from_raw(pid);
            if kill(pid, signal).is_ok() {
                self.reap_one(pid, true);
            } else {
                self.remove_proc(pid);
            }
        }
    }
}

/// Run a helper binary to completion.
///
/// Exec failure is detected through a CLOEXEC pipe: the child writes one
/// byte only when execve fails; a successful exec closes the pipe.
/// Returns -1 on pipe/fork/exec failure, 0 on clean exit, 1 on nonzero
/// exit, 2 on signal death.
pub fn system_exe(args: &[String], envs: &[String]) -> i32 {
    if args.is_empty() {
        log::warn!("empty argv for the helper exec");
        return -1;
    }
    let argv: Vec<CString> = match args.iter().map(|a| CString::new(a.as_str())).collect() {
        Ok(argv) => argv,
        Err(_) => {
            log::warn!("helper argv contains a NUL byte");
            return -1;
        }
    };
    let envp: Vec<CString> = match envs.iter().map(|e| CString::new(e.as_str())).collect() {
        Ok(envp) => envp,
        Err(_) => {
            log::warn!("helper environment contains a NUL byte");
            return -1;
        }
    };

    let (exec_read, exec_write) = match nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC) {
        Ok(pair) => pair,
        Err(e) => {
            log::warn!("pipe2(O_CLOEXEC) failed: {}", e);
            return -1;
        }
    };

    let pid = match unsafe { nix::unistd::fork() } {
        Ok(ForkResult::Child) => {
            drop(exec_read);
            let _ = nix::unistd::execve(&argv[0], &argv, &envp);
            let _ = util::write_fd(exec_write.as_raw_fd(), b"A");
            unsafe { libc::_exit(0) };
        }
        Ok(ForkResult::Parent { child }) => child,
        Err(e) => {
            log::warn!("fork() failed: {}", e);
            return -1;
        }
    };
    drop(exec_write);

    let mut buf = [0u8; 1];
    let exec_failed = matches!(util::read_fd(exec_read.as_raw_fd(), &mut buf), Ok(n) if n > 0);
    if exec_failed {
        log::warn!("couldn't execute '{}'", args[0]);
    }
    drop(exec_read);

    loop {
        let mut status = 0;
        let ret = unsafe { libc::wait4(pid.as_raw(), &mut status, libc::__WALL, std::ptr::null_mut()) };
        if ret == -1 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            log::warn!("wait4(pid={}) failed: {}", pid, err);
            return -1;
        }
        if libc::WIFEXITED(status) {
            let code = libc::WEXITSTATUS(status);
            log::debug!("helper pid={} exited with code {}", pid, code);
            if exec_failed {
                return -1;
            }
            return if code == 0 { 0 } else { 1 };
        }
        if libc::WIFSIGNALED(status) {
            let sig = libc::WTERMSIG(status);
            log::warn!(
                "helper pid={} killed by signal: {} ({})",
                pid,
                sig,
                util::sig_name(sig)
            );
            return 2;
        }
        log::warn!("helper pid={} unknown wait status: {}", pid, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_signal_soft_cpu() {
        assert_eq!(
            classify_signal(libc::SIGXCPU, 0.0, libc::RLIM_INFINITY),
            SignalClass::CpuSoftLimit
        );
    }

    #[test]
    fn test_classify_signal_hard_cpu_needs_stored_limit() {
        // SIGKILL with no configured rlimit is just a kill.
        assert_eq!(
            classify_signal(libc::SIGKILL, 100.0, libc::RLIM_INFINITY),
            SignalClass::Plain
        );
        // With a stored limit, usage at or above it means the hard cap hit.
        assert_eq!(
            classify_signal(libc::SIGKILL, 2.0, 2),
            SignalClass::CpuHardLimit
        );
        assert_eq!(classify_signal(libc::SIGKILL, 1.5, 2), SignalClass::Plain);
    }

    #[test]
    fn test_classify_signal_other() {
        assert_eq!(
            classify_signal(libc::SIGTERM, 0.0, 2),
            SignalClass::Plain
        );
    }

    #[test]
    fn test_parse_syscall_snapshot_full() {
        let text = "202 0x7 0x0 0x0 0xca 0x1 0x0 0x7ffdcd9b8260 0x7f large";
        // Nine fields exactly; the trailing token above makes it ten.
        assert_eq!(parse_syscall_snapshot(text), SyscallSnapshot::Unparsed);

        let text = "202 0x7 0x0 0x0 0xca 0x1 0x0 0x7ffdcd9b8260 0x7f22334455";
        match parse_syscall_snapshot(text) {
            SyscallSnapshot::Full { nr, args, sp, pc } => {
                assert_eq!(nr, 202);
                assert_eq!(args[0], 0x7);
                assert_eq!(args[3], 0xca);
                assert_eq!(sp, 0x7ffdcd9b8260);
                assert_eq!(pc, 0x7f22334455);
            }
            other => panic!("unexpected parse: {:?}", other),
        }
    }

    #[test]
    fn test_parse_syscall_snapshot_brief() {
        assert_eq!(
            parse_syscall_snapshot("-1 0x7ffd000 0x400000"),
            SyscallSnapshot::Brief {
                sp: 0x7ffd000,
                pc: 0x400000
            }
        );
    }

    #[test]
    fn test_parse_syscall_snapshot_garbage() {
        assert_eq!(parse_syscall_snapshot(""), SyscallSnapshot::Unparsed);
        assert_eq!(parse_syscall_snapshot("running"), SyscallSnapshot::Unparsed);
        assert_eq!(
            parse_syscall_snapshot("one two three"),
            SyscallSnapshot::Unparsed
        );
    }

    #[test]
    fn test_system_exe_contract() {
        assert_eq!(system_exe(&["/bin/true".to_string()], &[]), 0);
        assert_eq!(system_exe(&["/bin/false".to_string()], &[]), 1);
        assert_eq!(
            system_exe(&["/nonexistent/procjail-helper".to_string()], &[]),
            -1
        );
        assert_eq!(system_exe(&[], &[]), -1);
    }

    #[test]
    fn test_supervisor_starts_empty() {
        let sup = Supervisor::with_defaults(JailConfig::default());
        assert_eq!(sup.count_procs(), 0);
    }
}
