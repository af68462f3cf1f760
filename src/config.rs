/// Jail configuration: namespaces, execution target, resource budgets
use serde::{Deserialize, Serialize};
use std::os::unix::io::RawFd;
use std::path::PathBuf;

// Not exported by older libc builds.
pub const CLONE_NEWTIME: u64 = 0x0000_0080;

/// How the jail launches its payload
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum RunMode {
    /// Clone a fresh child per connection and supervise it
    Clone,
    /// Unshare in place and exec the payload under the current PID
    StandaloneExecve,
}

/// Process isolation configuration, immutable for the lifetime of a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JailConfig {
    /// Launch mode
    pub mode: RunMode,
    /// Create a new network namespace
    pub clone_newnet: bool,
    /// Create a new user namespace
    pub clone_newuser: bool,
    /// Create a new mount namespace
    pub clone_newns: bool,
    /// Create a new PID namespace
    pub clone_newpid: bool,
    /// Create a new IPC namespace
    pub clone_newipc: bool,
    /// Create a new UTS namespace
    pub clone_newuts: bool,
    /// Create a new cgroup namespace
    pub clone_newcgroup: bool,
    /// Create a new time namespace (clone3 only)
    pub clone_newtime: bool,
    /// Program to execute
    pub exec_file: PathBuf,
    /// Preopened fd for the program, used with `use_execveat`
    #[serde(skip)]
    pub exec_fd: Option<RawFd>,
    /// Exec by fd with an empty path instead of by `exec_file`
    pub use_execveat: bool,
    /// Argument vector, argv[0] included
    pub argv: Vec<String>,
    /// Environment entries in KEY=VALUE form, applied after the clear
    pub envs: Vec<String>,
    /// Inherit the host environment before applying `envs`
    pub keep_env: bool,
    /// Wallclock budget in seconds, 0 = unlimited
    pub tlimit: u64,
    /// Per-process RLIMIT_CPU in seconds
    pub rl_cpu: u64,
    /// Skip rlimit configuration entirely
    pub disable_rl: bool,
    /// memory.max in bytes, 0 = unlimited
    pub cgroup_mem_max: u64,
    /// memory.swap.max in bytes, negative = leave alone
    pub cgroup_mem_swap_max: i64,
    /// Legacy combined memory+swap cap; nonzero derives swap as memsw - mem
    pub cgroup_mem_memsw_max: u64,
    /// pids.max, 0 = unlimited
    pub cgroup_pids_max: u64,
    /// CPU bandwidth in milliseconds per wallclock second, 0 = unlimited
    pub cgroup_cpu_ms_per_sec: u64,
    /// Mount point of the cgroup2 filesystem
    pub cgroupv2_mount: PathBuf,
    /// Root of the split v1 hierarchies, used only by the v1 fallback
    pub cgroup_mount: PathBuf,
    /// Set by detection at startup; selects the v2 controller
    pub use_cgroupv2: bool,
}

impl Default for JailConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Clone,
            clone_newnet: true,
            clone_newuser: true,
            clone_newns: true,
            clone_newpid: true,
            clone_newipc: true,
            clone_newuts: true,
            clone_newcgroup: true,
            clone_newtime: false,
            exec_file: PathBuf::new(),
            exec_fd: None,
            use_execveat: false,
            argv: Vec::new(),
            envs: Vec::new(),
            keep_env: false,
            tlimit: 600,
            rl_cpu: 600,
            disable_rl: false,
            cgroup_mem_max: 0,
            cgroup_mem_swap_max: -1,
            cgroup_mem_memsw_max: 0,
            cgroup_pids_max: 0,
            cgroup_cpu_ms_per_sec: 0,
            cgroupv2_mount: PathBuf::from("/sys/fs/cgroup"),
            cgroup_mount: PathBuf::from("/sys/fs/cgroup"),
            use_cgroupv2: false,
        }
    }
}

impl JailConfig {
    /// Clone flags bitmask built from the per-namespace booleans
    pub fn clone_flags(&self) -> u64 {
        let mut flags = 0u64;
        if self.clone_newnet {
            flags |= libc::CLONE_NEWNET as u64;
        }
        if self.clone_newuser {
            flags |= libc::CLONE_NEWUSER as u64;
        }
        if self.clone_newns {
            flags |= libc::CLONE_NEWNS as u64;
        }
        if self.clone_newpid {
            flags |= libc::CLONE_NEWPID as u64;
        }
        if self.clone_newipc {
            flags |= libc::CLONE_NEWIPC as u64;
        }
        if self.clone_newuts {
            flags |= libc::CLONE_NEWUTS as u64;
        }
        if self.clone_newcgroup {
            flags |= libc::CLONE_NEWCGROUP as u64;
        }
        if self.clone_newtime {
            flags |= CLONE_NEWTIME;
        }
        flags
    }

    /// Swap cap derived from the swap/memsw knobs.
    /// A nonzero legacy memsw cap wins and is converted to plain swap.
    pub fn derived_swap_max(&self) -> i64 {
        if self.cgroup_mem_memsw_max > 0 {
            self.cgroup_mem_memsw_max as i64 - self.cgroup_mem_max as i64
        } else {
            self.cgroup_mem_swap_max
        }
    }

    /// CPU rlimit configured for new children; u64::MAX means unlimited
    pub fn effective_cpu_rlimit(&self) -> u64 {
        if self.disable_rl {
            libc::RLIM_INFINITY
        } else {
            self.rl_cpu
        }
    }
}
