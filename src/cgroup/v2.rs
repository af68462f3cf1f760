//! Cgroup v2 manager
//!
//! Enables the required controllers on the root subtree (working around the
//! kernel's no-internal-processes rule), creates and limits one cgroup per
//! child, and collects usage statistics at teardown.

use crate::cgroup::{self, CgroupController, CHILD_CGROUP_PREFIX, SELF_CGROUP_PREFIX};
use crate::config::JailConfig;
use crate::types::{JailError, Result};
use crate::util;
use nix::unistd::Pid;
use std::cell::Cell;
use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

pub struct CgroupV2 {
    // Root subtree controllers are enabled lazily at first child creation
    // and never disabled.
    subtree_ready: Cell<bool>,
}

impl CgroupV2 {
    pub fn new() -> Self {
        Self {
            subtree_ready: Cell::new(false),
        }
    }

    fn child_path(cfg: &JailConfig, pid: Pid) -> PathBuf {
        cfg.cgroupv2_mount
            .join(format!("{}{}", CHILD_CGROUP_PREFIX, pid))
    }

    fn self_path(cfg: &JailConfig) -> PathBuf {
        cfg.cgroupv2_mount
            .join(format!("{}{}", SELF_CGROUP_PREFIX, std::process::id()))
    }

    fn create_cgroup(path: &Path) -> Result<()> {
        log::debug!("create '{}'", path.display());
        match DirBuilder::new().mode(0o700).create(path) {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(util::cgroup_err("mkdir", path, e)),
        }
    }

    fn add_pid_to_procs(cgroup_path: &Path, pid: u32) -> Result<()> {
        let procs = cgroup_path.join("cgroup.procs");
        log::debug!("adding pid={} to '{}'", pid, procs.display());
        util::write_small_file(&procs, &pid.to_string())
            .map_err(|e| util::cgroup_err("could not update", &procs, e))
    }

    /// Move the supervisor into a child cgroup of its own so the root
    /// cgroup no longer owns processes (the no-internal-processes rule).
    fn move_self_aside(cfg: &JailConfig) -> Result<()> {
        let self_path = Self::self_path(cfg);
        log::info!(
            "moving the supervisor into its own child cgroup: '{}'",
            self_path.display()
        );
        Self::create_cgroup(&self_path)?;
        Self::add_pid_to_procs(&self_path, 0)
    }

    /// Append `+<controller>` to the root `cgroup.subtree_control`.
    ///
    /// The write fails with EBUSY while the root cgroup owns processes, so
    /// a failed first attempt migrates the supervisor aside and retries.
    fn enable_subtree(&self, cfg: &JailConfig, controller: &str) -> Result<()> {
        let control = cfg.cgroupv2_mount.join("cgroup.subtree_control");
        let val = format!("+{}", controller);
        log::debug!("enabling '{}' in '{}'", val, control.display());

        let first = util::write_small_file(&control, &val);
        match first {
            Ok(()) => return Ok(()),
            Err(ref e) if e.raw_os_error() == Some(libc::EBUSY) => {
                Self::move_self_aside(cfg)?;
                if util::write_small_file(&control, &val).is_ok() {
                    return Ok(());
                }
            }
            Err(_) => {}
        }
        Err(JailError::Cgroup(format!(
            "could not apply '{}' to '{}'; the supervisor must run as root with the \
             cgroup mount pointing at the host root cgroup2 hierarchy (under Docker, \
             run the container with --cgroupns=host, or remount the cgroup2 filesystem)",
            val,
            control.display()
        )))
    }

    /// Make sure every needed controller is listed in the root
    /// `cgroup.subtree_control`, enabling the missing ones.
    fn setup_subtree(&self, cfg: &JailConfig) -> Result<()> {
        let control = cfg.cgroupv2_mount.join("cgroup.subtree_control");
        let listed = util::read_small_file(&control)
            .map_err(|e| util::cgroup_err("could not read", &control, e))?;
        let listed: Vec<&str> = listed.split_whitespace().collect();

        for (needed, name) in [
            (cgroup::needs_memory(cfg), "memory"),
            (cgroup::needs_pids(cfg), "pids"),
            (cgroup::needs_cpu(cfg), "cpu"),
        ] {
            if needed && !listed.contains(&name) {
                self.enable_subtree(cfg, name)?;
            }
        }
        Ok(())
    }

    fn write_limit(cgroup_path: &Path, file: &str, value: &str) -> Result<()> {
        let path = cgroup_path.join(file);
        log::info!("setting '{}' to '{}'", file, value);
        util::write_small_file(&path, value).map_err(|e| {
            log::warn!("could not update '{}': {}", path.display(), e);
            util::cgroup_err("could not update", &path, e)
        })
    }

    fn apply_limits(cfg: &JailConfig, cgroup_path: &Path) -> Result<()> {
        if cfg.cgroup_mem_max > 0 {
            Self::write_limit(cgroup_path, "memory.max", &cfg.cgroup_mem_max.to_string())?;
        }
        let swap_max = cfg.derived_swap_max();
        if swap_max >= 0 {
            Self::write_limit(cgroup_path, "memory.swap.max", &swap_max.to_string())?;
        }
        if cfg.cgroup_pids_max != 0 {
            Self::write_limit(cgroup_path, "pids.max", &cfg.cgroup_pids_max.to_string())?;
        }
        if cfg.cgroup_cpu_ms_per_sec != 0 {
            // Bandwidth format is `$MAX $PERIOD`: up to $MAX usec of CPU
            // per $PERIOD usec of wallclock.
            let quota = format!("{} 1000000", cfg.cgroup_cpu_ms_per_sec * 1000);
            Self::write_limit(cgroup_path, "cpu.max", &quota)?;
        }
        Ok(())
    }

    fn read_mem_peak(cgroup_path: &Path) -> i64 {
        let path = cgroup_path.join("memory.peak");
        let text = match util::read_small_file(&path) {
            Ok(text) => text,
            Err(ref e) if util::is_enoent(e) => {
                log::debug!("'{}' not found, cgroup may be gone", path.display());
                return -1;
            }
            Err(e) => {
                log::warn!("failed to read '{}': {}", path.display(), e);
                return -1;
            }
        };
        match util::parse_strict_decimal(&text) {
            Some(v) => v,
            None => {
                log::warn!(
                    "unparseable value in '{}': '{}'",
                    path.display(),
                    text.trim_end()
                );
                -1
            }
        }
    }

    fn read_cpu_stats(cgroup_path: &Path) -> (i64, i64, i64) {
        let path = cgroup_path.join("cpu.stat");
        let text = match util::read_small_file(&path) {
            Ok(text) => text,
            Err(ref e) if util::is_enoent(e) => {
                log::debug!("'{}' not found, cgroup may be gone", path.display());
                return (-1, -1, -1);
            }
            Err(e) => {
                log::warn!("failed to read '{}': {}", path.display(), e);
                return (-1, -1, -1);
            }
        };
        let (user, system) = parse_cpu_stat(&text);
        let total = if user >= 0 && system >= 0 {
            user + system
        } else {
            log::warn!(
                "could not determine total CPU usage from '{}' (user_usec={}, system_usec={})",
                path.display(),
                user,
                system
            );
            -1
        };
        (total, user, system)
    }

    /// Log final usage and remove the per-child cgroup.
    fn remove_cgroup(cgroup_path: &Path) {
        let mem_peak = Self::read_mem_peak(cgroup_path);
        let (cpu_total, cpu_user, cpu_system) = Self::read_cpu_stats(cgroup_path);

        log::info!(
            "Cgroup Stats: CPU_usec={} MEM_peak_bytes={} (user={}, system={})",
            cpu_total,
            mem_peak,
            cpu_user,
            cpu_system
        );

        log::debug!("remove '{}'", cgroup_path.display());
        if let Err(e) = std::fs::remove_dir(cgroup_path) {
            log::warn!("rmdir('{}') failed: {}", cgroup_path.display(), e);
        }
    }
}

impl Default for CgroupV2 {
    fn default() -> Self {
        Self::new()
    }
}

impl CgroupController for CgroupV2 {
    fn name(&self) -> &'static str {
        "cgroup_v2"
    }

    fn init_child(&self, cfg: &JailConfig, pid: Pid) -> Result<()> {
        if !cgroup::needs_any(cfg) {
            return Ok(());
        }
        if !self.subtree_ready.get() {
            self.setup_subtree(cfg)?;
            self.subtree_ready.set(true);
        }

        let cgroup_path = Self::child_path(cfg, pid);
        Self::create_cgroup(&cgroup_path)?;
        Self::add_pid_to_procs(&cgroup_path, pid.as_raw() as u32)?;
        Self::apply_limits(cfg, &cgroup_path)
    }

    fn finish_child(&self, cfg: &JailConfig, pid: Pid) {
        if cgroup::needs_any(cfg) {
            Self::remove_cgroup(&Self::child_path(cfg, pid));
        }
    }
}

/// Extract `user_usec` and `system_usec` from a cpu.stat body.
/// A missing or malformed entry yields -1 for that component.
fn parse_cpu_stat(text: &str) -> (i64, i64) {
    let mut user = -1i64;
    let mut system = -1i64;
    for line in text.lines() {
        if user == -1 {
            if let Some(rest) = line.strip_prefix("user_usec ") {
                user = util::parse_strict_decimal(rest).unwrap_or(-1);
                continue;
            }
        }
        if system == -1 {
            if let Some(rest) = line.strip_prefix("system_usec ") {
                system = util::parse_strict_decimal(rest).unwrap_or(-1);
            }
        }
        if user != -1 && system != -1 {
            break;
        }
    }
    (user, system)
}
