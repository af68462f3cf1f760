//! Cgroup resource governance
//!
//! A capability interface over the unified (v2) and split (v1) hierarchies.
//! The variant is chosen once at startup by filesystem detection; afterwards
//! the supervisor only talks to the trait.

pub mod v1;
pub mod v2;

use crate::config::JailConfig;
use crate::types::Result;
use nix::unistd::Pid;

pub use v1::CgroupV1;
pub use v2::CgroupV2;

/// Prefix of per-child cgroup directories, `<prefix><pid>`
pub const CHILD_CGROUP_PREFIX: &str = "NSJAIL.";
/// Prefix of the supervisor's own relocation cgroup, `<prefix><pid>`
pub const SELF_CGROUP_PREFIX: &str = "NSJAIL_SELF.";

pub trait CgroupController {
    fn name(&self) -> &'static str;

    /// Create and populate the per-child cgroup before the child execs.
    fn init_child(&self, cfg: &JailConfig, pid: Pid) -> Result<()>;

    /// Collect post-mortem usage and remove the per-child cgroup.
    /// Runs strictly after the child has been reaped; never fails.
    fn finish_child(&self, cfg: &JailConfig, pid: Pid);
}

/// Detect whether the configured mount is a cgroup2 filesystem and record
/// the answer in the config. Any stat failure just reports v2 unavailable.
pub fn detect_cgroupv2(cfg: &mut JailConfig) {
    match nix::sys::statfs::statfs(&cfg.cgroupv2_mount) {
        Ok(fs) => {
            cfg.use_cgroupv2 = fs.filesystem_type() == nix::sys::statfs::CGROUP2_SUPER_MAGIC;
        }
        Err(e) => {
            log::debug!(
                "statfs('{}') failed: {}; cgroup v2 unavailable",
                cfg.cgroupv2_mount.display(),
                e
            );
            cfg.use_cgroupv2 = false;
        }
    }
}

/// Run detection and hand back the matching controller. The supervisor holds
/// the boxed value for its whole lifetime and never branches on the choice
/// again.
pub fn select(cfg: &mut JailConfig) -> Box<dyn CgroupController> {
    detect_cgroupv2(cfg);
    if cfg.use_cgroupv2 {
        log::debug!(
            "using cgroup v2 at '{}'",
            cfg.cgroupv2_mount.display()
        );
        Box::new(CgroupV2::new())
    } else {
        log::debug!("using cgroup v1 at '{}'", cfg.cgroup_mount.display());
        Box::new(CgroupV1::new())
    }
}

/// True when the configuration asks for any memory cap.
pub fn needs_memory(cfg: &JailConfig) -> bool {
    cfg.cgroup_mem_max > 0 || cfg.derived_swap_max() >= 0
}

/// True when the configuration asks for a process-count cap.
pub fn needs_pids(cfg: &JailConfig) -> bool {
    cfg.cgroup_pids_max != 0
}

/// True when the configuration asks for a CPU bandwidth cap.
pub fn needs_cpu(cfg: &JailConfig) -> bool {
    cfg.cgroup_cpu_ms_per_sec != 0
}

/// True when any controller is needed at all.
pub fn needs_any(cfg: &JailConfig) -> bool {
    needs_memory(cfg) || needs_pids(cfg) || needs_cpu(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_controllers_needed_by_default() {
        let cfg = JailConfig::default();
        assert!(!needs_memory(&cfg));
        assert!(!needs_pids(&cfg));
        assert!(!needs_cpu(&cfg));
        assert!(!needs_any(&cfg));
    }

    #[test]
    fn test_memory_needed_via_swap_only() {
        let cfg = JailConfig {
            cgroup_mem_max: 0,
            cgroup_mem_swap_max: 0,
            ..Default::default()
        };
        assert!(needs_memory(&cfg));
    }

    #[test]
    fn test_memory_not_needed_when_unlimited() {
        let cfg = JailConfig {
            cgroup_mem_max: 0,
            cgroup_mem_swap_max: -1,
            cgroup_mem_memsw_max: 0,
            ..Default::default()
        };
        assert!(!needs_memory(&cfg));
    }

    #[test]
    fn test_memory_needed_via_memsw() {
        let cfg = JailConfig {
            cgroup_mem_max: 32 << 20,
            cgroup_mem_swap_max: -1,
            cgroup_mem_memsw_max: 32 << 20,
            ..Default::default()
        };
        // Derived swap is zero, which is a legitimate cap.
        assert_eq!(cfg.derived_swap_max(), 0);
        assert!(needs_memory(&cfg));
    }

    #[test]
    fn test_detection_failure_is_nonfatal() {
        let mut cfg = JailConfig {
            cgroupv2_mount: std::path::PathBuf::from("/nonexistent/procjail-test"),
            use_cgroupv2: true,
            ..Default::default()
        };
        detect_cgroupv2(&mut cfg);
        assert!(!cfg.use_cgroupv2);
    }
}
