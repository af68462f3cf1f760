//! Cgroup v1 variant of the capability interface
//!
//! The split hierarchies keep one directory per controller, attach through
//! the `tasks` file, and spell the limit files differently. Selected only
//! when the configured mount is not a cgroup2 filesystem.

use crate::cgroup::{self, CgroupController, CHILD_CGROUP_PREFIX};
use crate::config::JailConfig;
use crate::types::Result;
use crate::util;
use nix::unistd::Pid;
use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

pub struct CgroupV1;

impl CgroupV1 {
    pub fn new() -> Self {
        Self
    }

    fn controller_path(cfg: &JailConfig, controller: &str, pid: Pid) -> PathBuf {
        cfg.cgroup_mount
            .join(controller)
            .join(format!("{}{}", CHILD_CGROUP_PREFIX, pid))
    }

    fn create_and_attach(path: &Path, pid: Pid) -> Result<()> {
        log::debug!("create '{}'", path.display());
        match DirBuilder::new().mode(0o700).create(path) {
            Ok(()) => {}
            Err(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(util::cgroup_err("mkdir", path, e)),
        }
        let tasks = path.join("tasks");
        util::write_small_file(&tasks, &pid.as_raw().to_string())
            .map_err(|e| util::cgroup_err("could not update", &tasks, e))
    }

    fn write_limit(path: &Path, file: &str, value: &str) -> Result<()> {
        let limit = path.join(file);
        log::info!("setting '{}' to '{}'", file, value);
        util::write_small_file(&limit, value).map_err(|e| {
            log::warn!("could not update '{}': {}", limit.display(), e);
            util::cgroup_err("could not update", &limit, e)
        })
    }

    fn init_mem(cfg: &JailConfig, pid: Pid) -> Result<()> {
        if !cgroup::needs_memory(cfg) {
            return Ok(());
        }
        let path = Self::controller_path(cfg, "memory", pid);
        Self::create_and_attach(&path, pid)?;
        if cfg.cgroup_mem_max > 0 {
            Self::write_limit(&path, "memory.limit_in_bytes", &cfg.cgroup_mem_max.to_string())?;
        }
        if cfg.cgroup_mem_memsw_max > 0 {
            Self::write_limit(
                &path,
                "memory.memsw.limit_in_bytes",
                &cfg.cgroup_mem_memsw_max.to_string(),
            )?;
        }
        Ok(())
    }

    fn init_pids(cfg: &JailConfig, pid: Pid) -> Result<()> {
        if !cgroup::needs_pids(cfg) {
            return Ok(());
        }
        let path = Self::controller_path(cfg, "pids", pid);
        Self::create_and_attach(&path, pid)?;
        Self::write_limit(&path, "pids.max", &cfg.cgroup_pids_max.to_string())
    }

    fn init_cpu(cfg: &JailConfig, pid: Pid) -> Result<()> {
        if !cgroup::needs_cpu(cfg) {
            return Ok(());
        }
        let path = Self::controller_path(cfg, "cpu", pid);
        Self::create_and_attach(&path, pid)?;
        Self::write_limit(&path, "cpu.cfs_period_us", "1000000")?;
        let quota = cfg.cgroup_cpu_ms_per_sec * 1000;
        Self::write_limit(&path, "cpu.cfs_quota_us", &quota.to_string())
    }

    fn read_stat(path: &Path, file: &str) -> i64 {
        let stat = path.join(file);
        let text = match util::read_small_file(&stat) {
            Ok(text) => text,
            Err(ref e) if util::is_enoent(e) => {
                log::debug!("'{}' not found, cgroup may be gone", stat.display());
                return -1;
            }
            Err(e) => {
                log::warn!("failed to read '{}': {}", stat.display(), e);
                return -1;
            }
        };
        util::parse_strict_decimal(&text).unwrap_or(-1)
    }

    fn remove_dir(path: &Path) {
        log::debug!("remove '{}'", path.display());
        if let Err(e) = std::fs::remove_dir(path) {
            if !util::is_enoent(&e) {
                log::warn!("rmdir('{}') failed: {}", path.display(), e);
            }
        }
    }
}

impl Default for CgroupV1 {
    fn default() -> Self {
        Self::new()
    }
}

impl CgroupController for CgroupV1 {
    fn name(&self) -> &'static str {
        "cgroup_v1"
    }

    fn init_child(&self, cfg: &JailConfig, pid: Pid) -> Result<()> {
        Self::init_mem(cfg, pid)?;
        Self::init_pids(cfg, pid)?;
        Self::init_cpu(cfg, pid)
    }

    fn finish_child(&self, cfg: &JailConfig, pid: Pid) {
        if cgroup::needs_memory(cfg) {
            let path = Self::controller_path(cfg, "memory", pid);
            let peak = Self::read_stat(&path, "memory.max_usage_in_bytes");
            log::info!("Cgroup Stats: MEM_peak_bytes={}", peak);
            Self::remove_dir(&path);
        }
        if cgroup::needs_cpu(cfg) {
            let path = Self::controller_path(cfg, "cpu", pid);
            let usage_ns = Self::read_stat(&path, "cpuacct.usage");
            let usec = if usage_ns >= 0 { usage_ns / 1000 } else { -1 };
            log::info!("Cgroup Stats: CPU_usec={}", usec);
            Self::remove_dir(&path);
        }
        if cgroup::needs_pids(cfg) {
            Self::remove_dir(&Self::controller_path(cfg, "pids", pid));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fake_mount() -> (TempDir, JailConfig) {
        let dir = TempDir::new().unwrap();
        for controller in ["memory", "pids", "cpu"] {
            fs::create_dir(dir.path().join(controller)).unwrap();
        }
        let cfg = JailConfig {
            cgroup_mount: dir.path().to_path_buf(),
            use_cgroupv2: false,
            ..Default::default()
        };
        (dir, cfg)
    }

    #[test]
    fn test_v1_creates_per_controller_dirs() {
        let (dir, mut cfg) = fake_mount();
        cfg.cgroup_mem_max = 1 << 20;
        cfg.cgroup_pids_max = 8;
        cfg.cgroup_cpu_ms_per_sec = 100;
        let pid = Pid::from_raw(321);

        CgroupV1::new().init_child(&cfg, pid).unwrap();

        for controller in ["memory", "pids", "cpu"] {
            let path = dir.path().join(controller).join("NSJAIL.321");
            assert!(path.is_dir());
            assert_eq!(fs::read_to_string(path.join("tasks")).unwrap(), "321");
        }
        let mem = dir.path().join("memory/NSJAIL.321");
        assert_eq!(
            fs::read_to_string(mem.join("memory.limit_in_bytes")).unwrap(),
            (1u64 << 20).to_string()
        );
        let cpu = dir.path().join("cpu/NSJAIL.321");
        assert_eq!(
            fs::read_to_string(cpu.join("cpu.cfs_quota_us")).unwrap(),
            "100000"
        );
        assert_eq!(
            fs::read_to_string(cpu.join("cpu.cfs_period_us")).unwrap(),
            "1000000"
        );
    }

    #[test]
    fn test_v1_finish_removes_dirs() {
        let (dir, mut cfg) = fake_mount();
        cfg.cgroup_pids_max = 8;
        let pid = Pid::from_raw(322);
        CgroupV1::new().init_child(&cfg, pid).unwrap();
        let path = dir.path().join("pids/NSJAIL.322");
        fs::remove_file(path.join("tasks")).unwrap();

        CgroupV1::new().finish_child(&cfg, pid);
        assert!(!path.exists());
    }

    #[test]
    fn test_v1_skips_unconfigured_controllers() {
        let (dir, cfg) = fake_mount();
        CgroupV1::new().init_child(&cfg, Pid::from_raw(323)).unwrap();
        for controller in ["memory", "pids", "cpu"] {
            assert!(!dir.path().join(controller).join("NSJAIL.323").exists());
        }
    }
}
