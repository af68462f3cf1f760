//! Command-line front-end
//!
//! Maps flags (optionally layered over a JSON config file) onto a
//! `JailConfig`, then supervises a single jailed command to completion.

use crate::config::{JailConfig, RunMode};
use crate::supervisor::Supervisor;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file used as the baseline; flags override it
    #[arg(long)]
    config: Option<PathBuf>,
    /// Wallclock limit in seconds, 0 disables the limit
    #[arg(long, short = 't')]
    time_limit: Option<u64>,
    /// Per-process CPU rlimit in seconds
    #[arg(long)]
    rl_cpu: Option<u64>,
    /// Skip rlimit setup entirely
    #[arg(long)]
    disable_rl: bool,
    /// cgroup memory.max in bytes
    #[arg(long)]
    cgroup_mem_max: Option<u64>,
    /// cgroup memory.swap.max in bytes
    #[arg(long)]
    cgroup_mem_swap_max: Option<i64>,
    /// Legacy combined memory+swap cap in bytes
    #[arg(long)]
    cgroup_mem_memsw_max: Option<u64>,
    /// cgroup pids.max
    #[arg(long)]
    cgroup_pids_max: Option<u64>,
    /// CPU bandwidth in milliseconds per wallclock second
    #[arg(long)]
    cgroup_cpu_ms_per_sec: Option<u64>,
    /// Mount point of the cgroup2 filesystem
    #[arg(long)]
    cgroupv2_mount: Option<PathBuf>,
    /// Keep the host environment instead of starting clean
    #[arg(long, short = 'e')]
    keep_env: bool,
    /// Extra KEY=VALUE environment entries for the payload
    #[arg(long = "env", short = 'E', value_name = "KEY=VALUE")]
    envs: Vec<String>,
    /// Unshare and exec in place instead of cloning a supervised child
    #[arg(long)]
    standalone: bool,
    /// Do not create a new network namespace
    #[arg(long)]
    disable_clone_newnet: bool,
    /// Do not create a new user namespace
    #[arg(long)]
    disable_clone_newuser: bool,
    /// Do not create a new mount namespace
    #[arg(long)]
    disable_clone_newns: bool,
    /// Do not create a new PID namespace
    #[arg(long)]
    disable_clone_newpid: bool,
    /// Do not create a new IPC namespace
    #[arg(long)]
    disable_clone_newipc: bool,
    /// Do not create a new UTS namespace
    #[arg(long)]
    disable_clone_newuts: bool,
    /// Do not create a new cgroup namespace
    #[arg(long)]
    disable_clone_newcgroup: bool,
    /// Create a new time namespace (standalone mode only)
    #[arg(long)]
    clone_newtime: bool,
    /// Program and arguments to execute
    #[arg(required = true, trailing_var_arg = true)]
    command: Vec<String>,
}

fn build_config(cli: &Cli) -> Result<JailConfig> {
    let mut cfg = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file '{}'", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("parsing config file '{}'", path.display()))?
        }
        None => JailConfig::default(),
    };

    if let Some(v) = cli.time_limit {
        cfg.tlimit = v;
    }
    if let Some(v) = cli.rl_cpu {
        cfg.rl_cpu = v;
    }
    if cli.disable_rl {
        cfg.disable_rl = true;
    }
    if let Some(v) = cli.cgroup_mem_max {
        cfg.cgroup_mem_max = v;
    }
    if let Some(v) = cli.cgroup_mem_swap_max {
        cfg.cgroup_mem_swap_max = v;
    }
    if let Some(v) = cli.cgroup_mem_memsw_max {
        cfg.cgroup_mem_memsw_max = v;
    }
    if let Some(v) = cli.cgroup_pids_max {
        cfg.cgroup_pids_max = v;
    }
    if let Some(v) = cli.cgroup_cpu_ms_per_sec {
        cfg.cgroup_cpu_ms_per_sec = v;
    }
    if let Some(v) = &cli.cgroupv2_mount {
        cfg.cgroupv2_mount = v.clone();
    }
    if cli.keep_env {
        cfg.keep_env = true;
    }
    cfg.envs.extend(cli.envs.iter().cloned());

    cfg.clone_newnet = !cli.disable_clone_newnet;
    cfg.clone_newuser = !cli.disable_clone_newuser;
    cfg.clone_newns = !cli.disable_clone_newns;
    cfg.clone_newpid = !cli.disable_clone_newpid;
    cfg.clone_newipc = !cli.disable_clone_newipc;
    cfg.clone_newuts = !cli.disable_clone_newuts;
    cfg.clone_newcgroup = !cli.disable_clone_newcgroup;
    cfg.clone_newtime = cli.clone_newtime;

    if cli.standalone {
        cfg.mode = RunMode::StandaloneExecve;
    }
    if cli.clone_newtime && !cli.standalone {
        bail!("a time namespace is only supported in --standalone mode");
    }

    cfg.exec_file = PathBuf::from(&cli.command[0]);
    cfg.argv = cli.command.clone();
    Ok(cfg)
}

pub fn run() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = build_config(&cli)?;

    let mut supervisor = Supervisor::with_defaults(cfg);
    let launched = supervisor
        .run_child(
            libc::STDIN_FILENO,
            libc::STDIN_FILENO,
            libc::STDOUT_FILENO,
            libc::STDERR_FILENO,
        )
        .context("launching the jailed command")?;
    if launched.is_none() {
        bail!("connection rejected by admission control");
    }

    // Timer-driven reap loop; SIGCHLD just makes a pass find work sooner.
    let mut code = 0;
    while supervisor.count_procs() > 0 {
        let rv = supervisor.reap();
        if rv != 0 {
            code = rv;
        }
        if supervisor.count_procs() > 0 {
            std::thread::sleep(Duration::from_millis(100));
        }
    }
    std::process::exit(code);
}
