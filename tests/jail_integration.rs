//! End-to-end supervision scenarios that run without privileges.
//!
//! Namespaces and cgroup limits are switched off so the clone/handshake/
//! reap machinery can be exercised as an ordinary user. Everything that
//! spawns children lives in a single test function: the reap pass waits on
//! any child of the process, so concurrently forking tests would steal each
//! other's exits.

use procjail::config::{JailConfig, RunMode};
use procjail::supervisor::Supervisor;
use std::time::{Duration, Instant};

fn unprivileged_config(argv: &[&str]) -> JailConfig {
    JailConfig {
        mode: RunMode::Clone,
        clone_newnet: false,
        clone_newuser: false,
        clone_newns: false,
        clone_newpid: false,
        clone_newipc: false,
        clone_newuts: false,
        clone_newcgroup: false,
        clone_newtime: false,
        exec_file: argv[0].into(),
        argv: argv.iter().map(|s| s.to_string()).collect(),
        tlimit: 0,
        disable_rl: true,
        ..Default::default()
    }
}

fn spawn(sup: &mut Supervisor) -> nix::unistd::Pid {
    sup.run_child(libc::STDIN_FILENO, 0, 1, 2)
        .expect("launch failed")
        .expect("connection was rejected")
}

/// Reap until the table drains, returning the last nonzero mapped code.
fn wait_all(sup: &mut Supervisor, budget: Duration) -> i32 {
    let start = Instant::now();
    let mut code = 0;
    while sup.count_procs() > 0 {
        let rv = sup.reap();
        if rv != 0 {
            code = rv;
        }
        if sup.count_procs() == 0 {
            break;
        }
        assert!(
            start.elapsed() < budget,
            "children did not exit within {:?}",
            budget
        );
        std::thread::sleep(Duration::from_millis(50));
    }
    code
}

/// A child that failed its bootstrap exits 0xff after its record was rolled
/// back; keep reaping until that orphan is collected.
fn drain_failed_child(sup: &mut Supervisor) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if sup.reap() == 0xff {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "failed child was never collected"
        );
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn test_supervised_child_lifecycles() {
    // Normal exit with status 0.
    let mut sup = Supervisor::with_defaults(unprivileged_config(&["/bin/true"]));
    spawn(&mut sup);
    assert_eq!(wait_all(&mut sup, Duration::from_secs(10)), 0);
    assert_eq!(sup.count_procs(), 0);

    // Nonzero exit propagates unchanged.
    let mut sup = Supervisor::with_defaults(unprivileged_config(&["/bin/sh", "-c", "exit 3"]));
    spawn(&mut sup);
    assert_eq!(wait_all(&mut sup, Duration::from_secs(10)), 3);

    // Signal death maps to 128 + signo.
    let mut sup =
        Supervisor::with_defaults(unprivileged_config(&["/bin/sh", "-c", "kill -TERM $$"]));
    spawn(&mut sup);
    assert_eq!(
        wait_all(&mut sup, Duration::from_secs(10)),
        128 + libc::SIGTERM
    );

    // Wallclock expiry: SIGCONT+SIGKILL from the reap pass, 128 + 9.
    let mut cfg = unprivileged_config(&["/bin/sleep", "30"]);
    cfg.tlimit = 1;
    let mut sup = Supervisor::with_defaults(cfg);
    let started = Instant::now();
    spawn(&mut sup);
    assert_eq!(
        wait_all(&mut sup, Duration::from_secs(15)),
        128 + libc::SIGKILL
    );
    assert!(started.elapsed() < Duration::from_secs(10));

    // tlimit == 0 disables wallclock enforcement entirely.
    let mut sup = Supervisor::with_defaults(unprivileged_config(&["/bin/sleep", "0.4"]));
    spawn(&mut sup);
    assert_eq!(wait_all(&mut sup, Duration::from_secs(10)), 0);

    // Setup failure before exec: the child reports 'E' and registration
    // is rolled back, leaving a zombie for a later pass.
    let mut sup =
        Supervisor::with_defaults(unprivileged_config(&["/nonexistent/procjail-payload"]));
    assert!(sup.run_child(libc::STDIN_FILENO, 0, 1, 2).is_err());
    assert_eq!(sup.count_procs(), 0);
    drain_failed_child(&mut sup);

    // Exec-by-fd with a dead fd fails the same way.
    let mut cfg = unprivileged_config(&["payload"]);
    cfg.use_execveat = true;
    cfg.exec_fd = Some(-1);
    let mut sup = Supervisor::with_defaults(cfg);
    assert!(sup.run_child(libc::STDIN_FILENO, 0, 1, 2).is_err());
    drain_failed_child(&mut sup);

    // A burst of exits is fully drained; the pass only stops when waitid
    // reports no more children.
    let mut sup = Supervisor::with_defaults(unprivileged_config(&["/bin/true"]));
    for _ in 0..3 {
        spawn(&mut sup);
    }
    assert_eq!(sup.count_procs(), 3);
    wait_all(&mut sup, Duration::from_secs(10));
    assert_eq!(sup.count_procs(), 0);

    // Shutdown: kill and reap everything that is still running.
    let mut sup = Supervisor::with_defaults(unprivileged_config(&["/bin/sleep", "30"]));
    spawn(&mut sup);
    spawn(&mut sup);
    assert_eq!(sup.count_procs(), 2);
    sup.kill_and_reap_all(nix::sys::signal::Signal::SIGKILL);
    assert_eq!(sup.count_procs(), 0);
}

#[test]
fn test_supervisor_observability_without_children() {
    let sup = Supervisor::with_defaults(unprivileged_config(&["/bin/true"]));
    assert_eq!(sup.count_procs(), 0);
    // Must not panic on an empty table.
    sup.display_procs();
}
