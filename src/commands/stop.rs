use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant};

use crate::commands::CommandReport;
use crate::tether::lock::read_lock_pid;
use crate::tether::paths::resolve_paths;
use crate::tether::util::pid_alive;

const STOP_TIMEOUT: Duration = Duration::from_secs(8);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DAEMON_COMMAND_MARKER: &str = "watch --daemon";

/// What the pid recorded in the daemon lock currently points at.
#[derive(Debug, PartialEq, Eq)]
enum DaemonState {
    Gone,
    Foreign(String),
    Watcher,
}

/// One `ps -o <field>=` column for `pid`, or `None` when ps does not know it.
fn ps_field(pid: u32, field: &str) -> Result<Option<String>> {
    let output = Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", &format!("{field}=")])
        .output()
        .with_context(|| format!("failed to inspect pid {pid} with `ps -o {field}=`"))?;
    if !output.status.success() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
}

fn is_running(pid: u32) -> Result<bool> {
    if !pid_alive(pid) {
        return Ok(false);
    }
    // Zombies have exited and only wait to be reaped.
    Ok(ps_field(pid, "stat")?.is_some_and(|stat| !stat.starts_with('Z')))
}

fn classify(pid: u32) -> Result<DaemonState> {
    if !is_running(pid)? {
        return Ok(DaemonState::Gone);
    }
    let command_line = ps_field(pid, "command")?.unwrap_or_default();
    if command_line.contains(DAEMON_COMMAND_MARKER) {
        Ok(DaemonState::Watcher)
    } else {
        Ok(DaemonState::Foreign(command_line))
    }
}

fn terminate(pid: u32) -> Result<()> {
    let status = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()
        .context("failed to send SIGTERM with `kill -TERM`")?;
    if !status.success() && is_running(pid)? {
        anyhow::bail!("`kill -TERM {pid}` failed and process is still alive");
    }
    Ok(())
}

/// Poll until `pid` exits. Returns false when `timeout` elapses first.
fn wait_for_exit(pid: u32, timeout: Duration) -> Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        if !is_running(pid)? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(STOP_POLL_INTERVAL);
    }
}

fn remove_lock(lock_path: &Path, report: &mut CommandReport) {
    match fs::remove_file(lock_path) {
        Ok(()) => report.detail(format!("removed daemon lock {}", lock_path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => report.detail(format!(
            "could not remove daemon lock {}: {err}",
            lock_path.display()
        )),
    }
}

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("stop");
    let lock_path = resolve_paths()?.daemon_lock_file();
    report.detail(format!("daemon_lock={}", lock_path.display()));

    if !lock_path.exists() {
        report.detail("tether watcher daemon already stopped (no lock file)");
        return Ok(report);
    }

    let pid = match read_lock_pid(&lock_path) {
        Ok(pid) => pid,
        Err(err) => {
            report.issue(format!("unreadable daemon lock: {err:#}"));
            return Ok(report);
        }
    };
    report.detail(format!("daemon_pid={pid}"));

    match classify(pid)? {
        DaemonState::Gone => {
            report.detail(format!("pid {pid} is not running; lock was stale"));
            remove_lock(&lock_path, &mut report);
        }
        DaemonState::Foreign(command_line) => {
            let shown = if command_line.is_empty() {
                "<unknown>"
            } else {
                command_line.as_str()
            };
            report.issue(format!(
                "refusing to stop pid {pid}; it is not a tether watcher: {shown}"
            ));
        }
        DaemonState::Watcher => {
            terminate(pid)?;
            if wait_for_exit(pid, STOP_TIMEOUT)? {
                report.detail(format!("stopped tether watcher pid={pid}"));
                remove_lock(&lock_path, &mut report);
            } else {
                report.issue(format!(
                    "pid {pid} still running {}s after SIGTERM",
                    STOP_TIMEOUT.as_secs()
                ));
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_running_but_not_a_watcher() {
        let pid = std::process::id();
        assert!(is_running(pid).expect("check self"));
        match classify(pid).expect("classify") {
            DaemonState::Foreign(_) => {}
            other => panic!("expected foreign process, got {other:?}"),
        }
    }

    #[test]
    fn exited_child_waits_out_immediately() {
        let mut child = Command::new("true").spawn().expect("spawn true");
        let pid = child.id();
        child.wait().expect("reap child");
        assert!(wait_for_exit(pid, Duration::from_millis(200)).expect("wait"));
    }
}
