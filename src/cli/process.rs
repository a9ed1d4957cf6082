//! Pid file bookkeeping and background process control.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Write `pid` to `path`, creating parent directories.
pub fn write_pid_file(path: &Path, pid: u32) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create PID directory: {parent:?}"))?;
    }
    let mut file =
        fs::File::create(path).with_context(|| format!("Failed to create PID file: {path:?}"))?;
    writeln!(file, "{pid}")?;
    info!(pid = pid, path = ?path, "PID file created");
    Ok(())
}

/// The recorded pid, or `None` if there is no pid file.
pub fn read_pid_file(path: &Path) -> Result<Option<u32>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read PID file: {path:?}"))?;
    let pid = raw
        .trim()
        .parse()
        .with_context(|| format!("Invalid PID in {path:?}: '{}'", raw.trim()))?;
    Ok(Some(pid))
}

pub fn remove_pid_file(path: &Path) {
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(error = %e, path = ?path, "Failed to remove PID file");
        } else {
            info!(path = ?path, "PID file removed");
        }
    }
}

/// Whether a process with `pid` exists.
#[cfg(unix)]
pub fn is_running(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // Signal 0 only checks existence; EPERM means it exists but isn't ours.
    matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(Errno::EPERM))
}

#[cfg(not(unix))]
pub fn is_running(_pid: u32) -> bool {
    false
}

/// Ask `pid` to shut down gracefully.
#[cfg(unix)]
pub fn terminate(pid: u32) -> Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).with_context(|| format!("PID {pid} out of range"))?;
    kill(Pid::from_raw(raw), Signal::SIGTERM)
        .with_context(|| format!("Failed to send SIGTERM to {pid}"))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn terminate(pid: u32) -> Result<()> {
    anyhow::bail!("Stopping process {pid} is only supported on unix")
}

/// Fail if another live server owns the pid file; clear it if stale.
///
/// A detached server finds its own pid already recorded by its parent.
pub fn check_existing(pid_path: &Path) -> Result<()> {
    let Some(pid) = read_pid_file(pid_path)? else {
        return Ok(());
    };
    if pid == std::process::id() {
        return Ok(());
    }
    if is_running(pid) {
        anyhow::bail!(
            "avatar-overlay is already running (PID: {pid}). \
             Stop it first or remove {pid_path:?} if it's stale."
        );
    }
    warn!(pid = pid, "Removing stale PID file");
    fs::remove_file(pid_path)?;
    Ok(())
}

/// Re-run this executable with `args` in its own process group, detached
/// from the terminal. Returns the child's pid.
pub fn spawn_detached(args: &[String]) -> Result<u32> {
    let exe = std::env::current_exe().context("Failed to locate current executable")?;
    let mut command = Command::new(exe);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    let child = command.spawn().context("Failed to spawn detached server")?;
    Ok(child.id())
}
