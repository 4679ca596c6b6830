//! Subprocess execution for the external tools Packastack shells out to
//! (`gbp`, `dpkg-buildpackage`, `sbuild`, `uscan`, `gpg`, `apt-ftparchive`):
//! signal forwarding, exit-code translation and timeout enforcement.

use std::os::unix::process::ExitStatusExt;
use std::process::{Child, Command, ExitStatus};
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use signal_hook::consts::signal::{SIGCHLD, SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::instrument;

/// Grace period between `SIGTERM` and `SIGKILL` when a timeout expires.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Runs a child process, forwarding `SIGTERM` to it and ignoring `SIGINT`
/// (the terminal already delivers `SIGINT` to the whole foreground process
/// group, so forwarding it again would double-deliver it).
#[instrument(skip_all, fields(command = %cmd.get_program().to_string_lossy()))]
pub fn run(cmd: &mut Command) -> Result<ExitStatus> {
    let mut signals = Signals::new([SIGCHLD, SIGINT, SIGTERM])?;
    let mut child = cmd.spawn()?;

    for signal in signals.forever() {
        match signal {
            SIGCHLD => {
                if let Some(status) = child.try_wait()? {
                    return Ok(status);
                }
            }
            SIGINT => {}
            SIGTERM => signal::kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM)?,
            _ => unreachable!(),
        }
    }
    unreachable!()
}

/// Like [`run`], but fails if the command didn't exit successfully.
#[instrument(skip_all, fields(command = %cmd.get_program().to_string_lossy()))]
pub fn run_and_check(cmd: &mut Command) -> Result<()> {
    let status = run(cmd)?;
    if !status.success() {
        bail!("command {cmd:?} failed with {status}");
    }
    Ok(())
}

/// Outcome of [`run_with_timeout`].
#[derive(Debug)]
pub enum TimedRunOutcome {
    Exited(ExitStatus),
    TimedOut,
}

/// Runs a child process, killing it (`SIGTERM` then `SIGKILL` after
/// [`KILL_GRACE`]) if it hasn't exited within `timeout`.
///
/// Used for the driver phases where the spec treats an unbounded external
/// tool invocation (`gbp buildpackage -S`, `sbuild`, ...) as `BUILD_FAILED`
/// on timeout rather than hanging the run.
#[instrument(skip_all, fields(command = %cmd.get_program().to_string_lossy(), timeout_secs = timeout.as_secs()))]
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<TimedRunOutcome> {
    let mut child = cmd.spawn()?;
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            return Ok(TimedRunOutcome::Exited(status));
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    terminate(&mut child)?;
    Ok(TimedRunOutcome::TimedOut)
}

fn terminate(child: &mut Child) -> Result<()> {
    let pid = Pid::from_raw(child.id() as i32);
    signal::kill(pid, Signal::SIGTERM)?;

    let grace_deadline = Instant::now() + KILL_GRACE;
    while Instant::now() < grace_deadline {
        if child.try_wait()?.is_some() {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    signal::kill(pid, Signal::SIGKILL)?;
    child.wait()?;
    Ok(())
}

/// Converts [`ExitStatus`] to a process exit code following POSIX shell
/// convention (128+signal for signal termination).
///
/// Panics if `status` does not represent an exited-or-signalled process,
/// which cannot happen for statuses obtained from [`std::process`] APIs.
pub fn status_to_exit_code(status: &ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        code as u8
    } else if let Some(signal) = status.signal() {
        128 + signal as u8
    } else {
        panic!("ExitStatus does not represent process exit: {status:?}");
    }
}

/// Returns `true` if `tool` resolves on `$PATH`, for the driver's
/// `TOOL_MISSING` precondition check before invoking `gbp`/`sbuild`/etc.
pub fn tool_on_path(tool: &str) -> bool {
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(tool).is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_process() -> Result<()> {
        run_and_check(&mut Command::new("true"))?;
        Ok(())
    }

    #[test]
    fn runs_failed_process() -> Result<()> {
        run(&mut Command::new("false"))?;
        assert!(run_and_check(&mut Command::new("false")).is_err());
        Ok(())
    }

    #[test]
    fn timeout_kills_sleeping_process() -> Result<()> {
        let outcome = run_with_timeout(
            Command::new("sleep").arg("30"),
            Duration::from_millis(200),
        )?;
        assert!(matches!(outcome, TimedRunOutcome::TimedOut));
        Ok(())
    }

    #[test]
    fn finds_sh_on_path() {
        assert!(tool_on_path("sh"));
        assert!(!tool_on_path("definitely-not-a-real-tool-xyz"));
    }
}
