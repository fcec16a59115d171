//! Session, terminal and signal helpers shared by the pipe and pty spawners.
//!
//! - `detach_from_tty` runs in `pre_exec` so the child becomes the leader of
//!   a new session with no controlling terminal.
//! - `acquire_controlling_terminal` (pty only) then makes stdin, which is the
//!   pty slave, the controlling terminal of that session.
//! - `set_parent_death_signal` (Linux only) arranges for the child to receive
//!   `SIGTERM` when the connector exits, re-checking the parent PID to avoid
//!   races during fork/exec.
//! - `hangup_process` delivers `SIGHUP` when a session ends before its
//!   process does.

use std::io;

/// Start a new session with the calling process as its leader.
///
/// Intended for use in `pre_exec`.
pub fn detach_from_tty() -> io::Result<()> {
    let result = unsafe { libc::setsid() };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Make stdin the controlling terminal of the calling session.
///
/// Must run after [`detach_from_tty`] in `pre_exec`, once stdin has been
/// replaced by the pty slave.
pub fn acquire_controlling_terminal() -> io::Result<()> {
    let result = unsafe { libc::ioctl(libc::STDIN_FILENO, libc::TIOCSCTTY as _, 0) };
    if result == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Have the kernel send `SIGTERM` to the calling process once the connector
/// exits (Linux only; a no-op elsewhere).
///
/// Runs in `pre_exec`. `parent_pid` is captured before the fork: if the
/// connector is already gone by the time this runs, the signal is raised
/// immediately instead.
pub fn set_parent_death_signal(parent_pid: libc::pid_t) -> io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        if unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) } == -1 {
            return Err(io::Error::last_os_error());
        }
        let orphaned = unsafe { libc::getppid() } != parent_pid;
        if orphaned && unsafe { libc::raise(libc::SIGTERM) } == -1 {
            return Err(io::Error::last_os_error());
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = parent_pid;

    Ok(())
}

/// Send `SIGHUP` to `pid` (best-effort).
///
/// A process that already exited is not an error.
pub fn hangup_process(pid: u32) -> io::Result<()> {
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGHUP) };
    if result == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }

    Ok(())
}
