use std::io;
use std::process::Stdio;

use tokio::process::Child;
use tokio::process::ChildStderr;
use tokio::process::ChildStdin;
use tokio::process::ChildStdout;
use tracing::warn;

use crate::process::SpawnRequest;

/// A child wired to three independent pipes.
#[derive(Debug)]
pub struct PipeProcess {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Spawn `request` with piped stdin/stdout/stderr and no controlling terminal.
///
/// The child leads its own session. If any pipe is unavailable after spawn
/// the child is killed and an error is returned, so callers never observe a
/// half-wired process.
pub fn spawn_process(request: &SpawnRequest) -> io::Result<PipeProcess> {
    let mut command = request.command()?;
    command.stdin(Stdio::piped());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    let parent_pid = unsafe { libc::getpid() };
    unsafe {
        command.pre_exec(move || {
            crate::process_group::detach_from_tty()?;
            crate::process_group::set_parent_death_signal(parent_pid)?;
            Ok(())
        });
    }

    let mut child = command.spawn()?;
    let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
    let (Some(stdin), Some(stdout), Some(stderr)) = pipes else {
        if let Err(err) = child.start_kill() {
            warn!("failed to kill child with missing pipes: {err}");
        }
        return Err(io::Error::other("failed to obtain child stdio pipes"));
    };

    Ok(PipeProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}
