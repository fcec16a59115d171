use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use portal_utils_pty::PipeProcess;
use portal_utils_pty::PtyMaster;
use portal_utils_pty::PtyProcess;
use portal_utils_pty::PtyStream;
use portal_utils_pty::SpawnRequest;
use portal_utils_pty::WindowSize;
use portal_utils_pty::process_group::hangup_process;
use portal_utils_pty::spawn_pipe_process;
use portal_utils_pty::spawn_pty_process;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::error::ExecError;
use crate::launch::ExecutorConfig;
use crate::launch::ShellCommand;
use crate::launch::plan_launch;
use crate::session::PtyRequest;
use crate::session::Session;
use crate::session::SessionEnd;
use crate::session::SessionReader;
use crate::session::SessionWriter;

/// How long buffered terminal output may still drain after the process exits.
const PTY_OUTPUT_DRAIN: Duration = Duration::from_millis(250);

/// How long a session waits to report the exit code of a process it just
/// hung up or whose stream closed first.
const PTY_EXIT_GRACE: Duration = Duration::from_millis(250);

/// Output pump, input pump and process wait each signal once.
const PTY_COMPLETION_SIGNALS: usize = 3;

/// Binds inbound sessions to local processes.
#[derive(Debug, Clone)]
pub struct SessionExecutor {
    config: ExecutorConfig,
}

impl SessionExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    /// Run one session to completion.
    ///
    /// Returns once the session is over: in pty mode when either stream
    /// closes or the process exits, in pipe mode when both output streams
    /// are drained, and in both modes when `session.cancel` fires. Copy
    /// errors are logged and end the session normally. Only a failure to
    /// start the process is returned as an error.
    pub async fn execute(
        &self,
        session: Session,
        shell: &ShellCommand,
    ) -> Result<SessionEnd, ExecError> {
        let Session {
            user,
            credential,
            raw_command,
            pty,
            stdin,
            stdout,
            stderr,
            cancel,
        } = session;

        let plan = plan_launch(&self.config, &user, &raw_command, credential, shell);
        info!(
            user = %user,
            strategy = ?plan.strategy,
            tty = pty.is_some(),
            "starting session process"
        );

        match pty {
            Some(pty) => run_pty(plan.request, pty, stdin, stdout, cancel).await,
            None => run_pipe(plan.request, stdin, stdout, stderr, cancel).await,
        }
    }
}

async fn run_pty(
    mut request: SpawnRequest,
    pty: PtyRequest,
    stdin: SessionReader,
    stdout: SessionWriter,
    cancel: CancellationToken,
) -> Result<SessionEnd, ExecError> {
    let PtyRequest {
        term,
        window,
        resizes,
    } = pty;
    request.env.insert("TERM".to_string(), term);

    let PtyProcess { mut child, master } =
        spawn_pty_process(&request, window).map_err(|source| {
            let err = ExecError::PtySpawn {
                program: request.program.display().to_string(),
                source,
            };
            error!("{err}");
            err
        })?;
    let pid = child.id();
    debug!(?pid, "pty process started");

    let (done_tx, mut done_rx) = mpsc::channel::<()>(PTY_COMPLETION_SIGNALS);
    let (exit_tx, mut exit_rx) = watch::channel(None::<i32>);

    let resize_task = tokio::spawn(apply_resizes(Arc::clone(&master), resizes));
    let mut output_task = tokio::spawn({
        let reader = PtyStream::new(Arc::clone(&master));
        let done_tx = done_tx.clone();
        async move {
            copy_stream("pty output", reader, stdout).await;
            let _ = done_tx.send(()).await;
        }
    });
    let input_task = tokio::spawn({
        let writer = PtyStream::new(master);
        let done_tx = done_tx.clone();
        async move {
            copy_stream("pty input", stdin, writer).await;
            let _ = done_tx.send(()).await;
        }
    });
    // Never aborted: this task reaps the process whenever it exits.
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                exit_tx.send_replace(Some(exit_code_of(status)));
            }
            Err(err) => warn!("failed to wait for pty process: {err}"),
        }
        let _ = done_tx.send(()).await;
    });

    tokio::select! {
        _ = done_rx.recv() => {}
        _ = cancel.cancelled() => debug!("pty session cancelled"),
    }

    let exited = exit_rx.borrow().is_some();
    if exited {
        if tokio::time::timeout(PTY_OUTPUT_DRAIN, &mut output_task)
            .await
            .is_err()
        {
            debug!("pty output still open after process exit");
        }
    } else {
        hangup(pid);
    }

    output_task.abort();
    input_task.abort();
    resize_task.abort();

    let exit_code =
        match tokio::time::timeout(PTY_EXIT_GRACE, exit_rx.wait_for(Option::is_some)).await {
            Ok(Ok(code)) => *code,
            _ => None,
        };
    Ok(SessionEnd { exit_code })
}

async fn run_pipe(
    request: SpawnRequest,
    stdin: SessionReader,
    stdout: SessionWriter,
    stderr: SessionWriter,
    cancel: CancellationToken,
) -> Result<SessionEnd, ExecError> {
    let PipeProcess {
        mut child,
        stdin: child_stdin,
        stdout: child_stdout,
        stderr: child_stderr,
    } = spawn_pipe_process(&request).map_err(|source| {
        let err = ExecError::PipeSpawn {
            program: request.program.display().to_string(),
            source,
        };
        error!("{err}");
        err
    })?;
    let pid = child.id();
    debug!(?pid, "pipe process started");

    // Nobody waits on stdin: a process that exits early must not be held up
    // by input that never arrives. Dropping the pipe on completion closes it.
    let stdin_task = tokio::spawn(copy_stream("stdin", stdin, child_stdin));
    let stdout_task = tokio::spawn(copy_stream("stdout", child_stdout, stdout));
    let stderr_task = tokio::spawn(copy_stream("stderr", child_stderr, stderr));
    let output_aborts = [stdout_task.abort_handle(), stderr_task.abort_handle()];

    let exit_code = tokio::select! {
        _ = async { tokio::join!(stdout_task, stderr_task) } => {
            match child.wait().await {
                Ok(status) => Some(exit_code_of(status)),
                Err(err) => {
                    warn!("failed to wait for pipe process: {err}");
                    None
                }
            }
        }
        _ = cancel.cancelled() => {
            debug!("pipe session cancelled");
            hangup(pid);
            for handle in &output_aborts {
                handle.abort();
            }
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
            None
        }
    };

    stdin_task.abort();

    Ok(SessionEnd { exit_code })
}

/// Copy `reader` into `writer` until either side closes.
///
/// The writer is dropped on return so the far side observes end of stream.
async fn copy_stream<R, W>(label: &'static str, mut reader: R, mut writer: W)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match tokio::io::copy(&mut reader, &mut writer).await {
        Ok(bytes) => debug!("{label} closed after {bytes} bytes"),
        Err(err) => debug!("{label} copy failed: {err}"),
    }
}

/// Apply every window change in arrival order until the sender goes away.
async fn apply_resizes(master: Arc<PtyMaster>, mut resizes: mpsc::Receiver<WindowSize>) {
    while let Some(size) = resizes.recv().await {
        if let Err(err) = master.resize(size) {
            warn!("failed to resize pty to {}x{}: {err}", size.cols, size.rows);
        }
    }
}

fn hangup(pid: Option<u32>) {
    let Some(pid) = pid else {
        return;
    };
    debug!(pid, "sending SIGHUP to session process");
    if let Err(err) = hangup_process(pid) {
        warn!(pid, "failed to send SIGHUP: {err}");
    }
}

fn exit_code_of(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}
