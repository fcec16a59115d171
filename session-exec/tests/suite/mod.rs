#![allow(clippy::unwrap_used, clippy::expect_used)]

mod pipe_session;

use std::io::Cursor;
use std::path::PathBuf;

use portal_session_exec::Credential;
use portal_session_exec::DEFAULT_HOST_LABEL;
use portal_session_exec::ExecutorConfig;
use portal_session_exec::PtyRequest;
use portal_session_exec::Session;
use portal_session_exec::SessionExecutor;
use portal_session_exec::SessionReader;
use portal_session_exec::SessionWriter;
use portal_session_exec::ShellCommand;
use tokio::io::AsyncReadExt;
use tokio::io::DuplexStream;
use tokio_util::sync::CancellationToken;

pub(crate) const STREAM_CAPACITY: usize = 64 * 1024;

pub(crate) fn executor() -> SessionExecutor {
    SessionExecutor::new(ExecutorConfig {
        host_label: DEFAULT_HOST_LABEL.to_string(),
        privileged: false,
        login_helper: None,
    })
}

pub(crate) fn sh() -> ShellCommand {
    ShellCommand {
        program: PathBuf::from("/bin/sh"),
        args: Vec::new(),
        env: std::env::vars().collect(),
        cwd: None,
    }
}

pub(crate) fn current_credential() -> Credential {
    Credential {
        uid: unsafe { libc::getuid() },
        gid: unsafe { libc::getgid() },
    }
}

/// Streams the test keeps: the writer feeding session input and the
/// readers draining session output.
pub(crate) struct Peer {
    pub stdin: Option<DuplexStream>,
    pub stdout: DuplexStream,
    pub stderr: DuplexStream,
}

pub(crate) fn session(
    raw_command: &str,
    pty: Option<PtyRequest>,
    cancel: CancellationToken,
) -> (Session, Peer) {
    let (stdin_tx, stdin_rx) = tokio::io::duplex(STREAM_CAPACITY);
    let (stdout_tx, stdout_rx) = tokio::io::duplex(STREAM_CAPACITY);
    let (stderr_tx, stderr_rx) = tokio::io::duplex(STREAM_CAPACITY);
    let session = Session {
        user: "tester".to_string(),
        credential: current_credential(),
        raw_command: raw_command.to_string(),
        pty,
        stdin: Box::new(stdin_rx),
        stdout: Box::new(stdout_tx),
        stderr: Box::new(stderr_tx),
        cancel,
    };
    let peer = Peer {
        stdin: Some(stdin_tx),
        stdout: stdout_rx,
        stderr: stderr_rx,
    };
    (session, peer)
}

pub(crate) fn session_with_input(raw_command: &str, input: &[u8]) -> (Session, Peer) {
    let (mut session, peer) = session(raw_command, None, CancellationToken::new());
    let stdin: SessionReader = Box::new(Cursor::new(input.to_vec()));
    session.stdin = stdin;
    (session, peer)
}

pub(crate) async fn read_all(mut reader: DuplexStream) -> String {
    let mut collected = Vec::new();
    reader.read_to_end(&mut collected).await.unwrap();
    String::from_utf8_lossy(&collected).into_owned()
}

pub(crate) fn discard() -> SessionWriter {
    Box::new(tokio::io::sink())
}

#[cfg(unix)]
pub(crate) fn process_exists(pid: i32) -> bool {
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}
