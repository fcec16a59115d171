use portal_utils_pty::Credential;
use portal_utils_pty::WindowSize;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub type SessionReader = Box<dyn AsyncRead + Send + Unpin>;
pub type SessionWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Terminal requested by the client.
#[derive(Debug)]
pub struct PtyRequest {
    /// Exported to the process as `TERM`.
    pub term: String,
    pub window: WindowSize,
    /// Window changes, applied in arrival order until the sender is dropped.
    pub resizes: mpsc::Receiver<WindowSize>,
}

/// One inbound command or shell request, as handed over by the transport.
///
/// The executor consumes the streams for the duration of one execution. The
/// transport keeps a clone of `cancel` and fires it when the channel goes
/// away.
pub struct Session {
    pub user: String,
    /// Resolved identity for `user`.
    pub credential: Credential,
    /// Raw command text; empty requests an interactive login shell.
    pub raw_command: String,
    pub pty: Option<PtyRequest>,
    pub stdin: SessionReader,
    pub stdout: SessionWriter,
    pub stderr: SessionWriter,
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("credential", &self.credential)
            .field("raw_command", &self.raw_command)
            .field("pty", &self.pty)
            .finish_non_exhaustive()
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionEnd {
    /// Exit code when the process was reaped before the session ended.
    /// Signal deaths report `128 + signal`.
    pub exit_code: Option<i32>,
}
