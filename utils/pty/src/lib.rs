pub mod pipe;
mod process;
pub mod process_group;
pub mod pty;

/// Spawn a process using three independent pipes for stdin/stdout/stderr.
pub use pipe::spawn_process as spawn_pipe_process;
/// Pipe endpoints plus the child handle returned by the pipe spawn helper.
pub use pipe::PipeProcess;
/// Identity the child switches to before exec.
pub use process::Credential;
/// Program, arguments, environment and identity for a spawn helper.
pub use process::SpawnRequest;
/// Async handle to the master side of a pseudo-terminal.
pub use pty::PtyMaster;
/// Master handle plus the child handle returned by the PTY spawn helper.
pub use pty::PtyProcess;
/// `AsyncRead`/`AsyncWrite` view over a shared [`PtyMaster`].
pub use pty::PtyStream;
/// Terminal dimensions in character cells.
pub use pty::WindowSize;
/// Allocate a PTY pair without spawning anything.
pub use pty::open_pty;
/// Spawn a process attached to a PTY as its controlling terminal.
pub use pty::spawn_process as spawn_pty_process;
