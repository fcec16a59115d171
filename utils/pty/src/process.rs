use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use tokio::process::Command;

/// Target identity for a spawned process.
///
/// Applied in the child between fork and exec. When the parent runs as root
/// the supplementary group list is cleared before `setuid`, so the child
/// never inherits the connector's groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credential {
    pub uid: u32,
    pub gid: u32,
}

/// Everything the spawn helpers need to start one child process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Overrides `argv[0]`; login shells use this for the leading `-`.
    pub arg0: Option<String>,
    /// The child sees exactly this environment.
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub credential: Option<Credential>,
}

impl SpawnRequest {
    pub(crate) fn command(&self) -> io::Result<Command> {
        if self.program.as_os_str().is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "missing program for spawn",
            ));
        }

        let mut command = Command::new(&self.program);
        if let Some(arg0) = &self.arg0 {
            command.arg0(arg0);
        }
        command.args(&self.args);
        command.env_clear();
        command.envs(&self.env);
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        if let Some(credential) = self.credential {
            command.uid(credential.uid);
            command.gid(credential.gid);
        }
        Ok(command)
    }
}
