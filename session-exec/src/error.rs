use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to start {program} on a pty: {source}")]
    PtySpawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to start {program} with pipes: {source}")]
    PipeSpawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("unknown user {user}")]
    UnknownUser { user: String },
    #[error("failed to look up user {user}: {source}")]
    UserLookup {
        user: String,
        #[source]
        source: io::Error,
    },
}
