use std::io;
use std::path::PathBuf;

use nix::unistd::User;
use portal_utils_pty::Credential;

use crate::error::ExecError;

/// A passwd entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: PathBuf,
}

impl UserAccount {
    /// Resolve `name` through the system passwd database.
    pub fn lookup(name: &str) -> Result<Self, ExecError> {
        let unknown = || ExecError::UnknownUser {
            user: name.to_string(),
        };
        if name.contains('\0') {
            return Err(unknown());
        }

        let user = User::from_name(name)
            .map_err(|errno| ExecError::UserLookup {
                user: name.to_string(),
                source: io::Error::from(errno),
            })?
            .ok_or_else(unknown)?;
        Ok(Self::from(user))
    }

    pub fn credential(&self) -> Credential {
        Credential {
            uid: self.uid,
            gid: self.gid,
        }
    }
}

impl From<User> for UserAccount {
    fn from(user: User) -> Self {
        Self {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
            home: user.dir,
            shell: user.shell,
        }
    }
}
