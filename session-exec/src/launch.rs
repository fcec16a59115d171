use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use portal_utils_pty::Credential;
use portal_utils_pty::SpawnRequest;
use tracing::warn;

use crate::account::UserAccount;

/// Host name `login(1)` records for sessions started through the helper.
pub const DEFAULT_HOST_LABEL: &str = "Portal";

const DEFAULT_SHELL: &str = "/bin/sh";
const FALLBACK_CWD: &str = "/";
const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Host facts that decide how privileges are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Passed to the login helper as `-h`.
    pub host_label: String,
    /// True when the connector runs with euid 0.
    pub privileged: bool,
    /// Location of `login(1)`, if the host has one.
    pub login_helper: Option<PathBuf>,
}

impl ExecutorConfig {
    /// Inspect the current process and `PATH`.
    pub fn detect() -> Self {
        Self {
            host_label: DEFAULT_HOST_LABEL.to_string(),
            privileged: unsafe { libc::geteuid() } == 0,
            login_helper: which::which("login").ok(),
        }
    }

    pub fn with_host_label(mut self, host_label: impl Into<String>) -> Self {
        self.host_label = host_label.into();
        self
    }
}

/// Shell invocation the session runs through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
}

impl ShellCommand {
    /// The account's own shell, started in its home directory with a minimal
    /// login environment. Accounts whose home is missing start in `/`.
    pub fn login_shell(account: &UserAccount) -> Self {
        let program = if account.shell.as_os_str().is_empty() {
            PathBuf::from(DEFAULT_SHELL)
        } else {
            account.shell.clone()
        };

        let mut env = HashMap::new();
        env.insert("HOME".to_string(), account.home.display().to_string());
        env.insert("USER".to_string(), account.name.clone());
        env.insert("LOGNAME".to_string(), account.name.clone());
        env.insert("SHELL".to_string(), program.display().to_string());
        env.insert("PATH".to_string(), DEFAULT_PATH.to_string());

        let cwd = if account.home.is_dir() {
            account.home.clone()
        } else {
            warn!(
                user = %account.name,
                home = %account.home.display(),
                "home directory is missing, starting in {FALLBACK_CWD}"
            );
            PathBuf::from(FALLBACK_CWD)
        };

        Self {
            program,
            args: Vec::new(),
            env,
            cwd: Some(cwd),
        }
    }
}

/// How the session process reaches its target identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchStrategy {
    /// `shell -c <command>` with uid/gid set directly.
    DirectCommand,
    /// `login -p -h <label> -f <user>`; the helper switches identity itself.
    LoginHelper,
    /// The shell as a login shell (`argv[0]` prefixed with `-`), uid/gid set
    /// directly.
    LoginShell,
}

/// Privilege decision table.
///
/// | command | privileged | helper  | strategy      |
/// |---------|------------|---------|---------------|
/// | present | any        | any     | DirectCommand |
/// | empty   | yes        | found   | LoginHelper   |
/// | empty   | yes        | missing | LoginShell    |
/// | empty   | no         | any     | LoginShell    |
pub fn select_strategy(has_command: bool, privileged: bool, helper_found: bool) -> LaunchStrategy {
    match (has_command, privileged, helper_found) {
        (true, _, _) => LaunchStrategy::DirectCommand,
        (false, true, true) => LaunchStrategy::LoginHelper,
        // Without a helper a privileged host still drops to the target
        // identity rather than handing out a root shell.
        (false, true, false) => LaunchStrategy::LoginShell,
        (false, false, _) => LaunchStrategy::LoginShell,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub strategy: LaunchStrategy,
    pub request: SpawnRequest,
}

/// Build the spawn request for one session.
pub fn plan_launch(
    config: &ExecutorConfig,
    user: &str,
    raw_command: &str,
    credential: Credential,
    shell: &ShellCommand,
) -> LaunchPlan {
    let strategy = select_strategy(
        !raw_command.is_empty(),
        config.privileged,
        config.login_helper.is_some(),
    );

    let mut request = SpawnRequest {
        program: shell.program.clone(),
        args: shell.args.clone(),
        arg0: None,
        env: shell.env.clone(),
        cwd: shell.cwd.clone(),
        credential: Some(credential),
    };

    match (strategy, config.login_helper.as_ref()) {
        (LaunchStrategy::DirectCommand, _) => {
            request.args.push("-c".to_string());
            request.args.push(raw_command.to_string());
        }
        (LaunchStrategy::LoginHelper, Some(helper)) => {
            request.program = helper.clone();
            request.args = vec![
                "-p".to_string(),
                "-h".to_string(),
                config.host_label.clone(),
                "-f".to_string(),
                user.to_string(),
            ];
            request.credential = None;
        }
        (LaunchStrategy::LoginHelper, None) | (LaunchStrategy::LoginShell, _) => {
            request.args.clear();
            request.arg0 = Some(login_arg0(&shell.program));
        }
    }

    LaunchPlan { strategy, request }
}

fn login_arg0(program: &Path) -> String {
    let name = program
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string());
    format!("-{name}")
}
