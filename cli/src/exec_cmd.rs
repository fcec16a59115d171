use anyhow::Context;
use clap::Args;
use portal_session_exec::ExecutorConfig;
use portal_session_exec::Session;
use portal_session_exec::SessionExecutor;
use portal_session_exec::ShellCommand;
use portal_session_exec::UserAccount;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

#[derive(Debug, Args)]
pub struct ExecCommand {
    /// Account the command runs as.
    #[arg(long = "user", value_name = "NAME")]
    pub user: String,

    /// Host name recorded by `login(1)` for interactive sessions.
    #[arg(long = "host-label", value_name = "LABEL")]
    pub host_label: Option<String>,

    /// Command to run; the user's login shell when omitted.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Run one pipe-mode session wired to this process's stdio and return the
/// exit code to report.
pub async fn run_exec_command(command: ExecCommand) -> anyhow::Result<i32> {
    let account = UserAccount::lookup(&command.user)?;
    // Quote up front so a bad argv fails before anything is spawned.
    let raw_command = join_command(&command.command)?;
    let shell = ShellCommand::login_shell(&account);
    let mut config = ExecutorConfig::detect();
    if let Some(label) = command.host_label {
        config = config.with_host_label(label);
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupted, hanging up session");
                    cancel.cancel();
                }
                Err(err) => warn!("failed to listen for ctrl-c: {err}"),
            }
        }
    });

    let session = Session {
        user: account.name.clone(),
        credential: account.credential(),
        raw_command,
        pty: None,
        stdin: Box::new(tokio::io::stdin()),
        stdout: Box::new(tokio::io::stdout()),
        stderr: Box::new(tokio::io::stderr()),
        cancel,
    };
    let end = SessionExecutor::new(config)
        .execute(session, &shell)
        .await
        .with_context(|| format!("failed to run session for {}", account.name))?;

    Ok(end.exit_code.unwrap_or(1))
}

/// Quote `argv` into the single command string the login shell runs with
/// `-c`. An empty argv yields an empty command, which selects an
/// interactive shell.
fn join_command(argv: &[String]) -> anyhow::Result<String> {
    shlex::try_join(argv.iter().map(String::as_str))
        .map_err(|err| anyhow::anyhow!("cannot quote command {argv:?}: {err}"))
}
