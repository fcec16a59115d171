use clap::Parser;
use clap::Subcommand;
use portal_cli::ExecCommand;
use portal_cli::SqlProxyCommand;
use portal_cli::init_tracing;
use portal_cli::run_exec_command;
use portal_cli::run_sql_proxy_command;

/// Portal connector runtime.
#[derive(Debug, Parser)]
#[clap(author, version, bin_name = "portal-connector")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Relay database clients to the backend described by a config file.
    SqlProxy(SqlProxyCommand),

    /// Run a command (or login shell) as another user on this host.
    Exec(ExecCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    match Cli::parse().command {
        Command::SqlProxy(command) => run_sql_proxy_command(command).await,
        Command::Exec(command) => {
            let code = run_exec_command(command).await?;
            std::process::exit(code);
        }
    }
}
