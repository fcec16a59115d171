#![deny(clippy::print_stdout, clippy::print_stderr)]

mod exec_cmd;
mod sql_proxy_cmd;

pub use exec_cmd::ExecCommand;
pub use exec_cmd::run_exec_command;
pub use sql_proxy_cmd::ListenAddr;
pub use sql_proxy_cmd::SqlProxyCommand;
pub use sql_proxy_cmd::load_descriptor;
pub use sql_proxy_cmd::run_sql_proxy_command;

use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "info";

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
