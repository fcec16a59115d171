#![deny(clippy::print_stdout, clippy::print_stderr)]

mod account;
mod error;
mod executor;
mod launch;
mod session;

pub use account::UserAccount;
pub use error::ExecError;
pub use executor::SessionExecutor;
pub use launch::DEFAULT_HOST_LABEL;
pub use launch::ExecutorConfig;
pub use launch::LaunchPlan;
pub use launch::LaunchStrategy;
pub use launch::ShellCommand;
pub use launch::plan_launch;
pub use launch::select_strategy;
pub use portal_utils_pty::Credential;
pub use portal_utils_pty::WindowSize;
pub use session::PtyRequest;
pub use session::Session;
pub use session::SessionEnd;
pub use session::SessionReader;
pub use session::SessionWriter;
