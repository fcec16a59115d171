//! Protocol-aware relay between database clients and an upstream SQL engine.
//!
//! [`build_proxy_config`] turns a [`BackendDescriptor`] into a
//! [`ProxyConfig`]; [`serve`] runs the accept loop for one listener and hands
//! every connection to the [`ProtocolHandler`] picked for it at startup.
#![deny(clippy::print_stdout, clippy::print_stderr)]

mod acceptor;
mod cloudsql;
mod config;
mod dialer;
mod error;
mod handler;
mod listener;
mod postgres;
mod tls;

pub use acceptor::serve;
pub use cloudsql::CloudSqlDialer;
pub use cloudsql::CloudSqlDialerFactory;
pub use cloudsql::DEFAULT_SOCKET_DIR;
pub use cloudsql::InstanceConnectionName;
pub use cloudsql::ManagedDialer;
pub use cloudsql::ManagedDialerFactory;
pub use cloudsql::ManagedDialerOptions;
pub use cloudsql::ServiceAccount;
pub use config::BackendDescriptor;
pub use config::ProxyConfig;
pub use config::build_proxy_config;
pub use config::build_proxy_config_with;
pub use dialer::DialFn;
pub use dialer::DialFuture;
pub use dialer::UpstreamIo;
pub use dialer::UpstreamStream;
pub use dialer::dial_upstream;
pub use error::HandlerError;
pub use error::ManagedDialerError;
pub use error::ProxyError;
pub use handler::MysqlHandler;
pub use handler::ProtocolHandler;
pub use handler::UpstreamKind;
pub use listener::Listener;
pub use postgres::PostgresHandler;
