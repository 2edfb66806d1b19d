pub mod commands;
pub mod config;
pub mod daemon;
pub mod notify;
pub mod protocol;

pub use commands::{execute, print_response};
pub use config::CliConfig;
pub use daemon::run_daemon;
pub use notify::ConsoleNotifier;
pub use protocol::{CliCommand, Response, SitesCommand};
