use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use takeover_cli::cli::{
    execute, print_response, run_daemon, CliCommand, CliConfig, ConsoleNotifier, SitesCommand,
};
use takeover_core::tracing_setup::init_tracing_with_service;
use takeover_core::TakeoverRuntime;

#[derive(Parser)]
#[command(name = "takeover")]
#[command(about = "Full-page meeting reminders for every open tab")]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, short)]
    pretty: bool,

    /// Path to JSON config file (core settings and virtual tabs)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a reminder
    Add {
        /// Reminder title
        title: String,
        /// Date as YYYY-MM-DD
        date: String,
        /// Time as HH:MM
        time: String,
        /// Optional note shown under the title
        #[arg(long, short = 'n', default_value = "")]
        note: String,
    },

    /// Replace an existing reminder's fields
    Edit {
        /// Reminder ID
        id: String,
        title: String,
        date: String,
        time: String,
        #[arg(long, short = 'n', default_value = "")]
        note: String,
    },

    /// List active reminders
    List,

    /// Delete a reminder
    Delete {
        /// Reminder ID
        id: String,
    },

    /// Delete all reminders
    Clear,

    /// Manage sites that never get a takeover
    Sites {
        #[command(subcommand)]
        action: SitesAction,
    },

    /// Show storage usage
    Usage,

    /// Show a test takeover in the configured tabs
    Test,

    /// Run the controller in the foreground
    Run {
        /// Seconds between alarm reconciliations
        #[arg(long, default_value_t = 60)]
        reconcile_secs: u64,
    },
}

#[derive(Subcommand)]
enum SitesAction {
    /// List whitelisted sites
    List,
    /// Add a site (domain or URL)
    Add { site: String },
    /// Remove a site
    Remove { site: String },
}

#[tokio::main]
async fn main() {
    init_tracing_with_service("takeover");
    let cli = Cli::parse();

    let mut config = load_config(&cli);
    if let Some(ref dir) = cli.data_dir {
        config.core.data_dir = dir.clone();
    }

    let command = match cli.command {
        Some(Commands::Add {
            title,
            date,
            time,
            note,
        }) => CliCommand::Add {
            title,
            date,
            time,
            note,
        },
        Some(Commands::Edit {
            id,
            title,
            date,
            time,
            note,
        }) => CliCommand::Edit {
            id,
            title,
            date,
            time,
            note,
        },
        Some(Commands::List) => CliCommand::List,
        Some(Commands::Delete { id }) => CliCommand::Delete { id },
        Some(Commands::Clear) => CliCommand::Clear,
        Some(Commands::Sites { action }) => CliCommand::Sites(match action {
            SitesAction::List => SitesCommand::List,
            SitesAction::Add { site } => SitesCommand::Add { site },
            SitesAction::Remove { site } => SitesCommand::Remove { site },
        }),
        Some(Commands::Usage) => CliCommand::Usage,
        Some(Commands::Test) => CliCommand::Test,
        Some(Commands::Run { reconcile_secs }) => {
            let runtime = open_runtime(&config);
            let every = Duration::from_secs(reconcile_secs.max(1));
            if let Err(e) = run_daemon(runtime, cli.pretty, every).await {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
            return;
        }
        None => {
            eprintln!("No command specified. Use --help for usage.");
            std::process::exit(1);
        }
    };

    let runtime = open_runtime(&config);
    let response = execute(&runtime, command).await;
    if let Err(e) = print_response(&response, cli.pretty) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    if response.is_error() {
        std::process::exit(1);
    }
}

fn open_runtime(config: &CliConfig) -> TakeoverRuntime {
    match TakeoverRuntime::open(config.core.clone(), &config.tabs, Arc::new(ConsoleNotifier)) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Load configuration from file, or defaults when no file is given
fn load_config(cli: &Cli) -> CliConfig {
    let Some(ref path) = cli.config else {
        return CliConfig::default();
    };
    match CliConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
