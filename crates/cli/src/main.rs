mod config_commands;
mod library_commands;
mod page_commands;
mod schedule_commands;

use std::path::PathBuf;

use {
    cartograph_config::CartographConfig,
    clap::{Parser, Subcommand},
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "cartograph",
    version,
    about = "Map live pages onto container libraries"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of the standard locations.
    #[arg(long, global = true, env = "CARTOGRAPH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Container library inspection.
    Library {
        #[command(subcommand)]
        action: library_commands::LibraryAction,
    },
    /// Open a page and match its container library against it.
    Match(page_commands::MatchArgs),
    /// Open a page and fetch the DOM branch under a path.
    Branch(page_commands::BranchArgs),
    /// Scheduled task administration.
    Schedule {
        #[command(subcommand)]
        action: schedule_commands::ScheduleAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so command output on stdout stays machine-readable.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// The explicit `--config` file must load; discovery falls back to defaults.
fn load_config(cli: &Cli) -> anyhow::Result<CartographConfig> {
    match cli.config {
        Some(ref path) => cartograph_config::load_config(path),
        None => Ok(cartograph_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    debug!(version = env!("CARGO_PKG_VERSION"), "cartograph starting");

    match cli.command {
        Commands::Library { ref action } => library_commands::handle_library(action),
        Commands::Config { ref action } => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
        Commands::Match(ref args) => {
            let config = load_config(&cli)?;
            page_commands::handle_match(&config, args).await
        },
        Commands::Branch(ref args) => {
            let config = load_config(&cli)?;
            page_commands::handle_branch(&config, args).await
        },
        Commands::Schedule { ref action } => {
            let config = load_config(&cli)?;
            schedule_commands::handle_schedule(&config, action).await
        },
    }
}
