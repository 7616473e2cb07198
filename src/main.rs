use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vigil::cli::watch::WatchOptions;
use vigil::ServerVersion;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Watch a database server log until the server is ready", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for the server to finish starting (and optionally upgrading)
    Watch {
        /// Server error log to tail
        #[arg(long, conflicts_with = "stdin")]
        log: Option<PathBuf>,

        /// Read server output from standard input instead of a file
        #[arg(long)]
        stdin: bool,

        #[arg(long)]
        target_version: Option<ServerVersion>,

        /// Wait for a system-table upgrade before waiting for connections
        #[arg(long)]
        upgrade: bool,

        #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
        poll_interval: Option<Duration>,

        #[arg(long)]
        timeout_polls: Option<u64>,

        #[arg(long)]
        progress_every: Option<u64>,

        /// Do not echo log lines or progress
        #[arg(long)]
        quiet: bool,

        /// Print the final status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Parse a log file and print each line as JSON
    Parse { path: PathBuf },
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Init {
        #[arg(long)]
        stdout: bool,
    },
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vigil=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config_path = vigil::config::resolve_config_path(cli.config.as_deref());

    match cli.command {
        Commands::Watch {
            log,
            stdin,
            target_version,
            upgrade,
            poll_interval,
            timeout_polls,
            progress_every,
            quiet,
            json,
        } => {
            let options = WatchOptions {
                log,
                stdin,
                target_version,
                upgrade,
                poll_interval,
                timeout_polls,
                progress_every,
                quiet,
                json,
            };
            let code = vigil::cli::watch::run(config_path, options).await?;
            std::process::exit(code);
        }
        Commands::Parse { path } => vigil::cli::parse::run(&path)?,
        Commands::Config { action } => match action {
            ConfigAction::Init { stdout } => vigil::cli::config::init(stdout)?,
            ConfigAction::Validate => vigil::cli::config::validate(config_path)?,
        },
    }

    Ok(())
}
