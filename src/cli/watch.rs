use crate::config::parse::{load_config, ConfigError};
use crate::config::types::{Config, WaitMode};
use crate::milestone::version::ServerVersion;
use crate::monitor::{
    ExitReason, LineSource, MonitorError, MonitorObserver, MonitorSession, PollingConfig,
    WaitOutcome,
};
use crate::source::tailer::LogTailer;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const EXIT_READY: i32 = 0;
pub const EXIT_NOT_READY: i32 = 1;
pub const EXIT_CANCELLED: i32 = 130;

const STDIN_QUEUE: usize = 1024;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("no target version given, set monitor.target_version or pass --target-version")]
    MissingTargetVersion,

    #[error("no log source given, set monitor.log_path, pass --log, or use --stdin")]
    MissingSource,

    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Command-line overrides for the `watch` command.
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub log: Option<PathBuf>,
    pub stdin: bool,
    pub target_version: Option<ServerVersion>,
    pub upgrade: bool,
    pub poll_interval: Option<Duration>,
    pub timeout_polls: Option<u64>,
    pub progress_every: Option<u64>,
    pub quiet: bool,
    pub json: bool,
}

/// Prints progress to the terminal.
struct ConsoleObserver;

impl MonitorObserver for ConsoleObserver {
    fn on_line(&self, text: &str) {
        eprintln!("{}", console::style(text).dim());
    }

    fn on_waiting(&self, polls: u64) {
        eprintln!("{}", console::style(format!("still waiting ({} polls)", polls)).yellow());
    }
}

/// Run one monitoring session and return the process exit code.
pub async fn run(config_path: Option<PathBuf>, options: WatchOptions) -> Result<i32, WatchError> {
    let config = match &config_path {
        Some(path) => {
            info!(config_path = %path.display(), "Loading configuration");
            load_config(path)?
        }
        None => Config::default(),
    };

    let (polling, source, forwarder) = build_session_parts(&config, &options)?;
    let cancel = CancellationToken::new();

    let mut session = MonitorSession::new(polling, source);
    if !options.quiet {
        session = session.with_observer(ConsoleObserver);
    }

    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, cancelling");
                cancel.cancel();
            }
        })
    };
    let stdin_task = forwarder.map(|tx| spawn_stdin_forwarder(tx, cancel.clone()));

    let worker = {
        let cancel = cancel.clone();
        tokio::spawn(async move { session.wait_for_milestones(&cancel).await })
    };
    let result = worker.await?;

    ctrl_c.abort();
    cancel.cancel();
    if let Some(task) = stdin_task {
        task.abort();
    }

    match result {
        Ok(outcome) => {
            report(&outcome, options.json)?;
            Ok(if outcome.is_success() {
                EXIT_READY
            } else {
                EXIT_NOT_READY
            })
        }
        Err(MonitorError::Cancelled) => {
            eprintln!("{}", console::style("cancelled").red());
            Ok(EXIT_CANCELLED)
        }
        Err(e) => Err(e.into()),
    }
}

fn build_session_parts(
    config: &Config,
    options: &WatchOptions,
) -> Result<(PollingConfig, LineSource, Option<mpsc::Sender<String>>), WatchError> {
    let monitor = &config.monitor;
    let target = options
        .target_version
        .or(monitor.target_version)
        .ok_or(WatchError::MissingTargetVersion)?;

    let mut polling = PollingConfig::from_monitor_config(monitor, target);
    if options.upgrade {
        polling.mode = WaitMode::Upgrade;
    }
    if let Some(interval) = options.poll_interval {
        polling.poll_interval = interval;
    }
    if let Some(polls) = options.timeout_polls {
        polling.timeout_polls = polls;
    }
    if let Some(every) = options.progress_every {
        polling.progress_every_polls = every;
    }
    if options.quiet {
        polling.report_lines = false;
    }

    if options.stdin {
        let (tx, rx) = mpsc::channel(STDIN_QUEUE);
        return Ok((polling, LineSource::Channel(rx), Some(tx)));
    }

    let path = options
        .log
        .clone()
        .or_else(|| monitor.log_path.clone())
        .ok_or(WatchError::MissingSource)?;
    info!(path = %path.display(), "Tailing server log");
    let tailer = LogTailer::new(path, monitor.read_start);
    Ok((polling, LineSource::File(tailer), None))
}

fn spawn_stdin_forwarder(tx: mpsc::Sender<String>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = FramedRead::new(tokio::io::stdin(), LinesCodec::new());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = lines.next() => match next {
                    Some(Ok(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Failed to read standard input");
                        break;
                    }
                    None => break,
                },
            }
        }
    })
}

fn report(outcome: &WaitOutcome, json: bool) -> Result<(), WatchError> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    let headline = match outcome.reason {
        ExitReason::AcceptingConnections => console::style("server is accepting connections").green(),
        ExitReason::UpgradeFailed => console::style("server upgrade failed").red(),
        ExitReason::TimedOut => console::style("timed out waiting for the server").red(),
    };
    println!("{} after {} polls", headline, outcome.polls);

    let status = &outcome.status;
    println!("  upgrade started:       {}", status.upgrade_started);
    println!("  upgrade finished:      {}", status.upgrade_finished);
    println!("  upgrade failed:        {}", status.upgrade_failed);
    println!("  accepting connections: {}", status.accepting_connections);
    if let Some(info) = &outcome.server_info {
        println!(
            "  server: {} {} ({}) port {} socket {}",
            info.product, info.version, info.license, info.port, info.socket
        );
    }
    Ok(())
}
