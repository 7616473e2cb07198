use crate::milestone::version::ServerVersion;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Server error log to tail. Without it lines must be pushed in.
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    #[serde(default)]
    pub read_start: ReadStart,
    #[serde(default)]
    pub target_version: Option<ServerVersion>,
    #[serde(default)]
    pub mode: WaitMode,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_progress_every_polls")]
    pub progress_every_polls: u64,
    #[serde(default = "default_timeout_polls")]
    pub timeout_polls: u64,
    #[serde(default = "default_report_lines")]
    pub report_lines: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            read_start: ReadStart::default(),
            target_version: None,
            mode: WaitMode::default(),
            poll_interval: default_poll_interval(),
            progress_every_polls: default_progress_every_polls(),
            timeout_polls: default_timeout_polls(),
            report_lines: default_report_lines(),
        }
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_progress_every_polls() -> u64 {
    10
}

fn default_timeout_polls() -> u64 {
    120
}

fn default_report_lines() -> bool {
    true
}

/// Where tailing starts when the log already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStart {
    #[default]
    Beginning,
    End,
}

/// What the monitor is waiting for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitMode {
    /// Plain startup: wait for the server to accept connections.
    #[default]
    OnlyAcceptingConnections,
    /// Wait for the system-table upgrade, then for connections.
    Upgrade,
}
