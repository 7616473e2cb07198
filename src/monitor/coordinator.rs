use crate::config::types::{MonitorConfig, WaitMode};
use crate::milestone::machine::MilestoneMachine;
use crate::milestone::patterns::ServerInfo;
use crate::milestone::status::UpgradeStatus;
use crate::milestone::version::ServerVersion;
use crate::monitor::observer::{MonitorObserver, NoopObserver};
use crate::source::log::OrderedLog;
use crate::source::tailer::{LogTailer, TailError};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitoring cancelled")]
    Cancelled,

    #[error("log tail error: {0}")]
    Tail(#[from] TailError),
}

/// Session parameters, fixed for the lifetime of one wait.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    pub target_version: ServerVersion,
    pub mode: WaitMode,
    pub poll_interval: Duration,
    /// Emit a still-waiting signal every N polls; 0 disables it.
    pub progress_every_polls: u64,
    /// Polls allowed while waiting for connections before giving up.
    pub timeout_polls: u64,
    pub report_lines: bool,
}

impl PollingConfig {
    pub fn new(target_version: ServerVersion, mode: WaitMode) -> Self {
        Self::from_monitor_config(&MonitorConfig::default(), target_version).with_mode(mode)
    }

    pub fn from_monitor_config(config: &MonitorConfig, target_version: ServerVersion) -> Self {
        Self {
            target_version,
            mode: config.mode,
            poll_interval: config.poll_interval,
            progress_every_polls: config.progress_every_polls,
            timeout_polls: config.timeout_polls,
            report_lines: config.report_lines,
        }
    }

    pub fn with_mode(mut self, mode: WaitMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Where a session gets its lines from.
pub enum LineSource {
    /// Tail a log file on disk.
    File(LogTailer),
    /// Lines forwarded from a redirected process output stream.
    Channel(mpsc::Receiver<String>),
    /// The caller feeds lines through [`MonitorSession::push_line`].
    Detached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    AcceptingConnections,
    UpgradeFailed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitOutcome {
    pub status: UpgradeStatus,
    pub reason: ExitReason,
    pub polls: u64,
    pub server_info: Option<ServerInfo>,
}

impl WaitOutcome {
    pub fn is_success(&self) -> bool {
        self.reason == ExitReason::AcceptingConnections
    }
}

/// One monitoring session: owns the ordered log, the cursor (through its
/// source) and the milestone machine.
pub struct MonitorSession {
    id: Uuid,
    config: PollingConfig,
    source: LineSource,
    log: OrderedLog,
    machine: MilestoneMachine,
    observer: Box<dyn MonitorObserver>,
    polls: u64,
    timeout_counter: u64,
    channel_open: bool,
}

impl MonitorSession {
    pub fn new(config: PollingConfig, source: LineSource) -> Self {
        let machine = MilestoneMachine::new(config.target_version, config.mode);
        Self {
            id: Uuid::new_v4(),
            config,
            source,
            log: OrderedLog::new(),
            machine,
            observer: Box::new(NoopObserver),
            polls: 0,
            timeout_counter: 0,
            channel_open: true,
        }
    }

    pub fn with_observer(mut self, observer: impl MonitorObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &PollingConfig {
        &self.config
    }

    pub fn log(&self) -> &OrderedLog {
        &self.log
    }

    pub fn status(&self) -> UpgradeStatus {
        self.machine.status()
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.machine.server_info()
    }

    /// Append one line supplied by the caller (push mode).
    pub fn push_line(&mut self, raw: &str) {
        let before = self.log.len();
        self.log.append_raw(raw);
        self.notify_lines(before);
    }

    /// Pull whatever the source has available right now.
    pub fn ingest(&mut self, cancel: &CancellationToken) -> Result<usize, MonitorError> {
        let before = self.log.len();

        match &mut self.source {
            LineSource::File(tailer) => {
                tailer.read_new_lines(&mut self.log, cancel)?;
            }
            LineSource::Channel(rx) => {
                while !cancel.is_cancelled() {
                    match rx.try_recv() {
                        Ok(raw) => {
                            self.log.append_raw(&raw);
                        }
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            if self.channel_open {
                                debug!(session_id = %self.id, "Push channel closed");
                                self.channel_open = false;
                            }
                            break;
                        }
                    }
                }
            }
            LineSource::Detached => {}
        }

        self.notify_lines(before);
        Ok(self.log.len() - before)
    }

    /// Run the milestone machine over lines it has not seen yet.
    pub fn evaluate(&mut self) -> UpgradeStatus {
        if self.log.len() > self.machine.scanned() {
            self.machine.evaluate(&self.log)
        } else {
            self.machine.status()
        }
    }

    /// Poll until the server accepts connections, the upgrade fails, or
    /// the timeout elapses. Cancellation aborts with
    /// [`MonitorError::Cancelled`].
    pub async fn wait_for_milestones(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, MonitorError> {
        info!(
            session_id = %self.id,
            target_version = %self.config.target_version,
            mode = ?self.config.mode,
            poll_interval = ?self.config.poll_interval,
            timeout_polls = self.config.timeout_polls,
            "Waiting for server milestones"
        );

        self.ingest(cancel)?;

        loop {
            if cancel.is_cancelled() {
                info!(session_id = %self.id, polls = self.polls, "Monitoring cancelled");
                return Err(MonitorError::Cancelled);
            }

            let status = self.evaluate();
            if status.accepting_connections {
                return Ok(self.finish(ExitReason::AcceptingConnections));
            }
            if self.config.mode == WaitMode::Upgrade && status.upgrade_failed {
                return Ok(self.finish(ExitReason::UpgradeFailed));
            }

            // An upgrade may legitimately take a long time; only the wait
            // for connections afterwards is bounded.
            let counting = match self.config.mode {
                WaitMode::OnlyAcceptingConnections => true,
                WaitMode::Upgrade => status.upgrade_finished,
            };
            if counting {
                if self.timeout_counter >= self.config.timeout_polls {
                    return Ok(self.finish(ExitReason::TimedOut));
                }
                self.timeout_counter += 1;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(session_id = %self.id, polls = self.polls, "Monitoring cancelled");
                    return Err(MonitorError::Cancelled);
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            self.ingest(cancel)?;

            self.polls += 1;
            let every = self.config.progress_every_polls;
            if every > 0 && self.polls % every == 0 {
                debug!(session_id = %self.id, polls = self.polls, "Still waiting");
                self.observer.on_waiting(self.polls);
            }
        }
    }

    fn finish(&self, reason: ExitReason) -> WaitOutcome {
        let outcome = WaitOutcome {
            status: self.machine.status(),
            reason,
            polls: self.polls,
            server_info: self.machine.server_info().cloned(),
        };
        match reason {
            ExitReason::AcceptingConnections => {
                info!(session_id = %self.id, polls = self.polls, "Server is ready")
            }
            ExitReason::UpgradeFailed => {
                warn!(session_id = %self.id, polls = self.polls, "Server upgrade failed")
            }
            ExitReason::TimedOut => warn!(
                session_id = %self.id,
                polls = self.polls,
                status = ?outcome.status,
                "Timed out waiting for the server"
            ),
        }
        outcome
    }

    fn notify_lines(&self, from: usize) {
        if !self.config.report_lines {
            return;
        }
        for (_, line) in self.log.lines_since(from) {
            self.observer.on_line(line.display_text());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const READY: &str = "2024-05-14T09:12:51Z 0 [System] [MY-010931] [Server] /usr/sbin/mysqld: ready for connections. Version: '8.0.34'  socket: '/tmp/mysql.sock'  port: 3306  MySQL Community Server - GPL.";

    #[derive(Clone, Default)]
    struct Recorder {
        lines: Arc<Mutex<Vec<String>>>,
    }

    impl MonitorObserver for Recorder {
        fn on_line(&self, text: &str) {
            self.lines.lock().unwrap().push(text.to_string());
        }
    }

    fn config() -> PollingConfig {
        PollingConfig {
            target_version: ServerVersion::new(8, 0, 34),
            mode: WaitMode::OnlyAcceptingConnections,
            poll_interval: Duration::from_millis(10),
            progress_every_polls: 0,
            timeout_polls: 5,
            report_lines: true,
        }
    }

    #[test]
    fn test_push_line_notifies_observer() {
        let recorder = Recorder::default();
        let mut session =
            MonitorSession::new(config(), LineSource::Detached).with_observer(recorder.clone());

        session.push_line("plain output");
        session.push_line(READY);

        let lines = recorder.lines.lock().unwrap().clone();
        assert_eq!(lines[0], "plain output");
        assert!(lines[1].starts_with("/usr/sbin/mysqld: ready for connections."));
    }

    #[test]
    fn test_line_reporting_can_be_disabled() {
        let recorder = Recorder::default();
        let mut cfg = config();
        cfg.report_lines = false;
        let mut session = MonitorSession::new(cfg, LineSource::Detached).with_observer(recorder.clone());

        session.push_line("quiet");
        assert!(recorder.lines.lock().unwrap().is_empty());
        assert_eq!(session.log().len(), 1);
    }

    #[test]
    fn test_evaluate_after_push() {
        let mut session = MonitorSession::new(config(), LineSource::Detached);
        assert!(!session.evaluate().accepting_connections);

        session.push_line(READY);
        assert!(session.evaluate().accepting_connections);
        assert_eq!(session.server_info().unwrap().port, 3306);
    }

    #[tokio::test]
    async fn test_channel_source_drains_queued_lines() {
        let (tx, rx) = mpsc::channel(8);
        tx.send("one".to_string()).await.unwrap();
        tx.send("two".to_string()).await.unwrap();

        let mut session = MonitorSession::new(config(), LineSource::Channel(rx));
        let ingested = session.ingest(&CancellationToken::new()).unwrap();

        assert_eq!(ingested, 2);
        assert_eq!(session.log().get(1).unwrap().raw, "two");
    }

    #[tokio::test]
    async fn test_already_cancelled_aborts_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut session = MonitorSession::new(config(), LineSource::Detached);
        session.push_line(READY);
        let result = session.wait_for_milestones(&cancel).await;

        assert!(matches!(result, Err(MonitorError::Cancelled)));
    }
}
