use crate::config::types::WaitMode;
use crate::milestone::patterns::{MilestonePatterns, ServerInfo};
use crate::milestone::status::UpgradeStatus;
use crate::milestone::version::ServerVersion;
use crate::source::log::OrderedLog;
use tracing::{debug, info};

/// Tracks startup and upgrade milestones for one server session.
///
/// For every pattern only the most recent matching line counts, since a
/// restarted server appends a new incarnation to the same log. Only lines
/// added since the previous evaluation are scanned; the latest match per
/// pattern is remembered, which gives the same answer as rescanning the
/// whole log each time.
#[derive(Debug)]
pub struct MilestoneMachine {
    patterns: MilestonePatterns,
    target: ServerVersion,
    target_text: String,
    mode: WaitMode,
    scanned: usize,
    last_started: Option<(usize, u64)>,
    last_completed: Option<(usize, u64)>,
    last_failure: Option<usize>,
    last_ready: Option<usize>,
    last_identity: Option<(usize, ServerInfo)>,
    status: UpgradeStatus,
}

impl MilestoneMachine {
    pub fn new(target: ServerVersion, mode: WaitMode) -> Self {
        Self {
            patterns: MilestonePatterns::compile(),
            target,
            target_text: target.to_string(),
            mode,
            scanned: 0,
            last_started: None,
            last_completed: None,
            last_failure: None,
            last_ready: None,
            last_identity: None,
            status: UpgradeStatus::default(),
        }
    }

    pub fn status(&self) -> UpgradeStatus {
        self.status
    }

    pub fn target(&self) -> ServerVersion {
        self.target
    }

    pub fn mode(&self) -> WaitMode {
        self.mode
    }

    /// Number of log lines already taken into account.
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// Identity advertised by the most recent server identity line.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.last_identity.as_ref().map(|(_, info)| info)
    }

    pub fn evaluate(&mut self, log: &OrderedLog) -> UpgradeStatus {
        let watch_upgrade = matches!(self.mode, WaitMode::Upgrade);

        for (index, line) in log.lines_since(self.scanned) {
            let text = line.message.as_str();

            if watch_upgrade {
                if let Some(code) = self.patterns.upgrade_started(text) {
                    self.last_started = Some((index, code));
                }
                if let Some(code) = self.patterns.upgrade_completed(text) {
                    self.last_completed = Some((index, code));
                }
                if self.patterns.upgrade_failed(text) {
                    self.last_failure = Some(index);
                }
            }

            if self.patterns.ready_for_connections(text) {
                self.last_ready = Some(index);
            }
            if let Some(info) = self.patterns.server_identity(text) {
                self.last_identity = Some((index, info));
            }
        }
        self.scanned = self.scanned.max(log.len());

        let before = self.status;
        self.status.absorb(self.observed(watch_upgrade));
        self.log_transitions(before);
        self.status
    }

    fn observed(&self, watch_upgrade: bool) -> UpgradeStatus {
        let mut observed = UpgradeStatus::default();

        if watch_upgrade {
            let target_code = self.target.upgrade_code();
            let start_index = self
                .last_started
                .filter(|(_, code)| *code == target_code)
                .map(|(index, _)| index);
            let started = self.status.upgrade_started || start_index.is_some();

            if started {
                observed.upgrade_started = true;
                observed.upgrade_finished = self
                    .last_completed
                    .is_some_and(|(_, code)| code == target_code);

                let finished = self.status.upgrade_finished || observed.upgrade_finished;
                if !finished {
                    observed.upgrade_failed = match (start_index, self.last_failure) {
                        (Some(start), Some(failure)) => failure > start,
                        _ => false,
                    };
                }
            }
        }

        let identity_matches = self
            .last_identity
            .as_ref()
            .is_some_and(|(_, info)| info.version == self.target_text);
        observed.accepting_connections = self.last_ready.is_some() && identity_matches;

        observed
    }

    fn log_transitions(&self, before: UpgradeStatus) {
        let after = self.status;
        if after == before {
            debug!(scanned = self.scanned, "No new milestones");
            return;
        }
        if after.upgrade_started && !before.upgrade_started {
            info!(target_version = %self.target, "Server upgrade started");
        }
        if after.upgrade_finished && !before.upgrade_finished {
            info!(target_version = %self.target, "Server upgrade completed");
        }
        if after.upgrade_failed && !before.upgrade_failed {
            info!(target_version = %self.target, "Server upgrade failed");
        }
        if after.accepting_connections && !before.accepting_connections {
            info!(target_version = %self.target, "Server is accepting connections");
        }
    }
}
