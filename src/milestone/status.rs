use serde::Serialize;

/// Milestones observed during one monitoring session. Flags only ever go
/// from `false` to `true`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpgradeStatus {
    pub upgrade_started: bool,
    pub upgrade_finished: bool,
    pub upgrade_failed: bool,
    pub accepting_connections: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradePhase {
    NotStarted,
    Started,
    Finished,
    Failed,
}

impl UpgradeStatus {
    pub fn phase(&self) -> UpgradePhase {
        match (
            self.upgrade_started,
            self.upgrade_finished,
            self.upgrade_failed,
        ) {
            (false, _, _) => UpgradePhase::NotStarted,
            (true, true, _) => UpgradePhase::Finished,
            (true, false, true) => UpgradePhase::Failed,
            (true, false, false) => UpgradePhase::Started,
        }
    }

    /// Fold newly observed milestones in without clearing any flag.
    pub(crate) fn absorb(&mut self, observed: UpgradeStatus) {
        self.upgrade_started |= observed.upgrade_started;
        self.upgrade_finished |= observed.upgrade_finished;
        self.upgrade_failed |= observed.upgrade_failed;
        self.accepting_connections |= observed.accepting_connections;
    }
}
