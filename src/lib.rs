pub mod cli;
pub mod config;
pub mod milestone;
pub mod monitor;
pub mod source;

pub use milestone::{ServerVersion, UpgradeStatus};
pub use monitor::{ExitReason, MonitorError, MonitorSession, WaitOutcome};
pub use source::{LogLine, OrderedLog};
