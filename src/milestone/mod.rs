pub mod machine;
pub mod patterns;
pub mod status;
pub mod version;

pub use machine::MilestoneMachine;
pub use patterns::{MilestonePatterns, ServerInfo};
pub use status::{UpgradePhase, UpgradeStatus};
pub use version::{ServerVersion, VersionError};
