pub mod coordinator;
pub mod observer;

pub use coordinator::{
    ExitReason, LineSource, MonitorError, MonitorSession, PollingConfig, WaitOutcome,
};
pub use observer::{MonitorObserver, NoopObserver};
