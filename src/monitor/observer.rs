/// Progress notifications emitted by a monitoring session. Both hooks are
/// fire-and-forget.
pub trait MonitorObserver: Send {
    /// A newly ingested line, as display text. Only called when line
    /// reporting is enabled.
    fn on_line(&self, _text: &str) {}

    /// Periodic "still waiting" signal carrying the number of polls so far.
    fn on_waiting(&self, _polls: u64) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl MonitorObserver for NoopObserver {}
