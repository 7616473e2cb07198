pub mod line;
pub mod log;
pub mod tailer;

pub use line::LogLine;
pub use log::OrderedLog;
pub use tailer::{read_all, LogTailer, TailCursor, TailError};
