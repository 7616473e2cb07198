use crate::source::tailer::read_all;
use std::io::Write;
use std::path::Path;

/// Print every line of a log file as one JSON object per line.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let log = read_all(path)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for line in log.iter() {
        serde_json::to_writer(&mut out, line)?;
        writeln!(out)?;
    }

    tracing::debug!(path = %path.display(), lines = log.len(), "Parsed log file");
    Ok(())
}
