use crate::config::types::ReadStart;
use crate::source::line::LogLine;
use crate::source::log::OrderedLog;
use std::fs::{File, Metadata, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum TailError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Read position within the tailed file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailCursor {
    /// Byte offset just past the last consumed line. `None` until a start
    /// position has been established (file missing at construction, or
    /// nothing read yet when starting from the beginning).
    pub offset: Option<u64>,
    pub last_known_size: u64,
}

/// Incrementally reads complete lines appended to a file that another
/// process is still writing.
pub struct LogTailer {
    path: PathBuf,
    cursor: TailCursor,
    file_identity: Option<u64>,
}

impl LogTailer {
    pub fn new(path: impl Into<PathBuf>, start: ReadStart) -> Self {
        let path = path.into();
        let mut cursor = TailCursor::default();
        let mut file_identity = None;

        if let Ok(metadata) = std::fs::metadata(&path) {
            file_identity = identity(&metadata);
            if let ReadStart::End = start {
                cursor.offset = Some(metadata.len());
                cursor.last_known_size = metadata.len();
            }
        }

        Self {
            path,
            cursor,
            file_identity,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cursor(&self) -> TailCursor {
        self.cursor
    }

    /// Append every complete line written since the previous call.
    ///
    /// A missing file, an unchanged size, or the file vanishing between the
    /// stat and the open all count as "nothing new". A trailing line without
    /// a newline is left for a later call.
    pub fn read_new_lines(
        &mut self,
        log: &mut OrderedLog,
        cancel: &CancellationToken,
    ) -> Result<usize, TailError> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let size = metadata.len();
        let current_identity = identity(&metadata);

        if self.was_replaced(size, current_identity) {
            warn!(
                path = %self.path.display(),
                size,
                previous_size = self.cursor.last_known_size,
                "Log file truncated or replaced, restarting from the beginning"
            );
            self.cursor = TailCursor::default();
        }
        self.file_identity = current_identity;

        if size == self.cursor.last_known_size {
            return Ok(0);
        }

        let file = match open_shared(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let start = self.cursor.offset.unwrap_or(0);
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(start))?;

        let mut position = start;
        let mut appended = 0;
        let mut interrupted = false;
        let mut buf = Vec::new();

        loop {
            if cancel.is_cancelled() {
                interrupted = true;
                break;
            }

            buf.clear();
            let bytes_read = reader.read_until(b'\n', &mut buf)?;
            if bytes_read == 0 || buf.last() != Some(&b'\n') {
                break;
            }

            position += bytes_read as u64;
            log.push(LogLine::parse(&String::from_utf8_lossy(&buf)));
            appended += 1;
        }

        self.cursor.offset = Some(position);
        // An interrupted read must not look "unchanged" to the next call.
        self.cursor.last_known_size = if interrupted {
            position
        } else {
            size.max(position)
        };

        debug!(
            path = %self.path.display(),
            appended,
            offset = position,
            interrupted,
            "Read new log lines"
        );

        Ok(appended)
    }

    fn was_replaced(&self, size: u64, current_identity: Option<u64>) -> bool {
        let shrunk = size < self.cursor.last_known_size
            || self.cursor.offset.is_some_and(|offset| size < offset);
        let rotated = match (self.file_identity, current_identity) {
            (Some(previous), Some(current)) => previous != current,
            _ => false,
        };
        shrunk || rotated
    }
}

/// Parse a whole file in one pass.
pub fn read_all(path: &Path) -> Result<OrderedLog, TailError> {
    let reader = BufReader::new(open_shared(path)?);
    let mut log = OrderedLog::new();
    for chunk in reader.split(b'\n') {
        let chunk = chunk?;
        log.push(LogLine::parse(&String::from_utf8_lossy(&chunk)));
    }
    Ok(log)
}

#[cfg(windows)]
fn open_shared(path: &Path) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;

    const FILE_SHARE_READ: u32 = 0x0000_0001;
    const FILE_SHARE_WRITE: u32 = 0x0000_0002;
    const FILE_SHARE_DELETE: u32 = 0x0000_0004;

    OpenOptions::new()
        .read(true)
        .share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE)
        .open(path)
}

#[cfg(not(windows))]
fn open_shared(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).open(path)
}

#[cfg(unix)]
fn identity(metadata: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.ino())
}

// No stable file identity elsewhere; rely on size checks only.
#[cfg(not(unix))]
fn identity(_metadata: &Metadata) -> Option<u64> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn append(file: &mut NamedTempFile, text: &str) {
        file.write_all(text.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let mut tailer = LogTailer::new(dir.path().join("server.err"), ReadStart::Beginning);
        let mut log = OrderedLog::new();

        let appended = tailer
            .read_new_lines(&mut log, &CancellationToken::new())
            .unwrap();

        assert_eq!(appended, 0);
        assert!(log.is_empty());
        assert_eq!(tailer.cursor().offset, None);
    }

    #[test]
    fn test_file_created_after_construction() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("server.err");
        let mut tailer = LogTailer::new(&path, ReadStart::End);
        let mut log = OrderedLog::new();

        std::fs::write(&path, "first\nsecond\n").unwrap();
        tailer
            .read_new_lines(&mut log, &CancellationToken::new())
            .unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(tailer.cursor().offset, Some(13));
    }

    #[test]
    fn test_start_at_end_skips_existing_content() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, "old line\n");

        let mut tailer = LogTailer::new(file.path(), ReadStart::End);
        let mut log = OrderedLog::new();
        let cancel = CancellationToken::new();

        assert_eq!(tailer.read_new_lines(&mut log, &cancel).unwrap(), 0);

        append(&mut file, "new line\n");
        assert_eq!(tailer.read_new_lines(&mut log, &cancel).unwrap(), 1);
        assert_eq!(log.get(0).unwrap().raw, "new line");
    }

    #[test]
    fn test_partial_line_waits_for_newline() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, "complete\nhalf");

        let mut tailer = LogTailer::new(file.path(), ReadStart::Beginning);
        let mut log = OrderedLog::new();
        let cancel = CancellationToken::new();

        assert_eq!(tailer.read_new_lines(&mut log, &cancel).unwrap(), 1);
        assert_eq!(tailer.cursor().offset, Some(9));

        append(&mut file, " done\n");
        assert_eq!(tailer.read_new_lines(&mut log, &cancel).unwrap(), 1);
        assert_eq!(log.get(1).unwrap().raw, "half done");
    }

    #[test]
    fn test_unchanged_size_is_noop() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, "one\n");

        let mut tailer = LogTailer::new(file.path(), ReadStart::Beginning);
        let mut log = OrderedLog::new();
        let cancel = CancellationToken::new();

        tailer.read_new_lines(&mut log, &cancel).unwrap();
        let cursor = tailer.cursor();
        assert_eq!(tailer.read_new_lines(&mut log, &cancel).unwrap(), 0);
        assert_eq!(tailer.cursor(), cursor);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_cancelled_read_keeps_remaining_lines_for_later() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, "one\ntwo\n");

        let mut tailer = LogTailer::new(file.path(), ReadStart::Beginning);
        let mut log = OrderedLog::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(tailer.read_new_lines(&mut log, &cancel).unwrap(), 0);
        assert_eq!(tailer.cursor().offset, Some(0));

        let fresh = CancellationToken::new();
        assert_eq!(tailer.read_new_lines(&mut log, &fresh).unwrap(), 2);
    }

    #[test]
    fn test_truncation_restarts_from_zero() {
        let mut file = NamedTempFile::new().unwrap();
        append(&mut file, "a long first incarnation line\n");

        let mut tailer = LogTailer::new(file.path(), ReadStart::Beginning);
        let mut log = OrderedLog::new();
        let cancel = CancellationToken::new();
        tailer.read_new_lines(&mut log, &cancel).unwrap();

        file.as_file().set_len(0).unwrap();
        file.as_file_mut().seek(SeekFrom::Start(0)).unwrap();
        append(&mut file, "fresh\n");

        assert_eq!(tailer.read_new_lines(&mut log, &cancel).unwrap(), 1);
        assert_eq!(log.len(), 2);
        assert_eq!(log.get(1).unwrap().raw, "fresh");
        assert_eq!(tailer.cursor().offset, Some(6));
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"bad \xff byte\n").unwrap();
        file.flush().unwrap();

        let mut tailer = LogTailer::new(file.path(), ReadStart::Beginning);
        let mut log = OrderedLog::new();
        tailer
            .read_new_lines(&mut log, &CancellationToken::new())
            .unwrap();

        assert_eq!(log.get(0).unwrap().raw, "bad \u{fffd} byte");
    }
}
