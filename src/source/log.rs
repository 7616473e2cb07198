use super::line::LogLine;

/// Append-only, insertion-ordered log of parsed lines for one session.
#[derive(Debug, Default, Clone)]
pub struct OrderedLog {
    lines: Vec<LogLine>,
}

impl OrderedLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LogLine> {
        self.lines.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    /// Lines appended at or after `index`, paired with their position.
    pub fn lines_since(&self, index: usize) -> impl Iterator<Item = (usize, &LogLine)> {
        self.lines
            .iter()
            .enumerate()
            .skip(index.min(self.lines.len()))
    }

    /// Parse and append a raw line, returning the stored record.
    pub fn append_raw(&mut self, raw: &str) -> &LogLine {
        self.push(LogLine::parse(raw))
    }

    pub(crate) fn push(&mut self, line: LogLine) -> &LogLine {
        self.lines.push(line);
        &self.lines[self.lines.len() - 1]
    }
}
