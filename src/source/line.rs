use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Structured server log line:
/// `2024-05-14T09:12:44.123456Z 0 [System] [MY-010116] [Server] message text`
const STRUCTURED_LINE_PATTERN: &str = r"^(?P<timestamp>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?)\s+(?P<severity>\d)\s+\[(?P<type>[^\]]+)\](?:\s+\[(?P<code>[A-Za-z]{2}-\d+)\])?(?:\s+\[(?P<category>[^\]]+)\])?(?:\s+(?P<message>.*))?$";

fn structured_line_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(STRUCTURED_LINE_PATTERN).expect("structured line pattern is valid"))
}

/// One line of server log output.
///
/// Lines that do not follow the structured grammar are kept with
/// `parsed == false`; their `message` is the raw text so milestone
/// matching still sees them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub raw: String,
    pub parsed: bool,
    pub timestamp: String,
    pub severity: u8,
    pub message_type: String,
    pub internal_code: Option<String>,
    pub category: Option<String>,
    pub message: String,
}

impl LogLine {
    /// Parse a single line. Never fails; unmatched input becomes an
    /// unparsed record.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim_end_matches(&['\n', '\r'][..]);
        if raw.is_empty() {
            return Self::default();
        }

        let Some(caps) = structured_line_regex().captures(raw) else {
            return Self::unparsed(raw);
        };

        let severity = caps
            .name("severity")
            .and_then(|m| m.as_str().parse::<u8>().ok())
            .unwrap_or_default();

        Self {
            raw: raw.to_string(),
            parsed: true,
            timestamp: capture(&caps, "timestamp"),
            severity,
            message_type: capture(&caps, "type"),
            internal_code: caps.name("code").map(|m| m.as_str().to_string()),
            category: caps.name("category").map(|m| m.as_str().to_string()),
            message: capture(&caps, "message"),
        }
    }

    fn unparsed(raw: &str) -> Self {
        Self {
            raw: raw.to_string(),
            message: raw.to_string(),
            ..Self::default()
        }
    }

    /// Text shown to users for this line.
    pub fn display_text(&self) -> &str {
        if self.parsed {
            &self.message
        } else {
            &self.raw
        }
    }

    /// Interpret the timestamp as RFC 3339. `None` for unparsed lines or
    /// timestamps without an offset.
    pub fn timestamp_utc(&self) -> Option<DateTime<Utc>> {
        if !self.parsed {
            return None;
        }
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn capture(caps: &regex::Captures<'_>, name: &str) -> String {
    caps.name(name)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_structured_line() {
        let line = LogLine::parse(
            "2024-05-14T09:12:44.123456Z 0 [System] [MY-010116] [Server] /usr/sbin/mysqld (mysqld 8.0.34) starting as process 4242",
        );

        assert!(line.parsed);
        assert_eq!(line.timestamp, "2024-05-14T09:12:44.123456Z");
        assert_eq!(line.severity, 0);
        assert_eq!(line.message_type, "System");
        assert_eq!(line.internal_code.as_deref(), Some("MY-010116"));
        assert_eq!(line.category.as_deref(), Some("Server"));
        assert_eq!(
            line.message,
            "/usr/sbin/mysqld (mysqld 8.0.34) starting as process 4242"
        );
    }

    #[test]
    fn test_parse_without_optional_brackets() {
        let line = LogLine::parse("2024-05-14T09:12:44Z 2 [Warning] Something odd happened");

        assert!(line.parsed);
        assert_eq!(line.severity, 2);
        assert_eq!(line.message_type, "Warning");
        assert!(line.internal_code.is_none());
        assert!(line.category.is_none());
        assert_eq!(line.message, "Something odd happened");
    }

    #[test]
    fn test_parse_code_without_category() {
        let line = LogLine::parse("2024-05-14T09:12:44Z 1 [ERROR] [MY-012345] Disk is full");

        assert!(line.parsed);
        assert_eq!(line.internal_code.as_deref(), Some("MY-012345"));
        assert!(line.category.is_none());
        assert_eq!(line.message, "Disk is full");
    }

    #[test]
    fn test_unstructured_line_keeps_raw_as_message() {
        let line = LogLine::parse("mysqld: ready for connections.");

        assert!(!line.parsed);
        assert_eq!(line.raw, "mysqld: ready for connections.");
        assert_eq!(line.message, line.raw);
        assert!(line.timestamp.is_empty());
        assert_eq!(line.severity, 0);
        assert!(line.message_type.is_empty());
        assert!(line.internal_code.is_none());
        assert!(line.category.is_none());
    }

    #[test]
    fn test_empty_line() {
        let line = LogLine::parse("");
        assert!(!line.parsed);
        assert!(line.raw.is_empty());
        assert!(line.message.is_empty());

        assert_eq!(LogLine::parse("\r\n"), LogLine::default());
    }

    #[test]
    fn test_garbage_never_panics() {
        for input in ["]]][[[", "\u{0}\u{1}\u{7f}", "2024-05-14T09:12:44Z", "2024-05-14T09:12:44Z x [A]", "[System] [MY-1]"] {
            let line = LogLine::parse(input);
            assert!(!line.parsed, "unexpectedly parsed {:?}", input);
            assert_eq!(line.message, input);
        }
    }

    #[test]
    fn test_trailing_newline_stripped() {
        let line = LogLine::parse("2024-05-14T09:12:44Z 0 [System] hello\r\n");
        assert_eq!(line.raw, "2024-05-14T09:12:44Z 0 [System] hello");
        assert_eq!(line.message, "hello");
    }

    #[test]
    fn test_parse_is_idempotent() {
        let inputs = [
            "2024-05-14T09:12:44.000001+02:00 0 [System] [MY-013172] [Server] Received SHUTDOWN",
            "plain text",
            "",
            "2024-05-14T09:12:44Z 3 [Note] [Repl]",
        ];
        for input in inputs {
            let once = LogLine::parse(input);
            assert_eq!(LogLine::parse(&once.raw), once);
        }
    }

    #[test]
    fn test_display_text() {
        let parsed = LogLine::parse("2024-05-14T09:12:44Z 0 [System] hello");
        assert_eq!(parsed.display_text(), "hello");

        let unparsed = LogLine::parse("hello world");
        assert_eq!(unparsed.display_text(), "hello world");
    }

    #[test]
    fn test_timestamp_utc() {
        let line = LogLine::parse("2024-05-14T09:12:44+02:00 0 [System] hello");
        let ts = line.timestamp_utc().unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-05-14T07:12:44+00:00");

        let no_offset = LogLine::parse("2024-05-14T09:12:44 0 [System] hello");
        assert!(no_offset.parsed);
        assert!(no_offset.timestamp_utc().is_none());

        assert!(LogLine::parse("not a log line").timestamp_utc().is_none());
    }
}
