use regex::Regex;
use serde::Serialize;

// Revision 1 of the recognised server messages.

/// `Server upgrade from '80028' to '80034' has started.`
pub const UPGRADE_STARTED: &str =
    r"(?i)upgrade from '?(?P<from>\d+)'? to '?(?P<to>\d+)'?.*\bstarted\b";

/// `Server upgrade from '80028' to '80034' completed.`
pub const UPGRADE_COMPLETED: &str =
    r"(?i)upgrade from '?(?P<from>\d+)'? to '?(?P<to>\d+)'?.*\bcompleted\b";

/// `Failed to upgrade server.`
pub const UPGRADE_FAILED: &str = r"(?i)failed to upgrade server";

/// `/usr/sbin/mysqld: ready for connections.`
pub const READY_FOR_CONNECTIONS: &str = r"ready for connections";

/// `Version: '8.0.34'  socket: '/tmp/mysql.sock'  port: 3306  MySQL Community Server - GPL.`
pub const SERVER_IDENTITY: &str = r"Version: '(?P<version>[^']+)'\s+socket: '(?P<socket>[^']*)'\s+port: (?P<port>\d+)\s+(?P<product>.+?)\s+-\s+(?P<license>.+?)\.?\s*$";

/// Identity the server advertises once it accepts connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub version: String,
    pub socket: String,
    pub port: u16,
    pub product: String,
    pub license: String,
}

/// The milestone regexes, compiled once per session.
#[derive(Debug)]
pub struct MilestonePatterns {
    upgrade_started: Regex,
    upgrade_completed: Regex,
    upgrade_failed: Regex,
    ready: Regex,
    identity: Regex,
}

impl MilestonePatterns {
    pub fn compile() -> Self {
        Self {
            upgrade_started: Regex::new(UPGRADE_STARTED).expect("upgrade started pattern is valid"),
            upgrade_completed: Regex::new(UPGRADE_COMPLETED)
                .expect("upgrade completed pattern is valid"),
            upgrade_failed: Regex::new(UPGRADE_FAILED).expect("upgrade failed pattern is valid"),
            ready: Regex::new(READY_FOR_CONNECTIONS).expect("ready pattern is valid"),
            identity: Regex::new(SERVER_IDENTITY).expect("identity pattern is valid"),
        }
    }

    /// Target version code of an upgrade-started message.
    pub fn upgrade_started(&self, text: &str) -> Option<u64> {
        upgrade_target(&self.upgrade_started, text)
    }

    /// Target version code of an upgrade-completed message.
    pub fn upgrade_completed(&self, text: &str) -> Option<u64> {
        upgrade_target(&self.upgrade_completed, text)
    }

    pub fn upgrade_failed(&self, text: &str) -> bool {
        self.upgrade_failed.is_match(text)
    }

    pub fn ready_for_connections(&self, text: &str) -> bool {
        self.ready.is_match(text)
    }

    pub fn server_identity(&self, text: &str) -> Option<ServerInfo> {
        let caps = self.identity.captures(text)?;
        Some(ServerInfo {
            version: caps["version"].to_string(),
            socket: caps["socket"].to_string(),
            port: caps["port"].parse().ok()?,
            product: caps["product"].to_string(),
            license: caps["license"].to_string(),
        })
    }
}

impl Default for MilestonePatterns {
    fn default() -> Self {
        Self::compile()
    }
}

fn upgrade_target(regex: &Regex, text: &str) -> Option<u64> {
    regex.captures(text)?.name("to")?.as_str().parse().ok()
}
