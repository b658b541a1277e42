//! Shared engine types
//!
//! Router port link rows, desktop hand-off data and the report produced by a
//! wake-and-connect run.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Router session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
}

/// Link speeds observed on real firmware ("10f", "100f", "1000f")
const KNOWN_SPEEDS_MBPS: [u32; 3] = [10, 100, 1000];

/// Interpreted physical link state of one switch port
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Up { speed_mbps: u32 },
    Down,
    /// A value we have never seen; treated as down
    Unknown(String),
}

impl LinkState {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return LinkState::Down;
        };
        let lowered = raw.to_ascii_lowercase();
        let speed = lowered
            .strip_suffix('f')
            .and_then(|digits| digits.parse::<u32>().ok())
            .filter(|speed| KNOWN_SPEEDS_MBPS.contains(speed));
        match speed {
            Some(speed_mbps) => LinkState::Up { speed_mbps },
            None => LinkState::Unknown(raw.to_string()),
        }
    }

    pub fn is_up(&self) -> bool {
        matches!(self, LinkState::Up { .. })
    }
}

/// One row of the router's port link table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortLink {
    /// "lan" or "wan"
    #[serde(rename = "type")]
    pub kind: String,
    pub port: u16,
    #[serde(default)]
    pub link: Option<String>,
}

impl PortLink {
    /// Lenient row parse. The port may come as a number or a numeric string;
    /// rows that do not fit yield `None`.
    pub fn from_value(row: &Value) -> Option<Self> {
        let kind = row.get("type")?.as_str()?.to_string();
        let port = match row.get("port")? {
            Value::Number(n) => u16::try_from(n.as_u64()?).ok()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        let link = match row.get("link") {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
        Some(Self { kind, port, link })
    }

    pub fn state(&self) -> LinkState {
        LinkState::parse(self.link.as_deref())
    }
}

/// True when the table has a "lan" row for `lan_port` reporting link up
pub fn lan_port_is_up(rows: &[PortLink], lan_port: u16) -> bool {
    rows.iter()
        .find(|row| row.kind == "lan" && row.port == lan_port)
        .map(|row| row.state().is_up())
        .unwrap_or(false)
}

/// What the desktop-connection collaborator receives
#[derive(Clone)]
pub struct DesktopLogin {
    pub server: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for DesktopLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesktopLogin")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Outcome of the wake step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeOutcome {
    Sent,
    /// Failed, continued by policy
    Failed { reason: String },
}

/// How the run waited for the target to come up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkWait {
    /// The LAN port reported link up
    Up { elapsed: Duration, checks: u32 },
    /// Ceiling reached, continued by policy
    TimedOut { elapsed: Duration, checks: u32, errors: u32 },
    /// No link check configured (or no router session); slept a fixed delay
    FixedDelay(Duration),
}

/// Result of a completed wake-and-connect run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub target: String,
    pub wake: WakeOutcome,
    pub wait: LinkWait,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lan(port: u16, link: Option<&str>) -> PortLink {
        PortLink {
            kind: "lan".into(),
            port,
            link: link.map(str::to_string),
        }
    }

    #[test]
    fn known_full_duplex_speeds_are_up() {
        for (raw, speed) in [("10f", 10), ("100f", 100), ("1000f", 1000), ("1000F", 1000)] {
            assert_eq!(LinkState::parse(Some(raw)), LinkState::Up { speed_mbps: speed });
        }
    }

    #[test]
    fn empty_missing_and_unknown_values_are_not_up() {
        assert_eq!(LinkState::parse(None), LinkState::Down);
        assert_eq!(LinkState::parse(Some("")), LinkState::Down);
        for raw in ["100h", "down", "f", "2500f", "x100f"] {
            let state = LinkState::parse(Some(raw));
            assert!(!state.is_up(), "{} should not be up", raw);
            assert_eq!(state, LinkState::Unknown(raw.to_string()));
        }
    }

    #[test]
    fn lan_port_lookup() {
        let rows = vec![
            PortLink {
                kind: "wan".into(),
                port: 1,
                link: Some("1000f".into()),
            },
            lan(1, Some("100f")),
            lan(2, Some("")),
            lan(3, None),
            lan(4, Some("100h")),
        ];
        assert!(lan_port_is_up(&rows, 1));
        assert!(!lan_port_is_up(&rows, 2));
        assert!(!lan_port_is_up(&rows, 3));
        assert!(!lan_port_is_up(&rows, 4));
        // absent port
        assert!(!lan_port_is_up(&rows, 5));
    }

    #[test]
    fn rows_parse_leniently() {
        let row = PortLink::from_value(&json!({"type": "lan", "port": "3", "link": "10f"}))
            .expect("string port accepted");
        assert_eq!(row.port, 3);
        assert!(row.state().is_up());

        let row = PortLink::from_value(&json!({"type": "lan", "port": 2, "link": null}))
            .expect("null link accepted");
        assert_eq!(row.link, None);

        assert!(PortLink::from_value(&json!({"type": "lan", "port": "x"})).is_none());
        assert!(PortLink::from_value(&json!({"type": "lan"})).is_none());
        assert!(PortLink::from_value(&json!({"port": 1})).is_none());
        assert!(PortLink::from_value(&json!({"type": "lan", "port": 70000})).is_none());
        assert!(PortLink::from_value(&json!("garbage")).is_none());
    }

    #[test]
    fn desktop_login_debug_redacts_password() {
        let login = DesktopLogin {
            server: "pc:3389".into(),
            username: "alice".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", login).contains("hunter2"));
    }
}
