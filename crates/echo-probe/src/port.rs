//! Local TCP listener detection via the OS connection table.
//!
//! The table is captured once per run by spawning the configured listing
//! utility (`netstat -an` by default) and matched line by line. A failure to
//! run the utility is fail-closed: callers asking [`PortState::is_listening`]
//! get `false`, while reports can still tell `Unknown` apart from a port that
//! is definitely closed.

use std::fmt;

use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, warn};

pub const DEFAULT_COMMAND: &[&str] = &["netstat", "-an"];

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PortState {
    Listening,
    #[default]
    NotListening,
    Unknown(String),
}

impl PortState {
    pub fn is_listening(&self) -> bool {
        matches!(self, PortState::Listening)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PortState::Listening => "running",
            PortState::NotListening => "not running",
            PortState::Unknown(_) => "unknown",
        }
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortState::Unknown(reason) => write!(f, "unknown ({reason})"),
            other => f.write_str(other.label()),
        }
    }
}

/// Snapshot of the connection listing, or the reason it could not be taken.
#[derive(Clone, Debug)]
pub enum ConnectionTable {
    Captured(String),
    Unavailable(String),
}

impl ConnectionTable {
    pub async fn capture() -> Self {
        let command: Vec<String> = DEFAULT_COMMAND.iter().map(|s| s.to_string()).collect();
        Self::capture_with(&command).await
    }

    /// Run `command` (program followed by its arguments) and keep its stdout.
    pub async fn capture_with(command: &[String]) -> Self {
        let Some((program, args)) = command.split_first() else {
            return ConnectionTable::Unavailable("no connection listing command configured".into());
        };
        let output = match Command::new(program).args(args).output().await {
            Ok(output) => output,
            Err(err) => {
                warn!(%program, error = %err, "connection listing unavailable");
                return ConnectionTable::Unavailable(format!("{program}: {err}"));
            }
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(%program, status = %output.status, "connection listing failed");
            return ConnectionTable::Unavailable(format!(
                "{program} exited with {}: {}",
                output.status,
                stderr.trim()
            ));
        }
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(%program, lines = text.lines().count(), "captured connection table");
        ConnectionTable::Captured(text)
    }

    pub fn from_output(text: impl Into<String>) -> Self {
        ConnectionTable::Captured(text.into())
    }

    pub fn state(&self, port: u16) -> PortState {
        match self {
            ConnectionTable::Unavailable(reason) => PortState::Unknown(reason.clone()),
            ConnectionTable::Captured(text) => {
                if text.lines().any(|line| line_listens_on(line, port)) {
                    PortState::Listening
                } else {
                    PortState::NotListening
                }
            }
        }
    }
}

/// Single-port convenience: capture the table and look `port` up.
pub async fn is_listening(port: u16) -> bool {
    ConnectionTable::capture().await.state(port).is_listening()
}

/// True when one line carries both a local address ending in `port` and a
/// `LISTEN`/`LISTENING` state marker.
fn line_listens_on(line: &str, port: u16) -> bool {
    let mut has_marker = false;
    let mut has_port = false;
    for token in line.split_whitespace() {
        if token.starts_with("LISTEN") {
            has_marker = true;
        } else if token_port(token) == Some(port) {
            has_port = true;
        }
    }
    has_marker && has_port
}

// `0.0.0.0:8000`, `[::]:8000`, `*.8000` (BSD) all end in `<sep><port>`.
fn token_port(token: &str) -> Option<u16> {
    let idx = token.rfind([':', '.'])?;
    token[idx + 1..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINUX: &str = "\
Active Internet connections (servers and established)
Proto Recv-Q Send-Q Local Address           Foreign Address         State
tcp        0      0 0.0.0.0:8000            0.0.0.0:*               LISTEN
tcp        0      0 127.0.0.1:51234         127.0.0.1:8027          ESTABLISHED
tcp6       0      0 :::8025                 :::*                    LISTEN
";

    const WINDOWS: &str = "
  Proto  Local Address          Foreign Address        State
  TCP    0.0.0.0:8027           0.0.0.0:0              LISTENING
  TCP    127.0.0.1:8000         127.0.0.1:49822        ESTABLISHED
";

    #[test]
    fn linux_listeners_are_detected() {
        let table = ConnectionTable::from_output(LINUX);
        assert_eq!(table.state(8000), PortState::Listening);
        assert_eq!(table.state(8025), PortState::Listening);
    }

    #[test]
    fn established_remote_port_is_not_listening() {
        let table = ConnectionTable::from_output(LINUX);
        assert_eq!(table.state(8027), PortState::NotListening);
    }

    #[test]
    fn windows_listening_marker_is_detected() {
        let table = ConnectionTable::from_output(WINDOWS);
        assert!(table.state(8027).is_listening());
        assert!(!table.state(8000).is_listening());
    }

    #[test]
    fn port_prefix_does_not_match_longer_port() {
        let table = ConnectionTable::from_output(LINUX);
        assert_eq!(table.state(80), PortState::NotListening);
        assert_eq!(table.state(800), PortState::NotListening);
    }

    #[test]
    fn bsd_dot_separated_addresses_match() {
        let table = ConnectionTable::from_output(
            "tcp4       0      0  *.8027                 *.*                    LISTEN",
        );
        assert!(table.state(8027).is_listening());
    }

    #[test]
    fn marker_and_port_must_share_a_line() {
        let table = ConnectionTable::from_output(
            "tcp 0 0 127.0.0.1:9000 0.0.0.0:* LISTEN\n\
             tcp 0 0 127.0.0.1:8000 10.0.0.1:443 ESTABLISHED",
        );
        assert_eq!(table.state(8000), PortState::NotListening);
    }

    #[test]
    fn unavailable_table_is_unknown_and_fail_closed() {
        let table = ConnectionTable::Unavailable("netstat: not found".into());
        let state = table.state(8000);
        assert!(matches!(state, PortState::Unknown(_)));
        assert!(!state.is_listening());
        assert_eq!(state.label(), "unknown");
    }

    #[tokio::test]
    async fn missing_utility_yields_unknown() {
        let command = vec!["echo-probe-no-such-binary".to_string(), "-an".to_string()];
        let table = ConnectionTable::capture_with(&command).await;
        assert!(matches!(table, ConnectionTable::Unavailable(_)));
    }

    #[tokio::test]
    async fn empty_command_yields_unknown() {
        let table = ConnectionTable::capture_with(&[]).await;
        assert!(matches!(table.state(1), PortState::Unknown(_)));
    }

    #[tokio::test]
    async fn unbound_high_port_is_not_listening() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        assert!(!is_listening(port).await);
    }
}
