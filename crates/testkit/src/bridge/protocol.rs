//! Wire protocol types for driver/worker communication.
//!
//! One connection carries both directions:
//! - **driver → worker**: [`Command`], one in flight at a time
//! - **worker → driver**: [`WorkerMessage`], a single response per command
//!   interleaved with periodic heartbeats

use serde::{Deserialize, Serialize};

pub const GET_PORT: &str = "GET_PORT";
pub const EXECUTE_APP: &str = "EXECUTE_APP";
pub const PING: &str = "PING";

/// Command names the protocol reserves. Anything else is a protocol violation.
pub const COMMAND_NAMES: [&str; 3] = [GET_PORT, EXECUTE_APP, PING];

/// Identifier for one driver session, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commands from driver to worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Ask for the worker's own service port.
    GetPort,

    /// Run a registered workload to completion.
    ExecuteApp {
        workload: String,
        thread_label: String,
    },

    /// Reserved name. The worker has no handler bound to it.
    Ping,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetPort => GET_PORT,
            Self::ExecuteApp { .. } => EXECUTE_APP,
            Self::Ping => PING,
        }
    }

    /// Parse a decoded frame into a command.
    ///
    /// Unknown command names and malformed arguments are reported separately so
    /// the dispatcher can name the offending command in its log.
    pub fn from_frame(frame: serde_json::Value) -> Result<Self, ProtocolError> {
        let name = frame
            .get("command")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ProtocolError::Malformed("missing command name".to_string()))?;

        if !COMMAND_NAMES.contains(&name) {
            return Err(ProtocolError::UnknownCommand(name.to_string()));
        }

        serde_json::from_value(frame).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

/// Messages from worker to driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Reply to GET_PORT.
    Port { port: u16 },

    /// EXECUTE_APP completed.
    Ack,

    /// EXECUTE_APP failed. The worker closes the connection after sending this.
    Failure { reason: String },

    /// Keep-alive, written independently of any command.
    Heartbeat,
}

impl WorkerMessage {
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Heartbeat)
    }
}

/// Handler output: exactly one per dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Port(u16),
    Ack,
    Failure(String),
}

impl From<Response> for WorkerMessage {
    fn from(response: Response) -> Self {
        match response {
            Response::Port(port) => Self::Port { port },
            Response::Ack => Self::Ack,
            Response::Failure(reason) => Self::Failure { reason },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unexpected command '{0}'")]
    UnknownCommand(String),

    #[error("no handler bound to command '{0}'")]
    Unroutable(&'static str),

    #[error("malformed command: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_port_serializes() {
        insta::assert_json_snapshot!(Command::GetPort, @r#"
        {
          "command": "GET_PORT"
        }
        "#);
    }

    #[test]
    fn execute_app_serializes() {
        let cmd = Command::ExecuteApp {
            workload: "DemoWorkload".to_string(),
            thread_label: "worker-thread-1".to_string(),
        };
        insta::assert_json_snapshot!(cmd, @r#"
        {
          "command": "EXECUTE_APP",
          "workload": "DemoWorkload",
          "thread_label": "worker-thread-1"
        }
        "#);
    }

    #[test]
    fn port_serializes() {
        insta::assert_json_snapshot!(WorkerMessage::Port { port: 4000 }, @r#"
        {
          "type": "port",
          "port": 4000
        }
        "#);
    }

    #[test]
    fn failure_serializes() {
        let msg = WorkerMessage::Failure {
            reason: "workload 'FailingWorkload' failed: boom".to_string(),
        };
        insta::assert_json_snapshot!(msg, @r#"
        {
          "type": "failure",
          "reason": "workload 'FailingWorkload' failed: boom"
        }
        "#);
    }

    #[test]
    fn ack_and_heartbeat_serialize() {
        insta::assert_json_snapshot!(
            [WorkerMessage::Ack, WorkerMessage::Heartbeat],
            @r#"
        [
          {
            "type": "ack"
          },
          {
            "type": "heartbeat"
          }
        ]
        "#
        );
    }

    #[test]
    fn from_frame_parses_known_commands() {
        assert_eq!(
            Command::from_frame(json!({"command": "GET_PORT"})).unwrap(),
            Command::GetPort
        );
        assert_eq!(
            Command::from_frame(json!({"command": "PING"})).unwrap(),
            Command::Ping
        );
        assert_eq!(
            Command::from_frame(json!({
                "command": "EXECUTE_APP",
                "workload": "DemoWorkload",
                "thread_label": "t1",
            }))
            .unwrap()
            .name(),
            EXECUTE_APP
        );
    }

    #[test]
    fn from_frame_rejects_unknown_command() {
        let err = Command::from_frame(json!({"command": "SHUTDOWN"})).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(ref name) if name == "SHUTDOWN"));
        assert_eq!(err.to_string(), "unexpected command 'SHUTDOWN'");
    }

    #[test]
    fn from_frame_rejects_missing_arguments() {
        let err = Command::from_frame(json!({"command": "EXECUTE_APP", "workload": "x"}))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn from_frame_rejects_missing_name() {
        let err = Command::from_frame(json!({"type": "ack"})).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn response_maps_to_worker_message() {
        assert_eq!(
            WorkerMessage::from(Response::Port(4000)),
            WorkerMessage::Port { port: 4000 }
        );
        assert_eq!(WorkerMessage::from(Response::Ack), WorkerMessage::Ack);
        assert!(!WorkerMessage::from(Response::Ack).is_heartbeat());
    }
}
