//! The fixed command vocabulary exchanged between the two hosts.
//!
//! Every token is plain ASCII and travels as UTF-8 on the wire.  The same
//! enum is used for requests (`HEALTH_CHECK`, `UNREGISTER_ALL`, ...) and for
//! replies (`OP_SUCCESS`, `OP_FAILED`, `PERIPHERAL_DATA`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A command or reply token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    /// Liveness request; the peer answers `OP_SUCCESS`.
    HealthCheck,
    /// Ask the peer to release every peripheral it holds.
    UnregisterAll,
    /// Ask the peer to take over every peripheral.
    ConnectAll,
    /// The requested operation completed.
    OpSuccess,
    /// The requested operation failed or the request was not understood.
    OpFailed,
    /// Show a user notification on the peer.
    Notification,
    /// Ask the peer for its peripheral registry.
    SyncPeripherals,
    /// A peripheral list, either as a reply to `SYNC_PERIPHERALS` or pushed.
    PeripheralData,
}

impl Command {
    /// Every command, in declaration order.
    pub const ALL: [Command; 8] = [
        Command::HealthCheck,
        Command::UnregisterAll,
        Command::ConnectAll,
        Command::OpSuccess,
        Command::OpFailed,
        Command::Notification,
        Command::SyncPeripherals,
        Command::PeripheralData,
    ];

    /// Returns the exact token written on the wire.
    pub fn as_token(self) -> &'static str {
        match self {
            Command::HealthCheck => "HEALTH_CHECK",
            Command::UnregisterAll => "UNREGISTER_ALL",
            Command::ConnectAll => "CONNECT_ALL",
            Command::OpSuccess => "OP_SUCCESS",
            Command::OpFailed => "OP_FAILED",
            Command::Notification => "NOTIFICATION",
            Command::SyncPeripherals => "SYNC_PERIPHERALS",
            Command::PeripheralData => "PERIPHERAL_DATA",
        }
    }

    /// `true` for commands that are followed by a payload line.  Every other
    /// token is a complete request on its own.
    pub fn takes_payload(self) -> bool {
        matches!(self, Command::Notification | Command::PeripheralData)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

/// Returned when a token is not part of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command token: {0:?}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .iter()
            .copied()
            .find(|c| c.as_token() == s)
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_match_wire_vocabulary() {
        let tokens: Vec<&str> = Command::ALL.iter().map(|c| c.as_token()).collect();
        assert_eq!(
            tokens,
            vec![
                "HEALTH_CHECK",
                "UNREGISTER_ALL",
                "CONNECT_ALL",
                "OP_SUCCESS",
                "OP_FAILED",
                "NOTIFICATION",
                "SYNC_PERIPHERALS",
                "PERIPHERAL_DATA",
            ]
        );
    }

    #[test]
    fn test_from_str_parses_every_token() {
        for command in Command::ALL {
            assert_eq!(command.as_token().parse::<Command>(), Ok(command));
        }
    }

    #[test]
    fn test_from_str_is_case_sensitive() {
        let result = "op_success".parse::<Command>();
        assert_eq!(result, Err(UnknownCommand("op_success".to_string())));
    }

    #[test]
    fn test_only_notification_and_peripheral_data_take_payloads() {
        let with_payload: Vec<Command> = Command::ALL
            .into_iter()
            .filter(|c| c.takes_payload())
            .collect();
        assert_eq!(with_payload, vec![Command::Notification, Command::PeripheralData]);
    }

    #[test]
    fn test_unknown_command_displays_token() {
        let err = "REBOOT".parse::<Command>().unwrap_err();
        assert_eq!(err.to_string(), "unknown command token: \"REBOOT\"");
    }

    #[test]
    fn test_serde_uses_wire_tokens() {
        let json = serde_json::to_string(&Command::UnregisterAll).unwrap();
        assert_eq!(json, "\"UNREGISTER_ALL\"");
    }
}
