//! Small cross-cutting enums describing long-running task state. Generalizes
//! the teacher's `AgentState` enum (originally the DNS server's per-task
//! connection/health state) to this bridge's MQTT transport.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// The MQTT transport wrapper's connection state (spec §6 Ingress). Reported
/// over a `tokio::sync::watch` channel that both the `/status` handler and
/// the logs read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MqttConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl Display for MqttConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MqttConnectionState::Disconnected => write!(f, "disconnected"),
            MqttConnectionState::Connecting => write!(f, "connecting"),
            MqttConnectionState::Connected => write!(f, "connected"),
            MqttConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_connection_state_is_disconnected() {
        assert_eq!(MqttConnectionState::default(), MqttConnectionState::Disconnected);
    }
}
