//! When things go awry.

/// The single error type for the bridge. Mirrors the teacher's flat,
/// hand-rolled-`From` style rather than a `thiserror` derive per-variant,
/// since most variants just wrap a string produced further down the stack.
#[derive(Debug)]
pub enum BridgeError {
    /// Something failed while starting the process up.
    StartupError(String),
    /// The config file couldn't be found, parsed, or was invalid.
    ConfigError(String),
    /// Failed to send a command across an internal `mpsc` channel.
    SendError(String),
    /// The other end of a `oneshot` response channel was dropped.
    RecvError(String),
    /// MQTT transport failure.
    MqttError(String),
    /// The requested element, subscription, or type doesn't exist.
    NotFound(String),
    /// The caller tried to do something the current state forbids (409s).
    Conflict(String),
    /// The request body didn't parse or didn't pass basic validation (400s).
    BadRequest(String),
    /// Catch-all for anything else.
    Generic(String),
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::StartupError(e) => write!(f, "startup error: {e}"),
            BridgeError::ConfigError(e) => write!(f, "config error: {e}"),
            BridgeError::SendError(e) => write!(f, "failed to send internal command: {e}"),
            BridgeError::RecvError(e) => write!(f, "failed to receive internal response: {e}"),
            BridgeError::MqttError(e) => write!(f, "mqtt error: {e}"),
            BridgeError::NotFound(e) => write!(f, "not found: {e}"),
            BridgeError::Conflict(e) => write!(f, "conflict: {e}"),
            BridgeError::BadRequest(e) => write!(f, "bad request: {e}"),
            BridgeError::Generic(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<std::io::Error> for BridgeError {
    fn from(error: std::io::Error) -> Self {
        BridgeError::Generic(error.to_string())
    }
}

impl From<config::ConfigError> for BridgeError {
    fn from(error: config::ConfigError) -> Self {
        BridgeError::ConfigError(error.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for BridgeError {
    fn from(error: tokio::sync::mpsc::error::SendError<T>) -> Self {
        BridgeError::SendError(error.to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for BridgeError {
    fn from(error: tokio::sync::oneshot::error::RecvError) -> Self {
        BridgeError::RecvError(error.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(error: serde_json::Error) -> Self {
        BridgeError::BadRequest(error.to_string())
    }
}
