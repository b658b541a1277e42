//! Engine errors
//!
//! Single error taxonomy shared by the vault, the router clients and the
//! wake-and-connect orchestrator.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Orchestrator step a failure is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Wake,
    LinkWait,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Step::Wake => "wake signal",
            Step::LinkWait => "link wait",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// An expected file or record is absent
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// Wrong master password or corrupted ciphertext. Never says which.
    #[error("Authentication failed")]
    AuthFailed,

    /// Transport-level failure talking to the router
    #[error("Network error: {message}")]
    NetworkError { message: String },

    /// The router answered but rejected the operation
    #[error("Router rejected {operation}: {message}")]
    ProtocolError { operation: String, message: String },

    #[error("Timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("No stored credentials for target '{target}'")]
    MissingCredentials { target: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Router type not supported: {router_type} (known: {known})")]
    RouterNotSupported { router_type: String, known: String },

    #[error("Desktop launch failed: {message}")]
    LaunchFailed { message: String },

    #[error("Secret store error: {message}")]
    SecretStore { message: String },

    /// The continuation policy chose to stop after a failed step
    #[error("Aborted after {step} failure: {reason}")]
    Aborted { step: Step, reason: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    pub fn protocol(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProtocolError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn missing_credentials(target: impl Into<String>) -> Self {
        Self::MissingCredentials {
            target: target.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn router_not_supported(router_type: impl Into<String>, known: &[&str]) -> Self {
        Self::RouterNotSupported {
            router_type: router_type.into(),
            known: known.join(", "),
        }
    }

    pub fn launch(message: impl Into<String>) -> Self {
        Self::LaunchFailed {
            message: message.into(),
        }
    }

    pub fn secret_store(message: impl Into<String>) -> Self {
        Self::SecretStore {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Failures the orchestrator hands to the continuation policy instead of
    /// failing the run outright
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError { .. }
                | Self::ProtocolError { .. }
                | Self::Timeout { .. }
                | Self::RouterNotSupported { .. }
        )
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::not_found(err.to_string())
        } else {
            Self::internal(format!("I/O error: {}", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failed_message_carries_no_detail() {
        assert_eq!(EngineError::AuthFailed.to_string(), "Authentication failed");
    }

    #[test]
    fn router_failures_are_degradable() {
        assert!(EngineError::network("refused").is_degradable());
        assert!(EngineError::protocol("wol/signal", "denied").is_degradable());
        assert!(EngineError::Timeout { elapsed_ms: 30_000 }.is_degradable());
        assert!(!EngineError::AuthFailed.is_degradable());
        assert!(!EngineError::missing_credentials("main").is_degradable());
    }

    #[test]
    fn aborted_names_the_step() {
        let err = EngineError::Aborted {
            step: Step::LinkWait,
            reason: "Timed out after 30000 ms".into(),
        };
        assert_eq!(
            err.to_string(),
            "Aborted after link wait failure: Timed out after 30000 ms"
        );
    }
}
