use std::time::Duration;

use sov_database::model::action::ActionKind;
use sov_database::model::member::Tier;
use thiserror::Error;

use crate::api::Endpoint;
use crate::router::PermissionLevel;

/// Failure taxonomy shared by the gateway adapter, router, sequencer and API client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModerationError {
    #[error("malformed {event_type} event: {detail}")]
    MalformedEvent { event_type: String, detail: String },

    #[error("`{command}` requires {required} permissions (you have {actual})")]
    PermissionDenied {
        command: String,
        required: PermissionLevel,
        actual: PermissionLevel,
    },

    #[error("cannot {action} a member who is {from}")]
    InvalidTransition { from: Tier, action: ActionKind },

    #[error("{endpoint} queue is full ({capacity} waiting calls)")]
    Backpressure { endpoint: Endpoint, capacity: usize },

    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout { operation: String, after: Duration },

    #[error("transient platform error after {attempts} attempt(s): {message}")]
    TransientApi { attempts: u32, message: String },

    #[error("platform rejected the request ({status}): {message}")]
    PermanentApi { status: u16, message: String },
}

impl ModerationError {
    /// Short machine-friendly name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedEvent { .. } => "malformed_event",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Backpressure { .. } => "backpressure",
            Self::Timeout { .. } => "timeout",
            Self::TransientApi { .. } => "transient_api",
            Self::PermanentApi { .. } => "permanent_api",
        }
    }

    pub(crate) fn malformed(event_type: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedEvent {
            event_type: event_type.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sov_database::model::action::ActionKind;
    use sov_database::model::member::Tier;

    use super::ModerationError;
    use crate::router::PermissionLevel;

    #[test]
    fn messages_read_naturally() {
        let err = ModerationError::InvalidTransition {
            from: Tier::Banned,
            action: ActionKind::Warn,
        };
        assert_eq!(err.to_string(), "cannot warn a member who is banned");

        let err = ModerationError::PermissionDenied {
            command: "ban".to_owned(),
            required: PermissionLevel::Administrator,
            actual: PermissionLevel::Moderator,
        };
        assert_eq!(
            err.to_string(),
            "`ban` requires administrator permissions (you have moderator)"
        );

        let err = ModerationError::timeout("kick", Duration::from_millis(1500));
        assert_eq!(err.to_string(), "kick timed out after 1500ms");
        assert_eq!(err.kind(), "timeout");
    }
}
