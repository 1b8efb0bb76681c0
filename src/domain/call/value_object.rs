//! Call value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Media kind of a call attempt, fixed from ringing until the call ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Audio,
    Video,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::Audio => "audio",
            CallType::Video => "video",
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CallState {
    /// No call in progress
    #[default]
    Idle,
    /// Incoming call waiting to be answered
    Ringing { call_type: CallType },
    /// Accepted call in progress
    InCall { call_type: CallType },
    /// Call just terminated; superseded by `Idle` after the auto-reset delay
    Ended,
}

impl CallState {
    /// Get state name
    pub fn name(&self) -> &'static str {
        match self {
            CallState::Idle => "Idle",
            CallState::Ringing { .. } => "Ringing",
            CallState::InCall { .. } => "InCall",
            CallState::Ended => "Ended",
        }
    }

    /// Call type carried by the state, if any
    pub fn call_type(&self) -> Option<CallType> {
        match self {
            CallState::Ringing { call_type } | CallState::InCall { call_type } => Some(*call_type),
            CallState::Idle | CallState::Ended => None,
        }
    }

    /// Check if a call attempt is in progress (ringing or connected)
    pub fn is_active(&self) -> bool {
        matches!(self, CallState::Ringing { .. } | CallState::InCall { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, CallState::Idle)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.call_type() {
            Some(call_type) => write!(f, "{}({})", self.name(), call_type),
            None => f.write_str(self.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_idle() {
        assert_eq!(CallState::default(), CallState::Idle);
    }

    #[test]
    fn test_state_helpers() {
        let ringing = CallState::Ringing {
            call_type: CallType::Video,
        };
        assert!(ringing.is_active());
        assert_eq!(ringing.call_type(), Some(CallType::Video));
        assert_eq!(ringing.to_string(), "Ringing(video)");

        let in_call = CallState::InCall {
            call_type: CallType::Audio,
        };
        assert!(in_call.is_active());
        assert_eq!(in_call.call_type(), Some(CallType::Audio));

        assert!(!CallState::Idle.is_active());
        assert!(!CallState::Ended.is_active());
        assert_eq!(CallState::Ended.call_type(), None);
        assert_eq!(CallState::Ended.to_string(), "Ended");
    }

    #[test]
    fn test_state_json_snapshot() {
        let state = CallState::InCall {
            call_type: CallType::Video,
        };
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "state": "in_call", "call_type": "video" })
        );

        let idle: CallState = serde_json::from_str(r#"{"state":"idle"}"#).unwrap();
        assert_eq!(idle, CallState::Idle);
    }
}
