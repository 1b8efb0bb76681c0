//! Domain errors

use crate::domain::call::{CallState, CallType};
use thiserror::Error;

/// Errors returned by call-session operations.
///
/// Every error leaves the session untouched; callers decide whether to retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Invalid state transition: cannot {operation} while {}", .from.name())]
    InvalidTransition {
        from: CallState,
        operation: &'static str,
    },

    #[error("Call type mismatch: ringing call is {expected:?}, accept requested {actual:?}")]
    TypeMismatch {
        expected: CallType,
        actual: CallType,
    },
}

impl CallError {
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, CallError::InvalidTransition { .. })
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, CallError::TypeMismatch { .. })
    }
}
