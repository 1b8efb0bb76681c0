//! Call State Machine
//!
//! The allowed-edges table of the call lifecycle. Initial state is `Idle`;
//! there is no terminal state because `Ended` always auto-advances.
//!
//! | From        | Operation          | To          |
//! |-------------|--------------------|-------------|
//! | Idle        | `IncomingCall(t)`  | Ringing(t)  |
//! | Ringing(t)  | `Accept(t)`        | InCall(t)   |
//! | Ringing(t)  | `Reject`           | Idle        |
//! | InCall(t)   | `End`              | Ended       |
//! | Ended       | `AutoReset`        | Idle        |
//! | any         | `Reset`            | Idle        |

use crate::domain::call::value_object::{CallState, CallType};
use crate::domain::shared::error::CallError;
use crate::domain::shared::result::Result;

/// Operation applied to the call state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOperation {
    /// Simulated incoming call
    IncomingCall(CallType),
    /// Accept the ringing call
    Accept(CallType),
    /// Reject the ringing call
    Reject,
    /// Hang up the connected call
    End,
    /// Auto-reset timer fired
    AutoReset,
    /// Unconditional return to idle
    Reset,
}

impl CallOperation {
    pub fn name(&self) -> &'static str {
        match self {
            CallOperation::IncomingCall(_) => "receive an incoming call",
            CallOperation::Accept(_) => "accept",
            CallOperation::Reject => "reject",
            CallOperation::End => "end",
            CallOperation::AutoReset => "auto-reset",
            CallOperation::Reset => "reset",
        }
    }
}

/// Compute the state reached by applying `operation` to `state`.
///
/// Pure: nothing is mutated, so a failed operation leaves the caller's
/// state exactly as it was.
pub fn transition(state: &CallState, operation: &CallOperation) -> Result<CallState> {
    let next = match (state, operation) {
        (_, CallOperation::Reset) => CallState::Idle,

        (CallState::Idle, CallOperation::IncomingCall(call_type)) => CallState::Ringing {
            call_type: *call_type,
        },

        (CallState::Ringing { call_type: ringing }, CallOperation::Accept(requested)) => {
            if ringing != requested {
                return Err(CallError::TypeMismatch {
                    expected: *ringing,
                    actual: *requested,
                });
            }
            CallState::InCall {
                call_type: *ringing,
            }
        }
        (CallState::Ringing { .. }, CallOperation::Reject) => CallState::Idle,

        (CallState::InCall { .. }, CallOperation::End) => CallState::Ended,

        (CallState::Ended, CallOperation::AutoReset) => CallState::Idle,

        _ => {
            return Err(CallError::InvalidTransition {
                from: *state,
                operation: operation.name(),
            })
        }
    };

    Ok(next)
}
