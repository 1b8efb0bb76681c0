//! Domain layer - Core lifecycle rules
//!
//! This layer contains:
//! - Value Objects: call type and call state
//! - The call state machine: the allowed-edges table as a pure function
//! - Observable cells: the reactive state holders
//! - Domain errors

pub mod call;
pub mod observable;
pub mod shared;

// Re-export commonly used types
pub use shared::{CallError, Result};
