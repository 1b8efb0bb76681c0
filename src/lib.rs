//! Callsim - a simulated phone call lifecycle
//!
//! Drives an Idle / Ringing / InCall / Ended state machine with no real
//! signaling or media, and exposes its state as observable cells for a
//! presentation layer to render.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::CallSessionController;
pub use domain::call::{CallState, CallType};
pub use domain::observable::{CellReader, ObservableCell, Subscription};
pub use domain::shared::error::CallError;
pub use domain::shared::result::Result;
