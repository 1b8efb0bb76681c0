//! Application layer - Use cases driven by the presentation layer
//!
//! This layer orchestrates the domain to fulfill use cases.
//! It's responsible for:
//! - Serializing operations on a call session
//! - Driving the scheduler for timed transitions
//! - Publishing state through observable cells

pub mod call_session;

pub use call_session::CallSessionController;
