//! Shared kernel - types used across the domain

pub mod error;
pub mod result;

pub use error::CallError;
pub use result::Result;
