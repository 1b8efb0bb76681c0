//! Call bounded context - the lifecycle of a simulated call

pub mod state_machine;
pub mod value_object;

pub use state_machine::{transition, CallOperation};
pub use value_object::{CallState, CallType};
