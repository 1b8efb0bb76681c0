//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Timer-backed and virtual-clock schedulers

pub mod scheduler;

pub use scheduler::{ManualScheduler, Scheduler, Task, TaskHandle, TokioScheduler};
