//! Workflow core for prison operations: inmate transfers, visit scheduling, and messaging.

pub mod clock;
pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
