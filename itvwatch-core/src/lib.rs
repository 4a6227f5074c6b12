//! Core types and service wiring for the itvwatch appointment checker.

/// Process configuration assembled once at startup.
pub mod config;
/// Domain models and identifiers shared by all crates.
pub mod model;
/// Traits describing the booking site and notification backends.
pub mod ports;
/// Plain-text rendering of available slots.
pub mod report;
/// Check service that queries every center and sends the aggregate.
pub mod service;

pub use config::*;
pub use model::*;
pub use ports::*;
pub use report::*;
pub use service::*;
