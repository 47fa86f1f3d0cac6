//! Shared configuration types for the fixsim execution kernel.
//!
//! This crate defines the serializable settings consumed by the directors:
//! - Solver selection by name
//! - Fixed-point (synchronous-reactive) director options
//! - Continuous-time director options
//! - JSON load/save of the complete kernel configuration

mod settings;

pub use settings::*;
