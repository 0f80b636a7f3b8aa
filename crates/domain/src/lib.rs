//! # Courier Domain
//!
//! Business domain types and models for the Courier delivery pipeline.
//!
//! This crate contains:
//! - Outbox, destination and reconciliation data types
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Domain constants (retry policy defaults, seed rate limits)
//!
//! ## Architecture
//! - No dependencies on other Courier crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
