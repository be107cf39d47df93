//! Completion Service abstractions.
//!
//! - `CompletionService`: RPITIT trait for concrete collaborators
//! - `BoxCompletionService`: object-safe wrapper for dynamic dispatch

pub mod box_service;
pub mod service;
