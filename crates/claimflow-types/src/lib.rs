//! Shared domain types for claimflow.
//!
//! This crate contains the value types threaded through a claimflow run:
//! LLM request/response shapes, the claim records produced by each step,
//! the case record itself, evaluator verdicts, configuration, and errors.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror, schemars.

pub mod case;
pub mod claim;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod llm;
