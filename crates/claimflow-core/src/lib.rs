//! Business logic for claimflow.
//!
//! Depends only on `claimflow-types` (and `claimflow-observe` for span
//! attribute names). The Completion Service is an injected trait object;
//! this crate owns no transport.
//!
//! - `llm` -- Completion Service trait and its object-safe wrapper
//! - `gate` -- pure validators turning raw model output into typed records
//! - `workflow` -- gated steps, the pipeline engine, the evaluator-optimizer
//!   loop, and specialist fan-out
//! - `config` -- `claimflow.toml` loader

pub mod config;
pub mod gate;
pub mod llm;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;
