//! Workflow core: gated steps and the orchestration patterns built on them.
//!
//! - `retry` -- retry policy with simple and self-correct strategies
//! - `step` -- `PipelineStep`, `GatedCall` bounded loop, step errors
//! - `pipeline` -- linear Pipeline Engine, batch runs, batch summary
//! - `claims` -- extract / assess / route steps for FNOL reports
//! - `optimizer` -- evaluator-optimizer refinement loop
//! - `fan_out` -- parallel specialists with a synthesis barrier

pub mod claims;
pub mod fan_out;
pub mod optimizer;
pub mod pipeline;
pub mod retry;
pub mod step;
