//! Observability for claimflow: subscriber setup and GenAI span attributes.
//!
//! - `tracing_setup` -- fmt + env-filter subscriber, optional OTel stdout export
//! - `genai_attrs` -- OpenTelemetry GenAI semantic convention names

pub mod genai_attrs;
pub mod tracing_setup;
