//! Pipeline configuration types.
//!
//! `PipelineConfig` represents `claimflow.toml`: model defaults, per-step
//! retry policy, batch concurrency, and evaluator-optimizer bounds. Every
//! field has a default so an empty file is a valid configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level configuration for a claimflow pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Model identifier used when the caller does not pick one.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature for pipeline steps.
    #[serde(default)]
    pub temperature: f64,

    /// Upper bound on output tokens per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Retry policy applied to every step without an override.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Per-step retry overrides keyed by step name.
    #[serde(default)]
    pub steps: HashMap<String, RetryConfig>,

    /// Maximum number of cases processed concurrently by a batch run.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,

    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_batch_concurrency() -> usize {
    4
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            retry: RetryConfig::default(),
            steps: HashMap::new(),
            batch_concurrency: default_batch_concurrency(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Retry policy for `step`, falling back to the global policy.
    pub fn retry_for(&self, step: &str) -> &RetryConfig {
        self.steps.get(step).unwrap_or(&self.retry)
    }

    /// Clamp values that would make the engine loop zero times.
    pub fn normalized(mut self) -> Self {
        self.retry.max_attempts = self.retry.max_attempts.max(1);
        for retry in self.steps.values_mut() {
            retry.max_attempts = retry.max_attempts.max(1);
        }
        self.batch_concurrency = self.batch_concurrency.max(1);
        self.optimizer.max_iterations = self.optimizer.max_iterations.max(1);
        self
    }
}

/// Retry configuration for a single step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (default 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Retry strategy.
    #[serde(default)]
    pub strategy: RetryStrategy,
    /// Base delay before retrying a transient provider error, doubled per
    /// attempt. Zero disables backoff.
    #[serde(default)]
    pub backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: RetryStrategy::default(),
            backoff_ms: 0,
        }
    }
}

/// Strategy for retrying a rejected step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Re-send the identical request.
    Simple,
    /// Append the rejection reason to the request so the model can correct itself.
    #[default]
    SelfCorrect,
}

/// Bounds and sampling for the evaluator-optimizer loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Hard ceiling on generate/evaluate cycles.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_generator_temperature")]
    pub generator_temperature: f64,
    #[serde(default)]
    pub evaluator_temperature: f64,
}

fn default_max_iterations() -> u32 {
    3
}

fn default_generator_temperature() -> f64 {
    0.7
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            generator_temperature: default_generator_temperature(),
            evaluator_temperature: 0.0,
        }
    }
}
