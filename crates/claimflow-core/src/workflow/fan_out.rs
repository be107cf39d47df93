//! Parallel specialist fan-out with a single synthesis step.
//!
//! Every specialist analyses the same immutable input on its own task. The
//! join is a barrier: synthesis starts only after every specialist has
//! completed or failed. Outcomes land in a map keyed by specialist name;
//! names are unique by construction, so each key has exactly one writer.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::{self, JoinSet};
use tracing::{Instrument, info, info_span, warn};

use claimflow_types::config::{PipelineConfig, RetryConfig};
use claimflow_types::llm::{CompletionRequest, Message};

use crate::gate::{Gate, TextGate};
use crate::llm::box_service::BoxCompletionService;

use super::step::{GatedCall, StepError};

/// Retry override key for specialist calls.
pub const SPECIALIST: &str = "specialist";
/// Retry override key for the synthesis call.
pub const SYNTHESIZE: &str = "synthesize";

pub const DEFAULT_SPECIALIST_TEMPERATURE: f64 = 0.2;

/// One independent analyst in a fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct Specialist {
    pub name: String,
    pub system_prompt: String,
    pub temperature: f64,
}

impl Specialist {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            temperature: DEFAULT_SPECIALIST_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// What one specialist produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecialistOutcome {
    Completed(String),
    Failed(String),
}

impl SpecialistOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SpecialistOutcome::Completed(_))
    }

    pub fn output(&self) -> Option<&str> {
        match self {
            SpecialistOutcome::Completed(output) => Some(output),
            SpecialistOutcome::Failed(_) => None,
        }
    }
}

/// Everything a successful fan-out returns.
#[derive(Debug, Clone, PartialEq)]
pub struct FanOutReport {
    pub outcomes: BTreeMap<String, SpecialistOutcome>,
    pub synthesis: String,
}

impl FanOutReport {
    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_completed())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FanOutError {
    #[error("duplicate specialist name: {0}")]
    DuplicateSpecialist(String),

    #[error("a fan-out needs at least one specialist")]
    NoSpecialists,

    #[error("all {} specialists failed", .0.len())]
    AllSpecialistsFailed(BTreeMap<String, String>),

    #[error("synthesis failed: {0}")]
    Synthesis(StepError),
}

/// Concurrent specialists followed by one synthesizer call.
pub struct FanOut {
    service: Arc<BoxCompletionService>,
    specialists: Vec<Specialist>,
    synthesizer_prompt: String,
    model: String,
    max_tokens: u32,
    specialist_retry: RetryConfig,
    synthesis_retry: RetryConfig,
}

impl FanOut {
    /// Rejects an empty specialist list and duplicate names.
    pub fn new(
        service: Arc<BoxCompletionService>,
        specialists: Vec<Specialist>,
        synthesizer_prompt: impl Into<String>,
        config: &PipelineConfig,
    ) -> Result<Self, FanOutError> {
        if specialists.is_empty() {
            return Err(FanOutError::NoSpecialists);
        }
        let mut seen = HashSet::new();
        for specialist in &specialists {
            if !seen.insert(specialist.name.as_str()) {
                return Err(FanOutError::DuplicateSpecialist(specialist.name.clone()));
            }
        }

        Ok(Self {
            service,
            specialists,
            synthesizer_prompt: synthesizer_prompt.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            specialist_retry: config.retry_for(SPECIALIST).clone(),
            synthesis_retry: config.retry_for(SYNTHESIZE).clone(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn specialists(&self) -> &[Specialist] {
        &self.specialists
    }

    /// Run every specialist on `input`, then synthesize what came back.
    pub async fn run(&self, input: &str) -> Result<FanOutReport, FanOutError> {
        let span = info_span!(
            "fan_out.run",
            specialists = self.specialists.len(),
            model = %self.model,
        );
        self.run_inner(input).instrument(span).await
    }

    async fn run_inner(&self, input: &str) -> Result<FanOutReport, FanOutError> {
        let outcomes = self.gather(Arc::from(input)).await;

        let failures: BTreeMap<String, String> = outcomes
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                SpecialistOutcome::Failed(reason) => Some((name.clone(), reason.clone())),
                SpecialistOutcome::Completed(_) => None,
            })
            .collect();
        if failures.len() == outcomes.len() {
            warn!(failed = failures.len(), "no specialist succeeded, skipping synthesis");
            return Err(FanOutError::AllSpecialistsFailed(failures));
        }
        info!(
            completed = outcomes.len() - failures.len(),
            failed = failures.len(),
            "specialists joined"
        );

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(self.synthesizer_prompt.clone()),
                Message::user(build_synthesis_prompt(input, &outcomes)),
            ],
            temperature: None,
            max_tokens: Some(self.max_tokens),
            response_schema: None,
        };
        let synthesis = GatedCall::new(&self.service, SYNTHESIZE, &self.synthesis_retry)
            .run(request, |response| TextGate.check(response))
            .await
            .result
            .map_err(FanOutError::Synthesis)?;

        Ok(FanOutReport {
            outcomes,
            synthesis,
        })
    }

    /// Spawn one task per specialist and wait for all of them.
    async fn gather(&self, input: Arc<str>) -> BTreeMap<String, SpecialistOutcome> {
        let mut set: JoinSet<(String, SpecialistOutcome)> = JoinSet::new();
        let mut names: HashMap<task::Id, String> = HashMap::new();

        for specialist in &self.specialists {
            let service = Arc::clone(&self.service);
            let input = Arc::clone(&input);
            let specialist = specialist.clone();
            let model = self.model.clone();
            let max_tokens = self.max_tokens;
            let retry = self.specialist_retry.clone();
            let span = info_span!("fan_out.specialist", specialist = %specialist.name);

            let name = specialist.name.clone();
            let handle = set.spawn(
                async move {
                    let request = CompletionRequest {
                        model,
                        messages: vec![
                            Message::system(specialist.system_prompt.clone()),
                            Message::user(input.to_string()),
                        ],
                        temperature: Some(specialist.temperature),
                        max_tokens: Some(max_tokens),
                        response_schema: None,
                    };
                    let outcome = GatedCall::new(&service, &specialist.name, &retry)
                        .run(request, |response| TextGate.check(response))
                        .await;
                    let outcome = match outcome.result {
                        Ok(output) => {
                            info!(attempts = outcome.attempts, "specialist finished");
                            SpecialistOutcome::Completed(output)
                        }
                        Err(e) => {
                            warn!(error = %e, "specialist failed");
                            SpecialistOutcome::Failed(e.to_string())
                        }
                    };
                    (specialist.name, outcome)
                }
                .instrument(span),
            );
            names.insert(handle.id(), name);
        }

        let mut outcomes = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, outcome)) => {
                    outcomes.insert(name, outcome);
                }
                Err(e) => {
                    let reason = if e.is_panic() {
                        "specialist task panicked"
                    } else {
                        "specialist task was cancelled"
                    };
                    match names.remove(&e.id()) {
                        Some(name) => {
                            warn!(
                                specialist = %name,
                                error = %e,
                                "specialist task did not complete"
                            );
                            outcomes.insert(name, SpecialistOutcome::Failed(reason.to_string()));
                        }
                        None => warn!(error = %e, "unknown specialist task did not complete"),
                    }
                }
            }
        }

        for specialist in &self.specialists {
            outcomes
                .entry(specialist.name.clone())
                .or_insert_with(|| SpecialistOutcome::Failed("task did not complete".to_string()));
        }
        outcomes
    }
}

/// Build the synthesizer's user message.
///
/// Each specialist appears once, in name order, with either its output or
/// an explicit `[unavailable: {reason}]` placeholder.
pub fn build_synthesis_prompt(input: &str, outcomes: &BTreeMap<String, SpecialistOutcome>) -> String {
    let mut xml = format!("User query: {}\n\n<specialist_results>\n", input.trim());

    for (name, outcome) in outcomes {
        let escaped_name = name
            .replace('&', "&amp;")
            .replace('"', "&quot;")
            .replace('<', "&lt;")
            .replace('>', "&gt;");
        let (status, body) = match outcome {
            SpecialistOutcome::Completed(output) => ("completed", output.trim().to_string()),
            SpecialistOutcome::Failed(reason) => {
                ("failed", format!("[unavailable: {}]", reason.trim()))
            }
        };
        xml.push_str(&format!(
            "  <result specialist=\"{escaped_name}\" status=\"{status}\">\n    {body}\n  </result>\n"
        ));
    }

    xml.push_str("</specialist_results>\n\n");
    xml.push_str(
        "Synthesize these specialist analyses into one cohesive response that \
         integrates all findings. Call out any gaps left by unavailable specialists.",
    );
    xml
}
