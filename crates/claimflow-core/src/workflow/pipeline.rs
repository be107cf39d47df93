//! Pipeline Engine: runs gated steps in declared order over one case record.
//!
//! The engine never retries on its own; retry is local to each step. Its
//! cross-step duties are the halt-on-failure rule, merging each step's delta
//! into a new record, and accumulating the error log.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use futures_util::{StreamExt, stream};
use tracing::{Instrument, info, info_span, warn};

use claimflow_types::case::{CaseRecord, CaseStatus, CaseUpdate};
use claimflow_types::claim::Queue;
use claimflow_types::config::PipelineConfig;

use crate::llm::box_service::BoxCompletionService;

use super::step::{PipelineStep, StepResult, execute as execute_step};

/// An ordered chain of steps bound to a Completion Service.
pub struct Pipeline {
    name: String,
    service: Arc<BoxCompletionService>,
    config: PipelineConfig,
    steps: Vec<Box<dyn PipelineStep>>,
}

impl Pipeline {
    pub fn new(
        name: impl Into<String>,
        service: Arc<BoxCompletionService>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            name: name.into(),
            service,
            config: config.normalized(),
            steps: Vec::new(),
        }
    }

    /// Append a step. Steps run in the order they are added.
    pub fn with_step(mut self, step: impl PipelineStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run one input through every step.
    ///
    /// `model` overrides the configured default for this run. The returned
    /// record is either `Completed` or `Failed`; callers must check
    /// [`CaseRecord::is_completed`] before trusting its structured fields.
    pub async fn run(&self, input: &str, model: Option<&str>) -> CaseRecord {
        let model = model.unwrap_or(&self.config.model);
        let case = CaseRecord::new(input, model);
        let span = info_span!(
            "pipeline.run",
            pipeline = %self.name,
            case_id = %case.id,
            model = %case.model,
        );
        self.run_case(case).instrument(span).await
    }

    /// Run an already constructed record through the remaining steps.
    pub async fn run_case(&self, mut case: CaseRecord) -> CaseRecord {
        for step in &self.steps {
            if case.status == CaseStatus::Failed {
                info!(step = step.name(), "case failed, skipping remaining steps");
                break;
            }

            info!(step = step.name(), status = %case.status, "step started");
            let execution = execute_step(step.as_ref(), &self.service, &self.config, &case).await;
            let retries = execution.retries();
            case = case
                .with_errors(execution.diagnostics)
                .with_retries(retries);

            match execution.result {
                StepResult::Advance(update) => {
                    case = self.merge(case, step.as_ref(), update);
                    if !case.is_failed() {
                        info!(
                            step = step.name(),
                            status = %case.status,
                            attempts = execution.attempts,
                            "step finished"
                        );
                    }
                }
                StepResult::Fail(error) => {
                    warn!(
                        step = step.name(),
                        attempts = execution.attempts,
                        error = %error,
                        "step failed"
                    );
                    case = case.fail(format!("[{}] {error}", step.name()));
                }
            }
        }

        if case.is_failed() {
            return case;
        }
        match case.clone().apply(CaseUpdate::status(CaseStatus::Completed)) {
            Ok(done) => {
                info!(retry_count = done.retry_count, "case completed");
                done
            }
            Err(e) => case.fail(format!("[{}] {e}", self.name)),
        }
    }

    /// Merge a step's delta, failing the case if the delta breaks a record
    /// invariant or does not reach the step's declared status.
    fn merge(&self, case: CaseRecord, step: &dyn PipelineStep, update: CaseUpdate) -> CaseRecord {
        let target = step.target_status();
        if update.status != Some(target) {
            warn!(step = step.name(), %target, "update does not reach the step's status");
            return case.fail(format!(
                "[{}] update does not advance the case to {target}",
                step.name()
            ));
        }
        match case.clone().apply(update) {
            Ok(next) => next,
            Err(e) => {
                warn!(step = step.name(), error = %e, "update rejected by case record");
                case.fail(format!("[{}] {e}", step.name()))
            }
        }
    }

    /// Run every input independently, at most `batch_concurrency` at a time.
    ///
    /// Output order equals input order.
    pub async fn run_batch<I, S>(&self, inputs: I, model: Option<&str>) -> Vec<CaseRecord>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let inputs: Vec<S> = inputs.into_iter().collect();
        info!(
            pipeline = %self.name,
            cases = inputs.len(),
            concurrency = self.config.batch_concurrency,
            "batch started"
        );
        let records: Vec<CaseRecord> = stream::iter(inputs.iter().map(|input| self.run(input.as_ref(), model)))
            .buffered(self.config.batch_concurrency)
            .collect()
            .await;
        let summary = BatchSummary::from_records(&records);
        info!(
            pipeline = %self.name,
            completed = summary.completed,
            failed = summary.failed,
            "batch finished"
        );
        records
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("service", &self.service)
            .field("steps", &self.step_names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// BatchSummary
// ---------------------------------------------------------------------------

/// Aggregate view of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Completed cases per routing queue.
    pub by_queue: BTreeMap<Queue, usize>,
    pub total_retries: u64,
}

impl BatchSummary {
    pub fn from_records(records: &[CaseRecord]) -> Self {
        let mut summary = BatchSummary {
            total: records.len(),
            ..Default::default()
        };
        for record in records {
            summary.total_retries += u64::from(record.retry_count);
            if record.is_completed() {
                summary.completed += 1;
                if let Some(routing) = &record.routing {
                    *summary.by_queue.entry(routing.queue).or_default() += 1;
                }
            } else {
                summary.failed += 1;
            }
        }
        summary
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cases: {} completed, {} failed, {} retries",
            self.total, self.completed, self.failed, self.total_retries
        )?;
        for (queue, count) in &self.by_queue {
            write!(f, "\n  {queue}: {count}")?;
        }
        Ok(())
    }
}
