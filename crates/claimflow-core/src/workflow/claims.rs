//! The auto-insurance claims pipeline: extract, assess, route.
//!
//! Input is a free-text First Notice of Loss (FNOL) report. Each step sees
//! only the fields it needs, never the whole case record.

use std::sync::Arc;

use serde::Serialize;

use claimflow_types::case::{CaseRecord, CaseStatus, CaseUpdate};
use claimflow_types::claim::{ClaimInformation, Queue, Severity, SeverityAssessment};
use claimflow_types::config::PipelineConfig;
use claimflow_types::error::ValidationError;
use claimflow_types::llm::{CompletionResponse, Message, OutputJsonSchema};

use crate::gate::{AssessmentGate, ExtractionGate, Gate, RoutingGate};
use crate::llm::box_service::BoxCompletionService;

use super::pipeline::Pipeline;
use super::step::{PipelineStep, StepError};

pub const EXTRACT_CLAIM: &str = "extract_claim";
pub const ASSESS_SEVERITY: &str = "assess_severity";
pub const ROUTE_CLAIM: &str = "route_claim";

pub const EXTRACTION_PROMPT: &str = "\
You are an auto insurance claim processing assistant.
Your task is to extract key information from First Notice of Loss (FNOL) reports.

Format your response as a valid JSON object with the following keys:
- claim_id (str): The claim ID, 2 to 10 characters
- name (str): The customer's full name
- vehicle (str): The vehicle make, model, and year
- loss_desc (str): A concise description of the incident, 10 to 500 characters
- damage_area (list[str]): The damaged areas, each one of: windshield, front, rear, \
side, roof, hood, door, bumper, fender, quarter panel, trunk, glass

Only respond with the JSON object, nothing else.";

pub const ASSESSMENT_PROMPT: &str = "\
You are an auto insurance damage assessor.
Your task is to evaluate the severity of vehicle damage and estimate repair costs.

Apply these carrier heuristics:
- Low damage: Small dents, scratches, glass chips (cost range: $100-$1,000)
- Medium damage: Single panel damage, bumper replacement, door damage (cost range: over $1,000 up to $5,000)
- High damage: Structural damage, multiple panel replacement, engine/drivetrain issues, \
total loss candidates (cost range: over $5,000 up to $50,000)

Format your response as a valid JSON object with the following keys:
- severity: One of \"Low\", \"Medium\", or \"High\"
- est_cost: Numeric estimate of repair costs, inside the range for the severity
- reasoning: One sentence explaining the assessment

Only respond with the JSON object, nothing else.";

pub const ROUTING_PROMPT: &str = "\
You are an auto insurance claim routing specialist.
Your task is to determine the appropriate processing queue for each claim.

Use these routing rules:
- 'glass' queue: For Low severity damage involving ONLY glass (windshield, windows)
- 'fast_track' queue: For other Low severity damage
- 'material_damage' queue: For all Medium severity damage
- 'total_loss' queue: For all High severity damage

Format your response as a valid JSON object with the following keys:
- claim_id: Use the provided claim ID
- queue: One of \"glass\", \"fast_track\", \"material_damage\", or \"total_loss\"
- priority: One of \"low\", \"medium\", or \"high\"

Only respond with the JSON object, nothing else.";

/// Queue the routing rules assign to a claim.
pub fn suggested_queue(info: &ClaimInformation, assessment: &SeverityAssessment) -> Queue {
    match assessment.severity {
        Severity::Low if info.glass_only() => Queue::Glass,
        Severity::Low => Queue::FastTrack,
        Severity::Medium => Queue::MaterialDamage,
        Severity::High => Queue::TotalLoss,
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StepError> {
    serde_json::to_string_pretty(value).map_err(|e| StepError::Prompt(e.to_string()))
}

fn require<'a, T>(field: &'a Option<T>, name: &str) -> Result<&'a T, StepError> {
    field
        .as_ref()
        .ok_or_else(|| StepError::Prompt(format!("case has no {name} record")))
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// FNOL text to [`ClaimInformation`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractClaimStep;

impl PipelineStep for ExtractClaimStep {
    fn name(&self) -> &str {
        EXTRACT_CLAIM
    }

    fn target_status(&self) -> CaseStatus {
        CaseStatus::Extracted
    }

    fn build_messages(&self, case: &CaseRecord) -> Result<Vec<Message>, StepError> {
        if case.input.trim().is_empty() {
            return Err(StepError::Prompt("FNOL report is empty".to_string()));
        }
        Ok(vec![
            Message::system(EXTRACTION_PROMPT),
            Message::user(case.input.clone()),
        ])
    }

    fn response_schema(&self) -> Option<OutputJsonSchema> {
        ExtractionGate.response_schema()
    }

    fn accept(
        &self,
        response: &CompletionResponse,
        _case: &CaseRecord,
    ) -> Result<CaseUpdate, ValidationError> {
        ExtractionGate.check(response).map(CaseUpdate::extracted)
    }
}

/// [`ClaimInformation`] to [`SeverityAssessment`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AssessSeverityStep;

impl PipelineStep for AssessSeverityStep {
    fn name(&self) -> &str {
        ASSESS_SEVERITY
    }

    fn target_status(&self) -> CaseStatus {
        CaseStatus::Assessed
    }

    fn build_messages(&self, case: &CaseRecord) -> Result<Vec<Message>, StepError> {
        let info = require(&case.extracted, "extraction")?;
        Ok(vec![
            Message::system(ASSESSMENT_PROMPT),
            Message::user(to_json(info)?),
        ])
    }

    fn response_schema(&self) -> Option<OutputJsonSchema> {
        AssessmentGate.response_schema()
    }

    fn accept(
        &self,
        response: &CompletionResponse,
        _case: &CaseRecord,
    ) -> Result<CaseUpdate, ValidationError> {
        AssessmentGate.check(response).map(CaseUpdate::assessed)
    }
}

/// Claim plus assessment to a [`ClaimRouting`](claimflow_types::claim::ClaimRouting).
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteClaimStep;

#[derive(Serialize)]
struct RoutingInput<'a> {
    claim_id: &'a str,
    damage_area: &'a [claimflow_types::claim::DamageArea],
    loss_desc: &'a str,
    severity: Severity,
    est_cost: f64,
}

impl PipelineStep for RouteClaimStep {
    fn name(&self) -> &str {
        ROUTE_CLAIM
    }

    fn target_status(&self) -> CaseStatus {
        CaseStatus::Routed
    }

    fn build_messages(&self, case: &CaseRecord) -> Result<Vec<Message>, StepError> {
        let info = require(&case.extracted, "extraction")?;
        let assessment = require(&case.assessment, "assessment")?;
        let input = RoutingInput {
            claim_id: &info.claim_id,
            damage_area: &info.damage_area,
            loss_desc: &info.loss_desc,
            severity: assessment.severity,
            est_cost: assessment.est_cost,
        };
        let hint = suggested_queue(info, assessment);
        Ok(vec![
            Message::system(ROUTING_PROMPT),
            Message::user(format!(
                "{}\n\nThe routing rules suggest the '{hint}' queue.",
                to_json(&input)?
            )),
        ])
    }

    fn response_schema(&self) -> Option<OutputJsonSchema> {
        RoutingGate::new().response_schema()
    }

    fn accept(
        &self,
        response: &CompletionResponse,
        case: &CaseRecord,
    ) -> Result<CaseUpdate, ValidationError> {
        let gate = match &case.extracted {
            Some(info) => RoutingGate::for_claim(info.claim_id.clone()),
            None => RoutingGate::new(),
        };
        gate.check(response).map(CaseUpdate::routed)
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// Builders for ready-made pipelines.
pub struct ClaimPipeline;

impl ClaimPipeline {
    /// Extract, assess, and route, in that order.
    pub fn claims(service: Arc<BoxCompletionService>, config: PipelineConfig) -> Pipeline {
        Pipeline::new("claims", service, config)
            .with_step(ExtractClaimStep)
            .with_step(AssessSeverityStep)
            .with_step(RouteClaimStep)
    }
}
