//! Gates for the three claims pipeline records.

use claimflow_types::claim::{
    CLAIM_ID_LEN, ClaimInformation, ClaimRouting, LOSS_DESC_LEN, NAME_LEN, SeverityAssessment,
};
use claimflow_types::error::ValidationError;
use claimflow_types::llm::OutputJsonSchema;

use super::{Gate, check_len, parse_single_object, schema_of};

/// Gate 1: structured claim information pulled from the FNOL text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionGate;

impl Gate for ExtractionGate {
    type Output = ClaimInformation;

    fn name(&self) -> &str {
        "extraction"
    }

    fn validate(&self, raw: &str) -> Result<ClaimInformation, ValidationError> {
        let info: ClaimInformation = parse_single_object(raw)?;
        check_len("claim_id", &info.claim_id, &CLAIM_ID_LEN)?;
        check_len("name", &info.name, &NAME_LEN)?;
        check_len("vehicle", &info.vehicle, &NAME_LEN)?;
        check_len("loss_desc", &info.loss_desc, &LOSS_DESC_LEN)?;
        if info.damage_area.is_empty() {
            return Err(ValidationError::field(
                "damage_area",
                "must list at least one area",
            ));
        }
        Ok(info)
    }

    fn response_schema(&self) -> Option<OutputJsonSchema> {
        Some(schema_of::<ClaimInformation>("claim_information"))
    }
}

/// Gate 2: severity assessment with the severity/cost consistency rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssessmentGate;

impl Gate for AssessmentGate {
    type Output = SeverityAssessment;

    fn name(&self) -> &str {
        "assessment"
    }

    fn validate(&self, raw: &str) -> Result<SeverityAssessment, ValidationError> {
        let assessment: SeverityAssessment = parse_single_object(raw)?;
        let cost = assessment.est_cost;
        if !cost.is_finite() || cost <= 0.0 {
            return Err(ValidationError::field(
                "est_cost",
                format!("must be a positive amount, got {cost}"),
            ));
        }
        let range = assessment.severity.cost_range();
        if !range.contains(cost) {
            return Err(ValidationError::Inconsistent(format!(
                "cost ${cost} out of range for {} severity {range}",
                assessment.severity
            )));
        }
        Ok(assessment)
    }

    fn response_schema(&self) -> Option<OutputJsonSchema> {
        Some(schema_of::<SeverityAssessment>("severity_assessment"))
    }
}

/// Gate 3: routing decision.
///
/// Built with [`RoutingGate::for_claim`], the gate also requires the routed
/// claim id to match the one extracted earlier in the run.
#[derive(Debug, Clone, Default)]
pub struct RoutingGate {
    expected_claim_id: Option<String>,
}

impl RoutingGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_claim(claim_id: impl Into<String>) -> Self {
        Self {
            expected_claim_id: Some(claim_id.into()),
        }
    }
}

impl Gate for RoutingGate {
    type Output = ClaimRouting;

    fn name(&self) -> &str {
        "routing"
    }

    fn validate(&self, raw: &str) -> Result<ClaimRouting, ValidationError> {
        let routing: ClaimRouting = parse_single_object(raw)?;
        if routing.claim_id.trim().is_empty() {
            return Err(ValidationError::field("claim_id", "must not be empty"));
        }
        if let Some(expected) = &self.expected_claim_id {
            if routing.claim_id.trim() != expected.trim() {
                return Err(ValidationError::Inconsistent(format!(
                    "routed claim '{}' does not match extracted claim '{expected}'",
                    routing.claim_id
                )));
            }
        }
        Ok(routing)
    }

    fn response_schema(&self) -> Option<OutputJsonSchema> {
        Some(schema_of::<ClaimRouting>("claim_routing"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimflow_types::claim::{DamageArea, Priority, Queue, Severity};

    const WINDSHIELD: &str = r#"{
        "claim_id": "C001",
        "name": "Jane Doe",
        "vehicle": "2019 Honda Civic",
        "loss_desc": "Small rock chip on the windshield while driving on the highway",
        "damage_area": ["windshield"]
    }"#;

    // -------------------------------------------------------------------
    // Extraction
    // -------------------------------------------------------------------

    #[test]
    fn test_extraction_accepts_windshield_claim() {
        let info = ExtractionGate.validate(WINDSHIELD).unwrap();
        assert_eq!(info.claim_id, "C001");
        assert_eq!(info.damage_area, vec![DamageArea::Windshield]);
    }

    #[test]
    fn test_extraction_rejects_long_claim_id() {
        let raw = WINDSHIELD.replace("C001", "CLAIM-2024-000017");
        let err = ExtractionGate.validate(&raw).unwrap_err();
        assert!(matches!(err, ValidationError::Field { ref field, .. } if field == "claim_id"));
    }

    #[test]
    fn test_extraction_rejects_short_narrative() {
        let raw = WINDSHIELD.replace(
            "Small rock chip on the windshield while driving on the highway",
            "chip",
        );
        let err = ExtractionGate.validate(&raw).unwrap_err();
        assert!(matches!(err, ValidationError::Field { ref field, .. } if field == "loss_desc"));
    }

    #[test]
    fn test_extraction_rejects_unknown_category() {
        let raw = WINDSHIELD.replace("[\"windshield\"]", "[\"engine\"]");
        let err = ExtractionGate.validate(&raw).unwrap_err();
        match err {
            ValidationError::Parse(reason) => assert!(reason.contains("unknown variant")),
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn test_extraction_rejects_empty_categories() {
        let raw = WINDSHIELD.replace("[\"windshield\"]", "[]");
        let err = ExtractionGate.validate(&raw).unwrap_err();
        assert!(matches!(err, ValidationError::Field { ref field, .. } if field == "damage_area"));
    }

    #[test]
    fn test_extraction_rejects_missing_field() {
        let err = ExtractionGate
            .validate(r#"{"claim_id":"C001","name":"Jane Doe"}"#)
            .unwrap_err();
        assert!(matches!(err, ValidationError::Parse(_)));
    }

    #[test]
    fn test_extraction_roundtrip_is_stable() {
        let info = ExtractionGate.validate(WINDSHIELD).unwrap();
        let again = ExtractionGate
            .validate(&serde_json::to_string(&info).unwrap())
            .unwrap();
        assert_eq!(info, again);
    }

    #[test]
    fn test_extraction_schema_names_fields() {
        let schema = ExtractionGate.response_schema().unwrap();
        assert_eq!(schema.name, "claim_information");
        assert!(schema.schema["properties"].get("damage_area").is_some());
    }

    // -------------------------------------------------------------------
    // Assessment
    // -------------------------------------------------------------------

    fn assessment(severity: &str, cost: f64) -> String {
        format!(r#"{{"severity":"{severity}","est_cost":{cost}}}"#)
    }

    #[test]
    fn test_assessment_boundaries() {
        let accepted = [
            ("Low", 100.0),
            ("Low", 1000.0),
            ("Medium", 1000.01),
            ("Medium", 5000.0),
            ("High", 5000.01),
            ("High", 50000.0),
        ];
        for (severity, cost) in accepted {
            let result = AssessmentGate.validate(&assessment(severity, cost));
            assert!(result.is_ok(), "{severity} @ {cost} should pass: {result:?}");
        }

        let rejected = [
            ("Low", 99.99),
            ("Low", 1000.01),
            ("Medium", 1000.0),
            ("Medium", 5000.01),
            ("High", 5000.0),
            ("High", 50000.01),
        ];
        for (severity, cost) in rejected {
            let err = AssessmentGate.validate(&assessment(severity, cost)).unwrap_err();
            assert!(
                matches!(err, ValidationError::Inconsistent(_)),
                "{severity} @ {cost} should be inconsistent, got {err:?}"
            );
        }
    }

    #[test]
    fn test_assessment_accepts_every_level_inside_its_range() {
        for severity in [Severity::Low, Severity::Medium, Severity::High] {
            let range = severity.cost_range();
            let mid = (range.min + range.max) / 2.0;
            let parsed = AssessmentGate
                .validate(&assessment(&severity.to_string(), mid))
                .unwrap();
            assert!(parsed.severity.accepts(parsed.est_cost));
        }
    }

    #[test]
    fn test_assessment_rejects_non_positive_cost() {
        let err = AssessmentGate.validate(&assessment("Low", 0.0)).unwrap_err();
        assert!(matches!(err, ValidationError::Field { ref field, .. } if field == "est_cost"));
        let err = AssessmentGate.validate(&assessment("Low", -50.0)).unwrap_err();
        assert!(matches!(err, ValidationError::Field { .. }));
    }

    #[test]
    fn test_assessment_rejects_unknown_severity() {
        let err = AssessmentGate.validate(&assessment("Critical", 900.0)).unwrap_err();
        assert!(matches!(err, ValidationError::Parse(_)));
    }

    #[test]
    fn test_assessment_reason_is_readable() {
        let err = AssessmentGate.validate(&assessment("Low", 1500.0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "inconsistent record: cost $1500 out of range for Low severity [$100, $1000]"
        );
    }

    #[test]
    fn test_assessment_roundtrip_keeps_reasoning() {
        let raw = r#"{"severity":"Medium","est_cost":2500,"reasoning":"bumper replacement"}"#;
        let parsed = AssessmentGate.validate(raw).unwrap();
        assert_eq!(parsed.reasoning.as_deref(), Some("bumper replacement"));
        let again = AssessmentGate
            .validate(&serde_json::to_string(&parsed).unwrap())
            .unwrap();
        assert_eq!(parsed, again);
    }

    // -------------------------------------------------------------------
    // Routing
    // -------------------------------------------------------------------

    #[test]
    fn test_routing_accepts_closed_set() {
        let routing = RoutingGate::new()
            .validate(r#"{"claim_id":"C001","queue":"glass","priority":"low"}"#)
            .unwrap();
        assert_eq!(routing.queue, Queue::Glass);
        assert_eq!(routing.priority, Some(Priority::Low));
    }

    #[test]
    fn test_routing_rejects_unknown_queue() {
        let err = RoutingGate::new()
            .validate(r#"{"claim_id":"C001","queue":"manual"}"#)
            .unwrap_err();
        assert!(matches!(err, ValidationError::Parse(_)));
    }

    #[test]
    fn test_routing_requires_matching_claim_id() {
        let gate = RoutingGate::for_claim("C001");
        assert!(gate.validate(r#"{"claim_id":"C001","queue":"total_loss"}"#).is_ok());
        let err = gate
            .validate(r#"{"claim_id":"C999","queue":"total_loss"}"#)
            .unwrap_err();
        assert!(matches!(err, ValidationError::Inconsistent(_)));
    }

    #[test]
    fn test_routing_rejects_blank_claim_id() {
        let err = RoutingGate::new()
            .validate(r#"{"claim_id":"  ","queue":"glass"}"#)
            .unwrap_err();
        assert!(matches!(err, ValidationError::Field { .. }));
    }

    #[test]
    fn test_routing_roundtrip_is_stable() {
        let gate = RoutingGate::for_claim("C001");
        for raw in [
            r#"{"claim_id":"C001","queue":"glass"}"#,
            r#"{"claim_id":"C001","queue":"material_damage","priority":"high","reasoning":"frame damage"}"#,
        ] {
            let routing = gate.validate(raw).unwrap();
            let again = gate
                .validate(&serde_json::to_string(&routing).unwrap())
                .unwrap();
            assert_eq!(routing, again);
        }
    }
}
