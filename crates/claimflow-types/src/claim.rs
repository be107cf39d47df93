//! Claim records produced by the extraction, assessment, and routing steps.
//!
//! Field shapes and closed sets mirror what the prompts instruct the model
//! to emit. Length bounds and cross-field rules are enforced by the gates in
//! `claimflow-core`, not by deserialization.

use std::fmt;
use std::ops::RangeInclusive;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Allowed length (in chars) of a claim identifier.
pub const CLAIM_ID_LEN: RangeInclusive<usize> = 2..=10;

/// Allowed length of the claimant name and vehicle description.
pub const NAME_LEN: RangeInclusive<usize> = 2..=100;

/// Allowed length of the loss narrative.
pub const LOSS_DESC_LEN: RangeInclusive<usize> = 10..=500;

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Damaged vehicle area. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DamageArea {
    Windshield,
    Front,
    Rear,
    Side,
    Roof,
    Hood,
    Door,
    Bumper,
    Fender,
    #[serde(rename = "quarter panel")]
    QuarterPanel,
    Trunk,
    Glass,
}

impl DamageArea {
    pub fn is_glass(self) -> bool {
        matches!(self, DamageArea::Windshield | DamageArea::Glass)
    }
}

/// Structured fields extracted from a First Notice of Loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClaimInformation {
    pub claim_id: String,
    /// Claimant's full name.
    pub name: String,
    /// Vehicle make, model and year.
    pub vehicle: String,
    /// Concise narrative of the incident.
    pub loss_desc: String,
    pub damage_area: Vec<DamageArea>,
}

impl ClaimInformation {
    /// True when every damaged area is glass.
    pub fn glass_only(&self) -> bool {
        !self.damage_area.is_empty() && self.damage_area.iter().all(|a| a.is_glass())
    }
}

// ---------------------------------------------------------------------------
// Assessment
// ---------------------------------------------------------------------------

/// Damage severity. Ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "Low"),
            Severity::Medium => write!(f, "Medium"),
            Severity::High => write!(f, "High"),
        }
    }
}

/// Cost interval bound to a severity level.
///
/// The upper bound is always inclusive. The lower bound is inclusive only
/// for `Low`; `Medium` and `High` start just above the previous ceiling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostRange {
    pub min: f64,
    pub max: f64,
    pub min_inclusive: bool,
}

impl CostRange {
    pub fn contains(&self, cost: f64) -> bool {
        let above_min = if self.min_inclusive {
            cost >= self.min
        } else {
            cost > self.min
        };
        above_min && cost <= self.max
    }
}

impl fmt::Display for CostRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.min_inclusive { '[' } else { '(' };
        write!(f, "{open}${}, ${}]", self.min, self.max)
    }
}

impl Severity {
    pub fn cost_range(self) -> CostRange {
        match self {
            Severity::Low => CostRange {
                min: 100.0,
                max: 1_000.0,
                min_inclusive: true,
            },
            Severity::Medium => CostRange {
                min: 1_000.0,
                max: 5_000.0,
                min_inclusive: false,
            },
            Severity::High => CostRange {
                min: 5_000.0,
                max: 50_000.0,
                min_inclusive: false,
            },
        }
    }

    pub fn accepts(self, cost: f64) -> bool {
        self.cost_range().contains(cost)
    }
}

/// Severity level plus repair cost estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SeverityAssessment {
    pub severity: Severity,
    /// Estimated repair cost in USD.
    pub est_cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Processing queue. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Queue {
    /// Minor damage involving only glass.
    Glass,
    /// Other minor damage.
    FastTrack,
    /// Moderate damage.
    MaterialDamage,
    /// Major damage, structural or total loss candidates.
    TotalLoss,
}

impl fmt::Display for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Queue::Glass => write!(f, "glass"),
            Queue::FastTrack => write!(f, "fast_track"),
            Queue::MaterialDamage => write!(f, "material_damage"),
            Queue::TotalLoss => write!(f, "total_loss"),
        }
    }
}

/// Handling priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

/// Routing decision for a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClaimRouting {
    /// Copied from the extraction record.
    pub claim_id: String,
    pub queue: Queue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}
