//! Deterministic risk scoring of generated output.
//!
//! The scorer maps output text plus the request context to four bounded
//! heuristic dimensions and a fixed-weight overall score. It is pure: no
//! network, no storage, no clock — so any audit record's risk block can be
//! reproduced from its inputs alone.
//!
//! Output that cannot be analyzed scores maximally conservative rather than
//! failing; risk assessment is never silently skipped.

mod lexicon;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{DataClassification, Industry, RequestContext};

pub use lexicon::identifier_hits;

/// Overall score above which human review is required.
pub const REVIEW_THRESHOLD: f64 = 0.7;

/// Data-leakage score above which output is flagged as a potential PHI leak.
pub const PHI_LEAK_THRESHOLD: f64 = 0.5;

/// Symbolic warnings derived from fixed thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskFlag {
    RequiresHumanReview,
    PotentialPhiLeak,
    /// The output could not be analyzed; the score was substituted with the
    /// maximally conservative value.
    AnalysisDegraded,
}

/// Weights combining the four dimensions into the overall score.
///
/// Invariant: non-negative and summing to 1, so the overall score is a
/// convex combination and raising any dimension can never lower it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskWeights {
    pub hallucination: f64,
    pub compliance: f64,
    pub data_leakage: f64,
    pub cultural: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            hallucination: 0.3,
            compliance: 0.3,
            data_leakage: 0.3,
            cultural: 0.1,
        }
    }
}

impl RiskWeights {
    /// Weighted combination, clamped to [0, 1].
    pub fn combine(
        &self,
        hallucination: f64,
        compliance: f64,
        data_leakage: f64,
        cultural: f64,
    ) -> f64 {
        (hallucination * self.hallucination
            + compliance * self.compliance
            + data_leakage * self.data_leakage
            + cultural * self.cultural)
            .clamp(0.0, 1.0)
    }
}

/// Multi-dimensional risk assessment of one generated output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
    pub hallucination: f64,
    pub compliance: f64,
    pub data_leakage: f64,
    pub cultural: f64,
    pub overall: f64,

    pub flags: Vec<RiskFlag>,

    /// Human-readable follow-up suggestions accompanying the flags.
    #[serde(default)]
    pub advisories: Vec<String>,
}

impl RiskScore {
    pub fn has_flag(&self, flag: RiskFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// The maximally conservative score, used when output cannot be
    /// analyzed.
    pub fn conservative() -> Self {
        Self {
            hallucination: 1.0,
            compliance: 1.0,
            data_leakage: 1.0,
            cultural: 1.0,
            overall: 1.0,
            flags: vec![
                RiskFlag::RequiresHumanReview,
                RiskFlag::PotentialPhiLeak,
                RiskFlag::AnalysisDegraded,
            ],
            advisories: vec!["Output could not be analyzed; treat as maximum risk".to_string()],
        }
    }
}

/// The risk scorer. Stateless apart from its weights.
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    weights: RiskWeights,
}

impl RiskScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: RiskWeights) -> Self {
        debug_assert!(
            (weights.hallucination + weights.compliance + weights.data_leakage + weights.cultural
                - 1.0)
                .abs()
                < 1e-9,
            "risk weights must sum to 1"
        );
        Self { weights }
    }

    /// Score one generated output against its request context.
    pub fn score(&self, output: &str, context: &RequestContext) -> RiskScore {
        if output.trim().is_empty() {
            warn!(
                request_id = %context.request_id,
                "output not analyzable; substituting conservative score"
            );
            return RiskScore::conservative();
        }

        let hallucination = hallucination_risk(output);
        let compliance = compliance_risk(output, context);
        let data_leakage = data_leakage_risk(output, context);
        let cultural = cultural_risk(output);
        let overall = self
            .weights
            .combine(hallucination, compliance, data_leakage, cultural);

        let mut flags = Vec::new();
        let mut advisories = Vec::new();

        if overall > REVIEW_THRESHOLD {
            flags.push(RiskFlag::RequiresHumanReview);
            advisories.push("Route to a human reviewer before delivery".to_string());
        }
        if data_leakage > PHI_LEAK_THRESHOLD {
            flags.push(RiskFlag::PotentialPhiLeak);
            advisories.push("Sanitize identifiers from the output before delivery".to_string());
        }
        if hallucination > 0.5 {
            advisories.push("Add source citations for unverified claims".to_string());
        }

        RiskScore {
            hallucination,
            compliance,
            data_leakage,
            cultural,
            overall,
            flags,
            advisories,
        }
    }
}

/// Textual markers of unfounded certainty or fabricated specificity.
fn hallucination_risk(output: &str) -> f64 {
    let lower = output.to_lowercase();
    let mut risk = 0.0;

    // Hedging density: each phrase adds a little, capped.
    let hedges = lexicon::count_present(&lower, lexicon::HEDGING_PHRASES);
    risk += (hedges as f64 * 0.1).min(0.4);

    // High-stakes clinical claims with no citation marker.
    if lexicon::contains_any(&lower, lexicon::CLINICAL_STAKES_TERMS)
        && !lexicon::contains_any(&lower, lexicon::CITATION_MARKERS)
    {
        risk += 0.3;
    }

    // A pile of precise unit-bearing numbers reads as fabricated specificity.
    if lexicon::UNIT_NUMBER_PATTERN.find_iter(&lower).count() > 3 {
        risk += 0.1;
    }

    risk.min(1.0)
}

/// Matches against disallowed terminology relevant to the declared industry
/// and classification.
fn compliance_risk(output: &str, context: &RequestContext) -> f64 {
    let lower = output.to_lowercase();
    let mut risk: f64 = 0.0;

    if context.data_classification.requires_signed_baa() {
        if lexicon::contains_any(&lower, lexicon::PRESCRIPTIVE_PHRASES) {
            risk += 0.5;
        }
        if lexicon::contains_any(&lower, lexicon::PATIENT_DIRECTED_PHRASES) {
            risk += 0.3;
        }
    }

    if context.industry == Industry::Healthcare
        && lexicon::contains_any(&lower, lexicon::CLINICAL_STAKES_TERMS)
        && !lexicon::contains_any(&lower, lexicon::DISCLAIMER_MARKERS)
    {
        risk += 0.2;
    }

    if context.industry == Industry::Financial
        && lexicon::contains_any(&lower, lexicon::FINANCIAL_ASSURANCE_PHRASES)
    {
        risk += 0.4;
    }

    risk.min(1.0)
}

/// Structured identifiers appearing in the OUTPUT, not the input.
fn data_leakage_risk(output: &str, context: &RequestContext) -> f64 {
    let mut risk = 0.0;

    let hits = lexicon::identifier_hits(output);
    if !hits.is_empty() {
        risk += (hits.len() as f64 * 0.15).min(0.8);
    }

    // Handling protected data raises the exposure baseline.
    if context.data_classification == DataClassification::Phi {
        risk += 0.1;
    }

    risk.min(1.0)
}

/// Bias lexicon and absolute group generalizations.
fn cultural_risk(output: &str) -> f64 {
    let lower = output.to_lowercase();
    let mut risk = 0.0;

    risk += lexicon::count_present(&lower, lexicon::BIAS_TERMS) as f64 * 0.2;

    if lexicon::GENERALIZATION_PATTERN.is_match(&lower) {
        risk += 0.15;
    }

    risk.min(1.0)
}
