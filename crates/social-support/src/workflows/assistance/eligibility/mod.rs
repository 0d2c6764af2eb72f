//! Runtime scoring contract for the pre-trained eligibility classifier.
//!
//! The model artifact and its explainer are loaded once at start-up and shared read-only by
//! every submission. A scoring call never panics; invalid inputs surface as [`ScoringError`]
//! so the orchestrator can degrade the assessment instead of aborting the application.

mod explainer;
mod model;

pub use explainer::{Explanation, TreeExplainer};
pub use model::{
    ModelArtifact, ModelLoadError, NodeArtifact, SplitArtifact, TreeArtifact, TreeEnsemble,
};

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Number of model inputs.
pub const FEATURE_COUNT: usize = 5;

/// Default positive-class cutoff; probabilities strictly above it are eligible.
pub const DEFAULT_ELIGIBILITY_CUTOFF: f64 = 0.5;

/// Model inputs, in the column order the artifact was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityFeature {
    Income,
    DebtService,
    Dependents,
    EmploymentStatus,
    ExistingBenefits,
}

impl EligibilityFeature {
    pub const fn ordered() -> [Self; FEATURE_COUNT] {
        [
            Self::Income,
            Self::DebtService,
            Self::Dependents,
            Self::EmploymentStatus,
            Self::ExistingBenefits,
        ]
    }

    /// Column name stored in the model artifact.
    pub const fn model_name(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::DebtService => "loans",
            Self::Dependents => "dependents",
            Self::EmploymentStatus => "employment_status",
            Self::ExistingBenefits => "existing_benefits",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Income => "Monthly income",
            Self::DebtService => "Monthly debt service",
            Self::Dependents => "Dependents",
            Self::EmploymentStatus => "Employment status",
            Self::ExistingBenefits => "Existing benefits",
        }
    }
}

/// Applicant facts fed to the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EligibilityInput {
    pub monthly_income: f64,
    pub monthly_debt_service: f64,
    pub dependents: u32,
    /// Not collected on the intake form; assumed employed.
    pub employed: bool,
    /// Not collected on the intake form; assumed none.
    pub existing_benefits: bool,
}

impl EligibilityInput {
    pub fn new(monthly_income: f64, monthly_debt_service: f64, dependents: u32) -> Self {
        Self {
            monthly_income,
            monthly_debt_service,
            dependents,
            employed: true,
            existing_benefits: false,
        }
    }

    fn feature_vector(&self) -> Result<[f64; FEATURE_COUNT], ScoringError> {
        for (feature, value) in [
            (EligibilityFeature::Income, self.monthly_income),
            (EligibilityFeature::DebtService, self.monthly_debt_service),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ScoringError::InvalidInput { feature, value });
            }
        }

        Ok([
            self.monthly_income,
            self.monthly_debt_service,
            f64::from(self.dependents),
            if self.employed { 1.0 } else { 0.0 },
            if self.existing_benefits { 1.0 } else { 0.0 },
        ])
    }
}

/// Scored outcome with its additive explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityScore {
    pub eligible: bool,
    /// Positive-class probability in `[0, 1]`.
    pub confidence: f64,
    /// Raw log-odds produced by the ensemble.
    pub raw_score: f64,
    /// Expected log-odds with no feature information.
    pub baseline: f64,
    /// Signed log-odds contribution of every feature; all five keys are always present.
    pub attribution: BTreeMap<EligibilityFeature, f64>,
    pub model_version: String,
}

impl EligibilityScore {
    /// Features ordered by absolute contribution, largest first.
    pub fn top_factors(&self, limit: usize) -> Vec<(EligibilityFeature, f64)> {
        let mut factors: Vec<_> = self
            .attribution
            .iter()
            .map(|(feature, value)| (*feature, *value))
            .collect();
        factors.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        factors.truncate(limit);
        factors
    }

    /// Difference between `baseline + Σ attribution` and the raw score.
    pub fn additivity_gap(&self) -> f64 {
        (self.baseline + self.attribution.values().sum::<f64>() - self.raw_score).abs()
    }
}

/// Eligibility result stored on the application record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum EligibilityAssessment {
    #[serde(rename = "success")]
    Scored(EligibilityScore),
    /// Scoring failed at runtime; treated as not eligible.
    #[serde(rename = "error")]
    Unavailable { reason: String },
}

impl EligibilityAssessment {
    pub fn eligible(&self) -> bool {
        match self {
            Self::Scored(score) => score.eligible,
            Self::Unavailable { .. } => false,
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            Self::Scored(score) => Some(score.confidence),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn score(&self) -> Option<&EligibilityScore> {
        match self {
            Self::Scored(score) => Some(score),
            Self::Unavailable { .. } => None,
        }
    }

    pub const fn status_label(&self) -> &'static str {
        match self {
            Self::Scored(_) => "success",
            Self::Unavailable { .. } => "error",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("{} must be a finite non-negative number, got {value}", .feature.label())]
    InvalidInput {
        feature: EligibilityFeature,
        value: f64,
    },
    #[error("model produced a non-finite score")]
    NonFinite,
}

/// Seam used by the orchestrator so tests can substitute a scripted scorer.
pub trait EligibilityScoring: Send + Sync {
    fn score(&self, input: &EligibilityInput) -> Result<EligibilityScore, ScoringError>;
}

/// Tree-ensemble scorer with exact Shapley attribution.
#[derive(Debug, Clone)]
pub struct EligibilityScorer {
    model: TreeEnsemble,
    explainer: TreeExplainer,
    cutoff: f64,
}

impl EligibilityScorer {
    pub fn new(model: TreeEnsemble, cutoff: f64) -> Self {
        Self {
            model,
            explainer: TreeExplainer::new(),
            cutoff,
        }
    }

    pub fn load(path: impl AsRef<Path>, cutoff: f64) -> Result<Self, ModelLoadError> {
        Ok(Self::new(TreeEnsemble::load(path)?, cutoff))
    }

    pub fn from_artifact(artifact: ModelArtifact, cutoff: f64) -> Result<Self, ModelLoadError> {
        Ok(Self::new(TreeEnsemble::from_artifact(artifact)?, cutoff))
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn model_version(&self) -> &str {
        self.model.version()
    }
}

impl EligibilityScoring for EligibilityScorer {
    fn score(&self, input: &EligibilityInput) -> Result<EligibilityScore, ScoringError> {
        let features = input.feature_vector()?;
        let raw_score = self.model.margin(&features);
        if !raw_score.is_finite() {
            return Err(ScoringError::NonFinite);
        }

        let confidence = model::logistic(raw_score);
        let explanation = self.explainer.explain(&self.model, &features);
        let attribution = EligibilityFeature::ordered()
            .into_iter()
            .zip(explanation.contributions)
            .collect();

        Ok(EligibilityScore {
            eligible: confidence > self.cutoff,
            confidence,
            raw_score,
            baseline: explanation.baseline,
            attribution,
            model_version: self.model.version().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLED_MODEL: &str = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../models/eligibility_model.json"
    );

    fn bundled() -> EligibilityScorer {
        EligibilityScorer::load(BUNDLED_MODEL, DEFAULT_ELIGIBILITY_CUTOFF)
            .expect("bundled model loads")
    }

    fn zero_margin_model() -> EligibilityScorer {
        let raw = r#"{
            "version": "boundary",
            "feature_names": ["income", "loans", "dependents", "employment_status", "existing_benefits"],
            "base_score": 0.0,
            "trees": [{ "nodes": [
                { "split": { "feature": 0, "threshold": 5000.0, "yes": 1, "no": 2 }, "cover": 10.0 },
                { "leaf": 0.0, "cover": 5.0 },
                { "leaf": -1.0, "cover": 5.0 }
            ] }]
        }"#;
        EligibilityScorer::new(
            TreeEnsemble::from_json(raw).expect("valid model"),
            DEFAULT_ELIGIBILITY_CUTOFF,
        )
    }

    #[test]
    fn low_income_household_is_scored_with_full_attribution() {
        let score = bundled()
            .score(&EligibilityInput::new(3000.0, 0.0, 3))
            .expect("score");

        assert!((0.0..=1.0).contains(&score.confidence));
        assert_eq!(score.eligible, score.confidence > 0.5);
        assert_eq!(score.attribution.len(), FEATURE_COUNT);
        for feature in EligibilityFeature::ordered() {
            assert!(score.attribution.contains_key(&feature), "{feature:?} missing");
        }
        assert!(score.additivity_gap() < 1e-9);
    }

    #[test]
    fn probability_of_exactly_half_is_not_eligible() {
        let score = zero_margin_model()
            .score(&EligibilityInput::new(1000.0, 0.0, 2))
            .expect("score");
        assert_eq!(score.confidence, 0.5);
        assert!(!score.eligible);
    }

    #[test]
    fn negative_income_is_rejected() {
        let err = bundled()
            .score(&EligibilityInput::new(-1.0, 0.0, 1))
            .expect_err("invalid input");
        assert!(matches!(
            err,
            ScoringError::InvalidInput {
                feature: EligibilityFeature::Income,
                ..
            }
        ));
    }

    #[test]
    fn unavailable_assessment_is_not_eligible() {
        let assessment = EligibilityAssessment::Unavailable {
            reason: "model produced a non-finite score".to_string(),
        };
        assert!(!assessment.eligible());
        assert_eq!(assessment.status_label(), "error");
        assert!(assessment.confidence().is_none());
    }

    #[test]
    fn top_factors_rank_by_magnitude() {
        let score = bundled()
            .score(&EligibilityInput::new(15000.0, 9000.0, 2))
            .expect("score");
        let factors = score.top_factors(2);
        assert_eq!(factors.len(), 2);
        assert!(factors[0].1.abs() >= factors[1].1.abs());
    }
}
