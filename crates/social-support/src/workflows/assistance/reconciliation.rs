use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{DeclaredFields, ExtractedFields, MismatchField};

pub const DEFAULT_INCOME_TOLERANCE: f64 = 500.0;
pub const DEFAULT_ADDRESS_SIMILARITY: f64 = 0.70;

/// Thresholds used when comparing declared and extracted values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationPolicy {
    /// Maximum absolute difference tolerated for income and debt service.
    pub amount_tolerance: f64,
    /// Minimum address similarity accepted as a match.
    pub address_similarity: f64,
}

impl Default for ReconciliationPolicy {
    fn default() -> Self {
        Self {
            amount_tolerance: DEFAULT_INCOME_TOLERANCE,
            address_similarity: DEFAULT_ADDRESS_SIMILARITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOutcome {
    Match,
    Mismatch,
    /// Nothing was extracted for this field, so it was not compared.
    Skipped,
}

/// One row of the reconciliation table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldComparison {
    pub field: MismatchField,
    pub declared: String,
    pub extracted: String,
    pub outcome: ComparisonOutcome,
    /// Address similarity or absolute amount difference, when one was computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub measure: Option<f64>,
}

impl FieldComparison {
    pub fn is_mismatch(&self) -> bool {
        self.outcome == ComparisonOutcome::Mismatch
    }
}

/// Pure comparison of declared values against extracted values.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconciliationEngine {
    policy: ReconciliationPolicy,
}

impl ReconciliationEngine {
    pub fn new(policy: ReconciliationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ReconciliationPolicy {
        &self.policy
    }

    /// Compare every field, in [`MismatchField::ordered`] order.
    pub fn compare(
        &self,
        declared: &DeclaredFields,
        extracted: &ExtractedFields,
    ) -> Vec<FieldComparison> {
        MismatchField::ordered()
            .into_iter()
            .map(|field| self.compare_field(field, declared, extracted))
            .collect()
    }

    /// Mismatched fields only, in evaluation order.
    pub fn reconcile(
        &self,
        declared: &DeclaredFields,
        extracted: &ExtractedFields,
    ) -> Vec<MismatchField> {
        let comparisons = self.compare(declared, extracted);
        for comparison in comparisons.iter().filter(|row| row.is_mismatch()) {
            warn!(
                field = comparison.field.label(),
                measure = ?comparison.measure,
                "field mismatch"
            );
        }

        let mismatches: Vec<MismatchField> = comparisons
            .into_iter()
            .filter(FieldComparison::is_mismatch)
            .map(|row| row.field)
            .collect();
        info!(count = mismatches.len(), "reconciliation finished");
        mismatches
    }

    fn compare_field(
        &self,
        field: MismatchField,
        declared: &DeclaredFields,
        extracted: &ExtractedFields,
    ) -> FieldComparison {
        let (declared_value, extracted_value, outcome, measure) = match field {
            MismatchField::Name => {
                let outcome = text_outcome(&extracted.name, || {
                    normalize_identifier(&declared.name) == normalize_identifier(&extracted.name)
                });
                (declared.name.clone(), extracted.name.clone(), outcome, None)
            }
            MismatchField::PhoneNumber => {
                let outcome = text_outcome(&extracted.phone, || {
                    phones_match(&declared.phone, &extracted.phone)
                });
                (declared.phone.clone(), extracted.phone.clone(), outcome, None)
            }
            MismatchField::Address => {
                if extracted.address.is_empty() {
                    (
                        declared.address.clone(),
                        String::new(),
                        ComparisonOutcome::Skipped,
                        None,
                    )
                } else {
                    let similarity = address_similarity(&declared.address, &extracted.address);
                    let outcome = if similarity < self.policy.address_similarity {
                        ComparisonOutcome::Mismatch
                    } else {
                        ComparisonOutcome::Match
                    };
                    (
                        declared.address.clone(),
                        extracted.address.clone(),
                        outcome,
                        Some(similarity),
                    )
                }
            }
            MismatchField::Income => self.amount_row(
                declared.monthly_income,
                extracted.monthly_income,
            ),
            MismatchField::LoanAmount => self.amount_row(
                declared.monthly_debt_service,
                extracted.monthly_debt_service,
            ),
        };

        FieldComparison {
            field,
            declared: declared_value,
            extracted: extracted_value,
            outcome,
            measure,
        }
    }

    fn amount_row(
        &self,
        declared: f64,
        extracted: f64,
    ) -> (String, String, ComparisonOutcome, Option<f64>) {
        let difference = (declared - extracted).abs();
        let outcome = if difference > self.policy.amount_tolerance {
            ComparisonOutcome::Mismatch
        } else {
            ComparisonOutcome::Match
        };
        (
            format!("{declared:.2}"),
            format!("{extracted:.2}"),
            outcome,
            Some(difference),
        )
    }
}

fn text_outcome(extracted: &str, matches: impl FnOnce() -> bool) -> ComparisonOutcome {
    if extracted.is_empty() {
        ComparisonOutcome::Skipped
    } else if matches() {
        ComparisonOutcome::Match
    } else {
        ComparisonOutcome::Mismatch
    }
}

/// Trim, lowercase, and drop spaces, `-`, and `+`.
pub fn normalize_identifier(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .filter(|ch| !matches!(ch, ' ' | '-' | '+'))
        .collect()
}

/// Phones match when either normalized form contains the other.
pub fn phones_match(declared: &str, extracted: &str) -> bool {
    let declared = normalize_identifier(declared);
    let extracted = normalize_identifier(extracted);
    declared.contains(&extracted) || extracted.contains(&declared)
}

/// Drop punctuation, collapse whitespace, lowercase.
pub fn normalize_address(value: &str) -> String {
    let kept: String = value
        .chars()
        .filter(|ch| ch.is_alphanumeric() || *ch == '_' || ch.is_whitespace())
        .collect();
    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Shared distinct characters over the longer normalized length; 0 when either side is empty.
pub fn address_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_address(a);
    let b = normalize_address(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let a_chars: BTreeSet<char> = a.chars().collect();
    let b_chars: BTreeSet<char> = b.chars().collect();
    let common = a_chars.intersection(&b_chars).count();
    let longest = a.chars().count().max(b.chars().count());
    common as f64 / longest as f64
}
