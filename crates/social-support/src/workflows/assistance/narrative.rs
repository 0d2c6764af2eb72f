use std::sync::Arc;

use super::domain::{DeclaredFields, ExtractedFields};
use super::eligibility::EligibilityAssessment;
use super::generation::{GenerationError, TextGenerator};

/// Policy statement quoted to the advisor model.
pub const ELIGIBILITY_POLICY: &str = "Monthly income < AED 5000 AND at least 2 dependents.";

/// Produces the free-text explanation attached to an evaluated application.
#[derive(Clone)]
pub struct NarrativeAdapter {
    generator: Arc<dyn TextGenerator>,
}

impl NarrativeAdapter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn narrate(
        &self,
        declared: &DeclaredFields,
        extracted: &ExtractedFields,
        assessment: &EligibilityAssessment,
    ) -> Result<String, GenerationError> {
        let prompt = narrative_prompt(declared, extracted, assessment);
        self.generator.generate(&prompt).await
    }
}

/// Contact details come from the form; amounts come from the bank statement.
pub(crate) fn narrative_prompt(
    declared: &DeclaredFields,
    extracted: &ExtractedFields,
    assessment: &EligibilityAssessment,
) -> String {
    let decision = match assessment {
        EligibilityAssessment::Scored(score) => format!(
            "The eligibility model rated the applicant {} with {:.1}% confidence.",
            if score.eligible { "eligible" } else { "not eligible" },
            score.confidence * 100.0
        ),
        EligibilityAssessment::Unavailable { .. } => {
            "The eligibility model could not score this application.".to_string()
        }
    };

    format!(
        "You are a financial assistance advisor for the UAE government. \
         Evaluate the following application for social support:\n\n\
         Emirates ID: {identity}\n\
         Name: {name}\n\
         Phone: {phone}\n\
         Address: {address}\n\
         Dependents: {dependents}\n\
         Monthly Income: AED {income:.2}\n\
         Total Loans: AED {loans:.2}\n\n\
         {decision}\n\n\
         Based on UAE social support policies, determine if the applicant is eligible for \
         assistance. Eligibility criteria: {ELIGIBILITY_POLICY}\n\n\
         Provide a detailed response explaining your decision.",
        identity = declared.identity_number,
        name = declared.name,
        phone = declared.phone,
        address = declared.address,
        dependents = declared.dependents,
        income = extracted.monthly_income,
        loans = extracted.monthly_debt_service,
    )
}
