//! Career suggestions for approved applicants who supplied a resume.

mod resume;

pub use resume::{summarize_resume, ResumeSummary};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::DocumentHandle;
use super::generation::TextGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendationStatus {
    #[serde(rename = "success")]
    Generated,
    #[serde(rename = "financial_assistance_not_approved")]
    NotApproved,
    #[serde(rename = "no_resume_provided")]
    NoResume,
    #[serde(rename = "error")]
    GenerationError,
}

impl RecommendationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Generated => "success",
            Self::NotApproved => "financial_assistance_not_approved",
            Self::NoResume => "no_resume_provided",
            Self::GenerationError => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationOutcome {
    pub status: RecommendationStatus,
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_summary: Option<ResumeSummary>,
}

impl RecommendationOutcome {
    fn empty(status: RecommendationStatus, resume_summary: Option<ResumeSummary>) -> Self {
        Self {
            status,
            suggestions: Vec::new(),
            resume_summary,
        }
    }

    pub fn not_approved() -> Self {
        Self::empty(RecommendationStatus::NotApproved, None)
    }

    pub fn no_resume() -> Self {
        Self::empty(RecommendationStatus::NoResume, None)
    }

    pub fn generation_failed(resume_summary: Option<ResumeSummary>) -> Self {
        Self::empty(RecommendationStatus::GenerationError, resume_summary)
    }
}

/// Financial facts quoted in the recommendation prompt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinancialFacts {
    pub monthly_income: f64,
    pub monthly_debt_service: f64,
    pub dependents: u32,
}

#[derive(Clone)]
pub struct RecommendationAdapter {
    generator: Arc<dyn TextGenerator>,
}

impl RecommendationAdapter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Generation runs only for eligible applicants with a non-empty resume.
    pub async fn recommend(
        &self,
        eligible: bool,
        resume: Option<&DocumentHandle>,
        facts: &FinancialFacts,
    ) -> RecommendationOutcome {
        if !eligible {
            return RecommendationOutcome::not_approved();
        }

        let text = resume
            .map(|document| String::from_utf8_lossy(&document.content).into_owned())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return RecommendationOutcome::no_resume();
        }

        let summary = summarize_resume(&text);
        let prompt = recommendation_prompt(&summary, facts);
        match self.generator.generate(&prompt).await {
            Ok(response) => {
                let suggestions = parse_suggestions(&response);
                info!(
                    model = self.generator.model_name(),
                    count = suggestions.len(),
                    "career recommendations generated"
                );
                RecommendationOutcome {
                    status: RecommendationStatus::Generated,
                    suggestions,
                    resume_summary: Some(summary),
                }
            }
            Err(err) => {
                warn!(
                    model = self.generator.model_name(),
                    error = %err,
                    "recommendation generation failed"
                );
                RecommendationOutcome::generation_failed(Some(summary))
            }
        }
    }
}

fn format_list(items: &[String]) -> String {
    if items.is_empty() {
        "not stated".to_string()
    } else {
        items.join("; ")
    }
}

pub(crate) fn recommendation_prompt(summary: &ResumeSummary, facts: &FinancialFacts) -> String {
    format!(
        "You are a career advisor for UAE government social support recipients.\n\
         Based on the following applicant profile, suggest specific job opportunities \
         or educational programs that would help improve their financial situation.\n\n\
         Applicant Profile:\n\
         - Skills: {skills}\n\
         - Experience: {experience}\n\
         - Education: {education}\n\
         - Current Financial Situation:\n\
         \x20 * Monthly Income: AED {income:.2}\n\
         \x20 * Dependents: {dependents}\n\
         \x20 * Loan Amount: AED {loans:.2}\n\n\
         Provide 3-5 concrete recommendations including:\n\
         - Specific job titles to apply for\n\
         - Training programs that would increase employability\n\
         - Educational opportunities\n\
         - Government support programs they may qualify for\n\n\
         Format your response as a bulleted list with brief explanations for each recommendation.",
        skills = format_list(&summary.skills),
        experience = format_list(&summary.experience),
        education = format_list(&summary.education),
        income = facts.monthly_income,
        dependents = facts.dependents,
        loans = facts.monthly_debt_service,
    )
}

/// Split a generated reply into suggestions, dropping bullets and lead-in lines.
pub fn parse_suggestions(response: &str) -> Vec<String> {
    response
        .lines()
        .map(strip_bullet)
        .filter(|line| !line.is_empty() && !line.ends_with(':'))
        .map(str::to_string)
        .collect()
}

/// Remove a leading `-`, `*`, `•` or `1.` / `1)` marker.
pub(crate) fn strip_bullet(line: &str) -> &str {
    let unmarked = line
        .trim()
        .trim_start_matches(|ch: char| matches!(ch, '-' | '*' | '•' | '–' | '·'))
        .trim_start();

    let digits = unmarked
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(unmarked.len());
    if digits > 0 {
        let rest = &unmarked[digits..];
        let mut chars = rest.chars();
        if matches!(chars.next(), Some('.') | Some(')'))
            && chars.next().map_or(true, char::is_whitespace)
        {
            return rest[1..].trim();
        }
    }

    unmarked.trim_end()
}
