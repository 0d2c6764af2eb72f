use serde::{Deserialize, Serialize};

use super::strip_bullet;

/// Sections pulled out of a resume before prompting for career suggestions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeSummary {
    pub skills: Vec<String>,
    pub experience: Vec<String>,
    pub education: Vec<String>,
}

impl ResumeSummary {
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty() && self.experience.is_empty() && self.education.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Skills,
    Experience,
    Education,
}

const HEADINGS: [(&str, Section); 9] = [
    ("technical skills", Section::Skills),
    ("skills", Section::Skills),
    ("core competencies", Section::Skills),
    ("competencies", Section::Skills),
    ("professional experience", Section::Experience),
    ("work experience", Section::Experience),
    ("experience", Section::Experience),
    ("work history", Section::Experience),
    ("education", Section::Education),
];

const EDUCATION_ALIASES: [&str; 1] = ["qualifications"];

/// Match a heading line, returning the section and any inline content after the colon.
fn heading(line: &str) -> Option<(Section, &str)> {
    let trimmed = line.trim();
    let (label, rest) = match trimmed.split_once(':') {
        Some((label, rest)) => (label.trim(), rest.trim()),
        None => (trimmed, ""),
    };
    let label = label.to_lowercase();

    HEADINGS
        .iter()
        .find(|(name, _)| label == *name)
        .map(|(_, section)| *section)
        .or_else(|| {
            EDUCATION_ALIASES
                .iter()
                .any(|name| label == *name)
                .then_some(Section::Education)
        })
        .map(|section| (section, rest))
}

/// Collect the lines under each recognised heading, up to a blank line or the next heading.
/// Only the first occurrence of each section is kept.
pub fn summarize_resume(text: &str) -> ResumeSummary {
    let mut summary = ResumeSummary::default();
    let mut seen: Vec<Section> = Vec::new();
    let mut current: Option<Section> = None;

    for line in text.lines() {
        if let Some((section, inline)) = heading(line) {
            if seen.contains(&section) {
                current = None;
                continue;
            }
            seen.push(section);
            current = Some(section);
            push_items(&mut summary, section, inline);
            continue;
        }

        if line.trim().is_empty() {
            current = None;
            continue;
        }

        if let Some(section) = current {
            push_items(&mut summary, section, line);
        }
    }

    summary
}

fn push_items(summary: &mut ResumeSummary, section: Section, raw: &str) {
    let item = strip_bullet(raw);
    if item.is_empty() {
        return;
    }

    let target = match section {
        Section::Skills => &mut summary.skills,
        Section::Experience => &mut summary.experience,
        Section::Education => &mut summary.education,
    };

    if section == Section::Skills && item.contains(',') {
        target.extend(
            item.split(',')
                .map(str::trim)
                .filter(|skill| !skill.is_empty())
                .map(str::to_string),
        );
    } else {
        target.push(item.to_string());
    }
}
