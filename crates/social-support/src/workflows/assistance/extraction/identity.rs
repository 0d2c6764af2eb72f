use std::sync::OnceLock;

use regex::Regex;

/// Labeled fields recovered from identity document text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityFields {
    pub identity_number: Option<String>,
    pub name: String,
    pub address: String,
    pub phone: String,
}

struct IdentityPatterns {
    identity_number: Regex,
    name: Regex,
    address: Regex,
    phone: Regex,
}

fn patterns() -> Option<&'static IdentityPatterns> {
    static PATTERNS: OnceLock<Option<IdentityPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(IdentityPatterns {
                identity_number: Regex::new(
                    r"(?i)(?:emirates\s*id|identity\s*number|id\s*number)\s*:\s*(\d[\d-]*)",
                )
                .ok()?,
                name: Regex::new(r"(?im)\bname\s*:[ \t]*([^\r\n]+)").ok()?,
                address: Regex::new(r"(?im)\baddress\s*:[ \t]*([^\r\n]+)").ok()?,
                phone: Regex::new(r"(?i)\bphone\s*:[ \t]*(\+?[\d ]+)").ok()?,
            })
        })
        .as_ref()
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|value| value.as_str().trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parse `Label: value` lines. Labels are case-insensitive; missing labels yield empty fields.
pub fn parse_identity_text(text: &str) -> IdentityFields {
    let Some(patterns) = patterns() else {
        return IdentityFields::default();
    };
    IdentityFields {
        identity_number: capture(&patterns.identity_number, text)
            .map(|value| value.trim_end_matches('-').to_string()),
        name: capture(&patterns.name, text).unwrap_or_default(),
        address: capture(&patterns.address, text).unwrap_or_default(),
        phone: capture(&patterns.phone, text).unwrap_or_default(),
    }
}
