use std::collections::BTreeMap;
use std::io::Read;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;

/// Metadata rows (bank name, account holder, period, ...) printed above the column header.
pub const STATEMENT_METADATA_ROWS: usize = 6;

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d-%b-%Y", "%d %b %Y", "%Y/%m/%d",
];

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Monthly averages derived from a bank statement.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatementSummary {
    pub monthly_income: f64,
    pub monthly_debt_service: f64,
    pub salary_months: usize,
    pub installment_months: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum StatementError {
    #[error("bank statement could not be read as CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("bank statement ended before the header row")]
    MissingHeader,
    #[error("bank statement header has no {0} column")]
    MissingColumn(&'static str),
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    description: usize,
    date: usize,
    income: Option<usize>,
    expenditure: Option<usize>,
}

impl Columns {
    fn locate(header: &csv::StringRecord) -> Result<Self, StatementError> {
        let find = |needle: &str| {
            header
                .iter()
                .position(|column| column.trim().to_lowercase().contains(needle))
        };

        Ok(Self {
            description: find("desc").ok_or(StatementError::MissingColumn("description"))?,
            date: find("date").ok_or(StatementError::MissingColumn("date"))?,
            income: find("income"),
            expenditure: find("expend"),
        })
    }
}

struct Keywords {
    salary: Regex,
    installment: Regex,
}

fn keywords() -> Option<&'static Keywords> {
    static KEYWORDS: OnceLock<Option<Keywords>> = OnceLock::new();
    KEYWORDS
        .get_or_init(|| {
            Some(Keywords {
                salary: Regex::new(r"(?i)salary").ok()?,
                installment: Regex::new(r"(?i)\bemi\b|loan\s+install?ment").ok()?,
            })
        })
        .as_ref()
}

/// Average salary credits and loan installments per calendar month.
///
/// Salary rows contribute their income amount and installment rows their expenditure amount.
/// Rows without a parsable date or amount are skipped. Each average is taken over the months
/// in which that kind of row appears.
pub fn summarize_statement<R: Read>(reader: R) -> Result<StatementSummary, StatementError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = reader.records().skip(STATEMENT_METADATA_ROWS);
    let header = records.next().ok_or(StatementError::MissingHeader)??;
    let columns = Columns::locate(&header)?;
    let Some(keywords) = keywords() else {
        return Ok(StatementSummary::default());
    };

    let mut salary: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    let mut installments: BTreeMap<(i32, u32), f64> = BTreeMap::new();

    for record in records {
        let record = record?;
        let description = record.get(columns.description).unwrap_or_default();
        let Some(date) = record.get(columns.date).and_then(parse_date) else {
            continue;
        };
        let month = (date.year(), date.month());

        if keywords.salary.is_match(description) {
            if let Some(amount) = columns
                .income
                .and_then(|index| record.get(index))
                .and_then(parse_amount)
            {
                *salary.entry(month).or_default() += amount;
            }
        }

        if keywords.installment.is_match(description) {
            if let Some(amount) = columns
                .expenditure
                .and_then(|index| record.get(index))
                .and_then(parse_amount)
            {
                *installments.entry(month).or_default() += amount;
            }
        }
    }

    Ok(StatementSummary {
        monthly_income: mean(&salary),
        monthly_debt_service: mean(&installments),
        salary_months: salary.len(),
        installment_months: installments.len(),
    })
}

fn mean(monthly: &BTreeMap<(i32, u32), f64>) -> f64 {
    if monthly.is_empty() {
        return 0.0;
    }
    monthly.values().sum::<f64>() / monthly.len() as f64
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
                .map(|timestamp| timestamp.date())
        })
}

fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches("AED")
        .chars()
        .filter(|ch| !matches!(ch, ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|amount| amount.is_finite())
}
