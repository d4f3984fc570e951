//! Regex templates that turn free text into a transaction skeleton.
//!
//! A template pairs a pattern with rules saying where each field of the
//! transaction comes from: a fixed value, or one of the pattern's capture
//! groups. Templates are tried in the caller's order and the first one whose
//! pattern finds a match anywhere in the text wins.

use crate::balance::AccountEntry;
use chrono::{Datelike, Local, NaiveDate};
use regex_lite::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::str::FromStr;
use tracing::{debug, warn};

/// Where a template field takes its value from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource<T> {
    /// A fixed value.
    Literal(T),
    /// 1-based capture group of the template's pattern.
    MatchGroup(usize),
}

impl<T: Clone> FieldSource<T> {
    /// Resolves the field against a match, parsing group text with `parse`.
    ///
    /// A group index outside `1..=group_count`, or a group that did not take
    /// part in the match, resolves to `None`.
    pub fn resolve(&self, matched: &MatchedTemplate, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        match self {
            FieldSource::Literal(value) => Some(value.clone()),
            FieldSource::MatchGroup(index) => matched.group(*index).and_then(parse),
        }
    }
}

fn resolve_text(source: Option<&FieldSource<String>>, matched: &MatchedTemplate) -> Option<String> {
    source.and_then(|s| s.resolve(matched, |text| Some(text.to_string())))
}

fn resolve_number<T: Clone + FromStr>(source: Option<&FieldSource<T>>, matched: &MatchedTemplate) -> Option<T> {
    source.and_then(|s| s.resolve(matched, |text| text.trim().parse().ok()))
}

/// One posting rule of a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateLine {
    pub account: Option<FieldSource<String>>,
    pub amount: Option<FieldSource<Decimal>>,
    /// Falls back to the profile's default currency.
    pub currency: Option<FieldSource<String>>,
    pub comment: Option<FieldSource<String>>,
    /// Flip the sign of the resolved amount.
    pub negate_amount: bool,
}

/// A named pattern plus the rules for building a transaction from its match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Template {
    pub name: String,
    pub pattern: String,
    /// Sample text shown while editing the template.
    pub test_text: Option<String>,
    pub description: Option<FieldSource<String>>,
    pub comment: Option<FieldSource<String>>,
    pub date_year: Option<FieldSource<i32>>,
    pub date_month: Option<FieldSource<u32>>,
    pub date_day: Option<FieldSource<u32>>,
    pub lines: Vec<TemplateLine>,
}

impl Template {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_line(mut self, line: TemplateLine) -> Self {
        self.lines.push(line);
        self
    }
}

/// A template together with the captures of its winning match.
///
/// Group texts are copied out so the result does not borrow the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedTemplate {
    pub template: Template,
    /// Index 0 is the whole match.
    groups: Vec<Option<String>>,
}

impl MatchedTemplate {
    /// Number of capture groups in the pattern, not counting group 0.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len().saturating_sub(1)
    }

    /// Text of capture group `index` (1-based).
    #[must_use]
    pub fn group(&self, index: usize) -> Option<&str> {
        if index == 0 {
            return None;
        }
        self.groups.get(index).and_then(|g| g.as_deref())
    }

    /// The full matched substring.
    #[must_use]
    pub fn matched_text(&self) -> &str {
        self.groups.first().and_then(|g| g.as_deref()).unwrap_or_default()
    }
}

/// Returns the first template whose pattern matches somewhere in `text`.
///
/// Blank patterns never match. A pattern that does not compile is logged
/// and skipped.
pub fn find_match(text: &str, templates: &[Template]) -> Option<MatchedTemplate> {
    for template in templates {
        if template.pattern.trim().is_empty() {
            continue;
        }
        let regex = match Regex::new(&template.pattern) {
            Ok(regex) => regex,
            Err(e) => {
                warn!(template = %template.name, "invalid template pattern: {e}");
                continue;
            }
        };
        if let Some(caps) = regex.captures(text) {
            debug!(template = %template.name, "template matched");
            let groups = caps.iter().map(|g| g.map(|m| m.as_str().to_string())).collect();
            return Some(MatchedTemplate {
                template: template.clone(),
                groups,
            });
        }
    }
    None
}

/// A posting produced from a template line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLine {
    pub account_name: String,
    pub amount: Option<Decimal>,
    pub currency: String,
    pub comment: String,
}

/// Transaction skeleton extracted from a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTransaction {
    pub description: String,
    pub comment: Option<String>,
    /// `None` when no year could be resolved or the date does not exist.
    pub date: Option<NaiveDate>,
    pub lines: Vec<ExtractedLine>,
}

impl ExtractedTransaction {
    /// The lines as balance-solver input.
    #[must_use]
    pub fn entries(&self) -> Vec<AccountEntry> {
        self.lines
            .iter()
            .map(|line| AccountEntry {
                account_name: line.account_name.clone(),
                amount: line.amount,
                currency: line.currency.clone(),
                comment: Some(line.comment.clone()).filter(|c| !c.trim().is_empty()),
            })
            .collect()
    }
}

/// Builds a transaction skeleton, defaulting a missing month or day to today.
pub fn extract_transaction(matched: &MatchedTemplate, default_currency: &str) -> ExtractedTransaction {
    extract_transaction_on(matched, default_currency, Local::now().date_naive())
}

/// Like [`extract_transaction`] with an explicit "today".
pub fn extract_transaction_on(
    matched: &MatchedTemplate,
    default_currency: &str,
    today: NaiveDate,
) -> ExtractedTransaction {
    let template = &matched.template;

    let date = resolve_number(template.date_year.as_ref(), matched).and_then(|year| {
        let month = resolve_number(template.date_month.as_ref(), matched).unwrap_or(today.month());
        let day = resolve_number(template.date_day.as_ref(), matched).unwrap_or(today.day());
        let date = NaiveDate::from_ymd_opt(year, month, day);
        if date.is_none() {
            debug!(year, month, day, "template produced an impossible date");
        }
        date
    });

    let lines = template
        .lines
        .iter()
        .map(|line| extract_line(line, matched, default_currency))
        .collect();

    ExtractedTransaction {
        description: resolve_text(template.description.as_ref(), matched).unwrap_or_default(),
        comment: resolve_text(template.comment.as_ref(), matched),
        date,
        lines,
    }
}

fn extract_line(line: &TemplateLine, matched: &MatchedTemplate, default_currency: &str) -> ExtractedLine {
    let amount = line
        .amount
        .as_ref()
        .and_then(|source| source.resolve(matched, parse_amount))
        .map(|amount| if line.negate_amount { -amount } else { amount });

    ExtractedLine {
        account_name: resolve_text(line.account.as_ref(), matched).unwrap_or_default(),
        amount,
        currency: resolve_text(line.currency.as_ref(), matched)
            .unwrap_or_else(|| default_currency.to_string()),
        comment: resolve_text(line.comment.as_ref(), matched).unwrap_or_default(),
    }
}

/// Parses amount text such as `1,234.50`: commas and whitespace are dropped.
fn parse_amount(text: &str) -> Option<Decimal> {
    let cleaned: String = text.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// Checks a pattern typed by the user. Blank is valid (it matches nothing).
///
/// Returns the compile error message when the pattern is invalid.
pub fn validate_pattern(pattern: &str) -> Option<String> {
    if pattern.trim().is_empty() {
        return None;
    }
    Regex::new(pattern).err().map(|e| e.to_string())
}

/// Outcome of trying a pattern against sample text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternTest {
    pub error: Option<String>,
    pub group_count: usize,
    /// Byte range of the first match in the sample text.
    pub matched_span: Option<Range<usize>>,
}

/// Compiles `pattern` and runs it once against `text`.
pub fn test_pattern(pattern: &str, text: &str) -> PatternTest {
    if pattern.is_empty() {
        return PatternTest {
            error: Some("pattern is empty".into()),
            ..PatternTest::default()
        };
    }
    match Regex::new(pattern) {
        Ok(regex) => PatternTest {
            error: None,
            group_count: regex.captures_len().saturating_sub(1),
            matched_span: regex.find(text).map(|m| m.range()),
        },
        Err(e) => PatternTest {
            error: Some(e.to_string()),
            ..PatternTest::default()
        },
    }
}
