//! Contact value scanning and the ordered contact set

use std::sync::OnceLock;

use indexmap::IndexSet;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Local part, `@`, domain, and a top-level segment of at least two letters
const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";

/// Ten digits starting with 6-9, optionally prefixed by `+91` or `91`
const PHONE_PATTERN: &str = r"\b(?:\+?91[\s-]?)?[6-9][0-9]{9}\b";

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern compiles"))
}

fn phone_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(PHONE_PATTERN).expect("phone pattern compiles"))
}

/// Email addresses and phone numbers, deduplicated in first-seen order
///
/// Insertion order is what makes capping deterministic: when a set is trimmed
/// the earliest observed values survive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSet {
    #[serde(default)]
    pub emails: IndexSet<String>,

    #[serde(default)]
    pub phones: IndexSet<String>,
}

impl ContactSet {
    /// True when neither emails nor phones are present
    pub fn is_empty(&self) -> bool {
        self.emails.is_empty() && self.phones.is_empty()
    }

    /// Keep at most `cap` values of each kind
    pub fn capped(&self, cap: usize) -> Self {
        Self {
            emails: self.emails.iter().take(cap).cloned().collect(),
            phones: self.phones.iter().take(cap).cloned().collect(),
        }
    }

    /// Set union (existing values first, then new ones), capped per kind
    ///
    /// Values are compared exactly; no case folding or normalisation.
    pub fn union_capped(&self, other: &ContactSet, cap: usize) -> Self {
        Self {
            emails: union_take(&self.emails, &other.emails, cap),
            phones: union_take(&self.phones, &other.phones, cap),
        }
    }
}

fn union_take(left: &IndexSet<String>, right: &IndexSet<String>, cap: usize) -> IndexSet<String> {
    let mut out = IndexSet::new();
    for value in left.iter().chain(right.iter()) {
        if out.len() >= cap {
            break;
        }
        out.insert(value.clone());
    }
    out
}

/// First `limit` email matches, then deduplicated
///
/// Truncation happens before deduplication, so repeated addresses can leave
/// fewer than `limit` values.
pub fn scan_emails(text: &str, limit: usize) -> IndexSet<String> {
    scan(email_regex(), text, limit)
}

/// First `limit` phone matches, then deduplicated
pub fn scan_phones(text: &str, limit: usize) -> IndexSet<String> {
    scan(phone_regex(), text, limit)
}

fn scan(regex: &Regex, text: &str, limit: usize) -> IndexSet<String> {
    regex
        .find_iter(text)
        .take(limit)
        .map(|m| m.as_str().to_string())
        .collect()
}
