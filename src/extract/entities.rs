//! Candidate entity strategies

use super::CandidateEntity;

/// Produces candidate entities from a page's visible text
///
/// Implementations must be deterministic: the same text always yields the same
/// candidates in the same order.
pub trait EntityStrategy: Send + Sync + std::fmt::Debug {
    /// Return at most `limit` candidates in scan order
    fn candidates(&self, text: &str, limit: usize) -> Vec<CandidateEntity>;
}

/// Shallow proper-noun heuristic
///
/// A whitespace token qualifies when it is title case, at least three
/// characters long and not a stopword. Every hit is labelled `ORG`.
/// Duplicates are kept.
#[derive(Debug, Clone)]
pub struct TitleCaseStrategy {
    min_chars: usize,
    stopwords: Vec<String>,
}

impl Default for TitleCaseStrategy {
    fn default() -> Self {
        Self {
            min_chars: 3,
            stopwords: vec!["the".to_string(), "and".to_string(), "for".to_string()],
        }
    }
}

impl TitleCaseStrategy {
    /// Replace the stopword list (compared case-insensitively)
    pub fn with_stopwords<I, S>(mut self, stopwords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stopwords = stopwords
            .into_iter()
            .map(|s| s.into().to_lowercase())
            .collect();
        self
    }

    fn qualifies(&self, token: &str) -> bool {
        token.chars().count() >= self.min_chars
            && is_title_case(token)
            && !self.stopwords.contains(&token.to_lowercase())
    }
}

impl EntityStrategy for TitleCaseStrategy {
    fn candidates(&self, text: &str, limit: usize) -> Vec<CandidateEntity> {
        text.split_whitespace()
            .filter(|token| self.qualifies(token))
            .take(limit)
            .map(CandidateEntity::org)
            .collect()
    }
}

/// Title case check over cased runs
///
/// Uppercase and titlecase letters may only start a run of cased letters, lowercase letters
/// may only continue one, and at least one cased letter must be present.
/// Uncased characters (digits, punctuation) end a run.
pub fn is_title_case(word: &str) -> bool {
    let mut seen_cased = false;
    let mut in_run = false;

    for c in word.chars() {
        if c.is_uppercase() || is_titlecase_letter(c) {
            if in_run {
                return false;
            }
            in_run = true;
            seen_cased = true;
        } else if c.is_lowercase() {
            if !in_run {
                return false;
            }
            seen_cased = true;
        } else {
            in_run = false;
        }
    }

    seen_cased
}

/// Letters in the Unicode titlecase category (Lt), e.g. `ǅ`
///
/// They are neither uppercase nor lowercase to `char`, but start a cased run
/// the same way an uppercase letter does.
fn is_titlecase_letter(c: char) -> bool {
    matches!(
        c,
        '\u{01C5}'
            | '\u{01C8}'
            | '\u{01CB}'
            | '\u{01F2}'
            | '\u{1F88}'..='\u{1F8F}'
            | '\u{1F98}'..='\u{1F9F}'
            | '\u{1FA8}'..='\u{1FAF}'
            | '\u{1FBC}'
            | '\u{1FCC}'
            | '\u{1FFC}'
    )
}
