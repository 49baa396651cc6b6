//! Recovery of a single SELECT statement from a model reply.
//!
//! Replies may wrap the statement in prose or markdown fences. The
//! sanitizer extracts the first SELECT statement and normalizes its
//! terminator, or rejects the reply with a typed error.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::error::{Result, SageError};

/// A statement that starts with `SELECT`, ends with exactly one `;` and
/// carries no markdown fencing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedQuery(String);

impl SanitizedQuery {
    /// Validates and normalizes an already extracted statement.
    ///
    /// Trailing terminators collapse to one `;`. Any other `;` outside a
    /// literal means a second statement and is rejected.
    pub fn new(statement: &str) -> Result<Self> {
        let trimmed = statement.trim();
        if trimmed.is_empty() {
            return Err(SageError::EmptyResponse);
        }
        if !starts_with_select(trimmed) {
            return Err(SageError::InvalidPrefix(preview(trimmed)));
        }

        let body = trimmed.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        if statement_end(body).is_some() {
            return Err(SageError::ReadOnlyViolation(format!(
                "more than one statement in '{}'",
                preview(body)
            )));
        }
        Ok(Self(format!("{body};")))
    }

    /// Returns the statement text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the query, returning the statement text.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for SanitizedQuery {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SanitizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?i)```(?:sql\b)?").expect("fence pattern is valid"))
}

fn select_pattern() -> &'static Regex {
    static SELECT: OnceLock<Regex> = OnceLock::new();
    SELECT.get_or_init(|| Regex::new(r"(?i)\bSELECT\b").expect("select pattern is valid"))
}

fn starts_with_select(text: &str) -> bool {
    text.get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("select"))
}

fn preview(text: &str) -> String {
    const MAX: usize = 40;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Returns the byte offset of the first `;` outside quoted literals.
///
/// A quote left open at the end belongs to prose, not SQL (e.g. "Here's
/// why"), so the first `;` after that quote is used instead.
fn statement_end(text: &str) -> Option<usize> {
    let mut quote: Option<(char, usize)> = None;
    for (idx, c) in text.char_indices() {
        match (quote, c) {
            (Some((q, _)), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"' | '`') => quote = Some((c, idx)),
            (None, ';') => return Some(idx),
            (None, _) => {}
        }
    }

    let (_, opened) = quote?;
    text[opened..].find(';').map(|offset| opened + offset)
}

/// Extracts a single SELECT statement from a raw model reply.
pub fn sanitize(raw_reply: &str) -> Result<SanitizedQuery> {
    if raw_reply.trim().is_empty() {
        return Err(SageError::EmptyResponse);
    }
    debug!(reply = raw_reply, "Sanitizing model reply");

    let unfenced = fence_pattern().replace_all(raw_reply, "\n");
    let text = unfenced.trim();

    let start = select_pattern()
        .find(text)
        .map(|m| m.start())
        .ok_or(SageError::NoSelectFound)?;
    let tail = &text[start..];

    let candidate = match statement_end(tail) {
        Some(end) => &tail[..=end],
        None => tail,
    };

    SanitizedQuery::new(candidate)
}
