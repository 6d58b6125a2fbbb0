//! Input sanitization and format validation.
//!
//! Everything here is a pure function. Values that end up in a SQL
//! identifier position (sort column, order direction) must pass
//! [`allowed_value`]; data values always bind as statement parameters.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

/// Trims, removes markup tags, and escapes HTML entities.
///
/// Stored text is rendered back into pages by the front-end, so anything
/// that looks like markup is neutralized before it reaches the store.
pub fn sanitize(input: &str) -> String {
    escape_entities(&strip_tags(input.trim()))
}

fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_tag = false;
    for c in input.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

fn escape_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Checks the usual `local@domain.tld` shape.
pub fn valid_email(email: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    let re = EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static email pattern"));
    re.is_match(email)
}

/// Strict `YYYY-MM-DD` check: parse, re-render, and compare, so impossible
/// calendar dates like 2024-02-30 are rejected.
pub fn valid_date(date: &str) -> bool {
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(parsed) => parsed.format("%Y-%m-%d").to_string() == date,
        Err(_) => false,
    }
}

/// Returns the matching allow-list entry, so callers interpolate the list's
/// own string rather than the caller-supplied one.
pub fn allowed_value<'a>(value: &str, allowed: &[&'a str]) -> Option<&'a str> {
    allowed.iter().copied().find(|v| *v == value)
}
