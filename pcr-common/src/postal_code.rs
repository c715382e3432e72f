//! Postal code normalization
//!
//! Candidate codes arrive in arbitrary formatting (`01001-000`, ` 01001000 `,
//! `01.001-000`). A candidate is accepted only if exactly 8 digits remain after
//! stripping every non-digit character.

use std::collections::HashSet;

/// Number of digits in a normalized postal code
pub const CODE_LEN: usize = 8;

/// Normalize one candidate code.
///
/// Returns `None` when the candidate does not reduce to exactly 8 digits.
pub fn normalize_code(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    (digits.len() == CODE_LEN).then_some(digits)
}

/// Normalize and deduplicate a sequence of candidates.
///
/// Keeps first-seen order so task submission follows the input order.
pub fn normalize_codes<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .filter_map(|candidate| normalize_code(candidate.as_ref()))
        .filter(|code| seen.insert(code.clone()))
        .collect()
}
